//! x86 (32-bit) instruction decoding.
//!
//! This module turns raw machine code into structured [`Instruction`]s. Decoding is driven
//! by an ordered, data-driven opcode [`registry`]; addressing modes are handled by the
//! shared ModRM/SIB sub-decoder, and every operand carries an explicit [`Width`] because the
//! same opcode byte denotes different operand sizes under different prefixes.
//!
//! # Key Types
//! - [`Instruction`] - A decoded instruction (address, [`Mnemonic`], operands, size)
//! - [`Operand`] - Register, immediate, memory, relative, far pointer and FPU operands
//! - [`Register`] / [`Width`] - Register file and operand sizes
//! - [`Prefixes`] - Legacy prefixes seen in front of an opcode
//! - [`BasicBlock`] - A straight-line run of instructions
//! - [`FlowType`] / [`Condition`] - Control flow classification and condition codes
//!
//! # Main Functions
//! - [`decode_instruction`] - Decode a single instruction, failing on bad input
//! - [`decode_instruction_lenient`] - Decode a single instruction, never failing
//! - [`decode_stream`] - Linear scan to the end of the buffer
//!
//! Control flow discovery on top of the decoder lives in [`crate::analysis`].
//!
//! # Example
//! ```rust
//! use x86scope::disassembler::decode_instruction;
//! use x86scope::Parser;
//! let code = &[0x83, 0xC0, 0x03]; // add eax, 3
//! let mut parser = Parser::new(code);
//! let instruction = decode_instruction(&mut parser, 0x1000)?;
//! assert_eq!(instruction.to_string(), "add eax, 3");
//! # Ok::<(), x86scope::Error>(())
//! ```

mod block;
mod decoder;
mod instruction;
mod modrm;
mod operand;
mod prefix;
mod register;
pub mod registry;

pub use block::BasicBlock;
pub use decoder::{decode_instruction, decode_instruction_lenient, decode_stream};
pub use instruction::{Condition, FlowType, Instruction, Mnemonic};
pub use modrm::{decode_rm, ModRm, Sib};
pub use operand::Operand;
pub(crate) use operand::write_hex;
pub use prefix::{PrefixFlags, Prefixes, MAX_INSTRUCTION_LENGTH};
pub use register::{Register, Width};
