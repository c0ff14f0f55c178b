//! Register-transfer intermediate representation.
//!
//! Lifting turns each decoded [`Instruction`](crate::disassembler::Instruction) into one
//! [`IrInstruction`]: a result location, the computed value, its operand expressions and the
//! set of flags it writes. Condition consumers (`jz`, `setl`, `cmovb`, ...) carry a boolean
//! expression rebuilt from the instruction that produced the flags, so `cmp eax, 5` followed
//! by `jz` becomes `if (eax == 5) goto ...` instead of a test of an opaque zero flag.
//!
//! # Key Types
//! - [`ExprArena`] / [`ExprId`] / [`Expr`] - Hash-consed expression trees
//! - [`IrInstruction`] / [`IrKind`] - One lifted instruction
//! - [`FlagProducer`] / [`Reconstruction`] - Per-flag condition reconstruction
//! - [`IrFunction`] - Lifted blocks of one function
//! - [`Lifter`] / [`LifterConfig`] - Function lifting
//!
//! # Example
//!
//! ```rust
//! use x86scope::analysis::{build_function, ir::lift_function};
//!
//! // mov eax, 5; add eax, 3; ret
//! let code = [0xB8, 0x05, 0x00, 0x00, 0x00, 0x83, 0xC0, 0x03, 0xC3];
//! let function = build_function(&code, 0x1000)?;
//! let ir = lift_function(&function);
//!
//! let text: Vec<String> = ir
//!     .instructions()
//!     .map(|instruction| instruction.display(ir.arena()).to_string())
//!     .collect();
//! assert_eq!(text, ["eax := 5", "eax := eax + 3", "return"]);
//! # Ok::<(), x86scope::Error>(())
//! ```

mod expr;
mod flags;
mod function;
mod instruction;
mod lifter;

pub use expr::{BinaryOp, CmpKind, Expr, ExprArena, ExprDisplay, ExprId, UnaryOp};
pub use flags::{compose_condition, condition_flags, Flag, FlagProducer, FlagSet, Reconstruction};
pub use function::IrFunction;
pub use instruction::{IrDisplay, IrInstruction, IrKind};
pub use lifter::{lift_address, lift_function, lift_instruction, lift_operand, Lifter, LifterConfig};
