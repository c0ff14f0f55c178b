// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # x86scope
//!
//! Static analysis of raw 32-bit x86 machine code. Given a byte buffer and a start address,
//! `x86scope` decodes instructions, discovers the basic blocks of the function, and lifts
//! every instruction into a register-transfer IR in which conditional jumps carry the
//! comparison that decides them (`if (eax == 5) goto 0x1010`) instead of a raw flag bit.
//!
//! Nothing is executed; the buffer is only read.
//!
//! ## Features
//!
//! - **Table-driven decoder** - An ordered opcode registry plus a shared ModRM/SIB decoder
//!   covering the one-byte, two-byte (`0x0F`) and x87 opcode maps
//! - **Explicit operand widths** - Every operand knows its size, prefixes included
//! - **Control flow discovery** - Work-list block building with block splitting
//! - **Flag-aware lifting** - Conditions rebuilt from `cmp`, `test`, `sub`, `add`, `inc`,
//!   `dec`, `neg`, logic ops, shifts, `bt` and string compares
//! - **Parallel batch analysis** - Independent functions built concurrently with `rayon`
//!
//! ## Quick Start
//!
//! ```rust
//! use x86scope::prelude::*;
//!
//! // mov eax, 5; add eax, 3; ret
//! let code = [0xB8, 0x05, 0x00, 0x00, 0x00, 0x83, 0xC0, 0x03, 0xC3];
//! let function = build_function(&code, 0x1000)?;
//! assert_eq!(function.instruction_count(), 3);
//!
//! let ir = lift_function(&function);
//! for instruction in ir.instructions() {
//!     println!("{}", instruction.display(ir.arena()));
//! }
//! # Ok::<(), x86scope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`stream`] - Bounds-checked byte cursor ([`Parser`])
//! - [`disassembler`] - Prefixes, opcode registry, ModRM/SIB, operands and instructions
//! - [`analysis::cfg`] - Basic block discovery ([`analysis::FunctionBuilder`])
//! - [`analysis::ir`] - Expression arena, flag modeling and the lifter
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, Error>`](Result):
//!
//! ```rust
//! use x86scope::{analysis::build_function, Error};
//!
//! // jmp 0x1001 lands inside its own encoding
//! match build_function(&[0xEB, 0xFF], 0x1000) {
//!     Ok(function) => println!("{} blocks", function.block_count()),
//!     Err(Error::MisalignedTarget { address }) => println!("bad target {address:#x}"),
//!     Err(e) => println!("other error: {e}"),
//! }
//! ```
//!
//! ## Logging
//!
//! The library emits [`tracing`](https://docs.rs/tracing) events (block splits, substituted
//! `unknown` instructions, external jump targets, swallowed indirect jumps) and never
//! installs a subscriber.
//!
//! ## Fuzzing
//!
//! ```bash
//! cargo +nightly fuzz run pipeline --release
//! ```

#[macro_use]
pub(crate) mod error;

/// Bounds-checked byte access.
///
/// The [`Parser`] cursor is shared by every decoder in this crate. Its
/// [`Parser::transactional`] helper restores the position when a decode fails, so
/// callers can retry or skip without tracking offsets themselves.
pub mod stream;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use x86scope::prelude::*;
///
/// let mut parser = Parser::new(&[0x90, 0xC3]);
/// let instructions = decode_stream(&mut parser, 0x1000);
/// assert_eq!(instructions[1].mnemonic, Mnemonic::Ret);
/// ```
pub mod prelude;

/// x86 (32-bit) instruction decoding.
///
/// # Key Types
///
/// - [`disassembler::Instruction`] - A decoded instruction
/// - [`disassembler::Operand`] - Instruction operands with explicit widths
/// - [`disassembler::BasicBlock`] - A straight-line run of instructions
/// - [`disassembler::FlowType`] - How instructions affect control flow
///
/// # Main Functions
///
/// - [`disassembler::decode_instruction`] - Decode a single instruction
/// - [`disassembler::decode_stream`] - Decode to the end of the buffer
pub mod disassembler;

/// Control flow discovery and IR lifting.
pub mod analysis;

/// `x86scope` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always
/// [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `x86scope` Error type
///
/// The main error type for all operations in this crate.
pub use error::Error;

/// Bounds-checked byte cursor used by the decoder.
pub use stream::Parser;
