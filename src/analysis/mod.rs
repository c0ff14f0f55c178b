//! Static analysis of decoded x86 code.
//!
//! This module builds on the [`crate::disassembler`] to recover the structure and the
//! semantics of a function without executing it.
//!
//! # Architecture
//!
//! The analysis module is organized into focused sub-modules:
//!
//! - [`cfg`] - Basic block discovery and the function graph
//! - [`ir`] - Expression arena, flag modeling and the IR lifter
//!
//! ```text
//! bytes + start → FunctionBuilder → Function (blocks) → Lifter → IrFunction
//! ```
//!
//! # Usage
//!
//! ```rust
//! use x86scope::analysis::{build_function, ir::lift_function, EdgeKind};
//!
//! // 0x1000: cmp eax, 5
//! // 0x1003: jz 0x1006
//! // 0x1005: nop
//! // 0x1006: ret
//! let code = [0x83, 0xF8, 0x05, 0x74, 0x01, 0x90, 0xC3];
//! let function = build_function(&code, 0x1000)?;
//! assert_eq!(function.block_count(), 3);
//!
//! let edges = function.successors(0x1000);
//! assert_eq!(edges[0].kind, EdgeKind::ConditionalTrue);
//! assert_eq!(edges[0].target, Some(0x1006));
//!
//! let ir = lift_function(&function);
//! let branch = &ir.block(0x1000).unwrap()[1];
//! assert_eq!(branch.display(ir.arena()).to_string(), "if (eax == 5) goto 0x1006");
//! # Ok::<(), x86scope::Error>(())
//! ```

pub mod cfg;
pub mod ir;

pub use cfg::{
    analyze_functions, build_function, build_function_at, BuilderConfig, Edge, EdgeKind,
    Function, FunctionBuilder, IndirectJumpPolicy, UnknownOpcodePolicy,
};
pub use ir::{lift_function, IrFunction, IrInstruction, IrKind, Lifter, LifterConfig};
