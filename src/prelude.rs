//! # x86scope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and functions
//! from the x86scope library. Import this module to get quick access to the decoder, the
//! block builder and the lifter.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all x86scope operations
pub use crate::Error;

/// The result type used throughout x86scope
pub use crate::Result;

/// Low-level byte cursor
pub use crate::Parser;

// ================================================================================================
// Decoding
// ================================================================================================

/// Decoder entry points
pub use crate::disassembler::{decode_instruction, decode_instruction_lenient, decode_stream};

/// Decoded instruction model
pub use crate::disassembler::{
    BasicBlock, Condition, FlowType, Instruction, Mnemonic, Operand, Prefixes, Register, Width,
};

// ================================================================================================
// Control Flow
// ================================================================================================

/// Block discovery
pub use crate::analysis::{
    analyze_functions, build_function, build_function_at, BuilderConfig, FunctionBuilder,
    IndirectJumpPolicy, UnknownOpcodePolicy,
};

/// Function graph
pub use crate::analysis::{Edge, EdgeKind, Function};

// ================================================================================================
// IR
// ================================================================================================

/// Lifting
pub use crate::analysis::ir::{lift_function, lift_instruction, Lifter, LifterConfig};

/// IR model
pub use crate::analysis::ir::{
    BinaryOp, CmpKind, Expr, ExprArena, ExprId, Flag, FlagProducer, FlagSet, IrFunction,
    IrInstruction, IrKind, Reconstruction, UnaryOp,
};
