//! Block builder configuration
//!
//! Controls how the block builder reacts to input it can not follow statically.

/// What to do with a jump whose target is only known at runtime (`jmp eax`, `jmp [table+eax*4]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndirectJumpPolicy {
    /// Fail the whole build with [`crate::Error::UnresolvedJump`]
    #[default]
    Abort,
    /// End the block, record the jump in [`super::Function::unresolved`] and keep the
    /// partial graph; the function is marked incomplete
    MarkIncomplete,
}

/// What to do with bytes no opcode handler accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownOpcodePolicy {
    /// Keep a one byte `unknown` instruction in the block and continue
    #[default]
    Continue,
    /// Fail the build with [`crate::Error::UnknownOpcode`]
    Abort,
}

/// Configuration for building a function's control flow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Handling of runtime-computed jump targets
    pub indirect_jumps: IndirectJumpPolicy,

    /// Maximum number of blocks before the build fails with [`crate::Error::BlockLimit`]
    /// (default: 65536)
    pub max_blocks: usize,

    /// Handling of undecodable bytes inside a block
    pub unknown_opcodes: UnknownOpcodePolicy,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            indirect_jumps: IndirectJumpPolicy::Abort,
            max_blocks: 65536,
            unknown_opcodes: UnknownOpcodePolicy::Continue,
        }
    }
}

impl BuilderConfig {
    /// Fails on anything that is not fully understood
    ///
    /// Indirect jumps and unknown opcodes both abort the build.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            indirect_jumps: IndirectJumpPolicy::Abort,
            unknown_opcodes: UnknownOpcodePolicy::Abort,
            ..Self::default()
        }
    }

    /// Recovers as much of the graph as possible
    ///
    /// Indirect jumps mark the function incomplete and unknown opcodes are kept.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            indirect_jumps: IndirectJumpPolicy::MarkIncomplete,
            unknown_opcodes: UnknownOpcodePolicy::Continue,
            ..Self::default()
        }
    }
}
