//! Lifted functions.

use std::collections::BTreeMap;

use crate::analysis::ir::{expr::ExprArena, instruction::IrInstruction};

/// A lifted function: one IR instruction list per basic block.
///
/// Blocks are keyed by the same start addresses as the [`Function`](crate::analysis::Function)
/// they were lifted from. All expressions live in the function's [`ExprArena`].
#[derive(Debug, Clone)]
pub struct IrFunction {
    arena: ExprArena,
    blocks: BTreeMap<u32, Vec<IrInstruction>>,
    entry: u32,
}

impl IrFunction {
    pub(crate) fn new(
        arena: ExprArena,
        blocks: BTreeMap<u32, Vec<IrInstruction>>,
        entry: u32,
    ) -> Self {
        IrFunction {
            arena,
            blocks,
            entry,
        }
    }

    /// The arena owning every expression of this function.
    #[must_use]
    pub fn arena(&self) -> &ExprArena {
        &self.arena
    }

    /// Mutable access to the arena, for building further expressions such as
    /// [`IrInstruction::flag_condition`] queries.
    pub fn arena_mut(&mut self) -> &mut ExprArena {
        &mut self.arena
    }

    /// Entry block address.
    #[must_use]
    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// The lifted instructions of the block starting at `address`.
    #[must_use]
    pub fn block(&self, address: u32) -> Option<&[IrInstruction]> {
        self.blocks.get(&address).map(Vec::as_slice)
    }

    /// Blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = (u32, &[IrInstruction])> {
        self.blocks
            .iter()
            .map(|(&address, instructions)| (address, instructions.as_slice()))
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of lifted instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.values().map(Vec::len).sum()
    }

    /// Every lifted instruction in address order.
    pub fn instructions(&self) -> impl Iterator<Item = &IrInstruction> {
        self.blocks.values().flatten()
    }
}
