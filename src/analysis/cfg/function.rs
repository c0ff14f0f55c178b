//! The control flow graph of a single function.

use std::collections::{BTreeMap, BTreeSet};

use crate::disassembler::{BasicBlock, FlowType, Instruction};

/// The kind of control flow represented by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Direct unconditional jump
    Unconditional,
    /// Execution runs past the end of the block into the next one
    Fallthrough,
    /// Conditional branch taken
    ConditionalTrue,
    /// Conditional branch not taken
    ConditionalFalse,
    /// Jump whose target is only known at runtime
    Indirect,
}

impl EdgeKind {
    /// Returns `true` for both directions of a conditional branch.
    #[must_use]
    pub const fn is_conditional(&self) -> bool {
        matches!(self, Self::ConditionalTrue | Self::ConditionalFalse)
    }
}

/// A control flow edge between two blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Start address of the source block
    pub source: u32,
    /// Start address of the target block, `None` for [`EdgeKind::Indirect`]
    pub target: Option<u32>,
    /// Semantics of the edge
    pub kind: EdgeKind,
}

/// A function discovered by the block builder.
///
/// Blocks are keyed by their start address, never overlap, and exactly one of them is the
/// entry block. Successor edges are derived from each block's last instruction on demand
/// rather than stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub(crate) blocks: BTreeMap<u32, BasicBlock>,
    pub(crate) entry: u32,
    pub(crate) unresolved: Vec<u32>,
    pub(crate) external_targets: BTreeSet<u32>,
}

impl Function {
    /// Start address of the entry block.
    #[must_use]
    pub fn entry(&self) -> u32 {
        self.entry
    }

    /// The entry block.
    #[must_use]
    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.get(&self.entry)
    }

    /// The block starting at `address`.
    #[must_use]
    pub fn block(&self, address: u32) -> Option<&BasicBlock> {
        self.blocks.get(&address)
    }

    /// All blocks in address order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.values()
    }

    /// The block map keyed by start address.
    #[must_use]
    pub fn block_map(&self) -> &BTreeMap<u32, BasicBlock> {
        &self.blocks
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Total number of instructions over all blocks.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.values().map(BasicBlock::len).sum()
    }

    /// The block whose byte range contains `address`.
    #[must_use]
    pub fn block_containing(&self, address: u32) -> Option<&BasicBlock> {
        self.blocks
            .range(..=address)
            .next_back()
            .map(|(_, block)| block)
            .filter(|block| block.contains(address))
    }

    /// The instruction starting exactly at `address`.
    #[must_use]
    pub fn instruction_at(&self, address: u32) -> Option<&Instruction> {
        let block = self.block_containing(address)?;
        let index = block.instruction_index(address)?;
        block.instructions.get(index)
    }

    /// Addresses of jumps whose targets could not be resolved statically.
    ///
    /// Only populated when the builder runs with
    /// [`super::IndirectJumpPolicy::MarkIncomplete`].
    #[must_use]
    pub fn unresolved(&self) -> &[u32] {
        &self.unresolved
    }

    /// Jump targets outside the analysed buffer (tail calls, thunks).
    #[must_use]
    pub fn external_targets(&self) -> &BTreeSet<u32> {
        &self.external_targets
    }

    /// Returns true if every control transfer could be followed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }

    /// Outgoing edges of the block starting at `address`.
    ///
    /// Edges to targets outside the function are omitted; they are listed by
    /// [`Function::external_targets`].
    #[must_use]
    pub fn successors(&self, address: u32) -> Vec<Edge> {
        let Some(block) = self.blocks.get(&address) else {
            return Vec::new();
        };
        let Some(last) = block.instructions.last() else {
            return Vec::new();
        };

        let edge = |target: u32, kind: EdgeKind| {
            self.blocks.contains_key(&target).then_some(Edge {
                source: address,
                target: Some(target),
                kind,
            })
        };

        let mut edges = Vec::new();
        match last.flow_type() {
            FlowType::ConditionalBranch => {
                if let Some(target) = last.branch_target() {
                    edges.extend(edge(target, EdgeKind::ConditionalTrue));
                }
                edges.extend(edge(last.end(), EdgeKind::ConditionalFalse));
            }
            FlowType::UnconditionalBranch => match last.branch_target() {
                Some(target) => edges.extend(edge(target, EdgeKind::Unconditional)),
                None => edges.push(Edge {
                    source: address,
                    target: None,
                    kind: EdgeKind::Indirect,
                }),
            },
            _ if last.is_terminator() => {}
            _ => edges.extend(edge(last.end(), EdgeKind::Fallthrough)),
        }

        edges
    }

    /// Incoming edges of the block starting at `address`.
    #[must_use]
    pub fn predecessors(&self, address: u32) -> Vec<Edge> {
        self.blocks
            .keys()
            .flat_map(|&source| self.successors(source))
            .filter(|edge| edge.target == Some(address))
            .collect()
    }

    /// Start addresses of blocks that leave the function (`ret`, `hlt`, `ud2`).
    #[must_use]
    pub fn exits(&self) -> Vec<u32> {
        self.blocks
            .values()
            .filter(|block| {
                block.terminator().is_some_and(|last| {
                    !matches!(
                        last.flow_type(),
                        FlowType::ConditionalBranch | FlowType::UnconditionalBranch
                    )
                })
            })
            .map(|block| block.address)
            .collect()
    }
}
