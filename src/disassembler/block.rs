//! Basic blocks of decoded instructions.

use crate::disassembler::Instruction;

/// A straight-line run of instructions with a single entry at its first instruction.
///
/// The last instruction is either a terminator (jump, conditional jump, return) or the
/// instruction right before the start of another known block. No instruction inside the
/// block transfers control elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Address of the first instruction
    pub address: u32,
    /// The instructions in address order
    pub instructions: Vec<Instruction>,
    /// True for the function entry block
    pub is_entry: bool,
}

impl BasicBlock {
    /// Creates an empty block starting at `address`.
    #[must_use]
    pub fn new(address: u32) -> Self {
        BasicBlock {
            address,
            instructions: Vec::new(),
            is_entry: false,
        }
    }

    /// Address of the byte following the last instruction.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.instructions
            .last()
            .map_or(self.address, Instruction::end)
    }

    /// Size of the block in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.end().wrapping_sub(self.address)
    }

    /// Number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Returns true if the block has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// The last instruction, if it ends the block by transferring control.
    #[must_use]
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions
            .last()
            .filter(|instruction| instruction.is_terminator())
    }

    /// Returns true if `address` lies within the bytes of this block.
    #[must_use]
    pub fn contains(&self, address: u32) -> bool {
        address >= self.address && address < self.end()
    }

    /// Index of the instruction starting exactly at `address`.
    #[must_use]
    pub fn instruction_index(&self, address: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&address, |instruction| instruction.address)
            .ok()
    }

    /// Splits the block before instruction `index`.
    ///
    /// `self` keeps its start address and the instructions before `index`; the returned
    /// block starts at the instruction at `index` and owns the remainder. Returns `None` if
    /// `index` is zero or out of range, since that would produce an empty block.
    pub fn split_off(&mut self, index: usize) -> Option<BasicBlock> {
        if index == 0 || index >= self.instructions.len() {
            return None;
        }

        let instructions = self.instructions.split_off(index);
        Some(BasicBlock {
            address: instructions[0].address,
            instructions,
            is_entry: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::decode_stream;
    use crate::Parser;

    fn block(code: &[u8], address: u32) -> BasicBlock {
        let mut parser = Parser::new(code);
        BasicBlock {
            address,
            instructions: decode_stream(&mut parser, address),
            is_entry: true,
        }
    }

    #[test]
    fn ranges() {
        // push ebp; mov ebp, esp; ret
        let block = block(&[0x55, 0x8B, 0xEC, 0xC3], 0x400);
        assert_eq!(block.end(), 0x404);
        assert_eq!(block.size(), 4);
        assert!(block.contains(0x400));
        assert!(block.contains(0x403));
        assert!(!block.contains(0x404));
        assert_eq!(block.instruction_index(0x401), Some(1));
        assert_eq!(block.instruction_index(0x402), None);
        assert!(block.terminator().is_some());
    }

    #[test]
    fn split() {
        let mut first = block(&[0x55, 0x8B, 0xEC, 0xC3], 0x400);
        let second = first.split_off(1).unwrap();

        assert_eq!(first.address, 0x400);
        assert_eq!(first.len(), 1);
        assert!(first.is_entry);
        assert!(first.terminator().is_none());

        assert_eq!(second.address, 0x401);
        assert_eq!(second.len(), 2);
        assert!(!second.is_entry);
        assert_eq!(first.end(), second.address);
    }

    #[test]
    fn split_rejects_empty_halves() {
        let mut block = block(&[0x90, 0xC3], 0);
        assert!(block.split_off(0).is_none());
        assert!(block.split_off(2).is_none());
        assert_eq!(block.len(), 2);
    }

    #[test]
    fn empty_block() {
        let block = BasicBlock::new(0x10);
        assert!(block.is_empty());
        assert_eq!(block.end(), 0x10);
        assert!(!block.contains(0x10));
        assert!(block.terminator().is_none());
    }
}
