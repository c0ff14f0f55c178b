//! Worklist based basic block discovery.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::{
    analysis::cfg::{
        config::{BuilderConfig, IndirectJumpPolicy, UnknownOpcodePolicy},
        coverage::CoverageMap,
        function::Function,
    },
    disassembler::{decode_instruction, BasicBlock, FlowType, Instruction},
    stream::Parser,
    Error, Result,
};

/// A stateful builder that discovers the blocks of one function.
///
/// The builder owns its work queue and block map; nothing is shared between two builds, so
/// independent functions can be built concurrently with one builder each.
pub struct FunctionBuilder<'a> {
    data: &'a [u8],
    base: u32,
    config: BuilderConfig,

    blocks: BTreeMap<u32, BasicBlock>,
    queue: VecDeque<u32>,
    seeds: Vec<u32>,
    coverage: CoverageMap,
    unresolved: Vec<u32>,
    external_targets: BTreeSet<u32>,
}

impl<'a> FunctionBuilder<'a> {
    /// Create a new builder
    ///
    /// ## Arguments
    /// * 'data'    - The code buffer
    /// * 'base'    - The address of the first byte of `data`
    /// * 'config'  - Policies for indirect jumps, unknown opcodes and limits
    #[must_use]
    pub fn new(data: &'a [u8], base: u32, config: BuilderConfig) -> Self {
        FunctionBuilder {
            data,
            base,
            config,
            blocks: BTreeMap::new(),
            queue: VecDeque::new(),
            seeds: Vec::new(),
            coverage: CoverageMap::new(data.len()),
            unresolved: Vec::new(),
            external_targets: BTreeSet::new(),
        }
    }

    /// Adds addresses known to start blocks of this function, such as resolved jump table
    /// entries. They are queued after the entry and do not change the resulting blocks when
    /// they are reachable from it anyway.
    #[must_use]
    pub fn with_targets(mut self, targets: impl IntoIterator<Item = u32>) -> Self {
        self.seeds.extend(targets);
        self
    }

    /// Discovers every block reachable from `start` and returns the finished function.
    ///
    /// # Errors
    /// - [`Error::Empty`] if the buffer is empty
    /// - [`Error::AddressOutOfRange`] if `start` is not inside the buffer
    /// - [`Error::UnresolvedJump`] for an indirect jump under [`IndirectJumpPolicy::Abort`]
    /// - [`Error::MisalignedTarget`] if a jump lands inside an already decoded instruction
    /// - [`Error::Truncated`] if a block runs off the end of the buffer
    /// - [`Error::UnknownOpcode`] or [`Error::Malformed`] under [`UnknownOpcodePolicy::Abort`]
    /// - [`Error::BlockLimit`] if more than `max_blocks` blocks are discovered
    pub fn build(mut self, start: u32) -> Result<Function> {
        if self.data.is_empty() {
            return Err(Error::Empty);
        }
        if self.offset(start).is_none() {
            return Err(Error::AddressOutOfRange { address: start });
        }

        self.queue.push_back(start);
        for target in std::mem::take(&mut self.seeds) {
            self.enqueue(target);
        }

        while let Some(address) = self.queue.pop_front() {
            if self.blocks.contains_key(&address) {
                continue;
            }

            let offset = self
                .offset(address)
                .ok_or(Error::AddressOutOfRange { address })?;

            if self.coverage.is_covered(offset) {
                if !self.coverage.is_instruction_start(offset) {
                    return Err(Error::MisalignedTarget { address });
                }
                self.split_at(address)?;
                continue;
            }

            self.decode_block(address)?;
        }

        if let Some(entry) = self.blocks.get_mut(&start) {
            entry.is_entry = true;
        }
        self.unresolved.sort_unstable();

        tracing::debug!(
            start,
            blocks = self.blocks.len(),
            covered = self.coverage.covered_bytes(),
            "function built"
        );

        Ok(Function {
            blocks: self.blocks,
            entry: start,
            unresolved: self.unresolved,
            external_targets: self.external_targets,
        })
    }

    fn offset(&self, address: u32) -> Option<usize> {
        let offset = usize::try_from(address.checked_sub(self.base)?).ok()?;
        (offset < self.data.len()).then_some(offset)
    }

    fn insert_block(&mut self, block: BasicBlock) -> Result<()> {
        if self.blocks.len() >= self.config.max_blocks {
            return Err(Error::BlockLimit(self.config.max_blocks));
        }
        self.blocks.insert(block.address, block);
        Ok(())
    }

    /// Splits the block containing `address` so that a new block starts there.
    fn split_at(&mut self, address: u32) -> Result<()> {
        let Some((&owner, block)) = self.blocks.range_mut(..address).next_back() else {
            return Err(Error::MisalignedTarget { address });
        };

        let Some(tail) = block
            .instruction_index(address)
            .and_then(|index| block.split_off(index))
        else {
            return Err(Error::MisalignedTarget { address });
        };

        tracing::trace!(block = owner, address, "splitting block");
        self.insert_block(tail)
    }

    fn enqueue(&mut self, target: u32) {
        if self.offset(target).is_some() {
            self.queue.push_back(target);
        } else {
            tracing::debug!(target, "jump target outside of the buffer");
            self.external_targets.insert(target);
        }
    }

    fn decode_one(&self, parser: &mut Parser, address: u32) -> Result<Instruction> {
        match decode_instruction(parser, address) {
            Err(error @ (Error::UnknownOpcode { .. } | Error::Malformed { .. }))
                if self.config.unknown_opcodes == UnknownOpcodePolicy::Continue =>
            {
                tracing::debug!(address, %error, "undecodable instruction inside block");
                parser.advance_by(1)?;
                Ok(Instruction::unknown(address))
            }
            other => other,
        }
    }

    /// Decodes instructions from `address` until the block ends.
    fn decode_block(&mut self, address: u32) -> Result<()> {
        let mut parser = Parser::new(self.data);
        let mut block = BasicBlock::new(address);
        let mut current = address;

        tracing::trace!(address, "decoding block");

        loop {
            let Some(offset) = self.offset(current) else {
                // The code continues past the end of the buffer
                return Err(Error::Truncated { address: current });
            };

            if current != address {
                if self.blocks.contains_key(&current) {
                    break;
                }
                if self.coverage.is_covered(offset) {
                    if !self.coverage.is_instruction_start(offset) {
                        return Err(Error::MisalignedTarget { address: current });
                    }
                    self.split_at(current)?;
                    break;
                }
            }

            parser.seek(offset)?;
            let instruction = self.decode_one(&mut parser, current)?;
            let size = usize::from(instruction.size);

            if !self.coverage.is_free(offset, size) {
                return Err(Error::MisalignedTarget {
                    address: instruction.address,
                });
            }
            self.coverage.mark_instruction(offset, size);
            current = instruction.end();

            match instruction.flow_type() {
                FlowType::ConditionalBranch | FlowType::UnconditionalBranch
                    if instruction.is_indirect_jump() =>
                {
                    self.unresolved_jump(&instruction)?;
                    block.instructions.push(instruction);
                    break;
                }
                FlowType::ConditionalBranch => {
                    let target = instruction.branch_target();
                    block.instructions.push(instruction);

                    if self.offset(current).is_none() {
                        return Err(Error::Truncated { address: current });
                    }
                    self.queue.push_back(current);
                    if let Some(target) = target {
                        self.enqueue(target);
                    }
                    break;
                }
                FlowType::UnconditionalBranch => {
                    if let Some(target) = instruction.branch_target() {
                        self.enqueue(target);
                    }
                    block.instructions.push(instruction);
                    break;
                }
                _ => {
                    let terminator = instruction.is_terminator();
                    block.instructions.push(instruction);
                    if terminator {
                        break;
                    }
                }
            }
        }

        self.insert_block(block)
    }

    fn unresolved_jump(&mut self, instruction: &Instruction) -> Result<()> {
        match self.config.indirect_jumps {
            IndirectJumpPolicy::Abort => Err(Error::UnresolvedJump {
                address: instruction.address,
                mnemonic: instruction.to_string(),
            }),
            IndirectJumpPolicy::MarkIncomplete => {
                tracing::warn!(
                    address = instruction.address,
                    instruction = %instruction,
                    "unresolved jump, function is incomplete"
                );
                self.unresolved.push(instruction.address);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::Mnemonic;

    fn build(code: &[u8], config: BuilderConfig) -> Result<Function> {
        FunctionBuilder::new(code, 0x1000, config).build(0x1000)
    }

    fn starts(function: &Function) -> Vec<u32> {
        function.blocks().map(|block| block.address).collect()
    }

    #[test]
    fn single_block() {
        let function = build(&[0x90, 0x90, 0xC3], BuilderConfig::default()).unwrap();
        assert_eq!(starts(&function), vec![0x1000]);
        assert_eq!(function.entry_block().unwrap().len(), 3);
    }

    #[test]
    fn conditional_branch_splits() {
        // jz +1; nop; ret
        let function = build(&[0x74, 0x01, 0x90, 0xC3], BuilderConfig::default()).unwrap();
        assert_eq!(starts(&function), vec![0x1000, 0x1002, 0x1003]);

        let blocks: Vec<_> = function.blocks().collect();
        assert!(blocks[0].is_entry);
        assert!(!blocks[1].is_entry);
        assert_eq!(blocks[1].len(), 1);
        assert_eq!(blocks[2].len(), 1);
    }

    #[test]
    fn backward_jump_into_block_splits() {
        // 0: nop; 1: nop; 2: dec ecx; 3: jnz 1; 5: ret
        let code = [0x90, 0x90, 0x49, 0x75, 0xFC, 0xC3];
        let function = build(&code, BuilderConfig::default()).unwrap();
        assert_eq!(starts(&function), vec![0x1000, 0x1001, 0x1005]);
        assert_eq!(function.block(0x1000).unwrap().len(), 1);
        assert_eq!(function.block(0x1001).unwrap().len(), 3);
    }

    #[test]
    fn jump_into_instruction_is_misaligned() {
        // 0: mov eax, 0x01eb0000 (5 bytes); 5: jmp 2
        let code = [0xB8, 0x00, 0x00, 0xEB, 0x01, 0xEB, 0xFB];
        let result = build(&code, BuilderConfig::default());
        assert!(matches!(
            result,
            Err(Error::MisalignedTarget { address: 0x1002 })
        ));
    }

    #[test]
    fn indirect_jump_policies() {
        let code = [0x90, 0xFF, 0xE0];
        assert!(matches!(
            build(&code, BuilderConfig::default()),
            Err(Error::UnresolvedJump { address: 0x1001, .. })
        ));

        let function = build(&code, BuilderConfig::permissive()).unwrap();
        assert!(!function.is_complete());
        assert_eq!(function.unresolved(), &[0x1001]);
        assert_eq!(function.entry_block().unwrap().len(), 2);
    }

    #[test]
    fn external_targets_are_recorded() {
        // jmp 0x2000
        let code = [0xE9, 0xFB, 0x0F, 0x00, 0x00];
        let function = build(&code, BuilderConfig::default()).unwrap();
        assert_eq!(function.block_count(), 1);
        assert!(function.external_targets().contains(&0x2000));
    }

    #[test]
    fn running_off_the_end_is_truncated() {
        assert!(matches!(
            build(&[0x90, 0x90], BuilderConfig::default()),
            Err(Error::Truncated { address: 0x1002 })
        ));
        // mov eax, imm32 missing two bytes
        assert!(matches!(
            build(&[0xB8, 0x01, 0x02], BuilderConfig::default()),
            Err(Error::Truncated { address: 0x1000 })
        ));
    }

    #[test]
    fn unknown_opcode_policies() {
        // 0F C3 is undefined: one byte unknown, then ret
        let code = [0x0F, 0xC3];
        let function = build(&code, BuilderConfig::default()).unwrap();
        let block = function.entry_block().unwrap();
        assert_eq!(block.len(), 2);
        assert_eq!(block.instructions[0].mnemonic, Mnemonic::Unknown);
        assert!(block.terminator().is_some());

        let code = [0x0F, 0x04, 0xC3];
        assert!(matches!(
            build(&code, BuilderConfig::strict()),
            Err(Error::UnknownOpcode { address: 0x1000, .. })
        ));
    }

    #[test]
    fn invalid_segment_register_is_unknown() {
        // 8C F0 names segment register 6; the byte after it is a lock prefix on ret
        let code = [0x8C, 0xF0, 0xC3];
        let function = build(&code, BuilderConfig::default()).unwrap();
        assert_eq!(starts(&function), vec![0x1000]);

        let block = function.entry_block().unwrap();
        let mnemonics: Vec<_> = block.instructions.iter().map(|i| i.mnemonic).collect();
        assert_eq!(mnemonics, vec![Mnemonic::Unknown, Mnemonic::Ret]);
        assert_eq!(block.instructions[0].size, 1);
        assert_eq!(block.instructions[1].address, 0x1001);

        // 8E F8 names segment register 7
        let function = build(&[0x8E, 0xF8, 0xC3], BuilderConfig::default()).unwrap();
        let block = function.entry_block().unwrap();
        assert_eq!(block.instructions[0].mnemonic, Mnemonic::Unknown);
        assert!(block.terminator().is_some());

        assert!(matches!(
            build(&code, BuilderConfig::strict()),
            Err(Error::Malformed { .. })
        ));
    }

    #[test]
    fn seeded_targets_do_not_change_the_blocks() {
        // 0x1000: cmp eax, 1
        // 0x1003: jz 0x100a
        // 0x1005: mov ecx, 2
        // 0x100a: dec ecx
        // 0x100b: jnz 0x1005
        // 0x100d: ret
        let code = [
            0x83, 0xF8, 0x01, 0x74, 0x05, 0xB9, 0x02, 0x00, 0x00, 0x00, 0x49, 0x75, 0xF8, 0xC3,
        ];
        let plain = build(&code, BuilderConfig::default()).unwrap();
        assert_eq!(starts(&plain), vec![0x1000, 0x1005, 0x100a, 0x100d]);

        let orders: [&[u32]; 4] = [
            &[0x100d, 0x100a, 0x1005],
            &[0x100a, 0x1005],
            &[0x1005, 0x100d],
            &[0x100d],
        ];
        for order in orders {
            let seeded = FunctionBuilder::new(&code, 0x1000, BuilderConfig::default())
                .with_targets(order.iter().copied())
                .build(0x1000)
                .unwrap();
            assert_eq!(seeded, plain, "seeded with {order:x?}");
        }
    }

    #[test]
    fn block_limit() {
        // jz +0 three times, then ret
        let code = [0x74, 0x00, 0x74, 0x00, 0x74, 0x00, 0xC3];
        let config = BuilderConfig {
            max_blocks: 2,
            ..BuilderConfig::default()
        };
        assert!(matches!(build(&code, config), Err(Error::BlockLimit(2))));
    }

    #[test]
    fn invalid_start() {
        assert!(matches!(
            FunctionBuilder::new(&[], 0, BuilderConfig::default()).build(0),
            Err(Error::Empty)
        ));
        assert!(matches!(
            FunctionBuilder::new(&[0xC3], 0x1000, BuilderConfig::default()).build(0x0FFF),
            Err(Error::AddressOutOfRange { address: 0x0FFF })
        ));
    }
}
