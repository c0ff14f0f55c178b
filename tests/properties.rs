//! Property tests over arbitrary byte input.

use proptest::prelude::*;
use x86scope::{
    analysis::{
        build_function,
        cfg::{BuilderConfig, FunctionBuilder},
        ir::lift_function,
    },
    disassembler::{decode_instruction_lenient, decode_stream, MAX_INSTRUCTION_LENGTH},
    Parser,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn lenient_decoding_always_makes_progress(code in prop::collection::vec(any::<u8>(), 1..64)) {
        let mut parser = Parser::new(&code);
        let mut address = 0x1000u32;
        while parser.has_more_data() {
            let before = parser.pos();
            let instruction = decode_instruction_lenient(&mut parser, address);
            let consumed = parser.pos() - before;

            prop_assert!(consumed >= 1);
            prop_assert!(consumed <= MAX_INSTRUCTION_LENGTH);
            prop_assert_eq!(consumed, usize::from(instruction.size));
            prop_assert_eq!(instruction.address, address);
            address += u32::from(instruction.size);
        }
    }

    #[test]
    fn stream_covers_the_buffer(code in prop::collection::vec(any::<u8>(), 0..64)) {
        let instructions = decode_stream(&mut Parser::new(&code), 0);
        let total: usize = instructions.iter().map(|i| usize::from(i.size)).sum();
        prop_assert_eq!(total, code.len());

        for pair in instructions.windows(2) {
            prop_assert_eq!(pair[0].end(), pair[1].address);
        }
    }

    #[test]
    fn building_is_deterministic(code in prop::collection::vec(any::<u8>(), 1..48)) {
        let first = build_function(&code, 0x1000);
        let second = build_function(&code, 0x1000);

        match (first, second) {
            (Ok(first), Ok(second)) => {
                prop_assert_eq!(first.block_map(), second.block_map());

                // Blocks never overlap
                let mut end = 0u32;
                for block in first.blocks() {
                    prop_assert!(block.address >= end);
                    end = block.end();
                }

                let ir = lift_function(&first);
                prop_assert_eq!(ir.instruction_count(), first.instruction_count());
            }
            (Err(first), Err(second)) => {
                prop_assert_eq!(first.to_string(), second.to_string());
            }
            _ => prop_assert!(false, "builds disagree"),
        }
    }

    #[test]
    fn discovery_order_does_not_matter(
        code in prop::collection::vec(any::<u8>(), 1..48),
        rotation in 0usize..16,
    ) {
        let Ok(plain) = build_function(&code, 0x1000) else {
            return Ok(());
        };

        // Queue the known block starts up front, in an order unrelated to discovery
        let mut targets: Vec<u32> = plain.blocks().map(|block| block.address).collect();
        targets.reverse();
        let len = targets.len();
        targets.rotate_left(rotation % len);

        let seeded = FunctionBuilder::new(&code, 0x1000, BuilderConfig::default())
            .with_targets(targets)
            .build(0x1000);
        prop_assert_eq!(seeded.ok(), Some(plain));
    }
}
