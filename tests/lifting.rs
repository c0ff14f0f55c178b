//! IR lifting integration tests.
//!
//! Every test builds a function from raw bytes, lifts it, and checks either the rendered
//! IR or the exact expression handles of reconstructed conditions.

use x86scope::{
    analysis::{
        build_function,
        ir::{lift_function, CmpKind, Flag, IrFunction, IrKind, Lifter, LifterConfig},
    },
    disassembler::{Register, Width},
    Result,
};

fn lift(code: &[u8]) -> Result<IrFunction> {
    Ok(lift_function(&build_function(code, 0x1000)?))
}

fn rendered(ir: &IrFunction) -> Vec<String> {
    ir.instructions()
        .map(|instruction| instruction.display(ir.arena()).to_string())
        .collect()
}

/// The condition of the first branch in the function.
fn first_branch(ir: &IrFunction) -> x86scope::analysis::ir::ExprId {
    ir.instructions()
        .find_map(|instruction| match instruction.kind {
            IrKind::Branch { condition, .. } => Some(condition),
            _ => None,
        })
        .expect("function has a conditional branch")
}

#[test]
fn test_end_to_end_straight_line() -> Result<()> {
    let ir = lift(&[0xB8, 0x05, 0x00, 0x00, 0x00, 0x83, 0xC0, 0x03, 0xC3])?;

    assert_eq!(ir.instruction_count(), 3);
    assert_eq!(rendered(&ir), vec!["eax := 5", "eax := eax + 3", "return"]);

    let ret = ir.instructions().last().unwrap();
    assert_eq!(ret.kind, IrKind::Return { pop: 0 });
    assert!(ret.result.is_none());
    assert!(ret.value.is_none());
    Ok(())
}

#[test]
fn test_cmp_jz_is_equality() -> Result<()> {
    // cmp eax, 5; jz +1; nop; ret
    let mut ir = lift(&[0x83, 0xF8, 0x05, 0x74, 0x01, 0x90, 0xC3])?;
    let condition = first_branch(&ir);

    let arena = ir.arena_mut();
    let eax = arena.register(Register::Eax);
    let five = arena.constant(5, Width::Bits32);
    assert_eq!(condition, arena.compare(CmpKind::Eq, eax, five, false));
    Ok(())
}

#[test]
fn test_cmp_jnz_is_inequality() -> Result<()> {
    // cmp eax, 5; jnz +1; nop; ret
    let mut ir = lift(&[0x83, 0xF8, 0x05, 0x75, 0x01, 0x90, 0xC3])?;
    let condition = first_branch(&ir);

    let arena = ir.arena_mut();
    let eax = arena.register(Register::Eax);
    let five = arena.constant(5, Width::Bits32);
    assert_eq!(condition, arena.compare(CmpKind::Ne, eax, five, false));
    Ok(())
}

#[test]
fn test_test_same_register_is_zero_check() -> Result<()> {
    // test eax, eax; jz +1; nop; ret
    let mut ir = lift(&[0x85, 0xC0, 0x74, 0x01, 0x90, 0xC3])?;
    let condition = first_branch(&ir);

    let arena = ir.arena_mut();
    let eax = arena.register(Register::Eax);
    let zero = arena.constant(0, Width::Bits32);
    assert_eq!(condition, arena.compare(CmpKind::Eq, eax, zero, false));
    assert_eq!(arena.display(condition).to_string(), "eax == 0");
    Ok(())
}

#[test]
fn test_flag_condition_on_producer() -> Result<()> {
    // sub ecx, edx; ret
    let mut ir = lift(&[0x29, 0xD1, 0xC3])?;
    let sub = ir.block(0x1000).unwrap()[0].clone();
    let arena = ir.arena_mut();

    let zero = sub.flag_condition(arena, Flag::Zf, true).expr().unwrap();
    assert_eq!(arena.display(zero).to_string(), "ecx == 0");
    let non_negative = sub.flag_condition(arena, Flag::Sf, false).expr().unwrap();
    assert_eq!(arena.display(non_negative).to_string(), "ecx >= 0");

    // The borrow depends on the value `ecx` held before the subtraction
    assert!(sub.flag_condition(arena, Flag::Cf, true).is_unsupported());
    assert!(sub.flag_condition(arena, Flag::Of, true).is_unsupported());
    assert!(sub.flag_condition(arena, Flag::Pf, false).is_unsupported());

    // cmp ecx, edx; ret
    let mut ir = lift(&[0x39, 0xD1, 0xC3])?;
    let cmp = ir.block(0x1000).unwrap()[0].clone();
    let arena = ir.arena_mut();
    let carry = cmp.flag_condition(arena, Flag::Cf, true).expr().unwrap();
    assert_eq!(arena.display(carry).to_string(), "ecx <u edx");
    let no_carry = cmp.flag_condition(arena, Flag::Cf, false).expr().unwrap();
    assert_eq!(arena.display(no_carry).to_string(), "ecx >=u edx");
    Ok(())
}

/// Condition of the first branch in the function built from `code`.
fn branch_condition(code: &[u8]) -> Result<String> {
    let function = build_function(code, 0x1000)?;
    let ir = lift_function(&function);
    let condition = first_branch(&ir);
    Ok(ir.arena().display(condition).to_string())
}

#[test]
fn test_condition_after_decrement() -> Result<()> {
    // 0x1000: dec ecx; jnz 0x1000; ret
    assert_eq!(branch_condition(&[0x49, 0x75, 0xFD, 0xC3])?, "ecx != 0");
    Ok(())
}

#[test]
fn test_condition_after_subtract() -> Result<()> {
    // sub eax, 5; jz +1; nop; ret
    assert_eq!(
        branch_condition(&[0x83, 0xE8, 0x05, 0x74, 0x01, 0x90, 0xC3])?,
        "eax == 0"
    );
    // and eax, ebx; jz +1; nop; ret
    assert_eq!(
        branch_condition(&[0x21, 0xD8, 0x74, 0x01, 0x90, 0xC3])?,
        "eax == 0"
    );
    Ok(())
}

#[test]
fn test_compare_then_overwrite() -> Result<()> {
    // cmp eax, 1; mov eax, 7; jb +1; nop; ret
    let code = [0x83, 0xF8, 0x01, 0xB8, 0x07, 0x00, 0x00, 0x00, 0x72, 0x01, 0x90, 0xC3];
    assert_eq!(branch_condition(&code)?, "CF");

    // cmp eax, 1; mov ecx, 7; jb +1; nop; ret
    let code = [0x83, 0xF8, 0x01, 0xB9, 0x07, 0x00, 0x00, 0x00, 0x72, 0x01, 0x90, 0xC3];
    assert_eq!(branch_condition(&code)?, "eax <u 1");
    Ok(())
}

#[test]
fn test_opaque_lifter_matches_shape() -> Result<()> {
    // cmp eax, 5; jz +1; nop; ret
    let function = build_function(&[0x83, 0xF8, 0x05, 0x74, 0x01, 0x90, 0xC3], 0x1000)?;
    let reconstructed = Lifter::default().lift_function(&function);
    let opaque = Lifter::new(LifterConfig::opaque()).lift_function(&function);

    assert_eq!(reconstructed.instruction_count(), opaque.instruction_count());
    let condition = first_branch(&opaque);
    assert_eq!(opaque.arena().display(condition).to_string(), "ZF");
    Ok(())
}

#[test]
fn test_blocks_match_the_function() -> Result<()> {
    // 0x1000: xor eax, eax
    // 0x1002: inc eax
    // 0x1003: cmp eax, 10
    // 0x1006: jb 0x1002
    // 0x1008: ret
    let code = [0x31, 0xC0, 0x40, 0x83, 0xF8, 0x0A, 0x72, 0xFA, 0xC3];
    let function = build_function(&code, 0x1000)?;
    let ir = lift_function(&function);

    let cfg_starts: Vec<u32> = function.blocks().map(|block| block.address).collect();
    let ir_starts: Vec<u32> = ir.blocks().map(|(address, _)| address).collect();
    assert_eq!(cfg_starts, ir_starts);

    for block in function.blocks() {
        let lifted = ir.block(block.address).unwrap();
        assert_eq!(lifted.len(), block.len());
        for (instruction, ir_instruction) in block.instructions.iter().zip(lifted) {
            assert_eq!(instruction.address, ir_instruction.address);
        }
    }

    assert_eq!(
        rendered(&ir),
        vec![
            "eax := eax ^ eax",
            "eax := eax + 1",
            "cmp eax, 0xa",
            "if (eax <u 0xa) goto 0x1002",
            "return",
        ]
    );
    Ok(())
}
