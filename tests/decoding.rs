//! Decoder integration tests.
//!
//! These tests drive the public decoding API with hand-assembled byte sequences and check
//! the Intel-syntax rendering, the encoded length and the operand model.

use x86scope::{
    disassembler::{decode_instruction, decode_stream, Mnemonic, Operand, Register, Width},
    Error, Parser, Result,
};

/// Decodes one instruction at 0x1000 and checks that the whole input was consumed.
fn decode(bytes: &[u8]) -> Result<x86scope::disassembler::Instruction> {
    let mut parser = Parser::new(bytes);
    let instruction = decode_instruction(&mut parser, 0x1000)?;
    assert_eq!(usize::from(instruction.size), bytes.len(), "{instruction}");
    assert_eq!(parser.pos(), bytes.len());
    Ok(instruction)
}

fn text(bytes: &[u8]) -> String {
    decode(bytes).unwrap().to_string()
}

#[test]
fn test_absolute_memory_is_never_ebp() -> Result<()> {
    // mod=00 rm=101: disp32 without base
    let instruction = decode(&[0x8B, 0x05, 0x00, 0x30, 0x40, 0x00])?;
    assert_eq!(
        instruction.operands[1],
        Operand::DirectMemory {
            address: 0x403000,
            width: Width::Bits32,
            segment: None,
        }
    );
    assert_eq!(instruction.to_string(), "mov eax, dword ptr [0x403000]");

    // mod=01 rm=101 is [ebp+disp8]
    assert_eq!(text(&[0x8B, 0x45, 0x08]), "mov eax, dword ptr [ebp+8]");
    Ok(())
}

#[test]
fn test_rm4_always_reads_sib() -> Result<()> {
    // mod=00 rm=100 SIB=0x24: [esp]
    let instruction = decode(&[0x8B, 0x04, 0x24])?;
    assert_eq!(
        instruction.operands[1],
        Operand::BaseRegisterMemory {
            base: Register::Esp,
            width: Width::Bits32,
            segment: None,
        }
    );

    assert_eq!(text(&[0x8B, 0x44, 0x24, 0x08]), "mov eax, dword ptr [esp+8]");
    assert_eq!(
        text(&[0x8B, 0x44, 0x8B, 0xFC]),
        "mov eax, dword ptr [ebx+ecx*4-4]"
    );

    // SIB base=101 with mod=00: index*scale + disp32, no base
    assert_eq!(
        text(&[0x8B, 0x04, 0x8D, 0x00, 0x20, 0x40, 0x00]),
        "mov eax, dword ptr [ecx*4+0x402000]"
    );
    Ok(())
}

#[test]
fn test_prefixes_change_widths() {
    assert_eq!(text(&[0x8B, 0xC1]), "mov eax, ecx");
    assert_eq!(text(&[0x66, 0x8B, 0xC1]), "mov ax, cx");
    assert_eq!(text(&[0x67, 0x8B, 0x00]), "mov eax, dword ptr [bx+si]");
    assert_eq!(
        text(&[0x64, 0xA1, 0x00, 0x00, 0x00, 0x00]),
        "mov eax, dword ptr fs:[0x0]"
    );
}

#[test]
fn test_immediates_are_extended() {
    assert_eq!(text(&[0x83, 0xC0, 0xFF]), "add eax, 0xffffffff");
    assert_eq!(text(&[0x6A, 0x10]), "push 0x10");
    assert_eq!(text(&[0xC2, 0x08, 0x00]), "ret 8");
}

#[test]
fn test_relative_targets() -> Result<()> {
    let je = decode(&[0x0F, 0x84, 0x10, 0x00, 0x00, 0x00])?;
    assert_eq!(je.to_string(), "je 0x1016");
    assert_eq!(je.branch_target(), Some(0x1016));

    let call = decode(&[0xE8, 0xFB, 0xFF, 0xFF, 0xFF])?;
    assert_eq!(call.mnemonic, Mnemonic::Call);
    assert_eq!(call.branch_target(), Some(0x1000));

    let short = decode(&[0xEB, 0xFE])?;
    assert_eq!(short.branch_target(), Some(0x1000));
    Ok(())
}

#[test]
fn test_decoding_is_deterministic() {
    let code = [0x55, 0x8B, 0xEC, 0x83, 0xEC, 0x08, 0x8B, 0x45, 0x08, 0xC9, 0xC3];
    let first = decode_stream(&mut Parser::new(&code), 0x401000);
    let second = decode_stream(&mut Parser::new(&code), 0x401000);
    assert_eq!(first, second);

    let rendered: Vec<String> = first.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "push ebp",
            "mov ebp, esp",
            "sub esp, 8",
            "mov eax, dword ptr [ebp+8]",
            "leave",
            "ret",
        ]
    );
}

#[test]
fn test_failures_leave_position_untouched() {
    let mut parser = Parser::new(&[0x8B]);
    assert!(matches!(
        decode_instruction(&mut parser, 0x1000),
        Err(Error::Truncated { address: 0x1000 })
    ));
    assert_eq!(parser.pos(), 0);

    let mut parser = Parser::new(&[0x0F, 0x04]);
    assert!(matches!(
        decode_instruction(&mut parser, 0x1000),
        Err(Error::UnknownOpcode { address: 0x1000, .. })
    ));
    assert_eq!(parser.pos(), 0);
}
