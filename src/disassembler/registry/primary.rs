//! One byte opcode table.
//!
//! Entries are listed by opcode. Where several entries share an opcode the order is the
//! priority order used by [`super::Registry::lookup`].

use super::{Encoding::*, OpWidth::*, OpcodeHandler as H};
use crate::disassembler::{
    instruction::{Condition, Mnemonic as M},
    register::{Register, Width},
};

/// One byte opcode handlers.
pub static HANDLERS: &[H] = &[
    // 00..=3F: the eight classic ALU operations and the legacy segment pushes
    H::new(0x00, M::Add, RmReg, Byte),
    H::new(0x01, M::Add, RmReg, Full),
    H::new(0x02, M::Add, RegRm, Byte),
    H::new(0x03, M::Add, RegRm, Full),
    H::new(0x04, M::Add, AccImm, Byte),
    H::new(0x05, M::Add, AccImm, Full),
    H::new(0x06, M::Push, FixedReg(Register::Es), Word),
    H::new(0x07, M::Pop, FixedReg(Register::Es), Word),
    H::new(0x08, M::Or, RmReg, Byte),
    H::new(0x09, M::Or, RmReg, Full),
    H::new(0x0A, M::Or, RegRm, Byte),
    H::new(0x0B, M::Or, RegRm, Full),
    H::new(0x0C, M::Or, AccImm, Byte),
    H::new(0x0D, M::Or, AccImm, Full),
    H::new(0x0E, M::Push, FixedReg(Register::Cs), Word),
    H::new(0x10, M::Adc, RmReg, Byte),
    H::new(0x11, M::Adc, RmReg, Full),
    H::new(0x12, M::Adc, RegRm, Byte),
    H::new(0x13, M::Adc, RegRm, Full),
    H::new(0x14, M::Adc, AccImm, Byte),
    H::new(0x15, M::Adc, AccImm, Full),
    H::new(0x16, M::Push, FixedReg(Register::Ss), Word),
    H::new(0x17, M::Pop, FixedReg(Register::Ss), Word),
    H::new(0x18, M::Sbb, RmReg, Byte),
    H::new(0x19, M::Sbb, RmReg, Full),
    H::new(0x1A, M::Sbb, RegRm, Byte),
    H::new(0x1B, M::Sbb, RegRm, Full),
    H::new(0x1C, M::Sbb, AccImm, Byte),
    H::new(0x1D, M::Sbb, AccImm, Full),
    H::new(0x1E, M::Push, FixedReg(Register::Ds), Word),
    H::new(0x1F, M::Pop, FixedReg(Register::Ds), Word),
    H::new(0x20, M::And, RmReg, Byte),
    H::new(0x21, M::And, RmReg, Full),
    H::new(0x22, M::And, RegRm, Byte),
    H::new(0x23, M::And, RegRm, Full),
    H::new(0x24, M::And, AccImm, Byte),
    H::new(0x25, M::And, AccImm, Full),
    H::new(0x27, M::Daa, Bare, Byte),
    H::new(0x28, M::Sub, RmReg, Byte),
    H::new(0x29, M::Sub, RmReg, Full),
    H::new(0x2A, M::Sub, RegRm, Byte),
    H::new(0x2B, M::Sub, RegRm, Full),
    H::new(0x2C, M::Sub, AccImm, Byte),
    H::new(0x2D, M::Sub, AccImm, Full),
    H::new(0x2F, M::Das, Bare, Byte),
    H::new(0x30, M::Xor, RmReg, Byte),
    H::new(0x31, M::Xor, RmReg, Full),
    H::new(0x32, M::Xor, RegRm, Byte),
    H::new(0x33, M::Xor, RegRm, Full),
    H::new(0x34, M::Xor, AccImm, Byte),
    H::new(0x35, M::Xor, AccImm, Full),
    H::new(0x37, M::Aaa, Bare, Byte),
    H::new(0x38, M::Cmp, RmReg, Byte),
    H::new(0x39, M::Cmp, RmReg, Full),
    H::new(0x3A, M::Cmp, RegRm, Byte),
    H::new(0x3B, M::Cmp, RegRm, Full),
    H::new(0x3C, M::Cmp, AccImm, Byte),
    H::new(0x3D, M::Cmp, AccImm, Full),
    H::new(0x3F, M::Aas, Bare, Byte),
    // 40..=5F: register in the opcode
    H::new(0x40, M::Inc, OpReg, Full).through(0x47),
    H::new(0x48, M::Dec, OpReg, Full).through(0x4F),
    H::new(0x50, M::Push, OpReg, Full).through(0x57),
    H::new(0x58, M::Pop, OpReg, Full).through(0x5F),
    // 60..=6F
    H::new(0x60, M::Pushad, Bare, Full),
    H::new(0x61, M::Popad, Bare, Full),
    H::new(0x68, M::Push, Imm, Full),
    H::new(0x69, M::Imul, RegRmImm, Full),
    H::new(0x6A, M::Push, Imm8Ext, Full),
    H::new(0x6B, M::Imul, RegRmImm8, Full),
    // 70..=7F: short conditional jumps
    H::new(0x70, M::Jcc(Condition::O), Rel8, Dword).through(0x7F),
    // 80..=83: ALU with immediate, selected by ModRM.reg
    H::new(0x80, M::Add, RmImm, Byte).reg(0),
    H::new(0x80, M::Or, RmImm, Byte).reg(1),
    H::new(0x80, M::Adc, RmImm, Byte).reg(2),
    H::new(0x80, M::Sbb, RmImm, Byte).reg(3),
    H::new(0x80, M::And, RmImm, Byte).reg(4),
    H::new(0x80, M::Sub, RmImm, Byte).reg(5),
    H::new(0x80, M::Xor, RmImm, Byte).reg(6),
    H::new(0x80, M::Cmp, RmImm, Byte).reg(7),
    H::new(0x81, M::Add, RmImm, Full).reg(0),
    H::new(0x81, M::Or, RmImm, Full).reg(1),
    H::new(0x81, M::Adc, RmImm, Full).reg(2),
    H::new(0x81, M::Sbb, RmImm, Full).reg(3),
    H::new(0x81, M::And, RmImm, Full).reg(4),
    H::new(0x81, M::Sub, RmImm, Full).reg(5),
    H::new(0x81, M::Xor, RmImm, Full).reg(6),
    H::new(0x81, M::Cmp, RmImm, Full).reg(7),
    H::new(0x82, M::Add, RmImm, Byte).reg(0),
    H::new(0x82, M::Or, RmImm, Byte).reg(1),
    H::new(0x82, M::Adc, RmImm, Byte).reg(2),
    H::new(0x82, M::Sbb, RmImm, Byte).reg(3),
    H::new(0x82, M::And, RmImm, Byte).reg(4),
    H::new(0x82, M::Sub, RmImm, Byte).reg(5),
    H::new(0x82, M::Xor, RmImm, Byte).reg(6),
    H::new(0x82, M::Cmp, RmImm, Byte).reg(7),
    H::new(0x83, M::Add, RmImm8, Full).reg(0),
    H::new(0x83, M::Or, RmImm8, Full).reg(1),
    H::new(0x83, M::Adc, RmImm8, Full).reg(2),
    H::new(0x83, M::Sbb, RmImm8, Full).reg(3),
    H::new(0x83, M::And, RmImm8, Full).reg(4),
    H::new(0x83, M::Sub, RmImm8, Full).reg(5),
    H::new(0x83, M::Xor, RmImm8, Full).reg(6),
    H::new(0x83, M::Cmp, RmImm8, Full).reg(7),
    // 84..=8F
    H::new(0x84, M::Test, RmReg, Byte),
    H::new(0x85, M::Test, RmReg, Full),
    H::new(0x86, M::Xchg, RmReg, Byte),
    H::new(0x87, M::Xchg, RmReg, Full),
    H::new(0x88, M::Mov, RmReg, Byte),
    H::new(0x89, M::Mov, RmReg, Full),
    H::new(0x8A, M::Mov, RegRm, Byte),
    H::new(0x8B, M::Mov, RegRm, Full),
    H::new(0x8C, M::Mov, RmSreg, Word),
    H::new(0x8D, M::Lea, RegRm, Full).memory(),
    H::new(0x8E, M::Mov, SregRm, Word),
    H::new(0x8F, M::Pop, Rm, Full).reg(0),
    // 90..=9F; nop has to precede the xchg range
    H::new(0x90, M::Nop, Bare, Full),
    H::new(0x90, M::Xchg, AccOpReg, Full).through(0x97),
    H::new(0x98, M::Cbw, Bare, Word).word(),
    H::new(0x98, M::Cwde, Bare, Dword),
    H::new(0x99, M::Cwd, Bare, Word).word(),
    H::new(0x99, M::Cdq, Bare, Dword),
    H::new(0x9A, M::Call, FarPtr, Full),
    H::new(0x9B, M::Wait, Bare, Full),
    H::new(0x9C, M::Pushfd, Bare, Full),
    H::new(0x9D, M::Popfd, Bare, Full),
    H::new(0x9E, M::Sahf, Bare, Byte),
    H::new(0x9F, M::Lahf, Bare, Byte),
    // A0..=AF: moffs forms and string instructions
    H::new(0xA0, M::Mov, AccMoffs, Byte),
    H::new(0xA1, M::Mov, AccMoffs, Full),
    H::new(0xA2, M::Mov, MoffsAcc, Byte),
    H::new(0xA3, M::Mov, MoffsAcc, Full),
    H::new(0xA4, M::Movs, StrMovs, Byte),
    H::new(0xA5, M::Movs, StrMovs, Full),
    H::new(0xA6, M::Cmps, StrCmps, Byte),
    H::new(0xA7, M::Cmps, StrCmps, Full),
    H::new(0xA8, M::Test, AccImm, Byte),
    H::new(0xA9, M::Test, AccImm, Full),
    H::new(0xAA, M::Stos, StrStos, Byte),
    H::new(0xAB, M::Stos, StrStos, Full),
    H::new(0xAC, M::Lods, StrLods, Byte),
    H::new(0xAD, M::Lods, StrLods, Full),
    H::new(0xAE, M::Scas, StrScas, Byte),
    H::new(0xAF, M::Scas, StrScas, Full),
    // B0..=BF: mov reg, imm
    H::new(0xB0, M::Mov, OpRegImm, Byte).through(0xB7),
    H::new(0xB8, M::Mov, OpRegImm, Full).through(0xBF),
    // C0..=CF
    H::new(0xC0, M::Rol, RmImm8u, Byte).reg(0),
    H::new(0xC0, M::Ror, RmImm8u, Byte).reg(1),
    H::new(0xC0, M::Rcl, RmImm8u, Byte).reg(2),
    H::new(0xC0, M::Rcr, RmImm8u, Byte).reg(3),
    H::new(0xC0, M::Shl, RmImm8u, Byte).reg(4),
    H::new(0xC0, M::Shr, RmImm8u, Byte).reg(5),
    H::new(0xC0, M::Shl, RmImm8u, Byte).reg(6),
    H::new(0xC0, M::Sar, RmImm8u, Byte).reg(7),
    H::new(0xC1, M::Rol, RmImm8u, Full).reg(0),
    H::new(0xC1, M::Ror, RmImm8u, Full).reg(1),
    H::new(0xC1, M::Rcl, RmImm8u, Full).reg(2),
    H::new(0xC1, M::Rcr, RmImm8u, Full).reg(3),
    H::new(0xC1, M::Shl, RmImm8u, Full).reg(4),
    H::new(0xC1, M::Shr, RmImm8u, Full).reg(5),
    H::new(0xC1, M::Shl, RmImm8u, Full).reg(6),
    H::new(0xC1, M::Sar, RmImm8u, Full).reg(7),
    H::new(0xC2, M::Ret, Imm16, Dword),
    H::new(0xC3, M::Ret, Bare, Dword),
    H::new(0xC4, M::Les, RegRm, Full).memory(),
    H::new(0xC5, M::Lds, RegRm, Full).memory(),
    H::new(0xC6, M::Mov, RmImm, Byte).reg(0),
    H::new(0xC7, M::Mov, RmImm, Full).reg(0),
    H::new(0xC8, M::Enter, Imm16Imm8, Dword),
    H::new(0xC9, M::Leave, Bare, Dword),
    H::new(0xCA, M::Retf, Imm16, Dword),
    H::new(0xCB, M::Retf, Bare, Dword),
    H::new(0xCC, M::Int3, Bare, Byte),
    H::new(0xCD, M::Int, Imm8, Byte),
    H::new(0xCE, M::Into, Bare, Byte),
    H::new(0xCF, M::Iret, Bare, Dword),
    // D0..=D7: shifts by 1 / cl, ASCII adjust, xlat
    H::new(0xD0, M::Rol, RmOne, Byte).reg(0),
    H::new(0xD0, M::Ror, RmOne, Byte).reg(1),
    H::new(0xD0, M::Rcl, RmOne, Byte).reg(2),
    H::new(0xD0, M::Rcr, RmOne, Byte).reg(3),
    H::new(0xD0, M::Shl, RmOne, Byte).reg(4),
    H::new(0xD0, M::Shr, RmOne, Byte).reg(5),
    H::new(0xD0, M::Shl, RmOne, Byte).reg(6),
    H::new(0xD0, M::Sar, RmOne, Byte).reg(7),
    H::new(0xD1, M::Rol, RmOne, Full).reg(0),
    H::new(0xD1, M::Ror, RmOne, Full).reg(1),
    H::new(0xD1, M::Rcl, RmOne, Full).reg(2),
    H::new(0xD1, M::Rcr, RmOne, Full).reg(3),
    H::new(0xD1, M::Shl, RmOne, Full).reg(4),
    H::new(0xD1, M::Shr, RmOne, Full).reg(5),
    H::new(0xD1, M::Shl, RmOne, Full).reg(6),
    H::new(0xD1, M::Sar, RmOne, Full).reg(7),
    H::new(0xD2, M::Rol, RmCl, Byte).reg(0),
    H::new(0xD2, M::Ror, RmCl, Byte).reg(1),
    H::new(0xD2, M::Rcl, RmCl, Byte).reg(2),
    H::new(0xD2, M::Rcr, RmCl, Byte).reg(3),
    H::new(0xD2, M::Shl, RmCl, Byte).reg(4),
    H::new(0xD2, M::Shr, RmCl, Byte).reg(5),
    H::new(0xD2, M::Shl, RmCl, Byte).reg(6),
    H::new(0xD2, M::Sar, RmCl, Byte).reg(7),
    H::new(0xD3, M::Rol, RmCl, Full).reg(0),
    H::new(0xD3, M::Ror, RmCl, Full).reg(1),
    H::new(0xD3, M::Rcl, RmCl, Full).reg(2),
    H::new(0xD3, M::Rcr, RmCl, Full).reg(3),
    H::new(0xD3, M::Shl, RmCl, Full).reg(4),
    H::new(0xD3, M::Shr, RmCl, Full).reg(5),
    H::new(0xD3, M::Shl, RmCl, Full).reg(6),
    H::new(0xD3, M::Sar, RmCl, Full).reg(7),
    H::new(0xD4, M::Aam, Imm8, Byte),
    H::new(0xD5, M::Aad, Imm8, Byte),
    H::new(0xD7, M::Xlat, Bare, Byte),
    // E0..=EF: loops, port I/O, near/far calls and jumps
    H::new(0xE0, M::Loopne, Rel8, Dword),
    H::new(0xE1, M::Loope, Rel8, Dword),
    H::new(0xE2, M::Loop, Rel8, Dword),
    H::new(0xE3, M::Jecxz, Rel8, Dword),
    H::new(0xE4, M::In, AccImm8, Byte),
    H::new(0xE5, M::In, AccImm8, Full),
    H::new(0xE6, M::Out, Imm8Acc, Byte),
    H::new(0xE7, M::Out, Imm8Acc, Full),
    H::new(0xE8, M::Call, Rel, Full),
    H::new(0xE9, M::Jmp, Rel, Full),
    H::new(0xEA, M::Jmp, FarPtr, Full),
    H::new(0xEB, M::Jmp, Rel8, Dword),
    H::new(0xEC, M::In, AccDx, Byte),
    H::new(0xED, M::In, AccDx, Full),
    H::new(0xEE, M::Out, DxAcc, Byte),
    H::new(0xEF, M::Out, DxAcc, Full),
    // F4..=FF
    H::new(0xF4, M::Hlt, Bare, Byte),
    H::new(0xF5, M::Cmc, Bare, Byte),
    H::new(0xF6, M::Test, RmImm, Byte).reg(0),
    H::new(0xF6, M::Test, RmImm, Byte).reg(1),
    H::new(0xF6, M::Not, Rm, Byte).reg(2),
    H::new(0xF6, M::Neg, Rm, Byte).reg(3),
    H::new(0xF6, M::Mul, Rm, Byte).reg(4),
    H::new(0xF6, M::Imul, Rm, Byte).reg(5),
    H::new(0xF6, M::Div, Rm, Byte).reg(6),
    H::new(0xF6, M::Idiv, Rm, Byte).reg(7),
    H::new(0xF7, M::Test, RmImm, Full).reg(0),
    H::new(0xF7, M::Test, RmImm, Full).reg(1),
    H::new(0xF7, M::Not, Rm, Full).reg(2),
    H::new(0xF7, M::Neg, Rm, Full).reg(3),
    H::new(0xF7, M::Mul, Rm, Full).reg(4),
    H::new(0xF7, M::Imul, Rm, Full).reg(5),
    H::new(0xF7, M::Div, Rm, Full).reg(6),
    H::new(0xF7, M::Idiv, Rm, Full).reg(7),
    H::new(0xF8, M::Clc, Bare, Byte),
    H::new(0xF9, M::Stc, Bare, Byte),
    H::new(0xFA, M::Cli, Bare, Byte),
    H::new(0xFB, M::Sti, Bare, Byte),
    H::new(0xFC, M::Cld, Bare, Byte),
    H::new(0xFD, M::Std, Bare, Byte),
    H::new(0xFE, M::Inc, Rm, Byte).reg(0),
    H::new(0xFE, M::Dec, Rm, Byte).reg(1),
    H::new(0xFF, M::Inc, Rm, Full).reg(0),
    H::new(0xFF, M::Dec, Rm, Full).reg(1),
    H::new(0xFF, M::Call, Rm, Full).reg(2),
    H::new(0xFF, M::Call, Rm, Fixed(Width::Bits48)).memory_reg(3),
    H::new(0xFF, M::Jmp, Rm, Full).reg(4),
    H::new(0xFF, M::Jmp, Rm, Fixed(Width::Bits48)).memory_reg(5),
    H::new(0xFF, M::Push, Rm, Full).reg(6),
];
