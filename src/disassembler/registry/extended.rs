//! Two byte opcode table (`0F xx`).

use super::{Encoding::*, OpWidth::*, OpcodeHandler as H};
use crate::disassembler::{
    instruction::{Condition, Mnemonic as M},
    register::Register,
};

/// Handlers for the opcode byte following `0F`.
pub static HANDLERS: &[H] = &[
    H::new(0x0B, M::Ud2, Bare, Dword),
    H::new(0x1F, M::Nop, Rm, Full).reg(0),
    H::new(0x31, M::Rdtsc, Bare, Dword),
    H::new(0x40, M::Cmov(Condition::O), RegRm, Full).through(0x4F),
    H::new(0x80, M::Jcc(Condition::O), Rel, Full).through(0x8F),
    H::new(0x90, M::Set(Condition::O), Rm, Byte).through(0x9F),
    H::new(0xA0, M::Push, FixedReg(Register::Fs), Word),
    H::new(0xA1, M::Pop, FixedReg(Register::Fs), Word),
    H::new(0xA2, M::Cpuid, Bare, Dword),
    H::new(0xA3, M::Bt, RmReg, Full),
    H::new(0xA4, M::Shld, RmRegImm8, Full),
    H::new(0xA5, M::Shld, RmRegCl, Full),
    H::new(0xA8, M::Push, FixedReg(Register::Gs), Word),
    H::new(0xA9, M::Pop, FixedReg(Register::Gs), Word),
    H::new(0xAB, M::Bts, RmReg, Full),
    H::new(0xAC, M::Shrd, RmRegImm8, Full),
    H::new(0xAD, M::Shrd, RmRegCl, Full),
    H::new(0xAF, M::Imul, RegRm, Full),
    H::new(0xB0, M::Cmpxchg, RmReg, Byte),
    H::new(0xB1, M::Cmpxchg, RmReg, Full),
    H::new(0xB2, M::Lss, RegRm, Full).memory(),
    H::new(0xB3, M::Btr, RmReg, Full),
    H::new(0xB4, M::Lfs, RegRm, Full).memory(),
    H::new(0xB5, M::Lgs, RegRm, Full).memory(),
    H::new(0xB6, M::Movzx, RegRmByte, Full),
    H::new(0xB7, M::Movzx, RegRmWord, Dword),
    H::new(0xBA, M::Bt, RmImm8u, Full).reg(4),
    H::new(0xBA, M::Bts, RmImm8u, Full).reg(5),
    H::new(0xBA, M::Btr, RmImm8u, Full).reg(6),
    H::new(0xBA, M::Btc, RmImm8u, Full).reg(7),
    H::new(0xBB, M::Btc, RmReg, Full),
    H::new(0xBC, M::Bsf, RegRm, Full),
    H::new(0xBD, M::Bsr, RegRm, Full),
    H::new(0xBE, M::Movsx, RegRmByte, Full),
    H::new(0xBF, M::Movsx, RegRmWord, Dword),
    H::new(0xC0, M::Xadd, RmReg, Byte),
    H::new(0xC1, M::Xadd, RmReg, Full),
    H::new(0xC8, M::Bswap, OpReg, Dword).through(0xCF),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_ranges_cover_sixteen_opcodes() {
        let ranged: Vec<_> = HANDLERS
            .iter()
            .filter(|h| h.mnemonic.condition().is_some())
            .collect();
        assert_eq!(ranged.len(), 3);
        for handler in ranged {
            assert_eq!(handler.opcode_last - handler.opcode, 0x0F);
        }
    }
}
