//! x87 escape opcodes `D8..=DF`.
//!
//! A ModRM byte below `C0` selects a memory form, keyed by the `reg` field; the memory
//! format (`m32fp`, `m64int`, ...) fixes the operand width. Bytes from `C0` upwards are
//! register forms and are matched by exact byte range.

use super::{Encoding::*, OpWidth::*, OpcodeHandler as H};
use crate::disassembler::{
    instruction::{Condition, Mnemonic as M},
    register::Width,
};

const M16: super::OpWidth = Fixed(Width::Bits16);
const M32: super::OpWidth = Fixed(Width::Bits32);
const M64: super::OpWidth = Fixed(Width::Bits64);
const M80: super::OpWidth = Fixed(Width::Bits80);

/// x87 handlers.
pub static HANDLERS: &[H] = &[
    // D8: arithmetic on m32fp / st(0), st(i)
    H::new(0xD8, M::Fadd, Rm, M32).memory_reg(0),
    H::new(0xD8, M::Fmul, Rm, M32).memory_reg(1),
    H::new(0xD8, M::Fcom, Rm, M32).memory_reg(2),
    H::new(0xD8, M::Fcomp, Rm, M32).memory_reg(3),
    H::new(0xD8, M::Fsub, Rm, M32).memory_reg(4),
    H::new(0xD8, M::Fsubr, Rm, M32).memory_reg(5),
    H::new(0xD8, M::Fdiv, Rm, M32).memory_reg(6),
    H::new(0xD8, M::Fdivr, Rm, M32).memory_reg(7),
    H::new(0xD8, M::Fadd, St0Sti, M80).modrm_range(0xC0, 0xC7),
    H::new(0xD8, M::Fmul, St0Sti, M80).modrm_range(0xC8, 0xCF),
    H::new(0xD8, M::Fcom, Sti, M80).modrm_range(0xD0, 0xD7),
    H::new(0xD8, M::Fcomp, Sti, M80).modrm_range(0xD8, 0xDF),
    H::new(0xD8, M::Fsub, St0Sti, M80).modrm_range(0xE0, 0xE7),
    H::new(0xD8, M::Fsubr, St0Sti, M80).modrm_range(0xE8, 0xEF),
    H::new(0xD8, M::Fdiv, St0Sti, M80).modrm_range(0xF0, 0xF7),
    H::new(0xD8, M::Fdivr, St0Sti, M80).modrm_range(0xF8, 0xFF),
    // D9: loads/stores of m32fp, control word, constants and transcendental functions
    H::new(0xD9, M::Fld, Rm, M32).memory_reg(0),
    H::new(0xD9, M::Fst, Rm, M32).memory_reg(2),
    H::new(0xD9, M::Fstp, Rm, M32).memory_reg(3),
    H::new(0xD9, M::Fldcw, Rm, M16).memory_reg(5),
    H::new(0xD9, M::Fnstcw, Rm, M16).memory_reg(7),
    H::new(0xD9, M::Fld, Sti, M80).modrm_range(0xC0, 0xC7),
    H::new(0xD9, M::Fxch, Sti, M80).modrm_range(0xC8, 0xCF),
    H::new(0xD9, M::Fnop, ModRmOnly, M80).modrm_range(0xD0, 0xD0),
    H::new(0xD9, M::Fchs, ModRmOnly, M80).modrm_range(0xE0, 0xE0),
    H::new(0xD9, M::Fabs, ModRmOnly, M80).modrm_range(0xE1, 0xE1),
    H::new(0xD9, M::Ftst, ModRmOnly, M80).modrm_range(0xE4, 0xE4),
    H::new(0xD9, M::Fxam, ModRmOnly, M80).modrm_range(0xE5, 0xE5),
    H::new(0xD9, M::Fld1, ModRmOnly, M80).modrm_range(0xE8, 0xE8),
    H::new(0xD9, M::Fldl2t, ModRmOnly, M80).modrm_range(0xE9, 0xE9),
    H::new(0xD9, M::Fldl2e, ModRmOnly, M80).modrm_range(0xEA, 0xEA),
    H::new(0xD9, M::Fldpi, ModRmOnly, M80).modrm_range(0xEB, 0xEB),
    H::new(0xD9, M::Fldlg2, ModRmOnly, M80).modrm_range(0xEC, 0xEC),
    H::new(0xD9, M::Fldln2, ModRmOnly, M80).modrm_range(0xED, 0xED),
    H::new(0xD9, M::Fldz, ModRmOnly, M80).modrm_range(0xEE, 0xEE),
    H::new(0xD9, M::F2xm1, ModRmOnly, M80).modrm_range(0xF0, 0xF0),
    H::new(0xD9, M::Fyl2x, ModRmOnly, M80).modrm_range(0xF1, 0xF1),
    H::new(0xD9, M::Fptan, ModRmOnly, M80).modrm_range(0xF2, 0xF2),
    H::new(0xD9, M::Fpatan, ModRmOnly, M80).modrm_range(0xF3, 0xF3),
    H::new(0xD9, M::Fxtract, ModRmOnly, M80).modrm_range(0xF4, 0xF4),
    H::new(0xD9, M::Fprem1, ModRmOnly, M80).modrm_range(0xF5, 0xF5),
    H::new(0xD9, M::Fdecstp, ModRmOnly, M80).modrm_range(0xF6, 0xF6),
    H::new(0xD9, M::Fincstp, ModRmOnly, M80).modrm_range(0xF7, 0xF7),
    H::new(0xD9, M::Fprem, ModRmOnly, M80).modrm_range(0xF8, 0xF8),
    H::new(0xD9, M::Fyl2xp1, ModRmOnly, M80).modrm_range(0xF9, 0xF9),
    H::new(0xD9, M::Fsqrt, ModRmOnly, M80).modrm_range(0xFA, 0xFA),
    H::new(0xD9, M::Fsincos, ModRmOnly, M80).modrm_range(0xFB, 0xFB),
    H::new(0xD9, M::Frndint, ModRmOnly, M80).modrm_range(0xFC, 0xFC),
    H::new(0xD9, M::Fscale, ModRmOnly, M80).modrm_range(0xFD, 0xFD),
    H::new(0xD9, M::Fsin, ModRmOnly, M80).modrm_range(0xFE, 0xFE),
    H::new(0xD9, M::Fcos, ModRmOnly, M80).modrm_range(0xFF, 0xFF),
    // DA: m32int arithmetic, unsigned fcmov
    H::new(0xDA, M::Fiadd, Rm, M32).memory_reg(0),
    H::new(0xDA, M::Fimul, Rm, M32).memory_reg(1),
    H::new(0xDA, M::Ficom, Rm, M32).memory_reg(2),
    H::new(0xDA, M::Ficomp, Rm, M32).memory_reg(3),
    H::new(0xDA, M::Fisub, Rm, M32).memory_reg(4),
    H::new(0xDA, M::Fisubr, Rm, M32).memory_reg(5),
    H::new(0xDA, M::Fidiv, Rm, M32).memory_reg(6),
    H::new(0xDA, M::Fidivr, Rm, M32).memory_reg(7),
    H::new(0xDA, M::Fcmov(Condition::B), St0Sti, M80).modrm_range(0xC0, 0xC7),
    H::new(0xDA, M::Fcmov(Condition::E), St0Sti, M80).modrm_range(0xC8, 0xCF),
    H::new(0xDA, M::Fcmov(Condition::Be), St0Sti, M80).modrm_range(0xD0, 0xD7),
    H::new(0xDA, M::Fcmov(Condition::P), St0Sti, M80).modrm_range(0xD8, 0xDF),
    H::new(0xDA, M::Fucompp, ModRmOnly, M80).modrm_range(0xE9, 0xE9),
    // DB: m32int loads/stores, m80fp, fcomi
    H::new(0xDB, M::Fild, Rm, M32).memory_reg(0),
    H::new(0xDB, M::Fisttp, Rm, M32).memory_reg(1),
    H::new(0xDB, M::Fist, Rm, M32).memory_reg(2),
    H::new(0xDB, M::Fistp, Rm, M32).memory_reg(3),
    H::new(0xDB, M::Fld, Rm, M80).memory_reg(5),
    H::new(0xDB, M::Fstp, Rm, M80).memory_reg(7),
    H::new(0xDB, M::Fcmov(Condition::Ae), St0Sti, M80).modrm_range(0xC0, 0xC7),
    H::new(0xDB, M::Fcmov(Condition::Ne), St0Sti, M80).modrm_range(0xC8, 0xCF),
    H::new(0xDB, M::Fcmov(Condition::A), St0Sti, M80).modrm_range(0xD0, 0xD7),
    H::new(0xDB, M::Fcmov(Condition::Np), St0Sti, M80).modrm_range(0xD8, 0xDF),
    H::new(0xDB, M::Fnclex, ModRmOnly, M80).modrm_range(0xE2, 0xE2),
    H::new(0xDB, M::Fninit, ModRmOnly, M80).modrm_range(0xE3, 0xE3),
    H::new(0xDB, M::Fucomi, St0Sti, M80).modrm_range(0xE8, 0xEF),
    H::new(0xDB, M::Fcomi, St0Sti, M80).modrm_range(0xF0, 0xF7),
    // DC: arithmetic on m64fp / st(i), st(0)
    H::new(0xDC, M::Fadd, Rm, M64).memory_reg(0),
    H::new(0xDC, M::Fmul, Rm, M64).memory_reg(1),
    H::new(0xDC, M::Fcom, Rm, M64).memory_reg(2),
    H::new(0xDC, M::Fcomp, Rm, M64).memory_reg(3),
    H::new(0xDC, M::Fsub, Rm, M64).memory_reg(4),
    H::new(0xDC, M::Fsubr, Rm, M64).memory_reg(5),
    H::new(0xDC, M::Fdiv, Rm, M64).memory_reg(6),
    H::new(0xDC, M::Fdivr, Rm, M64).memory_reg(7),
    H::new(0xDC, M::Fadd, StiSt0, M80).modrm_range(0xC0, 0xC7),
    H::new(0xDC, M::Fmul, StiSt0, M80).modrm_range(0xC8, 0xCF),
    H::new(0xDC, M::Fsubr, StiSt0, M80).modrm_range(0xE0, 0xE7),
    H::new(0xDC, M::Fsub, StiSt0, M80).modrm_range(0xE8, 0xEF),
    H::new(0xDC, M::Fdivr, StiSt0, M80).modrm_range(0xF0, 0xF7),
    H::new(0xDC, M::Fdiv, StiSt0, M80).modrm_range(0xF8, 0xFF),
    // DD: m64fp loads/stores, status word, ffree
    H::new(0xDD, M::Fld, Rm, M64).memory_reg(0),
    H::new(0xDD, M::Fisttp, Rm, M64).memory_reg(1),
    H::new(0xDD, M::Fst, Rm, M64).memory_reg(2),
    H::new(0xDD, M::Fstp, Rm, M64).memory_reg(3),
    H::new(0xDD, M::Fnstsw, Rm, M16).memory_reg(7),
    H::new(0xDD, M::Ffree, Sti, M80).modrm_range(0xC0, 0xC7),
    H::new(0xDD, M::Fst, Sti, M80).modrm_range(0xD0, 0xD7),
    H::new(0xDD, M::Fstp, Sti, M80).modrm_range(0xD8, 0xDF),
    H::new(0xDD, M::Fucom, Sti, M80).modrm_range(0xE0, 0xE7),
    H::new(0xDD, M::Fucomp, Sti, M80).modrm_range(0xE8, 0xEF),
    // DE: m16int arithmetic, popping register forms
    H::new(0xDE, M::Fiadd, Rm, M16).memory_reg(0),
    H::new(0xDE, M::Fimul, Rm, M16).memory_reg(1),
    H::new(0xDE, M::Ficom, Rm, M16).memory_reg(2),
    H::new(0xDE, M::Ficomp, Rm, M16).memory_reg(3),
    H::new(0xDE, M::Fisub, Rm, M16).memory_reg(4),
    H::new(0xDE, M::Fisubr, Rm, M16).memory_reg(5),
    H::new(0xDE, M::Fidiv, Rm, M16).memory_reg(6),
    H::new(0xDE, M::Fidivr, Rm, M16).memory_reg(7),
    H::new(0xDE, M::Faddp, StiSt0, M80).modrm_range(0xC0, 0xC7),
    H::new(0xDE, M::Fmulp, StiSt0, M80).modrm_range(0xC8, 0xCF),
    H::new(0xDE, M::Fcompp, ModRmOnly, M80).modrm_range(0xD9, 0xD9),
    H::new(0xDE, M::Fsubrp, StiSt0, M80).modrm_range(0xE0, 0xE7),
    H::new(0xDE, M::Fsubp, StiSt0, M80).modrm_range(0xE8, 0xEF),
    H::new(0xDE, M::Fdivrp, StiSt0, M80).modrm_range(0xF0, 0xF7),
    H::new(0xDE, M::Fdivp, StiSt0, M80).modrm_range(0xF8, 0xFF),
    // DF: m16int / m64int / packed BCD, fnstsw ax, popping fcomi
    H::new(0xDF, M::Fild, Rm, M16).memory_reg(0),
    H::new(0xDF, M::Fisttp, Rm, M16).memory_reg(1),
    H::new(0xDF, M::Fist, Rm, M16).memory_reg(2),
    H::new(0xDF, M::Fistp, Rm, M16).memory_reg(3),
    H::new(0xDF, M::Fbld, Rm, M80).memory_reg(4),
    H::new(0xDF, M::Fild, Rm, M64).memory_reg(5),
    H::new(0xDF, M::Fbstp, Rm, M80).memory_reg(6),
    H::new(0xDF, M::Fistp, Rm, M64).memory_reg(7),
    H::new(0xDF, M::Fnstsw, FpuAx, M80).modrm_range(0xE0, 0xE0),
    H::new(0xDF, M::Fucomip, St0Sti, M80).modrm_range(0xE8, 0xEF),
    H::new(0xDF, M::Fcomip, St0Sti, M80).modrm_range(0xF0, 0xF7),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::registry::ModRmFilter;

    #[test]
    fn every_entry_looks_at_modrm() {
        for handler in HANDLERS {
            assert!(handler.needs_modrm(), "{handler:?}");
            assert!((0xD8..=0xDF).contains(&handler.opcode));
        }
    }

    #[test]
    fn register_forms_do_not_overlap() {
        for escape in 0xD8..=0xDF_u8 {
            let ranges: Vec<(u8, u8)> = HANDLERS
                .iter()
                .filter(|h| h.opcode == escape)
                .filter_map(|h| match h.modrm {
                    ModRmFilter::Range(first, last) => Some((first, last)),
                    _ => None,
                })
                .collect();
            for (i, a) in ranges.iter().enumerate() {
                assert!(a.0 >= 0xC0);
                for b in &ranges[i + 1..] {
                    assert!(a.1 < b.0 || b.1 < a.0, "{escape:02x}: {a:?} / {b:?}");
                }
            }
        }
    }
}
