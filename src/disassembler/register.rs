//! x86 register and operand width definitions.
//!
//! # Overview
//!
//! - [`Width`] - Explicit bit width carried by every operand
//! - [`Register`] - General-purpose (8/16/32-bit) and segment registers
//!
//! The same ModRM register number denotes different registers depending on the operand
//! width in effect: number 4 is `esp` for 32-bit operands, `sp` for 16-bit operands and
//! `ah` for 8-bit operands. [`Register::gpr`] performs that mapping.

use std::fmt;

use strum::{Display, EnumIter};

/// Explicit bit width of an operand or an IR value.
///
/// The same opcode denotes different widths under different prefixes, so the width is
/// always stored next to the value instead of being implied by the opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Width {
    /// 8-bit (byte)
    Bits8,
    /// 16-bit (word)
    Bits16,
    /// 32-bit (dword)
    Bits32,
    /// 48-bit (far pointer `m16:32`)
    Bits48,
    /// 64-bit (qword, FPU double / int64)
    Bits64,
    /// 80-bit (FPU extended precision / packed BCD)
    Bits80,
}

impl Width {
    /// Returns the width in bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Width::Bits8 => 8,
            Width::Bits16 => 16,
            Width::Bits32 => 32,
            Width::Bits48 => 48,
            Width::Bits64 => 64,
            Width::Bits80 => 80,
        }
    }

    /// Returns the width in bytes.
    #[must_use]
    pub const fn bytes(self) -> u32 {
        self.bits() / 8
    }

    /// Returns the width matching `bits`, if it is one of the supported sizes.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            8 => Some(Width::Bits8),
            16 => Some(Width::Bits16),
            32 => Some(Width::Bits32),
            48 => Some(Width::Bits48),
            64 => Some(Width::Bits64),
            80 => Some(Width::Bits80),
            _ => None,
        }
    }

    /// Returns a mask with the low `bits()` bits set (saturating at 64 bits).
    #[must_use]
    pub const fn mask(self) -> u64 {
        match self {
            Width::Bits64 | Width::Bits80 => u64::MAX,
            _ => (1u64 << self.bits()) - 1,
        }
    }

    /// Returns the value with only the most significant bit of this width set.
    ///
    /// This is the smallest signed value (`0x80000000` for 32 bits).
    #[must_use]
    pub const fn sign_bit(self) -> u64 {
        match self {
            Width::Bits80 => 1u64 << 63,
            _ => 1u64 << (self.bits() - 1),
        }
    }

    /// Returns the largest signed value of this width (`0x7fffffff` for 32 bits).
    #[must_use]
    pub const fn signed_max(self) -> u64 {
        self.sign_bit() - 1
    }

    /// Intel syntax size keyword used for memory operands (`dword ptr`).
    #[must_use]
    pub const fn ptr_keyword(self) -> &'static str {
        match self {
            Width::Bits8 => "byte",
            Width::Bits16 => "word",
            Width::Bits32 => "dword",
            Width::Bits48 => "fword",
            Width::Bits64 => "qword",
            Width::Bits80 => "tbyte",
        }
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// x86 general-purpose and segment register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Register {
    /// 32-bit accumulator register (EAX)
    Eax,
    /// 32-bit counter register (ECX)
    Ecx,
    /// 32-bit data register (EDX)
    Edx,
    /// 32-bit base register (EBX)
    Ebx,
    /// 32-bit stack pointer (ESP)
    Esp,
    /// 32-bit base pointer (EBP)
    Ebp,
    /// 32-bit source index (ESI)
    Esi,
    /// 32-bit destination index (EDI)
    Edi,

    /// 16-bit accumulator register (AX)
    Ax,
    /// 16-bit counter register (CX)
    Cx,
    /// 16-bit data register (DX)
    Dx,
    /// 16-bit base register (BX)
    Bx,
    /// 16-bit stack pointer (SP)
    Sp,
    /// 16-bit base pointer (BP)
    Bp,
    /// 16-bit source index (SI)
    Si,
    /// 16-bit destination index (DI)
    Di,

    /// 8-bit low accumulator (AL)
    Al,
    /// 8-bit low counter (CL)
    Cl,
    /// 8-bit low data (DL)
    Dl,
    /// 8-bit low base (BL)
    Bl,
    /// 8-bit high accumulator (AH)
    Ah,
    /// 8-bit high counter (CH)
    Ch,
    /// 8-bit high data (DH)
    Dh,
    /// 8-bit high base (BH)
    Bh,

    /// Extra segment (ES)
    Es,
    /// Code segment (CS)
    Cs,
    /// Stack segment (SS)
    Ss,
    /// Data segment (DS)
    Ds,
    /// Extra segment (FS)
    Fs,
    /// Extra segment (GS)
    Gs,
}

const GPR32: [Register; 8] = [
    Register::Eax,
    Register::Ecx,
    Register::Edx,
    Register::Ebx,
    Register::Esp,
    Register::Ebp,
    Register::Esi,
    Register::Edi,
];

const GPR16: [Register; 8] = [
    Register::Ax,
    Register::Cx,
    Register::Dx,
    Register::Bx,
    Register::Sp,
    Register::Bp,
    Register::Si,
    Register::Di,
];

const GPR8: [Register; 8] = [
    Register::Al,
    Register::Cl,
    Register::Dl,
    Register::Bl,
    Register::Ah,
    Register::Ch,
    Register::Dh,
    Register::Bh,
];

const SEGMENTS: [Register; 6] = [
    Register::Es,
    Register::Cs,
    Register::Ss,
    Register::Ds,
    Register::Fs,
    Register::Gs,
];

impl Register {
    /// Maps a 3-bit register number to the general-purpose register of the given width.
    ///
    /// Returns `None` for widths that have no general-purpose register file (48/64/80 bits).
    #[must_use]
    pub fn gpr(number: u8, width: Width) -> Option<Register> {
        let index = usize::from(number & 0x7);
        match width {
            Width::Bits8 => Some(GPR8[index]),
            Width::Bits16 => Some(GPR16[index]),
            Width::Bits32 => Some(GPR32[index]),
            _ => None,
        }
    }

    /// Maps the 3-bit `sreg` field of a ModRM byte to a segment register.
    #[must_use]
    pub fn segment(number: u8) -> Option<Register> {
        SEGMENTS.get(usize::from(number)).copied()
    }

    /// Returns the width of this register.
    #[must_use]
    pub const fn width(self) -> Width {
        match self {
            Register::Al
            | Register::Cl
            | Register::Dl
            | Register::Bl
            | Register::Ah
            | Register::Ch
            | Register::Dh
            | Register::Bh => Width::Bits8,
            Register::Eax
            | Register::Ecx
            | Register::Edx
            | Register::Ebx
            | Register::Esp
            | Register::Ebp
            | Register::Esi
            | Register::Edi => Width::Bits32,
            _ => Width::Bits16,
        }
    }

    /// Returns the register number of the full-size register this register is part of.
    ///
    /// `al`, `ah`, `ax` and `eax` all return 0. Segment registers return their `sreg`
    /// encoding.
    #[must_use]
    pub const fn base_index(self) -> u8 {
        match self {
            Register::Eax | Register::Ax | Register::Al | Register::Ah | Register::Es => 0,
            Register::Ecx | Register::Cx | Register::Cl | Register::Ch | Register::Cs => 1,
            Register::Edx | Register::Dx | Register::Dl | Register::Dh | Register::Ss => 2,
            Register::Ebx | Register::Bx | Register::Bl | Register::Bh | Register::Ds => 3,
            Register::Esp | Register::Sp | Register::Fs => 4,
            Register::Ebp | Register::Bp | Register::Gs => 5,
            Register::Esi | Register::Si => 6,
            Register::Edi | Register::Di => 7,
        }
    }

    /// Returns the 32-bit register containing this register (`ah` → `eax`).
    ///
    /// Segment registers are returned unchanged.
    #[must_use]
    pub fn full(self) -> Register {
        if self.is_segment() {
            return self;
        }
        GPR32[usize::from(self.base_index())]
    }

    /// Returns true if this is one of the six segment registers.
    #[must_use]
    pub const fn is_segment(self) -> bool {
        matches!(
            self,
            Register::Es | Register::Cs | Register::Ss | Register::Ds | Register::Fs | Register::Gs
        )
    }

    /// Returns true if this is the stack pointer register.
    #[must_use]
    pub const fn is_stack_pointer(self) -> bool {
        matches!(self, Register::Sp | Register::Esp)
    }

    /// Returns true if this is the base pointer register.
    #[must_use]
    pub const fn is_base_pointer(self) -> bool {
        matches!(self, Register::Bp | Register::Ebp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn gpr_mapping_depends_on_width() {
        assert_eq!(Register::gpr(4, Width::Bits32), Some(Register::Esp));
        assert_eq!(Register::gpr(4, Width::Bits16), Some(Register::Sp));
        assert_eq!(Register::gpr(4, Width::Bits8), Some(Register::Ah));
        assert_eq!(Register::gpr(0, Width::Bits80), None);
    }

    #[test]
    fn widths_match_register_file() {
        for number in 0..8 {
            for width in [Width::Bits8, Width::Bits16, Width::Bits32] {
                let reg = Register::gpr(number, width).unwrap();
                assert_eq!(reg.width(), width);
                if width == Width::Bits8 {
                    // ah/ch/dh/bh live in the second byte of eax..ebx
                    assert_eq!(reg.base_index(), number & 0x3);
                } else {
                    assert_eq!(reg.base_index(), number);
                }
            }
        }
    }

    #[test]
    fn full_register() {
        assert_eq!(Register::Ah.full(), Register::Eax);
        assert_eq!(Register::Di.full(), Register::Edi);
        assert_eq!(Register::Fs.full(), Register::Fs);
    }

    #[test]
    fn segment_registers() {
        assert_eq!(Register::segment(3), Some(Register::Ds));
        assert_eq!(Register::segment(6), None);
        assert_eq!(Register::iter().filter(|r| r.is_segment()).count(), 6);
    }

    #[test]
    fn register_display() {
        assert_eq!(Register::Eax.to_string(), "eax");
        assert_eq!(Register::Bh.to_string(), "bh");
    }

    #[test]
    fn width_helpers() {
        assert_eq!(Width::Bits32.mask(), 0xFFFF_FFFF);
        assert_eq!(Width::Bits32.sign_bit(), 0x8000_0000);
        assert_eq!(Width::Bits16.signed_max(), 0x7FFF);
        assert_eq!(Width::Bits8.bytes(), 1);
        assert_eq!(Width::from_bits(48), Some(Width::Bits48));
        assert_eq!(Width::from_bits(12), None);
        assert_eq!(Width::Bits80.ptr_keyword(), "tbyte");
    }
}
