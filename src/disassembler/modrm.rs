//! ModRM and SIB addressing-mode decoding.
//!
//! Shared by every opcode handler that takes a register/memory operand. The ModRM byte
//! splits into `mod` (2 bits), `reg` (3 bits) and `rm` (3 bits):
//!
//! | mod | meaning (32-bit addressing)                             |
//! |-----|---------------------------------------------------------|
//! | 00  | `[rm]`, except `rm=4` (SIB) and `rm=5` (`[disp32]`)      |
//! | 01  | `[rm + disp8]`, `rm=4` still selects SIB               |
//! | 10  | `[rm + disp32]`, `rm=4` still selects SIB              |
//! | 11  | register operand                                        |
//!
//! `mod=00 rm=101` is an absolute address without base register, not `[ebp]`. In the SIB
//! byte `index=100` means "no index" and `base=101` with `mod=00` means "disp32, no base".
//! Under the address-size prefix the 16-bit table (`[bx+si]` .. `[bx]`) applies instead.

use crate::{
    disassembler::{
        operand::Operand,
        register::{Register, Width},
    },
    stream::Parser,
    Result,
};

/// Decoded ModRM byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    /// Mod field (2 bits)
    pub mod_: u8,
    /// Reg field (3 bits), a register number or an opcode extension
    pub reg: u8,
    /// R/M field (3 bits)
    pub rm: u8,
}

impl ModRm {
    /// Splits a ModRM byte into its fields.
    #[must_use]
    pub const fn parse(byte: u8) -> Self {
        ModRm {
            mod_: (byte >> 6) & 0x3,
            reg: (byte >> 3) & 0x7,
            rm: byte & 0x7,
        }
    }

    /// Returns true if this ModRM encodes a register operand (`mod=11`).
    #[must_use]
    pub const fn is_register(&self) -> bool {
        self.mod_ == 0b11
    }

    /// Returns true if a SIB byte follows (32-bit addressing only).
    #[must_use]
    pub const fn needs_sib(&self) -> bool {
        self.mod_ != 0b11 && self.rm == 0b100
    }

    /// Returns true if this is the absolute `[disp32]` form (32-bit addressing only).
    #[must_use]
    pub const fn is_absolute(&self) -> bool {
        self.mod_ == 0b00 && self.rm == 0b101
    }
}

/// Decoded SIB byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sib {
    /// Scale (2 bits), the actual factor is `1 << scale`
    pub scale: u8,
    /// Index register number (3 bits)
    pub index: u8,
    /// Base register number (3 bits)
    pub base: u8,
}

impl Sib {
    /// Splits a SIB byte into its fields.
    #[must_use]
    pub const fn parse(byte: u8) -> Self {
        Sib {
            scale: (byte >> 6) & 0x3,
            index: (byte >> 3) & 0x7,
            base: byte & 0x7,
        }
    }

    /// Returns the actual scale factor (1, 2, 4, or 8).
    #[must_use]
    pub const fn scale_factor(&self) -> u8 {
        1 << self.scale
    }

    /// Returns true if the index field encodes "no index".
    #[must_use]
    pub const fn has_index(&self) -> bool {
        self.index != 0b100
    }
}

/// Returns the general-purpose register selected by a 3-bit register number.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `width` has no register file.
pub fn gpr(number: u8, width: Width) -> Result<Register> {
    Register::gpr(number, width)
        .ok_or_else(|| malformed_error!("No {}-bit register for number {}", width, number))
}

/// Decodes the r/m operand of an already consumed ModRM byte.
///
/// Reads any SIB byte and displacement that follow. Register forms produce a register of
/// `width`, memory forms a memory operand accessing `width` bits.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the SIB byte or displacement is cut off, and
/// [`crate::Error::Malformed`] for a register form of a width without registers.
pub fn decode_rm(
    parser: &mut Parser,
    modrm: ModRm,
    width: Width,
    address_16: bool,
) -> Result<Operand> {
    if modrm.is_register() {
        return Ok(Operand::Register(gpr(modrm.rm, width)?));
    }

    if address_16 {
        decode_memory16(parser, modrm, width)
    } else {
        decode_memory32(parser, modrm, width)
    }
}

fn read_disp(parser: &mut Parser, mod_: u8) -> Result<i32> {
    match mod_ {
        0b01 => Ok(i32::from(parser.read_le::<i8>()?)),
        0b10 => parser.read_le::<i32>(),
        _ => Ok(0),
    }
}

fn decode_memory32(parser: &mut Parser, modrm: ModRm, width: Width) -> Result<Operand> {
    if modrm.is_absolute() {
        return Ok(Operand::DirectMemory {
            address: parser.read_le::<u32>()?,
            width,
            segment: None,
        });
    }

    if modrm.needs_sib() {
        return decode_sib(parser, modrm, width);
    }

    let base = gpr(modrm.rm, Width::Bits32)?;
    if modrm.mod_ == 0b00 {
        return Ok(Operand::BaseRegisterMemory {
            base,
            width,
            segment: None,
        });
    }

    Ok(Operand::DisplacementMemory {
        base,
        disp: read_disp(parser, modrm.mod_)?,
        width,
        segment: None,
    })
}

fn decode_sib(parser: &mut Parser, modrm: ModRm, width: Width) -> Result<Operand> {
    let sib = Sib::parse(parser.read_le::<u8>()?);

    let base = if sib.base == 0b101 && modrm.mod_ == 0b00 {
        None
    } else {
        Some(gpr(sib.base, Width::Bits32)?)
    };

    let disp = if base.is_none() {
        parser.read_le::<i32>()?
    } else {
        read_disp(parser, modrm.mod_)?
    };

    let operand = match (sib.has_index(), base) {
        (true, base) => Operand::ScaledIndexMemory {
            index: gpr(sib.index, Width::Bits32)?,
            scale: sib.scale_factor(),
            base,
            disp,
            width,
            segment: None,
        },
        (false, Some(base)) if modrm.mod_ == 0b00 => Operand::BaseRegisterMemory {
            base,
            width,
            segment: None,
        },
        (false, Some(base)) => Operand::DisplacementMemory {
            base,
            disp,
            width,
            segment: None,
        },
        #[allow(clippy::cast_sign_loss)]
        (false, None) => Operand::DirectMemory {
            address: disp as u32,
            width,
            segment: None,
        },
    };

    Ok(operand)
}

/// Base and index of the eight 16-bit r/m encodings.
const MEMORY16: [(Register, Option<Register>); 8] = [
    (Register::Bx, Some(Register::Si)),
    (Register::Bx, Some(Register::Di)),
    (Register::Bp, Some(Register::Si)),
    (Register::Bp, Some(Register::Di)),
    (Register::Si, None),
    (Register::Di, None),
    (Register::Bp, None),
    (Register::Bx, None),
];

fn decode_memory16(parser: &mut Parser, modrm: ModRm, width: Width) -> Result<Operand> {
    if modrm.mod_ == 0b00 && modrm.rm == 0b110 {
        return Ok(Operand::DirectMemory {
            address: u32::from(parser.read_le::<u16>()?),
            width,
            segment: None,
        });
    }

    let disp = match modrm.mod_ {
        0b01 => i32::from(parser.read_le::<i8>()?),
        0b10 => i32::from(parser.read_le::<i16>()?),
        _ => 0,
    };

    let (base, index) = MEMORY16[usize::from(modrm.rm)];
    let operand = match index {
        Some(index) => Operand::ScaledIndexMemory {
            index,
            scale: 1,
            base: Some(base),
            disp,
            width,
            segment: None,
        },
        None if modrm.mod_ == 0b00 => Operand::BaseRegisterMemory {
            base,
            width,
            segment: None,
        },
        None => Operand::DisplacementMemory {
            base,
            disp,
            width,
            segment: None,
        },
    };

    Ok(operand)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rm32(bytes: &[u8], width: Width) -> (Operand, usize) {
        let mut parser = Parser::new(bytes);
        let modrm = ModRm::parse(parser.read_le::<u8>().unwrap());
        let operand = decode_rm(&mut parser, modrm, width, false).unwrap();
        (operand, parser.pos())
    }

    #[test]
    fn modrm_fields() {
        let modrm = ModRm::parse(0b01_010_100);
        assert_eq!(modrm.mod_, 1);
        assert_eq!(modrm.reg, 2);
        assert_eq!(modrm.rm, 4);
        assert!(modrm.needs_sib());
        assert!(!modrm.is_register());
    }

    #[test]
    fn register_form() {
        let (operand, len) = rm32(&[0xC1], Width::Bits32);
        assert_eq!(operand, Operand::Register(Register::Ecx));
        assert_eq!(len, 1);

        let (operand, _) = rm32(&[0xC4], Width::Bits8);
        assert_eq!(operand, Operand::Register(Register::Ah));
    }

    #[test]
    fn mod0_rm5_is_absolute_not_ebp() {
        let (operand, len) = rm32(&[0x05, 0x00, 0x30, 0x40, 0x00], Width::Bits32);
        assert_eq!(
            operand,
            Operand::DirectMemory {
                address: 0x0040_3000,
                width: Width::Bits32,
                segment: None
            }
        );
        assert_eq!(len, 5);
    }

    #[test]
    fn mod1_rm5_is_ebp_relative() {
        let (operand, len) = rm32(&[0x45, 0xFC], Width::Bits32);
        assert_eq!(
            operand,
            Operand::DisplacementMemory {
                base: Register::Ebp,
                disp: -4,
                width: Width::Bits32,
                segment: None
            }
        );
        assert_eq!(len, 2);
    }

    #[test]
    fn mod0_rm4_reads_sib() {
        // [eax+ecx*4]
        let (operand, len) = rm32(&[0x04, 0x88], Width::Bits32);
        assert_eq!(
            operand,
            Operand::ScaledIndexMemory {
                index: Register::Ecx,
                scale: 4,
                base: Some(Register::Eax),
                disp: 0,
                width: Width::Bits32,
                segment: None
            }
        );
        assert_eq!(len, 2);
    }

    #[test]
    fn sib_without_index() {
        // [esp]
        let (operand, len) = rm32(&[0x04, 0x24], Width::Bits32);
        assert_eq!(
            operand,
            Operand::BaseRegisterMemory {
                base: Register::Esp,
                width: Width::Bits32,
                segment: None
            }
        );
        assert_eq!(len, 2);

        // [esp+8]
        let (operand, len) = rm32(&[0x44, 0x24, 0x08], Width::Bits32);
        assert_eq!(
            operand,
            Operand::DisplacementMemory {
                base: Register::Esp,
                disp: 8,
                width: Width::Bits32,
                segment: None
            }
        );
        assert_eq!(len, 3);
    }

    #[test]
    fn sib_base5_mod0_has_no_base() {
        // [eax*4+0x401000]
        let (operand, len) = rm32(&[0x04, 0x85, 0x00, 0x10, 0x40, 0x00], Width::Bits32);
        assert_eq!(
            operand,
            Operand::ScaledIndexMemory {
                index: Register::Eax,
                scale: 4,
                base: None,
                disp: 0x0040_1000,
                width: Width::Bits32,
                segment: None
            }
        );
        assert_eq!(len, 6);

        // no index and no base: plain absolute
        let (operand, _) = rm32(&[0x04, 0x25, 0x78, 0x56, 0x34, 0x12], Width::Bits8);
        assert_eq!(
            operand,
            Operand::DirectMemory {
                address: 0x1234_5678,
                width: Width::Bits8,
                segment: None
            }
        );
    }

    #[test]
    fn sib_base5_mod1_is_ebp() {
        // [ebp+esi*2+0x10]
        let (operand, _) = rm32(&[0x44, 0x75, 0x10], Width::Bits16);
        assert_eq!(
            operand,
            Operand::ScaledIndexMemory {
                index: Register::Esi,
                scale: 2,
                base: Some(Register::Ebp),
                disp: 0x10,
                width: Width::Bits16,
                segment: None
            }
        );
    }

    #[test]
    fn truncated_displacement() {
        let mut parser = Parser::new(&[0x05, 0x00, 0x30]);
        let modrm = ModRm::parse(parser.read_le::<u8>().unwrap());
        assert!(decode_rm(&mut parser, modrm, Width::Bits32, false).is_err());
    }

    #[test]
    fn addressing_16() {
        let mut parser = Parser::new(&[0x00]);
        let modrm = ModRm::parse(parser.read_le::<u8>().unwrap());
        assert_eq!(
            decode_rm(&mut parser, modrm, Width::Bits16, true).unwrap(),
            Operand::ScaledIndexMemory {
                index: Register::Si,
                scale: 1,
                base: Some(Register::Bx),
                disp: 0,
                width: Width::Bits16,
                segment: None
            }
        );

        let mut parser = Parser::new(&[0x06, 0x34, 0x12]);
        let modrm = ModRm::parse(parser.read_le::<u8>().unwrap());
        assert_eq!(
            decode_rm(&mut parser, modrm, Width::Bits8, true).unwrap(),
            Operand::DirectMemory {
                address: 0x1234,
                width: Width::Bits8,
                segment: None
            }
        );

        let mut parser = Parser::new(&[0x46, 0xFE]);
        let modrm = ModRm::parse(parser.read_le::<u8>().unwrap());
        assert_eq!(
            decode_rm(&mut parser, modrm, Width::Bits16, true).unwrap(),
            Operand::DisplacementMemory {
                base: Register::Bp,
                disp: -2,
                width: Width::Bits16,
                segment: None
            }
        );
    }
}
