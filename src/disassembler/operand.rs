//! Decoded operand forms.
//!
//! Every [`Operand`] carries an explicit [`Width`]: `01 C0` is `add eax, eax` while
//! `66 01 C0` is `add ax, ax`, so the width can never be recovered from the opcode alone.
//!
//! # Memory operands
//!
//! The addressing forms produced by the ModRM/SIB decoder map onto four variants:
//!
//! | Encoding                   | Variant                                  |
//! |----------------------------|------------------------------------------|
//! | `[disp32]`                 | [`Operand::DirectMemory`]                |
//! | `[base]`                   | [`Operand::BaseRegisterMemory`]          |
//! | `[base + disp]`            | [`Operand::DisplacementMemory`]          |
//! | `[base + index*scale + d]` | [`Operand::ScaledIndexMemory`]           |
//!
//! Each memory variant keeps the segment override that was active when it was decoded.

use std::fmt;

use crate::disassembler::register::{Register, Width};

/// A single decoded instruction operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A general-purpose or segment register; the width is that of the register.
    Register(Register),
    /// An immediate value, already sign- or zero-extended as the opcode specifies.
    Immediate {
        /// The extended value
        value: i64,
        /// Width of the operation the immediate takes part in
        width: Width,
    },
    /// An absolute memory address: `[0x00403000]`.
    DirectMemory {
        /// The absolute address
        address: u32,
        /// Width of the memory access
        width: Width,
        /// Segment override, if one was present
        segment: Option<Register>,
    },
    /// Register indirect memory: `[eax]`.
    BaseRegisterMemory {
        /// Register holding the address
        base: Register,
        /// Width of the memory access
        width: Width,
        /// Segment override, if one was present
        segment: Option<Register>,
    },
    /// Register plus signed displacement: `[ebp-0x8]`.
    DisplacementMemory {
        /// Base register
        base: Register,
        /// Signed displacement added to the base
        disp: i32,
        /// Width of the memory access
        width: Width,
        /// Segment override, if one was present
        segment: Option<Register>,
    },
    /// Scaled-index memory: `[base + index*scale + disp]`, base optional.
    ScaledIndexMemory {
        /// Index register
        index: Register,
        /// Scale factor, one of 1, 2, 4 or 8
        scale: u8,
        /// Base register, absent for the `[index*scale + disp32]` form
        base: Option<Register>,
        /// Signed displacement
        disp: i32,
        /// Width of the memory access
        width: Width,
        /// Segment override, if one was present
        segment: Option<Register>,
    },
    /// A branch target, already resolved against the end of the instruction.
    RelativeOffset {
        /// Absolute target address
        target: u32,
    },
    /// A direct far pointer `ptr16:32` as used by `jmp far` / `call far`.
    FarPointer {
        /// Selector part
        segment: u16,
        /// Offset part
        offset: u32,
    },
    /// An x87 stack register `st(i)`.
    FpuRegister(u8),
}

impl Operand {
    /// Shorthand for an immediate operand.
    #[must_use]
    pub const fn imm(value: i64, width: Width) -> Self {
        Operand::Immediate { value, width }
    }

    /// Returns the bit width of this operand.
    #[must_use]
    pub const fn width(&self) -> Width {
        match self {
            Operand::Register(reg) => reg.width(),
            Operand::Immediate { width, .. }
            | Operand::DirectMemory { width, .. }
            | Operand::BaseRegisterMemory { width, .. }
            | Operand::DisplacementMemory { width, .. }
            | Operand::ScaledIndexMemory { width, .. } => *width,
            Operand::RelativeOffset { .. } => Width::Bits32,
            Operand::FarPointer { .. } => Width::Bits48,
            Operand::FpuRegister(_) => Width::Bits80,
        }
    }

    /// Returns true if this operand refers to memory.
    #[must_use]
    pub const fn is_memory(&self) -> bool {
        matches!(
            self,
            Operand::DirectMemory { .. }
                | Operand::BaseRegisterMemory { .. }
                | Operand::DisplacementMemory { .. }
                | Operand::ScaledIndexMemory { .. }
        )
    }

    /// Returns true if this is a register operand.
    #[must_use]
    pub const fn is_register(&self) -> bool {
        matches!(self, Operand::Register(_))
    }

    /// Returns the register if this is a register operand.
    #[must_use]
    pub const fn as_register(&self) -> Option<Register> {
        match self {
            Operand::Register(reg) => Some(*reg),
            _ => None,
        }
    }

    /// Returns the immediate value if this is an immediate operand.
    #[must_use]
    pub const fn as_immediate(&self) -> Option<i64> {
        match self {
            Operand::Immediate { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Returns the segment override of a memory operand.
    #[must_use]
    pub const fn segment(&self) -> Option<Register> {
        match self {
            Operand::DirectMemory { segment, .. }
            | Operand::BaseRegisterMemory { segment, .. }
            | Operand::DisplacementMemory { segment, .. }
            | Operand::ScaledIndexMemory { segment, .. } => *segment,
            _ => None,
        }
    }

    /// Returns a copy of this operand with the given segment override.
    ///
    /// Non-memory operands are returned unchanged.
    #[must_use]
    pub fn with_segment(mut self, seg: Register) -> Self {
        match &mut self {
            Operand::DirectMemory { segment, .. }
            | Operand::BaseRegisterMemory { segment, .. }
            | Operand::DisplacementMemory { segment, .. }
            | Operand::ScaledIndexMemory { segment, .. } => *segment = Some(seg),
            _ => {}
        }
        self
    }

    /// Returns a copy of a memory operand with a different access width.
    ///
    /// Handlers decode the ModRM operand first and then fix up the width for forms such
    /// as `movzx r32, r/m8` or the FPU memory formats.
    #[must_use]
    pub fn with_width(mut self, new_width: Width) -> Self {
        match &mut self {
            Operand::Immediate { width, .. }
            | Operand::DirectMemory { width, .. }
            | Operand::BaseRegisterMemory { width, .. }
            | Operand::DisplacementMemory { width, .. }
            | Operand::ScaledIndexMemory { width, .. } => *width = new_width,
            _ => {}
        }
        self
    }

    /// Returns true if any register used by this operand (directly or for addressing)
    /// overlaps `reg`.
    #[must_use]
    pub fn uses_register(&self, reg: Register) -> bool {
        let base = reg.full();
        match self {
            Operand::Register(r) | Operand::BaseRegisterMemory { base: r, .. } => {
                r.full() == base
            }
            Operand::DisplacementMemory { base: r, .. } => r.full() == base,
            Operand::ScaledIndexMemory { index, base: b, .. } => {
                index.full() == base || b.is_some_and(|b| b.full() == base)
            }
            _ => false,
        }
    }
}

/// Writes a value in the style used for immediates and displacements: small values in
/// decimal, everything else in hex.
pub(crate) fn write_hex(f: &mut fmt::Formatter<'_>, value: u64) -> fmt::Result {
    if value < 10 {
        write!(f, "{value}")
    } else {
        write!(f, "0x{value:x}")
    }
}

fn write_disp(f: &mut fmt::Formatter<'_>, disp: i32) -> fmt::Result {
    match disp {
        0 => Ok(()),
        d if d < 0 => {
            f.write_str("-")?;
            write_hex(f, u64::from(d.unsigned_abs()))
        }
        d => {
            f.write_str("+")?;
            write_hex(f, u64::from(d.unsigned_abs()))
        }
    }
}

fn write_memory_prefix(
    f: &mut fmt::Formatter<'_>,
    width: Width,
    segment: Option<Register>,
) -> fmt::Result {
    write!(f, "{} ptr ", width.ptr_keyword())?;
    if let Some(seg) = segment {
        write!(f, "{seg}:")?;
    }
    Ok(())
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::Register(reg) => write!(f, "{reg}"),
            Operand::Immediate { value, width } => {
                #[allow(clippy::cast_sign_loss)]
                let raw = (value as u64) & width.mask();
                write_hex(f, raw)
            }
            Operand::DirectMemory {
                address,
                width,
                segment,
            } => {
                write_memory_prefix(f, width, segment)?;
                write!(f, "[0x{address:x}]")
            }
            Operand::BaseRegisterMemory {
                base,
                width,
                segment,
            } => {
                write_memory_prefix(f, width, segment)?;
                write!(f, "[{base}]")
            }
            Operand::DisplacementMemory {
                base,
                disp,
                width,
                segment,
            } => {
                write_memory_prefix(f, width, segment)?;
                write!(f, "[{base}")?;
                write_disp(f, disp)?;
                f.write_str("]")
            }
            Operand::ScaledIndexMemory {
                index,
                scale,
                base,
                disp,
                width,
                segment,
            } => {
                write_memory_prefix(f, width, segment)?;
                f.write_str("[")?;
                if let Some(base) = base {
                    write!(f, "{base}+")?;
                }
                write!(f, "{index}")?;
                if scale > 1 {
                    write!(f, "*{scale}")?;
                }
                if base.is_none() {
                    #[allow(clippy::cast_sign_loss)]
                    let absolute = disp as u32;
                    if absolute != 0 {
                        write!(f, "+0x{absolute:x}")?;
                    }
                } else {
                    write_disp(f, disp)?;
                }
                f.write_str("]")
            }
            Operand::RelativeOffset { target } => write!(f, "0x{target:x}"),
            Operand::FarPointer { segment, offset } => write!(f, "0x{segment:x}:0x{offset:x}"),
            Operand::FpuRegister(index) => write!(f, "st({index})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_are_explicit() {
        assert_eq!(Operand::Register(Register::Ax).width(), Width::Bits16);
        assert_eq!(Operand::imm(5, Width::Bits8).width(), Width::Bits8);
        assert_eq!(Operand::RelativeOffset { target: 0 }.width(), Width::Bits32);
        assert_eq!(
            Operand::FarPointer {
                segment: 8,
                offset: 0
            }
            .width(),
            Width::Bits48
        );
        assert_eq!(Operand::FpuRegister(3).width(), Width::Bits80);
    }

    #[test]
    fn display_memory_forms() {
        let direct = Operand::DirectMemory {
            address: 0x0040_3000,
            width: Width::Bits32,
            segment: None,
        };
        assert_eq!(direct.to_string(), "dword ptr [0x403000]");

        let local = Operand::DisplacementMemory {
            base: Register::Ebp,
            disp: -4,
            width: Width::Bits32,
            segment: None,
        };
        assert_eq!(local.to_string(), "dword ptr [ebp-4]");

        let element = Operand::ScaledIndexMemory {
            index: Register::Ecx,
            scale: 4,
            base: Some(Register::Eax),
            disp: 0x10,
            width: Width::Bits8,
            segment: None,
        };
        assert_eq!(element.to_string(), "byte ptr [eax+ecx*4+0x10]");

        let table = Operand::ScaledIndexMemory {
            index: Register::Eax,
            scale: 4,
            base: None,
            disp: 0x0040_1000,
            width: Width::Bits32,
            segment: None,
        };
        assert_eq!(table.to_string(), "dword ptr [eax*4+0x401000]");
    }

    #[test]
    fn segment_override_is_kept() {
        let tib = Operand::DirectMemory {
            address: 0,
            width: Width::Bits32,
            segment: None,
        }
        .with_segment(Register::Fs);
        assert_eq!(tib.segment(), Some(Register::Fs));
        assert_eq!(tib.to_string(), "dword ptr fs:[0x0]");

        let reg = Operand::Register(Register::Eax).with_segment(Register::Fs);
        assert_eq!(reg, Operand::Register(Register::Eax));
    }

    #[test]
    fn immediates_are_masked_to_width() {
        assert_eq!(Operand::imm(-1, Width::Bits32).to_string(), "0xffffffff");
        assert_eq!(Operand::imm(-1, Width::Bits8).to_string(), "0xff");
        assert_eq!(Operand::imm(3, Width::Bits32).to_string(), "3");
    }

    #[test]
    fn register_usage() {
        let op = Operand::ScaledIndexMemory {
            index: Register::Esi,
            scale: 2,
            base: Some(Register::Ebx),
            disp: 0,
            width: Width::Bits16,
            segment: None,
        };
        assert!(op.uses_register(Register::Bl));
        assert!(op.uses_register(Register::Si));
        assert!(!op.uses_register(Register::Eax));
    }
}
