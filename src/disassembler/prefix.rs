//! Legacy instruction prefixes.
//!
//! An instruction may start with any number of prefix bytes from five groups: LOCK,
//! REP/REPNE, segment override, operand-size (`0x66`) and address-size (`0x67`). When a
//! group appears more than once the last occurrence wins, as on real hardware.

use bitflags::bitflags;

use crate::disassembler::register::{Register, Width};

/// Upper bound on the length of a single x86 instruction.
pub const MAX_INSTRUCTION_LENGTH: usize = 15;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Prefix bytes seen in front of an opcode
    pub struct PrefixFlags: u8 {
        /// `0xF0` - LOCK
        const LOCK = 0x01;
        /// `0xF3` - REP / REPE
        const REP = 0x02;
        /// `0xF2` - REPNE
        const REPNE = 0x04;
        /// `0x66` - operand-size override
        const OPERAND_SIZE = 0x08;
        /// `0x67` - address-size override
        const ADDRESS_SIZE = 0x10;
    }
}

/// Prefix state collected before the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Prefixes {
    /// The non-segment prefixes
    pub flags: PrefixFlags,
    /// The last segment override prefix, if any
    pub segment: Option<Register>,
}

impl Prefixes {
    /// Folds `byte` into the prefix state. Returns `false` if it is not a prefix byte.
    pub fn apply(&mut self, byte: u8) -> bool {
        match byte {
            0xF0 => self.flags.insert(PrefixFlags::LOCK),
            0xF3 => {
                self.flags.remove(PrefixFlags::REPNE);
                self.flags.insert(PrefixFlags::REP);
            }
            0xF2 => {
                self.flags.remove(PrefixFlags::REP);
                self.flags.insert(PrefixFlags::REPNE);
            }
            0x66 => self.flags.insert(PrefixFlags::OPERAND_SIZE),
            0x67 => self.flags.insert(PrefixFlags::ADDRESS_SIZE),
            0x26 => self.segment = Some(Register::Es),
            0x2E => self.segment = Some(Register::Cs),
            0x36 => self.segment = Some(Register::Ss),
            0x3E => self.segment = Some(Register::Ds),
            0x64 => self.segment = Some(Register::Fs),
            0x65 => self.segment = Some(Register::Gs),
            _ => return false,
        }
        true
    }

    /// Width of "full size" operands: 16 bits under `0x66`, otherwise 32 bits.
    #[must_use]
    pub fn operand_width(&self) -> Width {
        if self.flags.contains(PrefixFlags::OPERAND_SIZE) {
            Width::Bits16
        } else {
            Width::Bits32
        }
    }

    /// Returns true if memory operands use 16-bit addressing.
    #[must_use]
    pub fn address_16(&self) -> bool {
        self.flags.contains(PrefixFlags::ADDRESS_SIZE)
    }

    /// Returns true if a LOCK prefix is present.
    #[must_use]
    pub fn lock(&self) -> bool {
        self.flags.contains(PrefixFlags::LOCK)
    }

    /// Returns true if a REP/REPE prefix is present.
    #[must_use]
    pub fn rep(&self) -> bool {
        self.flags.contains(PrefixFlags::REP)
    }

    /// Returns true if a REPNE prefix is present.
    #[must_use]
    pub fn repne(&self) -> bool {
        self.flags.contains(PrefixFlags::REPNE)
    }
}
