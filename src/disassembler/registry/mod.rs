//! Opcode handler registry.
//!
//! The registry is an ordered table of [`OpcodeHandler`] entries. Each entry pairs a
//! recognizer (opcode range, optional ModRM constraint, operand-size constraint) with an
//! operand [`Encoding`] and the resulting [`Mnemonic`]. The decoder asks for the first
//! entry whose recognizer accepts the opcode and a non-consuming peek of the next byte;
//! ordering inside a table is therefore significant. `90` is `nop` only because its entry
//! precedes the `xchg eax, r32` range `90..=97`.
//!
//! Three tables exist:
//! - [`primary`] - one byte opcodes
//! - [`extended`] - two byte opcodes behind the `0F` escape
//! - [`fpu`] - the x87 escapes `D8..=DF`, disambiguated by the ModRM byte
//!
//! # Example
//!
//! ```rust
//! use x86scope::disassembler::registry::{Lookup, OpcodeMap, Registry};
//! use x86scope::disassembler::{Mnemonic, Prefixes};
//!
//! // 83 /0 ib - add r/m32, imm8
//! match Registry::global().lookup(OpcodeMap::Primary, 0x83, Some(0xC0), &Prefixes::default()) {
//!     Lookup::Found(handler) => assert_eq!(handler.mnemonic, Mnemonic::Add),
//!     other => panic!("unexpected lookup result: {other:?}"),
//! }
//! ```

pub mod extended;
pub mod fpu;
pub mod primary;

use std::sync::OnceLock;

use crate::{
    disassembler::{
        instruction::{Condition, Mnemonic},
        modrm::{decode_rm, gpr, ModRm},
        operand::Operand,
        prefix::Prefixes,
        register::{Register, Width},
    },
    stream::Parser,
    Result,
};

/// The opcode space an opcode byte belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpcodeMap {
    /// Single byte opcodes, including the x87 escapes
    Primary,
    /// Opcodes following the `0F` escape byte
    Extended,
}

/// Operand width selected by a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpWidth {
    /// Always 8 bits
    Byte,
    /// Always 16 bits
    Word,
    /// Always 32 bits
    Dword,
    /// 32 bits, or 16 bits under the operand-size prefix
    Full,
    /// A fixed width, used by FPU and far pointer memory operands
    Fixed(Width),
}

impl OpWidth {
    /// Resolves this width against the active prefixes.
    #[must_use]
    pub fn resolve(self, prefixes: &Prefixes) -> Width {
        match self {
            OpWidth::Byte => Width::Bits8,
            OpWidth::Word => Width::Bits16,
            OpWidth::Dword => Width::Bits32,
            OpWidth::Full => prefixes.operand_width(),
            OpWidth::Fixed(width) => width,
        }
    }
}

/// Constraint on the byte following the opcode, checked without consuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModRmFilter {
    /// The handler does not look at the next byte
    Any,
    /// ModRM `reg` field equals the value (group opcodes such as `80..=83`, `F7`, `FF`)
    Reg(u8),
    /// Memory form (`mod != 11`) with the given `reg` field
    MemoryReg(u8),
    /// Any memory form (`lea`, `les`, `lds`)
    Memory,
    /// The raw byte is inside the inclusive range (x87 register forms)
    Range(u8, u8),
}

/// Constraint on the operand-size prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeFilter {
    /// Either operand size
    Any,
    /// Only with the `66` prefix
    Word,
    /// Only without the `66` prefix
    Dword,
}

/// Operand layout of an opcode handler.
///
/// Names list the operands in Intel order, destination first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// No operands
    Bare,
    /// `r/m, reg`
    RmReg,
    /// `reg, r/m`
    RegRm,
    /// `r/m` only, the `reg` field is an opcode extension
    Rm,
    /// `al/ax/eax, imm`
    AccImm,
    /// `r/m, imm`
    RmImm,
    /// `r/m, imm8` sign-extended to the operand width
    RmImm8,
    /// `r/m, imm8` unsigned (shift counts, bit offsets)
    RmImm8u,
    /// `r/m, 1`
    RmOne,
    /// `r/m, cl`
    RmCl,
    /// `r/m, reg, imm8`
    RmRegImm8,
    /// `r/m, reg, cl`
    RmRegCl,
    /// `reg, r/m, imm`
    RegRmImm,
    /// `reg, r/m, imm8` sign-extended
    RegRmImm8,
    /// `reg, r/m8` (`movzx`/`movsx` from a byte)
    RegRmByte,
    /// `reg, r/m16` (`movzx`/`movsx` from a word)
    RegRmWord,
    /// Register encoded in the low three opcode bits
    OpReg,
    /// Register in the opcode, then an immediate
    OpRegImm,
    /// `eax, reg` with the register in the opcode
    AccOpReg,
    /// A single implicit register
    FixedReg(Register),
    /// 8-bit relative branch target
    Rel8,
    /// 32-bit (16-bit under `66`) relative branch target
    Rel,
    /// Unsigned 8-bit immediate
    Imm8,
    /// Unsigned 16-bit immediate
    Imm16,
    /// Immediate of the operand width
    Imm,
    /// 8-bit immediate sign-extended to the operand width
    Imm8Ext,
    /// `imm16, imm8` (`enter`)
    Imm16Imm8,
    /// `al/eax, [moffs]`
    AccMoffs,
    /// `[moffs], al/eax`
    MoffsAcc,
    /// `r/m16, sreg`
    RmSreg,
    /// `sreg, r/m16`
    SregRm,
    /// Direct `ptr16:32`
    FarPtr,
    /// `al/eax, imm8` (`in`)
    AccImm8,
    /// `imm8, al/eax` (`out`)
    Imm8Acc,
    /// `al/eax, dx`
    AccDx,
    /// `dx, al/eax`
    DxAcc,
    /// `es:[edi], [esi]`
    StrMovs,
    /// `[esi], es:[edi]`
    StrCmps,
    /// `es:[edi], acc`
    StrStos,
    /// `acc, [esi]`
    StrLods,
    /// `acc, es:[edi]`
    StrScas,
    /// `st(0), st(i)`
    St0Sti,
    /// `st(i), st(0)`
    StiSt0,
    /// `st(i)`
    Sti,
    /// Consumes the ModRM byte, no operands
    ModRmOnly,
    /// Consumes the ModRM byte, operand `ax` (`fnstsw ax`)
    FpuAx,
}

/// One entry of the opcode registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeHandler {
    /// First opcode byte accepted
    pub opcode: u8,
    /// Last opcode byte accepted (inclusive)
    pub opcode_last: u8,
    /// Constraint on the next byte
    pub modrm: ModRmFilter,
    /// Constraint on the operand-size prefix
    pub size: SizeFilter,
    /// Resulting instruction kind; condition variants take the condition from the opcode
    /// when the handler spans several opcodes
    pub mnemonic: Mnemonic,
    /// Operand layout
    pub encoding: Encoding,
    /// Operand width
    pub width: OpWidth,
}

impl OpcodeHandler {
    /// Creates a handler for a single opcode without further constraints.
    #[must_use]
    pub const fn new(opcode: u8, mnemonic: Mnemonic, encoding: Encoding, width: OpWidth) -> Self {
        OpcodeHandler {
            opcode,
            opcode_last: opcode,
            modrm: ModRmFilter::Any,
            size: SizeFilter::Any,
            mnemonic,
            encoding,
            width,
        }
    }

    /// Extends the handler to the opcode range `opcode..=last`.
    #[must_use]
    pub const fn through(mut self, last: u8) -> Self {
        self.opcode_last = last;
        self
    }

    /// Requires the ModRM `reg` field to equal `reg`.
    #[must_use]
    pub const fn reg(mut self, reg: u8) -> Self {
        self.modrm = ModRmFilter::Reg(reg);
        self
    }

    /// Requires a memory form with the given ModRM `reg` field.
    #[must_use]
    pub const fn memory_reg(mut self, reg: u8) -> Self {
        self.modrm = ModRmFilter::MemoryReg(reg);
        self
    }

    /// Requires a memory form.
    #[must_use]
    pub const fn memory(mut self) -> Self {
        self.modrm = ModRmFilter::Memory;
        self
    }

    /// Requires the next byte to be inside `first..=last`.
    #[must_use]
    pub const fn modrm_range(mut self, first: u8, last: u8) -> Self {
        self.modrm = ModRmFilter::Range(first, last);
        self
    }

    /// Only matches with the operand-size prefix.
    #[must_use]
    pub const fn word(mut self) -> Self {
        self.size = SizeFilter::Word;
        self
    }

    /// Only matches without the operand-size prefix.
    #[must_use]
    pub const fn dword(mut self) -> Self {
        self.size = SizeFilter::Dword;
        self
    }

    /// Returns true if this handler needs the byte after the opcode to decide.
    #[must_use]
    pub const fn needs_modrm(&self) -> bool {
        !matches!(self.modrm, ModRmFilter::Any)
    }

    /// Returns true if this handler accepts the opcode, next byte and prefixes.
    ///
    /// `next` is `None` when the buffer ends after the opcode.
    #[must_use]
    pub fn matches(&self, opcode: u8, next: Option<u8>, prefixes: &Prefixes) -> bool {
        if opcode < self.opcode || opcode > self.opcode_last {
            return false;
        }

        let size_ok = match self.size {
            SizeFilter::Any => true,
            SizeFilter::Word => prefixes.operand_width() == Width::Bits16,
            SizeFilter::Dword => prefixes.operand_width() == Width::Bits32,
        };
        if !size_ok {
            return false;
        }

        match (self.modrm, next) {
            (ModRmFilter::Any, _) => true,
            (_, None) => false,
            (ModRmFilter::Reg(reg), Some(byte)) => ModRm::parse(byte).reg == reg,
            (ModRmFilter::MemoryReg(reg), Some(byte)) => {
                let modrm = ModRm::parse(byte);
                !modrm.is_register() && modrm.reg == reg
            }
            (ModRmFilter::Memory, Some(byte)) => !ModRm::parse(byte).is_register(),
            (ModRmFilter::Range(first, last), Some(byte)) => (first..=last).contains(&byte),
        }
    }

    /// Returns the mnemonic for a concrete opcode byte.
    ///
    /// Handlers covering a whole condition range (`70..=7F`, `0F 40..=4F`, ...) derive the
    /// condition from the low nibble of the opcode.
    #[must_use]
    pub fn mnemonic_for(&self, opcode: u8) -> Mnemonic {
        if self.opcode == self.opcode_last {
            return self.mnemonic;
        }

        match self.mnemonic {
            Mnemonic::Jcc(_) => Mnemonic::Jcc(Condition::from_code(opcode)),
            Mnemonic::Set(_) => Mnemonic::Set(Condition::from_code(opcode)),
            Mnemonic::Cmov(_) => Mnemonic::Cmov(Condition::from_code(opcode)),
            other => other,
        }
    }

    /// Decodes the operands that follow the opcode.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the buffer ends inside the operands, and
    /// [`crate::Error::Malformed`] for encodings that name a register that does not exist.
    pub fn decode_operands(&self, ctx: &mut DecodeContext<'_, '_>) -> Result<Vec<Operand>> {
        let width = self.width.resolve(&ctx.prefixes);

        let operands = match self.encoding {
            Encoding::Bare => Vec::new(),
            Encoding::RmReg => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, width)?;
                vec![rm, Operand::Register(gpr(modrm.reg, width)?)]
            }
            Encoding::RegRm => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, width)?;
                vec![Operand::Register(gpr(modrm.reg, width)?), rm]
            }
            Encoding::Rm => {
                let modrm = ctx.modrm()?;
                vec![ctx.rm(modrm, width)?]
            }
            Encoding::AccImm => vec![ctx.accumulator(width)?, ctx.immediate(width)?],
            Encoding::RmImm => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, width)?;
                vec![rm, ctx.immediate(width)?]
            }
            Encoding::RmImm8 => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, width)?;
                vec![rm, ctx.immediate_ext8(width)?]
            }
            Encoding::RmImm8u => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, width)?;
                vec![rm, ctx.immediate_u8()?]
            }
            Encoding::RmOne => {
                let modrm = ctx.modrm()?;
                vec![ctx.rm(modrm, width)?, Operand::imm(1, Width::Bits8)]
            }
            Encoding::RmCl => {
                let modrm = ctx.modrm()?;
                vec![ctx.rm(modrm, width)?, Operand::Register(Register::Cl)]
            }
            Encoding::RmRegImm8 => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, width)?;
                let reg = Operand::Register(gpr(modrm.reg, width)?);
                vec![rm, reg, ctx.immediate_u8()?]
            }
            Encoding::RmRegCl => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, width)?;
                let reg = Operand::Register(gpr(modrm.reg, width)?);
                vec![rm, reg, Operand::Register(Register::Cl)]
            }
            Encoding::RegRmImm => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, width)?;
                let reg = Operand::Register(gpr(modrm.reg, width)?);
                vec![reg, rm, ctx.immediate(width)?]
            }
            Encoding::RegRmImm8 => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, width)?;
                let reg = Operand::Register(gpr(modrm.reg, width)?);
                vec![reg, rm, ctx.immediate_ext8(width)?]
            }
            Encoding::RegRmByte => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, Width::Bits8)?;
                vec![Operand::Register(gpr(modrm.reg, width)?), rm]
            }
            Encoding::RegRmWord => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, Width::Bits16)?;
                vec![Operand::Register(gpr(modrm.reg, width)?), rm]
            }
            Encoding::OpReg => vec![Operand::Register(gpr(ctx.opcode, width)?)],
            Encoding::OpRegImm => {
                let reg = Operand::Register(gpr(ctx.opcode, width)?);
                vec![reg, ctx.immediate(width)?]
            }
            Encoding::AccOpReg => vec![
                ctx.accumulator(width)?,
                Operand::Register(gpr(ctx.opcode, width)?),
            ],
            Encoding::FixedReg(reg) => vec![Operand::Register(reg)],
            Encoding::Rel8 => {
                let disp = i32::from(ctx.parser.read_le::<i8>()?);
                vec![ctx.relative(disp, false)]
            }
            Encoding::Rel => {
                if width == Width::Bits16 {
                    let disp = i32::from(ctx.parser.read_le::<i16>()?);
                    vec![ctx.relative(disp, true)]
                } else {
                    let disp = ctx.parser.read_le::<i32>()?;
                    vec![ctx.relative(disp, false)]
                }
            }
            Encoding::Imm8 => vec![ctx.immediate_u8()?],
            Encoding::Imm16 => {
                let value = ctx.parser.read_le::<u16>()?;
                vec![Operand::imm(i64::from(value), Width::Bits16)]
            }
            Encoding::Imm => vec![ctx.immediate(width)?],
            Encoding::Imm8Ext => vec![ctx.immediate_ext8(width)?],
            Encoding::Imm16Imm8 => {
                let frame = ctx.parser.read_le::<u16>()?;
                let level = ctx.immediate_u8()?;
                vec![Operand::imm(i64::from(frame), Width::Bits16), level]
            }
            Encoding::AccMoffs => {
                let acc = ctx.accumulator(width)?;
                vec![acc, ctx.moffs(width)?]
            }
            Encoding::MoffsAcc => {
                let moffs = ctx.moffs(width)?;
                vec![moffs, ctx.accumulator(width)?]
            }
            Encoding::RmSreg => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, Width::Bits16)?;
                vec![rm, ctx.segment_register(modrm)?]
            }
            Encoding::SregRm => {
                let modrm = ctx.modrm()?;
                let rm = ctx.rm(modrm, Width::Bits16)?;
                vec![ctx.segment_register(modrm)?, rm]
            }
            Encoding::FarPtr => {
                let offset = if width == Width::Bits16 {
                    u32::from(ctx.parser.read_le::<u16>()?)
                } else {
                    ctx.parser.read_le::<u32>()?
                };
                let segment = ctx.parser.read_le::<u16>()?;
                vec![Operand::FarPointer { segment, offset }]
            }
            Encoding::AccImm8 => vec![ctx.accumulator(width)?, ctx.immediate_u8()?],
            Encoding::Imm8Acc => {
                let port = ctx.immediate_u8()?;
                vec![port, ctx.accumulator(width)?]
            }
            Encoding::AccDx => vec![ctx.accumulator(width)?, Operand::Register(Register::Dx)],
            Encoding::DxAcc => vec![Operand::Register(Register::Dx), ctx.accumulator(width)?],
            Encoding::StrMovs => vec![ctx.string_destination(width), ctx.string_source(width)],
            Encoding::StrCmps => vec![ctx.string_source(width), ctx.string_destination(width)],
            Encoding::StrStos => vec![ctx.string_destination(width), ctx.accumulator(width)?],
            Encoding::StrLods => vec![ctx.accumulator(width)?, ctx.string_source(width)],
            Encoding::StrScas => vec![ctx.accumulator(width)?, ctx.string_destination(width)],
            Encoding::St0Sti => {
                let modrm = ctx.modrm()?;
                vec![Operand::FpuRegister(0), Operand::FpuRegister(modrm.rm)]
            }
            Encoding::StiSt0 => {
                let modrm = ctx.modrm()?;
                vec![Operand::FpuRegister(modrm.rm), Operand::FpuRegister(0)]
            }
            Encoding::Sti => {
                let modrm = ctx.modrm()?;
                vec![Operand::FpuRegister(modrm.rm)]
            }
            Encoding::ModRmOnly => {
                ctx.modrm()?;
                Vec::new()
            }
            Encoding::FpuAx => {
                ctx.modrm()?;
                vec![Operand::Register(Register::Ax)]
            }
        };

        Ok(operands)
    }
}

/// Decoder state handed to an [`OpcodeHandler`] while it reads its operands.
pub struct DecodeContext<'p, 'a> {
    /// Cursor positioned directly after the opcode byte(s)
    pub parser: &'p mut Parser<'a>,
    /// The prefixes in front of the opcode
    pub prefixes: Prefixes,
    /// Address of the first byte of the instruction
    pub address: u32,
    /// Buffer offset of the first byte of the instruction
    pub start: usize,
    /// The (last) opcode byte
    pub opcode: u8,
}

impl DecodeContext<'_, '_> {
    /// Number of bytes consumed since the start of the instruction.
    #[must_use]
    pub fn consumed(&self) -> usize {
        self.parser.pos().saturating_sub(self.start)
    }

    /// Address of the byte following everything consumed so far.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn next_address(&self) -> u32 {
        self.address.wrapping_add(self.consumed() as u32)
    }

    fn modrm(&mut self) -> Result<ModRm> {
        Ok(ModRm::parse(self.parser.read_le::<u8>()?))
    }

    fn rm(&mut self, modrm: ModRm, width: Width) -> Result<Operand> {
        decode_rm(self.parser, modrm, width, self.prefixes.address_16())
    }

    fn accumulator(&self, width: Width) -> Result<Operand> {
        Ok(Operand::Register(gpr(0, width)?))
    }

    fn immediate(&mut self, width: Width) -> Result<Operand> {
        let value = match width {
            Width::Bits8 => i64::from(self.parser.read_le::<i8>()?),
            Width::Bits16 => i64::from(self.parser.read_le::<i16>()?),
            _ => i64::from(self.parser.read_le::<i32>()?),
        };
        Ok(Operand::imm(value, width))
    }

    fn immediate_ext8(&mut self, width: Width) -> Result<Operand> {
        let value = i64::from(self.parser.read_le::<i8>()?);
        Ok(Operand::imm(value, width))
    }

    fn immediate_u8(&mut self) -> Result<Operand> {
        let value = i64::from(self.parser.read_le::<u8>()?);
        Ok(Operand::imm(value, Width::Bits8))
    }

    #[allow(clippy::cast_sign_loss)]
    fn relative(&self, disp: i32, wrap_16: bool) -> Operand {
        let target = self.next_address().wrapping_add(disp as u32);
        let target = if wrap_16 { target & 0xFFFF } else { target };
        Operand::RelativeOffset { target }
    }

    fn moffs(&mut self, width: Width) -> Result<Operand> {
        let address = if self.prefixes.address_16() {
            u32::from(self.parser.read_le::<u16>()?)
        } else {
            self.parser.read_le::<u32>()?
        };
        Ok(Operand::DirectMemory {
            address,
            width,
            segment: None,
        })
    }

    fn segment_register(&self, modrm: ModRm) -> Result<Operand> {
        Register::segment(modrm.reg)
            .map(Operand::Register)
            .ok_or_else(|| malformed_error!("Invalid segment register {}", modrm.reg))
    }

    fn string_index(&self, si: bool) -> Register {
        match (si, self.prefixes.address_16()) {
            (true, false) => Register::Esi,
            (true, true) => Register::Si,
            (false, false) => Register::Edi,
            (false, true) => Register::Di,
        }
    }

    fn string_source(&self, width: Width) -> Operand {
        Operand::BaseRegisterMemory {
            base: self.string_index(true),
            width,
            segment: None,
        }
    }

    // The destination of string instructions is always es:[edi], overrides do not apply.
    fn string_destination(&self, width: Width) -> Operand {
        Operand::BaseRegisterMemory {
            base: self.string_index(false),
            width,
            segment: Some(Register::Es),
        }
    }
}

/// Outcome of a registry query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The first matching handler
    Found(&'static OpcodeHandler),
    /// Every candidate needs the byte after the opcode, but the buffer ended
    NeedsMoreBytes,
    /// No handler accepts this opcode
    NotFound,
}

/// The opcode tables, bucketed by opcode byte for fast lookup.
///
/// Bucketing keeps the table order, so the first match inside a bucket is the first
/// match in the table.
pub struct Registry {
    primary: Vec<Vec<&'static OpcodeHandler>>,
    extended: Vec<Vec<&'static OpcodeHandler>>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn bucket(tables: &[&'static [OpcodeHandler]]) -> Vec<Vec<&'static OpcodeHandler>> {
    let mut buckets: Vec<Vec<&'static OpcodeHandler>> = vec![Vec::new(); 256];
    for &table in tables {
        for handler in table {
            for opcode in handler.opcode..=handler.opcode_last {
                buckets[usize::from(opcode)].push(handler);
            }
        }
    }
    buckets
}

impl Registry {
    /// Returns the process-wide registry, building the buckets on first use.
    pub fn global() -> &'static Registry {
        REGISTRY.get_or_init(|| Registry {
            primary: bucket(&[primary::HANDLERS, fpu::HANDLERS]),
            extended: bucket(&[extended::HANDLERS]),
        })
    }

    /// Returns all handlers registered for an opcode, in priority order.
    #[must_use]
    pub fn candidates(&self, map: OpcodeMap, opcode: u8) -> &[&'static OpcodeHandler] {
        let buckets = match map {
            OpcodeMap::Primary => &self.primary,
            OpcodeMap::Extended => &self.extended,
        };
        &buckets[usize::from(opcode)]
    }

    /// Finds the first handler accepting `opcode` given the peeked next byte.
    #[must_use]
    pub fn lookup(
        &self,
        map: OpcodeMap,
        opcode: u8,
        next: Option<u8>,
        prefixes: &Prefixes,
    ) -> Lookup {
        let candidates = self.candidates(map, opcode);

        if let Some(handler) = candidates
            .iter()
            .find(|handler| handler.matches(opcode, next, prefixes))
        {
            return Lookup::Found(handler);
        }

        if next.is_none() && candidates.iter().any(|handler| handler.needs_modrm()) {
            Lookup::NeedsMoreBytes
        } else {
            Lookup::NotFound
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(map: OpcodeMap, opcode: u8, next: Option<u8>) -> Option<&'static OpcodeHandler> {
        match Registry::global().lookup(map, opcode, next, &Prefixes::default()) {
            Lookup::Found(handler) => Some(handler),
            _ => None,
        }
    }

    #[test]
    fn group_opcodes_dispatch_on_reg_field() {
        let sub = find(OpcodeMap::Primary, 0x83, Some(0b11_101_000)).unwrap();
        assert_eq!(sub.mnemonic, Mnemonic::Sub);
        let cmp = find(OpcodeMap::Primary, 0x83, Some(0b11_111_000)).unwrap();
        assert_eq!(cmp.mnemonic, Mnemonic::Cmp);
    }

    #[test]
    fn priority_order_is_respected() {
        let nop = find(OpcodeMap::Primary, 0x90, None).unwrap();
        assert_eq!(nop.mnemonic, Mnemonic::Nop);
        let xchg = find(OpcodeMap::Primary, 0x91, None).unwrap();
        assert_eq!(xchg.mnemonic, Mnemonic::Xchg);
    }

    #[test]
    fn operand_size_selects_handler() {
        let mut prefixes = Prefixes::default();
        let registry = Registry::global();

        let Lookup::Found(cwde) = registry.lookup(OpcodeMap::Primary, 0x98, None, &prefixes)
        else {
            panic!("98 not found");
        };
        assert_eq!(cwde.mnemonic, Mnemonic::Cwde);

        prefixes.apply(0x66);
        let Lookup::Found(cbw) = registry.lookup(OpcodeMap::Primary, 0x98, None, &prefixes)
        else {
            panic!("66 98 not found");
        };
        assert_eq!(cbw.mnemonic, Mnemonic::Cbw);
    }

    #[test]
    fn missing_modrm_is_reported() {
        let result = Registry::global().lookup(OpcodeMap::Primary, 0xFF, None, &Prefixes::default());
        assert_eq!(result, Lookup::NeedsMoreBytes);
    }

    #[test]
    fn unassigned_opcode() {
        // FF /7 is not an instruction
        assert!(find(OpcodeMap::Primary, 0xFF, Some(0b11_111_000)).is_none());
        // 0F 04 is not an instruction either
        assert!(find(OpcodeMap::Extended, 0x04, Some(0xC0)).is_none());
    }

    #[test]
    fn condition_ranges() {
        let jcc = find(OpcodeMap::Primary, 0x74, None).unwrap();
        assert_eq!(jcc.mnemonic_for(0x74), Mnemonic::Jcc(Condition::E));
        assert_eq!(jcc.mnemonic_for(0x7F), Mnemonic::Jcc(Condition::G));

        let setcc = find(OpcodeMap::Extended, 0x95, Some(0xC0)).unwrap();
        assert_eq!(setcc.mnemonic_for(0x95), Mnemonic::Set(Condition::Ne));
    }

    #[test]
    fn fpu_escapes_use_modrm() {
        let fld1 = find(OpcodeMap::Primary, 0xD9, Some(0xE8)).unwrap();
        assert_eq!(fld1.mnemonic, Mnemonic::Fld1);
        let fld = find(OpcodeMap::Primary, 0xD9, Some(0x45)).unwrap();
        assert_eq!(fld.mnemonic, Mnemonic::Fld);
        assert_eq!(fld.width.resolve(&Prefixes::default()), Width::Bits32);
    }
}
