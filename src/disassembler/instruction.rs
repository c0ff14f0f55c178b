//! Decoded instruction model.
//!
//! # Key Types
//! - [`Mnemonic`] - Closed enumeration of every instruction the decoder can produce
//! - [`Condition`] - The sixteen x86 condition codes shared by `Jcc`, `SETcc` and `CMOVcc`
//! - [`FlowType`] - How an instruction affects control flow
//! - [`Instruction`] - A fully decoded instruction with its address, operands and length

use std::fmt;

use strum::{Display, EnumIter, IntoStaticStr};

use crate::disassembler::{operand::Operand, prefix::Prefixes};

/// Condition codes, in the order of their 4-bit encoding (`0x70 + cc`, `0x0F 0x80 + cc`).
///
/// | Condition | Flags Checked | Meaning |
/// |-----------|---------------|---------|
/// | `O`/`No` | OF | Overflow |
/// | `B`/`Ae` | CF | Unsigned below / above-or-equal |
/// | `E`/`Ne` | ZF | Equal |
/// | `Be`/`A` | CF, ZF | Unsigned below-or-equal / above |
/// | `S`/`Ns` | SF | Sign |
/// | `P`/`Np` | PF | Parity |
/// | `L`/`Ge` | SF, OF | Signed less / greater-or-equal |
/// | `Le`/`G` | ZF, SF, OF | Signed less-or-equal / greater |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Condition {
    /// Overflow (OF=1)
    O,
    /// Not overflow (OF=0)
    No,
    /// Below (CF=1)
    B,
    /// Above or equal (CF=0)
    Ae,
    /// Equal (ZF=1)
    E,
    /// Not equal (ZF=0)
    Ne,
    /// Below or equal (CF=1 or ZF=1)
    Be,
    /// Above (CF=0 and ZF=0)
    A,
    /// Sign (SF=1)
    S,
    /// Not sign (SF=0)
    Ns,
    /// Parity even (PF=1)
    P,
    /// Parity odd (PF=0)
    Np,
    /// Less than (SF!=OF)
    L,
    /// Greater than or equal (SF=OF)
    Ge,
    /// Less than or equal (ZF=1 or SF!=OF)
    Le,
    /// Greater than (ZF=0 and SF=OF)
    G,
}

const CONDITIONS: [Condition; 16] = [
    Condition::O,
    Condition::No,
    Condition::B,
    Condition::Ae,
    Condition::E,
    Condition::Ne,
    Condition::Be,
    Condition::A,
    Condition::S,
    Condition::Ns,
    Condition::P,
    Condition::Np,
    Condition::L,
    Condition::Ge,
    Condition::Le,
    Condition::G,
];

impl Condition {
    /// Returns the condition encoded in the low nibble of `code`.
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        CONDITIONS[usize::from(code & 0x0F)]
    }

    /// Returns the 4-bit encoding of this condition.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns the negation of this condition.
    ///
    /// Negation flips the lowest encoding bit.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::from_code(self.code() ^ 1)
    }
}

/// How an instruction affects control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowType {
    /// Execution continues with the next instruction
    Sequential,
    /// Either the target or the next instruction (`jcc`, `loop`, `jecxz`)
    ConditionalBranch,
    /// Execution continues at the target only (`jmp`)
    UnconditionalBranch,
    /// Control returns to the next instruction after the callee (`call`)
    Call,
    /// Leaves the function (`ret`, `retf`, `iret`)
    Return,
    /// Software interrupt (`int`, `int3`, `into`)
    Interrupt,
}

/// Every instruction kind the decoder can produce.
///
/// Condition-carrying instructions are single variants parameterised by [`Condition`].
/// Repeated string instructions are separate variants, because the REP prefix changes
/// what the instruction does rather than how it is encoded.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Mnemonic {
    // Arithmetic
    Add,
    Adc,
    Sub,
    Sbb,
    Cmp,
    Inc,
    Dec,
    Neg,
    Mul,
    Imul,
    Div,
    Idiv,

    // Logic
    And,
    Or,
    Xor,
    Not,
    Test,

    // Shifts and rotates
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shld,
    Shrd,

    // Bit manipulation
    Bt,
    Bts,
    Btr,
    Btc,
    Bsf,
    Bsr,
    Bswap,

    // Data movement
    Mov,
    Movzx,
    Movsx,
    Lea,
    Xchg,
    Xadd,
    Cmpxchg,
    Push,
    Pop,
    Pushad,
    Popad,
    Pushfd,
    Popfd,
    Cbw,
    Cwde,
    Cwd,
    Cdq,
    Lahf,
    Sahf,
    Xlat,
    Lds,
    Les,
    Lfs,
    Lgs,
    Lss,

    // Condition code users
    Jcc(Condition),
    Set(Condition),
    Cmov(Condition),

    // Control flow
    Jmp,
    Call,
    Ret,
    Retf,
    Iret,
    Loop,
    Loope,
    Loopne,
    Jecxz,
    Int,
    Int3,
    Into,
    Enter,
    Leave,
    Hlt,

    // String operations
    Movs,
    Cmps,
    Stos,
    Lods,
    Scas,
    #[strum(serialize = "rep movs")]
    RepMovs,
    #[strum(serialize = "rep stos")]
    RepStos,
    #[strum(serialize = "rep lods")]
    RepLods,
    #[strum(serialize = "repe cmps")]
    RepeCmps,
    #[strum(serialize = "repne cmps")]
    RepneCmps,
    #[strum(serialize = "repe scas")]
    RepeScas,
    #[strum(serialize = "repne scas")]
    RepneScas,

    // Flag manipulation
    Clc,
    Stc,
    Cmc,
    Cld,
    Std,
    Cli,
    Sti,

    // Miscellaneous
    Nop,
    Wait,
    Cpuid,
    Rdtsc,
    Ud2,
    Daa,
    Das,
    Aaa,
    Aas,
    Aam,
    Aad,
    In,
    Out,

    // x87 loads and stores
    Fld,
    Fild,
    Fbld,
    Fst,
    Fstp,
    Fist,
    Fistp,
    Fisttp,
    Fbstp,
    Fxch,
    Fcmov(Condition),

    // x87 arithmetic
    Fadd,
    Faddp,
    Fiadd,
    Fsub,
    Fsubp,
    Fisub,
    Fsubr,
    Fsubrp,
    Fisubr,
    Fmul,
    Fmulp,
    Fimul,
    Fdiv,
    Fdivp,
    Fidiv,
    Fdivr,
    Fdivrp,
    Fidivr,

    // x87 comparison
    Fcom,
    Fcomp,
    Fcompp,
    Ficom,
    Ficomp,
    Fucom,
    Fucomp,
    Fucompp,
    Fcomi,
    Fcomip,
    Fucomi,
    Fucomip,
    Ftst,
    Fxam,

    // x87 constants and functions
    Fld1,
    Fldl2t,
    Fldl2e,
    Fldpi,
    Fldlg2,
    Fldln2,
    Fldz,
    Fchs,
    Fabs,
    F2xm1,
    Fyl2x,
    Fptan,
    Fpatan,
    Fxtract,
    Fprem1,
    Fdecstp,
    Fincstp,
    Fprem,
    Fyl2xp1,
    Fsqrt,
    Fsincos,
    Frndint,
    Fscale,
    Fsin,
    Fcos,

    // x87 control
    Fnop,
    Ffree,
    Fldcw,
    Fnstcw,
    Fnstsw,
    Fnclex,
    Fninit,

    /// Placeholder for bytes that did not decode to a known instruction
    Unknown,
}

impl Mnemonic {
    /// Returns the flow classification of this instruction kind.
    #[must_use]
    pub const fn flow_type(self) -> FlowType {
        match self {
            Mnemonic::Jcc(_)
            | Mnemonic::Loop
            | Mnemonic::Loope
            | Mnemonic::Loopne
            | Mnemonic::Jecxz => FlowType::ConditionalBranch,
            Mnemonic::Jmp => FlowType::UnconditionalBranch,
            Mnemonic::Call => FlowType::Call,
            Mnemonic::Ret | Mnemonic::Retf | Mnemonic::Iret => FlowType::Return,
            Mnemonic::Int | Mnemonic::Int3 | Mnemonic::Into => FlowType::Interrupt,
            _ => FlowType::Sequential,
        }
    }

    /// Returns the condition code of `jcc`, `setcc`, `cmovcc` and `fcmovcc`.
    #[must_use]
    pub const fn condition(self) -> Option<Condition> {
        match self {
            Mnemonic::Jcc(cond)
            | Mnemonic::Set(cond)
            | Mnemonic::Cmov(cond)
            | Mnemonic::Fcmov(cond) => Some(cond),
            _ => None,
        }
    }

    /// Returns true for the (possibly repeated) string instructions.
    #[must_use]
    pub const fn is_string(self) -> bool {
        matches!(
            self,
            Mnemonic::Movs
                | Mnemonic::Cmps
                | Mnemonic::Stos
                | Mnemonic::Lods
                | Mnemonic::Scas
                | Mnemonic::RepMovs
                | Mnemonic::RepStos
                | Mnemonic::RepLods
                | Mnemonic::RepeCmps
                | Mnemonic::RepneCmps
                | Mnemonic::RepeScas
                | Mnemonic::RepneScas
        )
    }

    /// Returns true for instructions that belong to the x87 instruction set.
    #[must_use]
    pub fn is_fpu(self) -> bool {
        let name: &'static str = self.into();
        name.starts_with('f')
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mnemonic::Jcc(cond) => write!(f, "j{cond}"),
            Mnemonic::Set(cond) => write!(f, "set{cond}"),
            Mnemonic::Cmov(cond) => write!(f, "cmov{cond}"),
            Mnemonic::Fcmov(cond) => {
                let suffix = match cond {
                    Condition::Ae => "nb",
                    Condition::Ne => "ne",
                    Condition::A => "nbe",
                    Condition::P => "u",
                    Condition::Np => "nu",
                    other => return write!(f, "fcmov{other}"),
                };
                write!(f, "fcmov{suffix}")
            }
            other => {
                let name: &'static str = (*other).into();
                f.write_str(name)
            }
        }
    }
}

/// A single decoded x86 instruction.
///
/// Instructions are created once by the decoder and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Absolute address of the first byte (including prefixes)
    pub address: u32,
    /// The instruction kind
    pub mnemonic: Mnemonic,
    /// Operands in Intel order (destination first)
    pub operands: Vec<Operand>,
    /// Encoded length in bytes, including prefixes
    pub size: u8,
    /// The prefixes that preceded the opcode
    pub prefixes: Prefixes,
}

impl Instruction {
    /// The synthetic one byte instruction used in place of undecodable bytes.
    #[must_use]
    pub fn unknown(address: u32) -> Self {
        Instruction {
            address,
            mnemonic: Mnemonic::Unknown,
            operands: Vec::new(),
            size: 1,
            prefixes: Prefixes::default(),
        }
    }

    /// Address of the byte following this instruction.
    #[must_use]
    pub fn end(&self) -> u32 {
        self.address.wrapping_add(u32::from(self.size))
    }

    /// Returns true if `address` lies within the bytes of this instruction.
    #[must_use]
    pub fn contains(&self, address: u32) -> bool {
        address.wrapping_sub(self.address) < u32::from(self.size)
    }

    /// Returns the flow classification of this instruction.
    #[must_use]
    pub fn flow_type(&self) -> FlowType {
        self.mnemonic.flow_type()
    }

    /// Returns true if this instruction ends a basic block.
    ///
    /// Jumps, conditional jumps and returns end a block, and so do `hlt` and `ud2` because
    /// execution never reaches the following byte. Calls do not.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Return
        ) || matches!(self.mnemonic, Mnemonic::Hlt | Mnemonic::Ud2)
    }

    /// Returns the statically known target of a branch or call.
    ///
    /// Only relative-offset operands produce a target. Register, memory and far pointer
    /// operands return `None`; the target is then only known at runtime.
    #[must_use]
    pub fn branch_target(&self) -> Option<u32> {
        if !matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Call
        ) {
            return None;
        }

        match self.operands.first() {
            Some(Operand::RelativeOffset { target }) => Some(*target),
            _ => None,
        }
    }

    /// Returns true for a jump whose target is computed at runtime.
    #[must_use]
    pub fn is_indirect_jump(&self) -> bool {
        matches!(
            self.flow_type(),
            FlowType::ConditionalBranch | FlowType::UnconditionalBranch
        ) && self.branch_target().is_none()
    }

    /// Returns the condition code of a condition consuming instruction.
    #[must_use]
    pub fn condition(&self) -> Option<Condition> {
        self.mnemonic.condition()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefixes.lock() {
            f.write_str("lock ")?;
        }
        write!(f, "{}", self.mnemonic)?;
        for (index, operand) in self.operands.iter().enumerate() {
            let separator = if index == 0 { " " } else { ", " };
            write!(f, "{separator}{operand}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disassembler::register::{Register, Width};
    use strum::IntoEnumIterator;

    #[test]
    fn condition_encoding_round_trips() {
        for (code, cond) in Condition::iter().enumerate() {
            assert_eq!(usize::from(cond.code()), code);
            assert_eq!(Condition::from_code(cond.code()), cond);
        }
    }

    #[test]
    fn condition_negation() {
        assert_eq!(Condition::E.negate(), Condition::Ne);
        assert_eq!(Condition::L.negate(), Condition::Ge);
        assert_eq!(Condition::Be.negate(), Condition::A);
        assert_eq!(Condition::P.negate(), Condition::Np);
        for cond in Condition::iter() {
            assert_eq!(cond.negate().negate(), cond);
        }
    }

    #[test]
    fn mnemonic_display() {
        assert_eq!(Mnemonic::Add.to_string(), "add");
        assert_eq!(Mnemonic::Jcc(Condition::E).to_string(), "je");
        assert_eq!(Mnemonic::Set(Condition::Ge).to_string(), "setge");
        assert_eq!(Mnemonic::Cmov(Condition::A).to_string(), "cmova");
        assert_eq!(Mnemonic::RepneScas.to_string(), "repne scas");
        assert_eq!(Mnemonic::Fcmov(Condition::P).to_string(), "fcmovu");
        assert_eq!(Mnemonic::F2xm1.to_string(), "f2xm1");
    }

    #[test]
    fn flow_classification() {
        assert_eq!(
            Mnemonic::Jcc(Condition::Ne).flow_type(),
            FlowType::ConditionalBranch
        );
        assert_eq!(Mnemonic::Loope.flow_type(), FlowType::ConditionalBranch);
        assert_eq!(Mnemonic::Jmp.flow_type(), FlowType::UnconditionalBranch);
        assert_eq!(Mnemonic::Call.flow_type(), FlowType::Call);
        assert_eq!(Mnemonic::Retf.flow_type(), FlowType::Return);
        assert_eq!(Mnemonic::Int3.flow_type(), FlowType::Interrupt);
        assert_eq!(Mnemonic::Mov.flow_type(), FlowType::Sequential);
        assert!(Mnemonic::Fsqrt.is_fpu());
        assert!(!Mnemonic::Mov.is_fpu());
    }

    #[test]
    fn branch_targets() {
        let jump = Instruction {
            address: 0x1000,
            mnemonic: Mnemonic::Jmp,
            operands: vec![Operand::RelativeOffset { target: 0x1010 }],
            size: 2,
            prefixes: Prefixes::default(),
        };
        assert_eq!(jump.branch_target(), Some(0x1010));
        assert!(jump.is_terminator());
        assert!(!jump.is_indirect_jump());
        assert_eq!(jump.end(), 0x1002);
        assert!(jump.contains(0x1001));
        assert!(!jump.contains(0x1002));

        let indirect = Instruction {
            address: 0x1000,
            mnemonic: Mnemonic::Jmp,
            operands: vec![Operand::Register(Register::Eax)],
            size: 2,
            prefixes: Prefixes::default(),
        };
        assert_eq!(indirect.branch_target(), None);
        assert!(indirect.is_indirect_jump());

        let call = Instruction {
            address: 0x1000,
            mnemonic: Mnemonic::Call,
            operands: vec![Operand::RelativeOffset { target: 0x2000 }],
            size: 5,
            prefixes: Prefixes::default(),
        };
        assert_eq!(call.branch_target(), Some(0x2000));
        assert!(!call.is_terminator());
    }

    #[test]
    fn instruction_display() {
        let instr = Instruction {
            address: 0,
            mnemonic: Mnemonic::Mov,
            operands: vec![
                Operand::Register(Register::Eax),
                Operand::imm(5, Width::Bits32),
            ],
            size: 5,
            prefixes: Prefixes::default(),
        };
        assert_eq!(instr.to_string(), "mov eax, 5");
        assert_eq!(Instruction::unknown(0).to_string(), "unknown");
    }
}
