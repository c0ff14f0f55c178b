//! Lifted IR instructions.

use std::fmt;

use crate::{
    analysis::ir::{
        expr::{BinaryOp, ExprArena, ExprId, UnaryOp},
        flags::{Flag, FlagProducer, FlagSet, Reconstruction},
    },
    disassembler::Mnemonic,
};

/// Shape of a lifted instruction.
///
/// The operand layout of [`IrInstruction::operands`] depends on the kind:
///
/// | Kind | `result` | `value` | `operands` |
/// |------|----------|---------|------------|
/// | `Assign`, `Binary`, `Unary` | destination | computed value | source operands |
/// | `Compare`, `Test` | - | - | `[left, right]` |
/// | `Exchange` | - | - | `[a, b]` |
/// | `Push` | - | - | `[source]` |
/// | `Pop` | destination | - | - |
/// | `Call`, `Jump` | - | - | `[target]` |
/// | `Loop` | counter | decremented counter | - |
/// | `Select` | destination | source | `[source]` |
/// | `Interrupt` | - | - | `[vector]` |
/// | `Intrinsic` | - | - | all decoded operands |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrKind {
    /// `result := value`
    Assign,
    /// `result := left op right`
    Binary(BinaryOp),
    /// `result := op operand`
    Unary(UnaryOp),
    /// Subtraction for the flags only (`cmp`)
    Compare,
    /// Conjunction for the flags only (`test`)
    Test,
    /// Swap two locations
    Exchange,
    /// Push onto the stack
    Push,
    /// Pop from the stack into `result`
    Pop,
    /// Call, with the target address when it is static
    Call {
        /// Static target
        target: Option<u32>,
    },
    /// Return, releasing `pop` bytes of arguments
    Return {
        /// Immediate of `ret imm16`
        pop: u16,
    },
    /// Unconditional jump, with the target address when it is static
    Jump {
        /// Static target
        target: Option<u32>,
    },
    /// Conditional jump
    Branch {
        /// Boolean condition under which the jump is taken
        condition: ExprId,
        /// Jump target
        target: u32,
    },
    /// Decrement the counter, then jump while `condition` holds (`loop`, `loope`, `loopne`)
    Loop {
        /// Condition over the decremented counter
        condition: ExprId,
        /// Jump target
        target: u32,
    },
    /// `result := value` when `condition` holds (`cmovcc`)
    Select {
        /// The move condition
        condition: ExprId,
    },
    /// Software interrupt
    Interrupt,
    /// Stop execution
    Halt,
    /// No effect
    Nop,
    /// Semantics not modeled in the IR; the mnemonic and operands are kept verbatim
    Intrinsic(Mnemonic),
    /// Bytes that did not decode
    Unknown,
}

/// One lifted instruction.
///
/// Instructions that write flags record the set in [`IrInstruction::flags`] and, when the
/// computation is modeled, a [`FlagProducer`] from which consumers reconstruct conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrInstruction {
    /// Address of the source instruction
    pub address: u32,
    /// The instruction shape
    pub kind: IrKind,
    /// Location written by the instruction
    pub result: Option<ExprId>,
    /// Value stored into `result`
    pub value: Option<ExprId>,
    /// Operand expressions, see [`IrKind`] for the layout
    pub operands: Vec<ExprId>,
    /// Flags written by the instruction
    pub flags: FlagSet,
    /// What the flags were computed from
    pub producer: Option<FlagProducer>,
}

impl IrInstruction {
    /// Creates an instruction of `kind` without result, operands or flag effects.
    #[must_use]
    pub fn new(address: u32, kind: IrKind) -> Self {
        IrInstruction {
            address,
            kind,
            result: None,
            value: None,
            operands: Vec::new(),
            flags: FlagSet::empty(),
            producer: None,
        }
    }

    /// Returns true if the instruction writes any flag.
    #[must_use]
    pub fn writes_flags(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Reconstructs the condition under which `flag` equals `expected` after this
    /// instruction.
    ///
    /// Returns [`Reconstruction::Unsupported`] if this instruction does not write `flag`
    /// or writes it in a way that has no algebraic form.
    pub fn flag_condition(
        &self,
        arena: &mut ExprArena,
        flag: Flag,
        expected: bool,
    ) -> Reconstruction {
        if !self.flags.contains(flag.set()) {
            return Reconstruction::Unsupported;
        }

        match &self.producer {
            Some(producer) => producer.reconstruct(arena, flag, expected),
            None => Reconstruction::Unsupported,
        }
    }

    /// Returns a value implementing [`fmt::Display`] for this instruction.
    #[must_use]
    pub fn display<'a>(&'a self, arena: &'a ExprArena) -> IrDisplay<'a> {
        IrDisplay {
            instruction: self,
            arena,
        }
    }
}

/// Textual form of an [`IrInstruction`], see [`IrInstruction::display`].
pub struct IrDisplay<'a> {
    instruction: &'a IrInstruction,
    arena: &'a ExprArena,
}

impl IrDisplay<'_> {
    fn expr(&self, id: ExprId) -> impl fmt::Display + '_ {
        self.arena.display(id)
    }

    fn write_operands(&self, f: &mut fmt::Formatter<'_>, separator: &str) -> fmt::Result {
        for (index, &operand) in self.instruction.operands.iter().enumerate() {
            let separator = if index == 0 { "" } else { separator };
            write!(f, "{separator}{}", self.expr(operand))?;
        }
        Ok(())
    }

    fn write_assignment(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.instruction.result, self.instruction.value) {
            (Some(result), Some(value)) => {
                write!(f, "{} := {}", self.expr(result), self.expr(value))
            }
            (Some(result), None) => write!(f, "{} := ?", self.expr(result)),
            _ => f.write_str("?"),
        }
    }
}

impl fmt::Display for IrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let instruction = self.instruction;
        match instruction.kind {
            IrKind::Assign | IrKind::Binary(_) | IrKind::Unary(_) => self.write_assignment(f),
            IrKind::Compare => {
                f.write_str("cmp ")?;
                self.write_operands(f, ", ")
            }
            IrKind::Test => {
                f.write_str("test ")?;
                self.write_operands(f, ", ")
            }
            IrKind::Exchange => self.write_operands(f, " <-> "),
            IrKind::Push => {
                f.write_str("push ")?;
                self.write_operands(f, ", ")
            }
            IrKind::Pop => match instruction.result {
                Some(result) => write!(f, "{} := pop", self.expr(result)),
                None => f.write_str("pop"),
            },
            IrKind::Call { .. } => {
                f.write_str("call ")?;
                self.write_operands(f, ", ")
            }
            IrKind::Return { .. } => f.write_str("return"),
            IrKind::Jump { .. } => {
                f.write_str("goto ")?;
                self.write_operands(f, ", ")
            }
            IrKind::Branch { condition, target } => {
                write!(f, "if ({}) goto 0x{target:x}", self.expr(condition))
            }
            IrKind::Loop { condition, target } => {
                self.write_assignment(f)?;
                write!(f, "; if ({}) goto 0x{target:x}", self.expr(condition))
            }
            IrKind::Select { condition } => {
                self.write_assignment(f)?;
                write!(f, " if ({})", self.expr(condition))
            }
            IrKind::Interrupt => {
                f.write_str("interrupt ")?;
                self.write_operands(f, ", ")
            }
            IrKind::Halt => f.write_str("halt"),
            IrKind::Nop => f.write_str("nop"),
            IrKind::Intrinsic(mnemonic) => {
                write!(f, "{mnemonic}")?;
                if !instruction.operands.is_empty() {
                    f.write_str(" ")?;
                    self.write_operands(f, ", ")?;
                }
                Ok(())
            }
            IrKind::Unknown => f.write_str("unknown"),
        }
    }
}
