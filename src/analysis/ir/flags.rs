//! x86 flag modeling and condition reconstruction.
//!
//! Instead of simulating flag bits, every flag-producing IR instruction carries a
//! [`FlagProducer`] describing *what* it computed. A consumer (conditional jump, `setcc`,
//! `cmovcc`, `adc`, `loope`) asks the producer to rebuild the boolean expression behind a
//! flag or a whole condition code:
//!
//! - `cmp a, b` + `jz`  → `a == b`
//! - `cmp a, b` + `jb`  → `a <u b`
//! - `cmp a, b` + `jl`  → `a < b`
//! - `test a, a` + `jz` → `a == 0`
//!
//! A producer only refers to values that still hold after the producing instruction. For
//! `cmp`, `test` and `bt`, which write nothing, those are the operands. For `sub`, `add`,
//! `and`, `inc`, `dec`, `neg` and shifts it is the written result, so `sub eax, 5` followed
//! by `jz` reconstructs to `eax == 0`. Flags that would need the overwritten input (CF and
//! OF after `sub`) have no reconstruction.
//!
//! When no algebraic form exists (overflow after `add`, parity, auxiliary carry, anything
//! after `mul`) the answer is [`Reconstruction::Unsupported`] and the consumer falls back to
//! an opaque [`Expr::Flag`](super::Expr::Flag) reference.
//!
//! # Flag Dependencies
//!
//! | Condition | Flags | Meaning |
//! |-----------|-------|---------|
//! | E/NE | ZF | Equal / Not equal |
//! | B/AE | CF | Below / Above-or-equal (unsigned) |
//! | BE/A | CF or ZF | Below-or-equal / Above (unsigned) |
//! | L/GE | SF≠OF | Less / Greater-or-equal (signed) |
//! | LE/G | ZF or SF≠OF | Less-or-equal / Greater (signed) |
//! | S/NS | SF | Sign / Not sign |
//! | O/NO | OF | Overflow / Not overflow |
//! | P/NP | PF | Parity even / odd |

use std::fmt;

use bitflags::bitflags;
use strum::{EnumIter, IntoEnumIterator};

use crate::{
    analysis::ir::expr::{BinaryOp, CmpKind, ExprArena, ExprId},
    disassembler::{Condition, Width},
};

/// One of the six status flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter)]
pub enum Flag {
    /// Carry flag
    Cf,
    /// Parity flag
    Pf,
    /// Auxiliary carry flag
    Af,
    /// Zero flag
    Zf,
    /// Sign flag
    Sf,
    /// Overflow flag
    Of,
}

impl Flag {
    /// The set containing only this flag.
    #[must_use]
    pub const fn set(self) -> FlagSet {
        match self {
            Flag::Cf => FlagSet::CF,
            Flag::Pf => FlagSet::PF,
            Flag::Af => FlagSet::AF,
            Flag::Zf => FlagSet::ZF,
            Flag::Sf => FlagSet::SF,
            Flag::Of => FlagSet::OF,
        }
    }

    /// Dense index, usable for per-flag tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flag::Cf => "CF",
            Flag::Pf => "PF",
            Flag::Af => "AF",
            Flag::Zf => "ZF",
            Flag::Sf => "SF",
            Flag::Of => "OF",
        };
        f.write_str(name)
    }
}

bitflags! {
    /// A set of status flags, used for the flags an instruction writes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FlagSet: u8 {
        /// Carry
        const CF = 0x01;
        /// Parity
        const PF = 0x02;
        /// Auxiliary carry
        const AF = 0x04;
        /// Zero
        const ZF = 0x08;
        /// Sign
        const SF = 0x10;
        /// Overflow
        const OF = 0x20;
        /// Every flag written by ordinary arithmetic
        const ARITHMETIC = Self::CF.bits() | Self::PF.bits() | Self::AF.bits()
            | Self::ZF.bits() | Self::SF.bits() | Self::OF.bits();
    }
}

impl FlagSet {
    /// Iterates over the individual flags in the set.
    pub fn flags(self) -> impl Iterator<Item = Flag> {
        Flag::iter().filter(move |flag| self.contains(flag.set()))
    }
}

/// The flags a condition code reads.
#[must_use]
pub fn condition_flags(condition: Condition) -> FlagSet {
    match condition {
        Condition::O | Condition::No => FlagSet::OF,
        Condition::B | Condition::Ae => FlagSet::CF,
        Condition::E | Condition::Ne => FlagSet::ZF,
        Condition::Be | Condition::A => FlagSet::CF | FlagSet::ZF,
        Condition::S | Condition::Ns => FlagSet::SF,
        Condition::P | Condition::Np => FlagSet::PF,
        Condition::L | Condition::Ge => FlagSet::SF | FlagSet::OF,
        Condition::Le | Condition::G => FlagSet::ZF | FlagSet::SF | FlagSet::OF,
    }
}

/// Result of asking a producer for a flag or condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconstruction {
    /// The boolean expression equivalent to the flag or condition
    Expr(ExprId),
    /// No algebraic form exists; use an opaque flag reference instead
    Unsupported,
}

impl Reconstruction {
    /// The expression, if one was reconstructed.
    #[must_use]
    pub fn expr(self) -> Option<ExprId> {
        match self {
            Reconstruction::Expr(id) => Some(id),
            Reconstruction::Unsupported => None,
        }
    }

    /// Returns true for [`Reconstruction::Unsupported`].
    #[must_use]
    pub fn is_unsupported(self) -> bool {
        self == Reconstruction::Unsupported
    }
}

/// What a flag-producing instruction computed, as far as its flags are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagProducer {
    /// `left - right` with the result discarded (`cmp`)
    Compare {
        /// Minuend
        left: ExprId,
        /// Subtrahend
        right: ExprId,
        /// Operand width
        width: Width,
    },
    /// `sub`; only ZF and SF can be derived from the difference alone
    Subtract {
        /// The written difference
        result: ExprId,
        /// Operand width
        width: Width,
    },
    /// `add`
    Add {
        /// The written sum
        result: ExprId,
        /// The source addend, if the addition did not overwrite it
        addend: Option<ExprId>,
        /// Operand width
        width: Width,
    },
    /// A bitwise result with CF and OF cleared (`test`, `and`, `or`, `xor`)
    ///
    /// `test a, a` stores `a` itself, so its conditions compare `a` directly against zero.
    Logic {
        /// The computed value
        value: ExprId,
        /// Operand width
        width: Width,
    },
    /// `inc` (CF unaffected)
    Increment {
        /// The incremented value
        result: ExprId,
        /// Operand width
        width: Width,
    },
    /// `dec` (CF unaffected)
    Decrement {
        /// The decremented value
        result: ExprId,
        /// Operand width
        width: Width,
    },
    /// `neg`
    Negate {
        /// The negated value
        result: ExprId,
        /// Operand width
        width: Width,
    },
    /// A shift by a non-zero constant count; only ZF and SF are modeled
    Shift {
        /// The shifted value
        value: ExprId,
        /// Operand width
        width: Width,
    },
    /// `bt base, bit`: CF is the selected bit
    BitTest {
        /// The value tested
        base: ExprId,
        /// Bit number
        bit: ExprId,
        /// Operand width
        width: Width,
    },
    /// `clc` / `stc`
    Carry(bool),
    /// Writes flags in a way that is not modeled
    Opaque,
}

impl FlagProducer {
    /// The expressions a reconstruction may refer to.
    ///
    /// Once a later instruction overwrites anything these read, the producer no longer
    /// describes the current flags.
    #[must_use]
    pub fn values(&self) -> [Option<ExprId>; 2] {
        match *self {
            FlagProducer::Compare { left, right, .. } => [Some(left), Some(right)],
            FlagProducer::BitTest { base, bit, .. } => [Some(base), Some(bit)],
            FlagProducer::Add { result, addend, .. } => [Some(result), addend],
            FlagProducer::Subtract { result, .. }
            | FlagProducer::Increment { result, .. }
            | FlagProducer::Decrement { result, .. }
            | FlagProducer::Negate { result, .. } => [Some(result), None],
            FlagProducer::Logic { value, .. } | FlagProducer::Shift { value, .. } => {
                [Some(value), None]
            }
            FlagProducer::Carry(_) | FlagProducer::Opaque => [None, None],
        }
    }

    /// Rebuilds the condition under which `flag` equals `expected`.
    pub fn reconstruct(&self, arena: &mut ExprArena, flag: Flag, expected: bool) -> Reconstruction {
        let Some(positive) = self.positive(arena, flag) else {
            return Reconstruction::Unsupported;
        };

        if expected {
            Reconstruction::Expr(positive)
        } else {
            Reconstruction::Expr(arena.logical_not(positive))
        }
    }

    /// Rebuilds a complete condition code directly from this producer.
    ///
    /// Only producers with a closed form for the condition answer; everything else returns
    /// [`Reconstruction::Unsupported`] and the caller composes the condition from
    /// [`FlagProducer::reconstruct`] per flag.
    pub fn condition(&self, arena: &mut ExprArena, condition: Condition) -> Reconstruction {
        let (kind, unsigned) = match condition {
            Condition::E => (CmpKind::Eq, false),
            Condition::Ne => (CmpKind::Ne, false),
            Condition::B => (CmpKind::Lt, true),
            Condition::Ae => (CmpKind::Ge, true),
            Condition::Be => (CmpKind::Le, true),
            Condition::A => (CmpKind::Gt, true),
            Condition::L => (CmpKind::Lt, false),
            Condition::Ge => (CmpKind::Ge, false),
            Condition::Le => (CmpKind::Le, false),
            Condition::G => (CmpKind::Gt, false),
            Condition::S | Condition::Ns => {
                return match self.positive(arena, Flag::Sf) {
                    Some(sf) if condition == Condition::S => Reconstruction::Expr(sf),
                    Some(sf) => Reconstruction::Expr(arena.logical_not(sf)),
                    None => Reconstruction::Unsupported,
                }
            }
            Condition::O | Condition::No | Condition::P | Condition::Np => {
                return self.reconstruct(arena, condition_flag(condition), is_positive(condition))
            }
        };

        match *self {
            FlagProducer::Compare { left, right, .. } => {
                Reconstruction::Expr(arena.compare(kind, left, right, unsigned))
            }
            FlagProducer::Logic { value, width } => {
                // CF = OF = 0: the condition reduces to a comparison of the value with zero
                let zero = arena.constant(0, width);
                let expr = match condition {
                    Condition::B => arena.boolean(false),
                    Condition::Ae => arena.boolean(true),
                    Condition::Be => arena.compare(CmpKind::Eq, value, zero, false),
                    Condition::A => arena.compare(CmpKind::Ne, value, zero, false),
                    _ => arena.compare(kind, value, zero, false),
                };
                Reconstruction::Expr(expr)
            }
            _ => Reconstruction::Unsupported,
        }
    }

    /// Expression that is true exactly when `flag` is set, if one exists.
    fn positive(&self, arena: &mut ExprArena, flag: Flag) -> Option<ExprId> {
        match *self {
            FlagProducer::Compare { left, right, width } => match flag {
                Flag::Zf => Some(arena.compare(CmpKind::Eq, left, right, false)),
                Flag::Cf => Some(arena.compare(CmpKind::Lt, left, right, true)),
                Flag::Sf => {
                    let diff = arena.binary(BinaryOp::Sub, left, right);
                    Some(sign_of(arena, diff, width))
                }
                _ => None,
            },
            FlagProducer::Subtract { result, width } => match flag {
                Flag::Zf => Some(zero_test(arena, result, width)),
                Flag::Sf => Some(sign_of(arena, result, width)),
                _ => None,
            },
            FlagProducer::Add {
                result,
                addend,
                width,
            } => match flag {
                Flag::Zf => Some(zero_test(arena, result, width)),
                Flag::Sf => Some(sign_of(arena, result, width)),
                // Unsigned wrap-around: the sum is smaller than an addend
                Flag::Cf => addend.map(|addend| arena.compare(CmpKind::Lt, result, addend, true)),
                _ => None,
            },
            FlagProducer::Logic { value, width } | FlagProducer::Shift { value, width } => {
                match flag {
                    Flag::Zf => Some(zero_test(arena, value, width)),
                    Flag::Sf => Some(sign_of(arena, value, width)),
                    Flag::Cf | Flag::Of if matches!(self, FlagProducer::Logic { .. }) => {
                        Some(arena.boolean(false))
                    }
                    _ => None,
                }
            }
            // inc and neg overflow exactly when the result is the signed minimum
            FlagProducer::Increment { result, width } | FlagProducer::Negate { result, width }
                if flag == Flag::Of =>
            {
                let min = arena.constant(width.sign_bit(), width);
                Some(arena.compare(CmpKind::Eq, result, min, false))
            }
            FlagProducer::Decrement { result, width } if flag == Flag::Of => {
                let max = arena.constant(width.signed_max(), width);
                Some(arena.compare(CmpKind::Eq, result, max, false))
            }
            FlagProducer::Negate { result, width } if flag == Flag::Cf => {
                let zero = arena.constant(0, width);
                Some(arena.compare(CmpKind::Ne, result, zero, false))
            }
            FlagProducer::Increment { result, width }
            | FlagProducer::Decrement { result, width }
            | FlagProducer::Negate { result, width } => match flag {
                Flag::Zf => Some(zero_test(arena, result, width)),
                Flag::Sf => Some(sign_of(arena, result, width)),
                _ => None,
            },
            FlagProducer::BitTest { base, bit, width } => match flag {
                Flag::Cf => {
                    let shifted = arena.binary(BinaryOp::Shr, base, bit);
                    let one = arena.constant(1, width);
                    let masked = arena.binary(BinaryOp::And, shifted, one);
                    Some(arena.compare(CmpKind::Eq, masked, one, false))
                }
                _ => None,
            },
            FlagProducer::Carry(value) => match flag {
                Flag::Cf => Some(arena.boolean(value)),
                _ => None,
            },
            FlagProducer::Opaque => None,
        }
    }
}

fn zero_test(arena: &mut ExprArena, value: ExprId, width: Width) -> ExprId {
    let zero = arena.constant(0, width);
    arena.compare(CmpKind::Eq, value, zero, false)
}

fn sign_of(arena: &mut ExprArena, value: ExprId, width: Width) -> ExprId {
    let zero = arena.constant(0, width);
    arena.compare(CmpKind::Lt, value, zero, false)
}

/// The single flag read by the one-flag conditions (O, B, E, S, P and their negations).
const fn condition_flag(condition: Condition) -> Flag {
    match condition {
        Condition::O | Condition::No => Flag::Of,
        Condition::B | Condition::Ae => Flag::Cf,
        Condition::E | Condition::Ne => Flag::Zf,
        Condition::S | Condition::Ns => Flag::Sf,
        Condition::P | Condition::Np => Flag::Pf,
        Condition::Be | Condition::A => Flag::Cf,
        Condition::L | Condition::Ge | Condition::Le | Condition::G => Flag::Sf,
    }
}

/// Even condition codes test for a set flag, odd ones for a clear flag.
fn is_positive(condition: Condition) -> bool {
    condition.code() & 1 == 0
}

/// Builds `condition` from per-flag expressions.
///
/// `flag` returns the expression for "flag == expected"; it is expected to fall back to an
/// opaque flag reference where no reconstruction exists.
pub fn compose_condition<F>(arena: &mut ExprArena, condition: Condition, mut flag: F) -> ExprId
where
    F: FnMut(&mut ExprArena, Flag, bool) -> ExprId,
{
    match condition {
        Condition::O
        | Condition::No
        | Condition::B
        | Condition::Ae
        | Condition::E
        | Condition::Ne
        | Condition::S
        | Condition::Ns
        | Condition::P
        | Condition::Np => flag(arena, condition_flag(condition), is_positive(condition)),
        Condition::Be => {
            let cf = flag(arena, Flag::Cf, true);
            let zf = flag(arena, Flag::Zf, true);
            arena.logical_or(cf, zf)
        }
        Condition::A => {
            let cf = flag(arena, Flag::Cf, false);
            let zf = flag(arena, Flag::Zf, false);
            arena.logical_and(cf, zf)
        }
        Condition::L | Condition::Ge => {
            let sf = flag(arena, Flag::Sf, true);
            let of = flag(arena, Flag::Of, true);
            let kind = if condition == Condition::L {
                CmpKind::Ne
            } else {
                CmpKind::Eq
            };
            arena.compare(kind, sf, of, false)
        }
        Condition::Le => {
            let zf = flag(arena, Flag::Zf, true);
            let sf = flag(arena, Flag::Sf, true);
            let of = flag(arena, Flag::Of, true);
            let less = arena.compare(CmpKind::Ne, sf, of, false);
            arena.logical_or(zf, less)
        }
        Condition::G => {
            let zf = flag(arena, Flag::Zf, false);
            let sf = flag(arena, Flag::Sf, true);
            let of = flag(arena, Flag::Of, true);
            let not_less = arena.compare(CmpKind::Eq, sf, of, false);
            arena.logical_and(zf, not_less)
        }
    }
}
