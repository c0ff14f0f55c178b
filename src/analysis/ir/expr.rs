//! IR expressions.
//!
//! Expressions are immutable trees stored in an [`ExprArena`] and referenced through
//! [`ExprId`] handles. The arena hash-conses its nodes: building the same expression twice
//! returns the same handle, so structurally equal subtrees are shared and equality of two
//! expressions is a handle comparison. Children always exist before their parents, which
//! keeps every tree acyclic without any back-pointers.
//!
//! # Key Types
//! - [`Expr`] - One node: constant, register, dereference, operator, comparison, flag
//! - [`ExprId`] - Handle of a node inside its arena
//! - [`ExprArena`] - Owner of all nodes of one lifted function
//!
//! # Example
//!
//! ```rust
//! use x86scope::analysis::ir::{BinaryOp, ExprArena};
//! use x86scope::disassembler::{Register, Width};
//!
//! let mut arena = ExprArena::new();
//! let eax = arena.register(Register::Eax);
//! let three = arena.constant(3, Width::Bits32);
//! let sum = arena.binary(BinaryOp::Add, eax, three);
//!
//! assert_eq!(arena.display(sum).to_string(), "eax + 3");
//! assert_eq!(sum, arena.binary(BinaryOp::Add, eax, three));
//! ```

use std::{collections::HashMap, fmt};

use crate::{
    analysis::ir::flags::Flag,
    disassembler::{Register, Width},
};

/// Handle of an expression node inside an [`ExprArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(u32);

impl ExprId {
    /// Position of the node inside its arena.
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Two operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Wrapping addition
    Add,
    /// Wrapping subtraction
    Sub,
    /// Multiplication (low half)
    Mul,
    /// Unsigned division
    UDiv,
    /// Signed division
    SDiv,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise exclusive or
    Xor,
    /// Shift left
    Shl,
    /// Logical shift right
    Shr,
    /// Arithmetic shift right
    Sar,
    /// Rotate left
    Rol,
    /// Rotate right
    Ror,
    /// Boolean conjunction
    LogicalAnd,
    /// Boolean disjunction
    LogicalOr,
}

impl BinaryOp {
    /// Infix symbol used by the textual form.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::UDiv => "/u",
            BinaryOp::SDiv => "/",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>u",
            BinaryOp::Sar => ">>",
            BinaryOp::Rol => "rol",
            BinaryOp::Ror => "ror",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalOr => "||",
        }
    }
}

/// Single operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Two's complement negation
    Neg,
    /// Bitwise complement
    Not,
    /// Add one
    Increment,
    /// Subtract one
    Decrement,
    /// Boolean negation
    LogicalNot,
    /// Zero extension to the given width
    ZeroExtend(Width),
    /// Sign extension to the given width
    SignExtend(Width),
    /// Byte order reversal
    ByteSwap,
}

/// Relation tested by a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpKind {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpKind {
    /// The relation that holds exactly when this one does not.
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            CmpKind::Eq => CmpKind::Ne,
            CmpKind::Ne => CmpKind::Eq,
            CmpKind::Lt => CmpKind::Ge,
            CmpKind::Ge => CmpKind::Lt,
            CmpKind::Le => CmpKind::Gt,
            CmpKind::Gt => CmpKind::Le,
        }
    }

    /// Returns true for `==` and `!=`, where signedness does not matter.
    #[must_use]
    pub const fn is_equality(self) -> bool {
        matches!(self, CmpKind::Eq | CmpKind::Ne)
    }

    const fn symbol(self) -> &'static str {
        match self {
            CmpKind::Eq => "==",
            CmpKind::Ne => "!=",
            CmpKind::Lt => "<",
            CmpKind::Le => "<=",
            CmpKind::Gt => ">",
            CmpKind::Ge => ">=",
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Integer constant, already masked to `width`
    Constant {
        /// The value
        value: u64,
        /// Its width
        width: Width,
    },
    /// Boolean constant
    Bool(bool),
    /// Value of a register
    Register(Register),
    /// Value of an x87 stack slot, `st(i)`
    FpuStack(u8),
    /// A far `segment:offset` address
    FarPointer {
        /// Segment selector
        segment: u16,
        /// Offset inside the segment
        offset: u32,
    },
    /// Memory load of `width` bits at `address`
    Deref {
        /// The address expression
        address: ExprId,
        /// Size of the access
        width: Width,
        /// Segment override, if any
        segment: Option<Register>,
    },
    /// `left op right`
    Binary {
        /// The operator
        op: BinaryOp,
        /// Left operand
        left: ExprId,
        /// Right operand
        right: ExprId,
    },
    /// `op operand`
    Unary {
        /// The operator
        op: UnaryOp,
        /// The operand
        operand: ExprId,
    },
    /// Boolean comparison of two values
    Compare {
        /// The relation
        kind: CmpKind,
        /// Left operand
        left: ExprId,
        /// Right operand
        right: ExprId,
        /// Relational comparisons treat the operands as unsigned
        unsigned: bool,
    },
    /// Opaque reference to a processor flag, used where no reconstruction exists
    Flag(Flag),
}

/// Owner of the expression nodes of one lifted function.
#[derive(Debug, Clone, Default)]
pub struct ExprArena {
    nodes: Vec<Expr>,
    index: HashMap<Expr, ExprId>,
}

impl ExprArena {
    /// Creates an empty arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Adds `expr`, or returns the handle of the identical node added before.
    pub fn intern(&mut self, expr: Expr) -> ExprId {
        if let Some(&id) = self.index.get(&expr) {
            return id;
        }

        #[allow(clippy::cast_possible_truncation)]
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(expr);
        self.index.insert(expr, id);
        id
    }

    /// Returns the handle of `expr` if it was added before.
    #[must_use]
    pub fn lookup(&self, expr: &Expr) -> Option<ExprId> {
        self.index.get(expr).copied()
    }

    /// Returns the node behind `id`.
    ///
    /// # Panics
    /// Panics if `id` was created by a different arena.
    #[must_use]
    pub fn get(&self, id: ExprId) -> &Expr {
        &self.nodes[id.index()]
    }

    /// Integer constant, masked to `width`.
    pub fn constant(&mut self, value: u64, width: Width) -> ExprId {
        self.intern(Expr::Constant {
            value: value & width.mask(),
            width,
        })
    }

    /// Boolean constant.
    pub fn boolean(&mut self, value: bool) -> ExprId {
        self.intern(Expr::Bool(value))
    }

    /// Register reference.
    pub fn register(&mut self, register: Register) -> ExprId {
        self.intern(Expr::Register(register))
    }

    /// Opaque flag reference.
    pub fn flag(&mut self, flag: Flag) -> ExprId {
        self.intern(Expr::Flag(flag))
    }

    /// Memory load.
    pub fn deref(&mut self, address: ExprId, width: Width, segment: Option<Register>) -> ExprId {
        self.intern(Expr::Deref {
            address,
            width,
            segment,
        })
    }

    /// `left op right`.
    pub fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        self.intern(Expr::Binary { op, left, right })
    }

    /// `op operand`.
    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        self.intern(Expr::Unary { op, operand })
    }

    /// Comparison; `unsigned` is ignored for `==` and `!=`.
    pub fn compare(&mut self, kind: CmpKind, left: ExprId, right: ExprId, unsigned: bool) -> ExprId {
        self.intern(Expr::Compare {
            kind,
            left,
            right,
            unsigned: unsigned && !kind.is_equality(),
        })
    }

    /// Boolean negation, folded into comparisons, constants and double negations.
    pub fn logical_not(&mut self, operand: ExprId) -> ExprId {
        let node = *self.get(operand);
        match node {
            Expr::Bool(value) => self.boolean(!value),
            Expr::Compare {
                kind,
                left,
                right,
                unsigned,
            } => self.compare(kind.negate(), left, right, unsigned),
            Expr::Unary {
                op: UnaryOp::LogicalNot,
                operand: inner,
            } => inner,
            _ => self.unary(UnaryOp::LogicalNot, operand),
        }
    }

    /// Boolean conjunction with constant folding.
    pub fn logical_and(&mut self, left: ExprId, right: ExprId) -> ExprId {
        let nodes = (*self.get(left), *self.get(right));
        match nodes {
            (Expr::Bool(false), _) | (_, Expr::Bool(false)) => self.boolean(false),
            (Expr::Bool(true), _) => right,
            (_, Expr::Bool(true)) => left,
            _ => self.binary(BinaryOp::LogicalAnd, left, right),
        }
    }

    /// Boolean disjunction with constant folding.
    pub fn logical_or(&mut self, left: ExprId, right: ExprId) -> ExprId {
        let nodes = (*self.get(left), *self.get(right));
        match nodes {
            (Expr::Bool(true), _) | (_, Expr::Bool(true)) => self.boolean(true),
            (Expr::Bool(false), _) => right,
            (_, Expr::Bool(false)) => left,
            _ => self.binary(BinaryOp::LogicalOr, left, right),
        }
    }

    /// Adds a signed displacement to `base`, as `base + d` or `base - |d|`.
    pub fn offset(&mut self, base: ExprId, disp: i32, width: Width) -> ExprId {
        match disp {
            0 => base,
            d if d < 0 => {
                let magnitude = self.constant(u64::from(d.unsigned_abs()), width);
                self.binary(BinaryOp::Sub, base, magnitude)
            }
            d => {
                let magnitude = self.constant(u64::from(d.unsigned_abs()), width);
                self.binary(BinaryOp::Add, base, magnitude)
            }
        }
    }

    /// Returns true if the tree rooted at `id` reads `register` or a register overlapping
    /// it (`al` overlaps `eax`), including registers used for addressing.
    #[must_use]
    pub fn reads_register(&self, id: ExprId, register: Register) -> bool {
        let full = register.full();
        self.any(id, &|expr| match *expr {
            Expr::Register(read) => read.full() == full,
            Expr::Deref { segment, .. } => segment == Some(full),
            _ => false,
        })
    }

    /// Returns true if the tree rooted at `id` loads from memory.
    #[must_use]
    pub fn reads_memory(&self, id: ExprId) -> bool {
        self.any(id, &|expr| matches!(expr, Expr::Deref { .. }))
    }

    fn any(&self, id: ExprId, predicate: &dyn Fn(&Expr) -> bool) -> bool {
        let node = self.get(id);
        if predicate(node) {
            return true;
        }

        match *node {
            Expr::Deref { address, .. } => self.any(address, predicate),
            Expr::Unary { operand, .. } => self.any(operand, predicate),
            Expr::Binary { left, right, .. } | Expr::Compare { left, right, .. } => {
                self.any(left, predicate) || self.any(right, predicate)
            }
            _ => false,
        }
    }

    /// Returns a value implementing [`fmt::Display`] for the tree rooted at `id`.
    #[must_use]
    pub fn display(&self, id: ExprId) -> ExprDisplay<'_> {
        ExprDisplay { arena: self, id }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, id: ExprId, nested: bool) -> fmt::Result {
        match *self.get(id) {
            Expr::Constant { value, .. } => crate::disassembler::write_hex(f, value),
            Expr::Bool(value) => write!(f, "{value}"),
            Expr::Register(register) => write!(f, "{register}"),
            Expr::FpuStack(index) => write!(f, "st({index})"),
            Expr::FarPointer { segment, offset } => write!(f, "0x{segment:x}:0x{offset:x}"),
            Expr::Flag(flag) => write!(f, "{flag}"),
            Expr::Deref {
                address,
                width,
                segment,
            } => {
                write!(f, "{} ", width.ptr_keyword())?;
                if let Some(segment) = segment {
                    write!(f, "{segment}:")?;
                }
                f.write_str("[")?;
                self.write(f, address, false)?;
                f.write_str("]")
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => self.write_prefixed(f, "-", operand),
                UnaryOp::Not => self.write_prefixed(f, "~", operand),
                UnaryOp::LogicalNot => self.write_prefixed(f, "!", operand),
                UnaryOp::Increment | UnaryOp::Decrement => {
                    if nested {
                        f.write_str("(")?;
                    }
                    self.write(f, operand, true)?;
                    let sign = if op == UnaryOp::Increment { '+' } else { '-' };
                    write!(f, " {sign} 1")?;
                    if nested {
                        f.write_str(")")?;
                    }
                    Ok(())
                }
                UnaryOp::ZeroExtend(width) => self.write_call(f, "zext", width, operand),
                UnaryOp::SignExtend(width) => self.write_call(f, "sext", width, operand),
                UnaryOp::ByteSwap => {
                    f.write_str("bswap(")?;
                    self.write(f, operand, false)?;
                    f.write_str(")")
                }
            },
            Expr::Binary { op, left, right } => {
                if nested {
                    f.write_str("(")?;
                }
                self.write(f, left, true)?;
                write!(f, " {} ", op.symbol())?;
                self.write(f, right, true)?;
                if nested {
                    f.write_str(")")?;
                }
                Ok(())
            }
            Expr::Compare {
                kind,
                left,
                right,
                unsigned,
            } => {
                if nested {
                    f.write_str("(")?;
                }
                self.write(f, left, true)?;
                let suffix = if unsigned { "u" } else { "" };
                write!(f, " {}{suffix} ", kind.symbol())?;
                self.write(f, right, true)?;
                if nested {
                    f.write_str(")")?;
                }
                Ok(())
            }
        }
    }

    fn write_prefixed(&self, f: &mut fmt::Formatter<'_>, prefix: &str, operand: ExprId) -> fmt::Result {
        f.write_str(prefix)?;
        self.write(f, operand, true)
    }

    fn write_call(
        &self,
        f: &mut fmt::Formatter<'_>,
        name: &str,
        width: Width,
        operand: ExprId,
    ) -> fmt::Result {
        write!(f, "{name}{width}(")?;
        self.write(f, operand, false)?;
        f.write_str(")")
    }
}

/// Textual form of an expression tree, see [`ExprArena::display`].
pub struct ExprDisplay<'a> {
    arena: &'a ExprArena,
    id: ExprId,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.arena.write(f, self.id, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_consing_shares_nodes() {
        let mut arena = ExprArena::new();
        let a = arena.register(Register::Eax);
        let b = arena.register(Register::Eax);
        assert_eq!(a, b);

        let one = arena.constant(1, Width::Bits32);
        let sum1 = arena.binary(BinaryOp::Add, a, one);
        let sum2 = arena.binary(BinaryOp::Add, b, one);
        assert_eq!(sum1, sum2);
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.lookup(&Expr::Register(Register::Eax)), Some(a));
        assert_eq!(arena.lookup(&Expr::Register(Register::Ebx)), None);
    }

    #[test]
    fn constants_are_masked() {
        let mut arena = ExprArena::new();
        let c = arena.constant(u64::MAX, Width::Bits8);
        assert_eq!(
            *arena.get(c),
            Expr::Constant {
                value: 0xFF,
                width: Width::Bits8
            }
        );
    }

    #[test]
    fn logical_not_folds() {
        let mut arena = ExprArena::new();
        let eax = arena.register(Register::Eax);
        let five = arena.constant(5, Width::Bits32);
        let lt = arena.compare(CmpKind::Lt, eax, five, true);
        let ge = arena.logical_not(lt);
        assert_eq!(arena.display(ge).to_string(), "eax >=u 5");
        assert_eq!(arena.logical_not(ge), lt);

        let zf = arena.flag(Flag::Zf);
        let not_zf = arena.logical_not(zf);
        assert_eq!(arena.display(not_zf).to_string(), "!ZF");
        assert_eq!(arena.logical_not(not_zf), zf);
    }

    #[test]
    fn equality_ignores_signedness() {
        let mut arena = ExprArena::new();
        let eax = arena.register(Register::Eax);
        let zero = arena.constant(0, Width::Bits32);
        let a = arena.compare(CmpKind::Eq, eax, zero, true);
        let b = arena.compare(CmpKind::Eq, eax, zero, false);
        assert_eq!(a, b);
    }

    #[test]
    fn logical_connectives_fold_constants() {
        let mut arena = ExprArena::new();
        let zf = arena.flag(Flag::Zf);
        let t = arena.boolean(true);
        let f = arena.boolean(false);
        assert_eq!(arena.logical_and(zf, t), zf);
        assert_eq!(arena.logical_and(zf, f), f);
        assert_eq!(arena.logical_or(f, zf), zf);
        assert_eq!(arena.logical_or(zf, t), t);
    }

    #[test]
    fn display_memory() {
        let mut arena = ExprArena::new();
        let ebp = arena.register(Register::Ebp);
        let address = arena.offset(ebp, -4, Width::Bits32);
        let load = arena.deref(address, Width::Bits32, None);
        assert_eq!(arena.display(load).to_string(), "dword [ebp - 4]");

        let zero = arena.constant(0, Width::Bits32);
        let tls = arena.deref(zero, Width::Bits32, Some(Register::Fs));
        assert_eq!(arena.display(tls).to_string(), "dword fs:[0]");
    }

    #[test]
    fn register_and_memory_reads() {
        let mut arena = ExprArena::new();
        let esi = arena.register(Register::Esi);
        let four = arena.constant(4, Width::Bits32);
        let address = arena.binary(BinaryOp::Add, esi, four);
        let load = arena.deref(address, Width::Bits8, Some(Register::Es));

        assert!(arena.reads_register(load, Register::Esi));
        assert!(arena.reads_register(load, Register::Si));
        assert!(arena.reads_register(load, Register::Es));
        assert!(!arena.reads_register(load, Register::Eax));
        assert!(arena.reads_memory(load));
        assert!(!arena.reads_memory(address));

        let al = arena.register(Register::Al);
        assert!(arena.reads_register(al, Register::Eax));
        assert!(arena.reads_register(al, Register::Ah));
        assert!(!arena.reads_register(four, Register::Eax));
    }

    #[test]
    fn display_nesting() {
        let mut arena = ExprArena::new();
        let eax = arena.register(Register::Eax);
        let ecx = arena.register(Register::Ecx);
        let four = arena.constant(4, Width::Bits32);
        let scaled = arena.binary(BinaryOp::Mul, ecx, four);
        let sum = arena.binary(BinaryOp::Add, eax, scaled);
        assert_eq!(arena.display(sum).to_string(), "eax + (ecx * 4)");

        let zero = arena.constant(0, Width::Bits32);
        let cmp = arena.compare(CmpKind::Lt, sum, zero, false);
        assert_eq!(arena.display(cmp).to_string(), "(eax + (ecx * 4)) < 0");

        let inc = arena.unary(UnaryOp::Increment, eax);
        assert_eq!(arena.display(inc).to_string(), "eax + 1");
        let neg = arena.unary(UnaryOp::Neg, eax);
        assert_eq!(arena.display(neg).to_string(), "-eax");
        let ext = arena.unary(UnaryOp::ZeroExtend(Width::Bits32), eax);
        assert_eq!(arena.display(ext).to_string(), "zext32(eax)");
    }
}
