//! Instruction to IR translation.
//!
//! The lifter walks a [`Function`] block by block. Inside a block it remembers, for each of
//! the six status flags, the [`FlagProducer`] of the last instruction that wrote it; a
//! condition consumer (`jcc`, `setcc`, `cmovcc`, `adc`, `sbb`, `loope`, `loopne`) is lifted
//! against those producers. Flag state is reset at every block start, so a consumer at the
//! top of a block always sees opaque flag references.
//!
//! When all flags of a condition come from the same producer, that producer answers the
//! whole condition at once (`cmp a, b` + `jl` → `a < b`). Otherwise the condition is
//! composed from per-flag reconstructions, with opaque [`Expr::Flag`](super::Expr::Flag)
//! references for flags that have none.
//!
//! A stored producer is dropped to [`FlagProducer::Opaque`] as soon as a later instruction
//! of the block writes a register or memory that its expressions read, so `cmp eax, 1;
//! mov eax, 7; jb` never claims `eax <u 1` for the new `eax`.

use std::collections::BTreeMap;

use crate::{
    analysis::{
        cfg::Function,
        ir::{
            expr::{BinaryOp, CmpKind, Expr, ExprArena, ExprId, UnaryOp},
            flags::{
                compose_condition, condition_flags, Flag, FlagProducer, FlagSet, Reconstruction,
            },
            function::IrFunction,
            instruction::{IrInstruction, IrKind},
        },
    },
    disassembler::{BasicBlock, Condition, Instruction, Mnemonic, Operand, Register, Width},
};

/// Lifter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifterConfig {
    /// Rebuild conditions from flag producers; when false every condition consumer uses
    /// opaque flag references
    pub reconstruct_flags: bool,
}

impl Default for LifterConfig {
    fn default() -> Self {
        LifterConfig {
            reconstruct_flags: true,
        }
    }
}

impl LifterConfig {
    /// Configuration that never reconstructs conditions.
    #[must_use]
    pub fn opaque() -> Self {
        LifterConfig {
            reconstruct_flags: false,
        }
    }
}

/// Lifts whole functions into [`IrFunction`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lifter {
    config: LifterConfig,
}

impl Lifter {
    /// Creates a lifter with the given settings.
    #[must_use]
    pub fn new(config: LifterConfig) -> Self {
        Lifter { config }
    }

    /// Lifts every block of `function`.
    #[must_use]
    pub fn lift_function(&self, function: &Function) -> IrFunction {
        let mut arena = ExprArena::new();
        let mut blocks = BTreeMap::new();

        for block in function.blocks() {
            let lifted = self.lift_block(&mut arena, block);
            blocks.insert(block.address, lifted);
        }

        tracing::trace!(
            entry = function.entry(),
            blocks = blocks.len(),
            nodes = arena.len(),
            "lifted function"
        );

        IrFunction::new(arena, blocks, function.entry())
    }

    /// Lifts the instructions of one block, starting with unknown flags.
    pub fn lift_block(&self, arena: &mut ExprArena, block: &BasicBlock) -> Vec<IrInstruction> {
        let mut state = BlockLifter::new(arena, self.config);
        block
            .instructions
            .iter()
            .map(|instruction| state.lift(instruction))
            .collect()
    }
}

/// Lifts `function` with the default [`LifterConfig`].
#[must_use]
pub fn lift_function(function: &Function) -> IrFunction {
    Lifter::default().lift_function(function)
}

/// Lifts a single instruction without any flag context.
///
/// Condition consumers lifted this way always use opaque flag references.
pub fn lift_instruction(arena: &mut ExprArena, instruction: &Instruction) -> IrInstruction {
    BlockLifter::new(arena, LifterConfig::default()).lift(instruction)
}

/// Converts an operand into an expression.
///
/// Memory operands become a [`Expr::Deref`] of their address arithmetic; relative offsets
/// become the constant target address.
pub fn lift_operand(arena: &mut ExprArena, operand: &Operand) -> ExprId {
    match *operand {
        Operand::Register(register) => arena.register(register),
        #[allow(clippy::cast_sign_loss)]
        Operand::Immediate { value, width } => arena.constant(value as u64, width),
        Operand::RelativeOffset { target } => arena.constant(u64::from(target), Width::Bits32),
        Operand::FarPointer { segment, offset } => {
            arena.intern(Expr::FarPointer { segment, offset })
        }
        Operand::FpuRegister(index) => arena.intern(Expr::FpuStack(index)),
        Operand::DirectMemory { .. }
        | Operand::BaseRegisterMemory { .. }
        | Operand::DisplacementMemory { .. }
        | Operand::ScaledIndexMemory { .. } => {
            let address = lift_address(arena, operand);
            arena.deref(address, operand.width(), operand.segment())
        }
    }
}

/// The address computed by a memory operand, `base + index * scale + disp`.
///
/// Non-memory operands are lifted as values.
pub fn lift_address(arena: &mut ExprArena, operand: &Operand) -> ExprId {
    match *operand {
        Operand::DirectMemory { address, .. } => arena.constant(u64::from(address), Width::Bits32),
        Operand::BaseRegisterMemory { base, .. } => arena.register(base),
        Operand::DisplacementMemory { base, disp, .. } => {
            let base = arena.register(base);
            arena.offset(base, disp, Width::Bits32)
        }
        Operand::ScaledIndexMemory {
            index,
            scale,
            base,
            disp,
            ..
        } => {
            let mut address = arena.register(index);
            if scale > 1 {
                let factor = arena.constant(u64::from(scale), index.width());
                address = arena.binary(BinaryOp::Mul, address, factor);
            }
            if let Some(base) = base {
                let base = arena.register(base);
                address = arena.binary(BinaryOp::Add, base, address);
            }
            arena.offset(address, disp, index.width())
        }
        _ => lift_operand(arena, operand),
    }
}

/// Flags written in an unmodeled way by instructions lifted as intrinsics.
fn opaque_flags(mnemonic: Mnemonic) -> FlagSet {
    match mnemonic {
        Mnemonic::Mul
        | Mnemonic::Imul
        | Mnemonic::Div
        | Mnemonic::Idiv
        | Mnemonic::Xadd
        | Mnemonic::Cmpxchg
        | Mnemonic::Shld
        | Mnemonic::Shrd
        | Mnemonic::Sahf
        | Mnemonic::Popfd
        | Mnemonic::Iret
        | Mnemonic::Daa
        | Mnemonic::Das
        | Mnemonic::Aaa
        | Mnemonic::Aas
        | Mnemonic::Aam
        | Mnemonic::Aad
        | Mnemonic::Cmps
        | Mnemonic::Scas
        | Mnemonic::RepeCmps
        | Mnemonic::RepneCmps
        | Mnemonic::RepeScas
        | Mnemonic::RepneScas => FlagSet::ARITHMETIC,
        Mnemonic::Rol | Mnemonic::Ror | Mnemonic::Rcl | Mnemonic::Rcr => {
            FlagSet::CF | FlagSet::OF
        }
        Mnemonic::Bts | Mnemonic::Btr | Mnemonic::Btc | Mnemonic::Cmc => FlagSet::CF,
        Mnemonic::Bsf | Mnemonic::Bsr => FlagSet::ZF,
        Mnemonic::Fcomi | Mnemonic::Fcomip | Mnemonic::Fucomi | Mnemonic::Fucomip => {
            FlagSet::ZF | FlagSet::PF | FlagSet::CF
        }
        _ => FlagSet::empty(),
    }
}

/// Lifting state of one basic block.
struct BlockLifter<'a> {
    arena: &'a mut ExprArena,
    config: LifterConfig,
    producers: [Option<FlagProducer>; 6],
}

impl<'a> BlockLifter<'a> {
    fn new(arena: &'a mut ExprArena, config: LifterConfig) -> Self {
        BlockLifter {
            arena,
            config,
            producers: [None; 6],
        }
    }

    fn lift(&mut self, instruction: &Instruction) -> IrInstruction {
        let ir = self.translate(instruction);

        let writes = Writes::of(self.arena, instruction, &ir);
        self.invalidate(&writes);

        for flag in ir.flags.flags() {
            self.producers[flag.index()] = Some(ir.producer.unwrap_or(FlagProducer::Opaque));
        }

        ir
    }

    /// Forgets every producer that reads a location in `writes`.
    fn invalidate(&mut self, writes: &Writes) {
        for slot in &mut self.producers {
            let Some(producer) = *slot else {
                continue;
            };
            let stale = producer
                .values()
                .into_iter()
                .flatten()
                .any(|value| writes.touches(self.arena, value));
            if stale {
                *slot = Some(FlagProducer::Opaque);
            }
        }
    }

    /// Expression for "`flag` == `expected`" against the current producers.
    fn flag(&mut self, flag: Flag, expected: bool) -> ExprId {
        flag_expr(
            self.arena,
            &self.producers,
            self.config.reconstruct_flags,
            flag,
            expected,
        )
    }

    fn condition(&mut self, condition: Condition) -> ExprId {
        let reconstruct = self.config.reconstruct_flags;

        if reconstruct {
            let mut sources = condition_flags(condition)
                .flags()
                .map(|flag| self.producers[flag.index()]);
            if let Some(Some(first)) = sources.next() {
                if sources.all(|other| other == Some(first)) {
                    if let Reconstruction::Expr(expr) = first.condition(self.arena, condition) {
                        return expr;
                    }
                }
            }
        }

        let producers = self.producers;
        compose_condition(self.arena, condition, |arena, flag, expected| {
            flag_expr(arena, &producers, reconstruct, flag, expected)
        })
    }

    fn translate(&mut self, instruction: &Instruction) -> IrInstruction {
        let address = instruction.address;
        let mnemonic = instruction.mnemonic;
        let operands: Vec<ExprId> = instruction
            .operands
            .iter()
            .map(|operand| lift_operand(self.arena, operand))
            .collect();
        let width = instruction
            .operands
            .first()
            .map_or(Width::Bits32, Operand::width);

        match (mnemonic, operands.as_slice()) {
            (Mnemonic::Mov, &[dst, src]) => assign(address, IrKind::Assign, dst, src, &operands),
            (Mnemonic::Movzx | Mnemonic::Movsx, &[dst, src]) => {
                let op = if mnemonic == Mnemonic::Movzx {
                    UnaryOp::ZeroExtend(width)
                } else {
                    UnaryOp::SignExtend(width)
                };
                let value = self.arena.unary(op, src);
                assign(address, IrKind::Unary(op), dst, value, &operands)
            }
            (Mnemonic::Lea, &[dst, _]) => {
                let value = match instruction.operands.get(1) {
                    Some(source) => lift_address(self.arena, source),
                    None => dst,
                };
                assign(address, IrKind::Assign, dst, value, &[value])
            }
            (Mnemonic::Add | Mnemonic::Sub, &[dst, src]) => {
                let op = if mnemonic == Mnemonic::Add {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                let value = self.arena.binary(op, dst, src);
                let producer = if op == BinaryOp::Add {
                    // `add eax, eax` leaves no copy of the addend behind
                    let overwritten = instruction
                        .operands
                        .first()
                        .is_some_and(|target| Writes::operand(target).touches(self.arena, src));
                    FlagProducer::Add {
                        result: dst,
                        addend: (!overwritten).then_some(src),
                        width,
                    }
                } else {
                    FlagProducer::Subtract { result: dst, width }
                };
                assign(address, IrKind::Binary(op), dst, value, &operands)
                    .with_flags(FlagSet::ARITHMETIC, producer)
            }
            (Mnemonic::Adc | Mnemonic::Sbb, &[dst, src]) => {
                let op = if mnemonic == Mnemonic::Adc {
                    BinaryOp::Add
                } else {
                    BinaryOp::Sub
                };
                let carry = self.flag(Flag::Cf, true);
                let partial = self.arena.binary(op, dst, src);
                let value = self.arena.binary(op, partial, carry);
                assign(address, IrKind::Binary(op), dst, value, &operands)
                    .with_flags(FlagSet::ARITHMETIC, FlagProducer::Opaque)
            }
            (Mnemonic::Cmp, &[left, right]) => {
                flags_only(address, IrKind::Compare, &operands).with_flags(
                    FlagSet::ARITHMETIC,
                    FlagProducer::Compare { left, right, width },
                )
            }
            (Mnemonic::Test, &[left, right]) => {
                // `test a, a` tests `a` itself against zero
                let value = if left == right {
                    left
                } else {
                    self.arena.binary(BinaryOp::And, left, right)
                };
                flags_only(address, IrKind::Test, &operands)
                    .with_flags(FlagSet::ARITHMETIC, FlagProducer::Logic { value, width })
            }
            (Mnemonic::And | Mnemonic::Or | Mnemonic::Xor, &[dst, src]) => {
                let op = match mnemonic {
                    Mnemonic::And => BinaryOp::And,
                    Mnemonic::Or => BinaryOp::Or,
                    _ => BinaryOp::Xor,
                };
                let value = self.arena.binary(op, dst, src);
                assign(address, IrKind::Binary(op), dst, value, &operands).with_flags(
                    FlagSet::ARITHMETIC,
                    FlagProducer::Logic { value: dst, width },
                )
            }
            (Mnemonic::Inc | Mnemonic::Dec, &[dst]) => {
                let (op, producer) = if mnemonic == Mnemonic::Inc {
                    (
                        UnaryOp::Increment,
                        FlagProducer::Increment { result: dst, width },
                    )
                } else {
                    (
                        UnaryOp::Decrement,
                        FlagProducer::Decrement { result: dst, width },
                    )
                };
                let value = self.arena.unary(op, dst);
                assign(address, IrKind::Unary(op), dst, value, &operands)
                    .with_flags(FlagSet::ARITHMETIC - FlagSet::CF, producer)
            }
            (Mnemonic::Neg, &[dst]) => {
                let value = self.arena.unary(UnaryOp::Neg, dst);
                assign(address, IrKind::Unary(UnaryOp::Neg), dst, value, &operands).with_flags(
                    FlagSet::ARITHMETIC,
                    FlagProducer::Negate { result: dst, width },
                )
            }
            (Mnemonic::Not, &[dst]) => {
                let value = self.arena.unary(UnaryOp::Not, dst);
                assign(address, IrKind::Unary(UnaryOp::Not), dst, value, &operands)
            }
            (Mnemonic::Bswap, &[dst]) => {
                let value = self.arena.unary(UnaryOp::ByteSwap, dst);
                assign(address, IrKind::Unary(UnaryOp::ByteSwap), dst, value, &operands)
            }
            (
                Mnemonic::Shl | Mnemonic::Shr | Mnemonic::Sar | Mnemonic::Rol | Mnemonic::Ror,
                &[dst, count],
            ) => {
                let op = match mnemonic {
                    Mnemonic::Shl => BinaryOp::Shl,
                    Mnemonic::Shr => BinaryOp::Shr,
                    Mnemonic::Sar => BinaryOp::Sar,
                    Mnemonic::Rol => BinaryOp::Rol,
                    _ => BinaryOp::Ror,
                };
                let value = self.arena.binary(op, dst, count);
                let ir = assign(address, IrKind::Binary(op), dst, value, &operands);

                // A zero count leaves every flag untouched; a count in `cl` may be zero
                let constant_count = instruction
                    .operands
                    .get(1)
                    .and_then(Operand::as_immediate)
                    .map(|count| count & 0x1F);
                let is_shift = matches!(op, BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Sar);
                match constant_count {
                    Some(0) => ir,
                    Some(_) if is_shift => ir.with_flags(
                        FlagSet::ARITHMETIC,
                        FlagProducer::Shift { value: dst, width },
                    ),
                    _ => ir.with_flags(opaque_flags_for_shift(is_shift), FlagProducer::Opaque),
                }
            }
            (Mnemonic::Imul, &[dst, src]) => {
                let value = self.arena.binary(BinaryOp::Mul, dst, src);
                assign(address, IrKind::Binary(BinaryOp::Mul), dst, value, &operands)
                    .with_flags(FlagSet::ARITHMETIC, FlagProducer::Opaque)
            }
            (Mnemonic::Imul, &[dst, left, right]) => {
                let value = self.arena.binary(BinaryOp::Mul, left, right);
                assign(address, IrKind::Binary(BinaryOp::Mul), dst, value, &operands[1..])
                    .with_flags(FlagSet::ARITHMETIC, FlagProducer::Opaque)
            }
            (Mnemonic::Cbw | Mnemonic::Cwde, _) => {
                let (dst, src, to) = if mnemonic == Mnemonic::Cbw {
                    (Register::Ax, Register::Al, Width::Bits16)
                } else {
                    (Register::Eax, Register::Ax, Width::Bits32)
                };
                let dst = self.arena.register(dst);
                let src = self.arena.register(src);
                let op = UnaryOp::SignExtend(to);
                let value = self.arena.unary(op, src);
                assign(address, IrKind::Unary(op), dst, value, &[src])
            }
            (Mnemonic::Xchg, &[a, b]) => {
                let mut ir = IrInstruction::new(address, IrKind::Exchange);
                ir.operands = vec![a, b];
                ir
            }
            (Mnemonic::Push, &[source]) => {
                let mut ir = IrInstruction::new(address, IrKind::Push);
                ir.operands = vec![source];
                ir
            }
            (Mnemonic::Pop, &[dst]) => {
                let mut ir = IrInstruction::new(address, IrKind::Pop);
                ir.result = Some(dst);
                ir
            }
            (Mnemonic::Call, &[target]) => {
                let kind = IrKind::Call {
                    target: instruction.branch_target(),
                };
                let mut ir = IrInstruction::new(address, kind);
                ir.operands = vec![target];
                ir
            }
            (Mnemonic::Jmp, &[target]) => {
                let kind = IrKind::Jump {
                    target: instruction.branch_target(),
                };
                let mut ir = IrInstruction::new(address, kind);
                ir.operands = vec![target];
                ir
            }
            (Mnemonic::Ret | Mnemonic::Retf, _) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let pop = instruction
                    .operands
                    .first()
                    .and_then(Operand::as_immediate)
                    .map_or(0, |value| value as u16);
                IrInstruction::new(address, IrKind::Return { pop })
            }
            (Mnemonic::Iret, _) => IrInstruction::new(address, IrKind::Return { pop: 0 })
                .with_flags(opaque_flags(mnemonic), FlagProducer::Opaque),
            (Mnemonic::Jcc(condition), _) => match instruction.branch_target() {
                Some(target) => {
                    let condition = self.condition(condition);
                    IrInstruction::new(address, IrKind::Branch { condition, target })
                }
                None => intrinsic(address, mnemonic, &operands),
            },
            (Mnemonic::Jecxz, _) => match instruction.branch_target() {
                Some(target) => {
                    let counter = self.counter(instruction);
                    let zero = self.arena.constant(0, counter_width(instruction));
                    let condition = self.arena.compare(CmpKind::Eq, counter, zero, false);
                    IrInstruction::new(address, IrKind::Branch { condition, target })
                }
                None => intrinsic(address, mnemonic, &operands),
            },
            (Mnemonic::Loop | Mnemonic::Loope | Mnemonic::Loopne, _) => {
                match instruction.branch_target() {
                    Some(target) => self.lift_loop(instruction, target),
                    None => intrinsic(address, mnemonic, &operands),
                }
            }
            (Mnemonic::Set(condition), &[dst]) => {
                let value = self.condition(condition);
                assign(address, IrKind::Assign, dst, value, &[value])
            }
            (Mnemonic::Cmov(condition), &[dst, src]) => {
                let condition = self.condition(condition);
                assign(address, IrKind::Select { condition }, dst, src, &[src])
            }
            (Mnemonic::Clc | Mnemonic::Stc, _) => intrinsic(address, mnemonic, &operands)
                .with_flags(FlagSet::CF, FlagProducer::Carry(mnemonic == Mnemonic::Stc)),
            (Mnemonic::Bt, &[base, bit]) => intrinsic(address, mnemonic, &operands).with_flags(
                FlagSet::CF,
                FlagProducer::BitTest { base, bit, width },
            ),
            (Mnemonic::Nop | Mnemonic::Wait | Mnemonic::Fnop, _) => {
                IrInstruction::new(address, IrKind::Nop)
            }
            (Mnemonic::Hlt, _) => IrInstruction::new(address, IrKind::Halt),
            (Mnemonic::Int, &[vector]) => {
                let mut ir = IrInstruction::new(address, IrKind::Interrupt);
                ir.operands = vec![vector];
                ir
            }
            (Mnemonic::Int3, _) => {
                let mut ir = IrInstruction::new(address, IrKind::Interrupt);
                ir.operands = vec![self.arena.constant(3, Width::Bits8)];
                ir
            }
            (Mnemonic::Unknown, _) => IrInstruction::new(address, IrKind::Unknown),
            _ => {
                let flags = opaque_flags(mnemonic);
                let ir = intrinsic(address, mnemonic, &operands);
                if flags.is_empty() {
                    ir
                } else {
                    ir.with_flags(flags, FlagProducer::Opaque)
                }
            }
        }
    }

    /// `ecx` (or `cx` under an address-size prefix), the implicit counter of `loop`/`jecxz`.
    fn counter(&mut self, instruction: &Instruction) -> ExprId {
        let register = if instruction.prefixes.address_16() {
            Register::Cx
        } else {
            Register::Ecx
        };
        self.arena.register(register)
    }

    fn lift_loop(&mut self, instruction: &Instruction, target: u32) -> IrInstruction {
        let counter = self.counter(instruction);
        let zero = self.arena.constant(0, counter_width(instruction));
        let decremented = self.arena.unary(UnaryOp::Decrement, counter);
        let remaining = self.arena.compare(CmpKind::Ne, counter, zero, false);

        // The condition is read after the decrement
        let writes = Writes::location(self.arena, counter);
        self.invalidate(&writes);

        let condition = match instruction.mnemonic {
            Mnemonic::Loope => {
                let zf = self.flag(Flag::Zf, true);
                self.arena.logical_and(remaining, zf)
            }
            Mnemonic::Loopne => {
                let not_zf = self.flag(Flag::Zf, false);
                self.arena.logical_and(remaining, not_zf)
            }
            _ => remaining,
        };

        let mut ir = IrInstruction::new(instruction.address, IrKind::Loop { condition, target });
        ir.result = Some(counter);
        ir.value = Some(decremented);
        ir
    }
}

/// Locations overwritten by one instruction.
#[derive(Debug, Default)]
struct Writes {
    registers: Vec<Register>,
    memory: bool,
    everything: bool,
}

impl Writes {
    fn of(arena: &ExprArena, instruction: &Instruction, ir: &IrInstruction) -> Self {
        let mut writes = match ir.kind {
            IrKind::Call { .. } | IrKind::Interrupt | IrKind::Unknown => Writes {
                everything: true,
                ..Writes::default()
            },
            IrKind::Intrinsic(mnemonic) => Writes::intrinsic(instruction, mnemonic),
            IrKind::Exchange => {
                let mut writes = Writes::default();
                for operand in &instruction.operands {
                    writes.add_operand(operand);
                }
                writes
            }
            IrKind::Push => Writes {
                registers: vec![Register::Esp],
                memory: true,
                everything: false,
            },
            IrKind::Pop => Writes {
                registers: vec![Register::Esp],
                ..Writes::default()
            },
            _ => Writes::default(),
        };

        if let Some(result) = ir.result {
            writes.add_location(arena, result);
        }
        writes
    }

    /// The location of a single written expression (register or memory).
    fn location(arena: &ExprArena, location: ExprId) -> Self {
        let mut writes = Writes::default();
        writes.add_location(arena, location);
        writes
    }

    /// The location denoted by a destination operand.
    fn operand(operand: &Operand) -> Self {
        let mut writes = Writes::default();
        writes.add_operand(operand);
        writes
    }

    /// Unmodeled instructions may write anything, except the few that only touch flags
    /// and x87 instructions, which reach general state only through their operands.
    fn intrinsic(instruction: &Instruction, mnemonic: Mnemonic) -> Self {
        match mnemonic {
            Mnemonic::Clc
            | Mnemonic::Stc
            | Mnemonic::Cmc
            | Mnemonic::Cld
            | Mnemonic::Std
            | Mnemonic::Cli
            | Mnemonic::Sti
            | Mnemonic::Bt => Writes::default(),
            _ if mnemonic.is_fpu() => {
                let mut writes = Writes::default();
                for operand in &instruction.operands {
                    writes.add_operand(operand);
                }
                writes
            }
            _ => Writes {
                everything: true,
                ..Writes::default()
            },
        }
    }

    fn add_location(&mut self, arena: &ExprArena, location: ExprId) {
        match *arena.get(location) {
            Expr::Register(register) => self.registers.push(register),
            Expr::Deref { .. } => self.memory = true,
            _ => {}
        }
    }

    fn add_operand(&mut self, operand: &Operand) {
        if let Some(register) = operand.as_register() {
            self.registers.push(register);
        } else if operand.is_memory() {
            self.memory = true;
        }
    }

    /// Returns true if `value` reads anything written here.
    fn touches(&self, arena: &ExprArena, value: ExprId) -> bool {
        self.everything
            || (self.memory && arena.reads_memory(value))
            || self
                .registers
                .iter()
                .any(|&register| arena.reads_register(value, register))
    }
}

fn flag_expr(
    arena: &mut ExprArena,
    producers: &[Option<FlagProducer>; 6],
    reconstruct: bool,
    flag: Flag,
    expected: bool,
) -> ExprId {
    if reconstruct {
        if let Some(producer) = producers[flag.index()] {
            if let Reconstruction::Expr(expr) = producer.reconstruct(arena, flag, expected) {
                return expr;
            }
        }
    }

    let opaque = arena.flag(flag);
    if expected {
        opaque
    } else {
        arena.logical_not(opaque)
    }
}

fn counter_width(instruction: &Instruction) -> Width {
    if instruction.prefixes.address_16() {
        Width::Bits16
    } else {
        Width::Bits32
    }
}

fn opaque_flags_for_shift(is_shift: bool) -> FlagSet {
    if is_shift {
        FlagSet::ARITHMETIC
    } else {
        FlagSet::CF | FlagSet::OF
    }
}

fn assign(
    address: u32,
    kind: IrKind,
    result: ExprId,
    value: ExprId,
    operands: &[ExprId],
) -> IrInstruction {
    let mut ir = IrInstruction::new(address, kind);
    ir.result = Some(result);
    ir.value = Some(value);
    ir.operands = operands.to_vec();
    ir
}

fn flags_only(address: u32, kind: IrKind, operands: &[ExprId]) -> IrInstruction {
    let mut ir = IrInstruction::new(address, kind);
    ir.operands = operands.to_vec();
    ir
}

fn intrinsic(address: u32, mnemonic: Mnemonic, operands: &[ExprId]) -> IrInstruction {
    flags_only(address, IrKind::Intrinsic(mnemonic), operands)
}

impl IrInstruction {
    fn with_flags(mut self, flags: FlagSet, producer: FlagProducer) -> Self {
        self.flags = flags;
        self.producer = Some(producer);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::build_function, disassembler::decode_stream, Parser};

    fn lift_bytes(code: &[u8]) -> (ExprArena, Vec<IrInstruction>) {
        let instructions = decode_stream(&mut Parser::new(code), 0x1000);
        let block = BasicBlock {
            address: 0x1000,
            instructions,
            is_entry: true,
        };
        let mut arena = ExprArena::new();
        let lifted = Lifter::default().lift_block(&mut arena, &block);
        (arena, lifted)
    }

    fn rendered(code: &[u8]) -> Vec<String> {
        let (arena, lifted) = lift_bytes(code);
        lifted
            .iter()
            .map(|ir| ir.display(&arena).to_string())
            .collect()
    }

    #[test]
    fn arithmetic_shapes() {
        // mov eax, 5; add eax, 3; ret
        let text = rendered(&[0xB8, 0x05, 0x00, 0x00, 0x00, 0x83, 0xC0, 0x03, 0xC3]);
        assert_eq!(text, vec!["eax := 5", "eax := eax + 3", "return"]);

        // inc ecx; neg edx; not ebx
        let text = rendered(&[0x41, 0xF7, 0xDA, 0xF7, 0xD3]);
        assert_eq!(text, vec!["ecx := ecx + 1", "edx := -edx", "ebx := ~ebx"]);
    }

    #[test]
    fn memory_operands() {
        // mov eax, [ebp-8]; lea ecx, [eax+ebx*4+0x10]; mov [0x403000], eax
        let text = rendered(&[
            0x8B, 0x45, 0xF8, 0x8D, 0x4C, 0x98, 0x10, 0xA3, 0x00, 0x30, 0x40, 0x00,
        ]);
        assert_eq!(
            text,
            vec![
                "eax := dword [ebp - 8]",
                "ecx := (eax + (ebx * 4)) + 0x10",
                "dword [0x403000] := eax",
            ]
        );
    }

    #[test]
    fn compare_then_branch() {
        // cmp eax, 5; jz +0x10; cmp eax, 5; jnz +0x10
        let (arena, lifted) = lift_bytes(&[0x83, 0xF8, 0x05, 0x74, 0x10, 0x83, 0xF8, 0x05, 0x75, 0x10]);
        let IrKind::Branch { condition, target } = lifted[1].kind else {
            panic!("expected a branch, got {:?}", lifted[1].kind);
        };
        assert_eq!(target, 0x1015);
        assert_eq!(arena.display(condition).to_string(), "eax == 5");
        assert_eq!(lifted[1].display(&arena).to_string(), "if (eax == 5) goto 0x1015");

        let IrKind::Branch { condition, .. } = lifted[3].kind else {
            panic!("expected a branch");
        };
        assert_eq!(arena.display(condition).to_string(), "eax != 5");
    }

    #[test]
    fn test_same_register_compares_against_zero() {
        // test eax, eax; jz +2
        let (arena, lifted) = lift_bytes(&[0x85, 0xC0, 0x74, 0x02]);
        let IrKind::Branch { condition, .. } = lifted[1].kind else {
            panic!("expected a branch");
        };
        assert_eq!(arena.display(condition).to_string(), "eax == 0");

        // test al, 1; jnz +2
        let (arena, lifted) = lift_bytes(&[0xA8, 0x01, 0x75, 0x02]);
        let IrKind::Branch { condition, .. } = lifted[1].kind else {
            panic!("expected a branch");
        };
        assert_eq!(arena.display(condition).to_string(), "(al & 1) != 0");
    }

    #[test]
    fn signed_and_unsigned_conditions() {
        // cmp ecx, edx; jl; jae; jg
        let (arena, lifted) = lift_bytes(&[0x39, 0xD1, 0x7C, 0x00, 0x73, 0x00, 0x7F, 0x00]);
        let conditions: Vec<String> = lifted[1..]
            .iter()
            .map(|ir| match ir.kind {
                IrKind::Branch { condition, .. } => arena.display(condition).to_string(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(conditions, vec!["ecx < edx", "ecx >=u edx", "ecx > edx"]);
    }

    #[test]
    fn flags_survive_non_writers() {
        // cmp eax, 1; mov ecx, eax; jb +0
        let (arena, lifted) = lift_bytes(&[0x83, 0xF8, 0x01, 0x89, 0xC1, 0x72, 0x00]);
        let IrKind::Branch { condition, .. } = lifted[2].kind else {
            panic!("expected a branch");
        };
        assert_eq!(arena.display(condition).to_string(), "eax <u 1");
    }

    #[test]
    fn mixed_producers_compose_per_flag() {
        // cmp eax, ebx; inc ecx; jbe +0
        // CF still comes from cmp, ZF now comes from inc
        let (arena, lifted) = lift_bytes(&[0x39, 0xD8, 0x41, 0x76, 0x00]);
        let IrKind::Branch { condition, .. } = lifted[2].kind else {
            panic!("expected a branch");
        };
        assert_eq!(
            arena.display(condition).to_string(),
            "(eax <u ebx) || (ecx == 0)"
        );
    }

    #[test]
    fn unknown_flags_are_opaque() {
        // jz +0 at block start
        let (arena, lifted) = lift_bytes(&[0x74, 0x00]);
        let IrKind::Branch { condition, .. } = lifted[0].kind else {
            panic!("expected a branch");
        };
        assert_eq!(arena.display(condition).to_string(), "ZF");

        // mul ecx; jo +0
        let (arena, lifted) = lift_bytes(&[0xF7, 0xE1, 0x70, 0x00]);
        let IrKind::Branch { condition, .. } = lifted[1].kind else {
            panic!("expected a branch");
        };
        assert_eq!(arena.display(condition).to_string(), "OF");
    }

    #[test]
    fn opaque_configuration() {
        let instructions = decode_stream(&mut Parser::new(&[0x83, 0xF8, 0x05, 0x7F, 0x00]), 0);
        let block = BasicBlock {
            address: 0,
            instructions,
            is_entry: true,
        };
        let mut arena = ExprArena::new();
        let lifted = Lifter::new(LifterConfig::opaque()).lift_block(&mut arena, &block);
        let IrKind::Branch { condition, .. } = lifted[1].kind else {
            panic!("expected a branch");
        };
        assert_eq!(arena.display(condition).to_string(), "!ZF && (SF == OF)");
    }

    #[test]
    fn condition_consumers() {
        // cmp eax, ecx; setl al; cmovb edx, ebx
        let text = rendered(&[0x39, 0xC8, 0x0F, 0x9C, 0xC0, 0x0F, 0x42, 0xD3]);
        assert_eq!(
            text,
            vec!["cmp eax, ecx", "al := eax < ecx", "edx := ebx if (eax <u ecx)"]
        );

        // stc; adc eax, 0
        let text = rendered(&[0xF9, 0x83, 0xD0, 0x00]);
        assert_eq!(text, vec!["stc", "eax := (eax + 0) + true"]);
    }

    #[test]
    fn loops_use_the_counter() {
        // dec eax; loopne -3; loop -5; jecxz -7
        let text = rendered(&[0x48, 0xE0, 0xFD, 0xE2, 0xFB, 0xE3, 0xF9]);
        assert_eq!(
            text,
            vec![
                "eax := eax - 1",
                "ecx := ecx - 1; if ((ecx != 0) && (eax != 0)) goto 0x1000",
                "ecx := ecx - 1; if (ecx != 0) goto 0x1000",
                "if (ecx == 0) goto 0x1000",
            ]
        );
    }

    #[test]
    fn stack_and_calls() {
        // push ebp; mov ebp, esp; pop ebp; call 0x1010; jmp eax
        let text = rendered(&[0x55, 0x89, 0xE5, 0x5D, 0xE8, 0x07, 0x00, 0x00, 0x00, 0xFF, 0xE0]);
        assert_eq!(
            text,
            vec![
                "push ebp",
                "ebp := esp",
                "ebp := pop",
                "call 0x1010",
                "goto eax",
            ]
        );
    }

    /// Conditions of every branch and loop in `code`, in order.
    fn conditions(code: &[u8]) -> Vec<String> {
        let (arena, lifted) = lift_bytes(code);
        lifted
            .iter()
            .filter_map(|ir| match ir.kind {
                IrKind::Branch { condition, .. } | IrKind::Loop { condition, .. } => {
                    Some(arena.display(condition).to_string())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn conditions_read_the_written_result() {
        // dec ecx; jnz -3
        assert_eq!(conditions(&[0x49, 0x75, 0xFD]), vec!["ecx != 0"]);
        // sub eax, 5; jz +0
        assert_eq!(conditions(&[0x83, 0xE8, 0x05, 0x74, 0x00]), vec!["eax == 0"]);
        // and eax, ebx; jz +0
        assert_eq!(conditions(&[0x21, 0xD8, 0x74, 0x00]), vec!["eax == 0"]);
        // neg edx; jb +0
        assert_eq!(conditions(&[0xF7, 0xDA, 0x72, 0x00]), vec!["edx != 0"]);
        // shl eax, 2; js +0
        assert_eq!(conditions(&[0xC1, 0xE0, 0x02, 0x78, 0x00]), vec!["eax < 0"]);
    }

    #[test]
    fn carry_needs_the_original_operands() {
        // sub eax, 5; jb +0
        assert_eq!(conditions(&[0x83, 0xE8, 0x05, 0x72, 0x00]), vec!["CF"]);
        // add eax, ebx; jb +0
        assert_eq!(conditions(&[0x01, 0xD8, 0x72, 0x00]), vec!["eax <u ebx"]);
        // add eax, eax; jb +0
        assert_eq!(conditions(&[0x01, 0xC0, 0x72, 0x00]), vec!["CF"]);
        // add eax, [eax]; jb +0
        assert_eq!(conditions(&[0x03, 0x00, 0x72, 0x00]), vec!["CF"]);
    }

    #[test]
    fn overwritten_operands_drop_the_producer() {
        // cmp eax, 1; mov eax, 7; jb +0
        assert_eq!(
            conditions(&[0x83, 0xF8, 0x01, 0xB8, 0x07, 0x00, 0x00, 0x00, 0x72, 0x00]),
            vec!["CF"]
        );
        // cmp eax, 1; mov al, 7; jz +0
        assert_eq!(conditions(&[0x83, 0xF8, 0x01, 0xB0, 0x07, 0x74, 0x00]), vec!["ZF"]);
        // sub eax, 5; xchg eax, ecx; jz +0
        assert_eq!(conditions(&[0x83, 0xE8, 0x05, 0x91, 0x74, 0x00]), vec!["ZF"]);
        // cmp dword [ebp-4], 0; mov dword [esi], 1; jz +0
        assert_eq!(
            conditions(&[
                0x83, 0x7D, 0xFC, 0x00, 0xC7, 0x06, 0x01, 0x00, 0x00, 0x00, 0x74, 0x00
            ]),
            vec!["ZF"]
        );
        // cmp eax, 1; call 0x1010; jz +0
        assert_eq!(
            conditions(&[0x83, 0xF8, 0x01, 0xE8, 0x08, 0x00, 0x00, 0x00, 0x74, 0x00]),
            vec!["ZF"]
        );
    }

    #[test]
    fn unrelated_writes_keep_the_producer() {
        // cmp dword [ebp-4], 0; mov ecx, 1; jz +0
        assert_eq!(
            conditions(&[0x83, 0x7D, 0xFC, 0x00, 0xB9, 0x01, 0x00, 0x00, 0x00, 0x74, 0x00]),
            vec!["dword [ebp - 4] == 0"]
        );
        // sub eax, 5; mov ecx, eax; clc; jz +0
        assert_eq!(
            conditions(&[0x83, 0xE8, 0x05, 0x89, 0xC1, 0xF8, 0x74, 0x00]),
            vec!["eax == 0"]
        );
    }

    #[test]
    fn loop_reads_flags_after_the_decrement() {
        // cmp ecx, eax; loope +0
        assert_eq!(
            conditions(&[0x39, 0xC1, 0xE1, 0x00]),
            vec!["(ecx != 0) && ZF"]
        );
        // cmp edx, eax; loope +0
        assert_eq!(
            conditions(&[0x39, 0xC2, 0xE1, 0x00]),
            vec!["(ecx != 0) && (edx == eax)"]
        );
    }

    #[test]
    fn string_compare_flags_are_opaque() {
        // cmpsb; jz +0
        assert_eq!(conditions(&[0xA6, 0x74, 0x00]), vec!["ZF"]);
    }

    #[test]
    fn lift_whole_function() {
        // 0x1000: cmp eax, 0; jz 0x100a; mov eax, 1; 0x100a: ret
        let code = [0x83, 0xF8, 0x00, 0x74, 0x05, 0xB8, 0x01, 0x00, 0x00, 0x00, 0xC3];
        let function = build_function(&code[..], 0x1000).unwrap();
        assert!(function.block(0x1005).is_some());

        let ir = lift_function(&function);
        assert_eq!(ir.entry(), 0x1000);
        assert_eq!(ir.block_count(), function.block_count());
        assert_eq!(ir.instruction_count(), function.instruction_count());

        let entry = ir.block(0x1000).unwrap();
        assert_eq!(entry[1].display(ir.arena()).to_string(), "if (eax == 0) goto 0x100a");
    }
}
