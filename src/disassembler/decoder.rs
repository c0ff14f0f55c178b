//! x86 instruction decoding.
//!
//! [`decode_instruction`] is strict: it either returns a complete instruction or an error
//! and leaves the cursor untouched. [`decode_instruction_lenient`] and [`decode_stream`]
//! never fail; undecodable bytes become a one byte [`Mnemonic::Unknown`] so that a linear
//! scan always makes progress.
//!
//! # Example: Decoding a Single Instruction
//!
//! ```rust
//! use x86scope::{disassembler::{decode_instruction, Mnemonic}, Parser};
//! let code = [0x8B, 0x45, 0xFC]; // mov eax, dword ptr [ebp-4]
//! let mut parser = Parser::new(&code);
//! let instr = decode_instruction(&mut parser, 0x1000)?;
//! assert_eq!(instr.mnemonic, Mnemonic::Mov);
//! assert_eq!(instr.to_string(), "mov eax, dword ptr [ebp-4]");
//! # Ok::<(), x86scope::Error>(())
//! ```
//!
//! # Example: Decoding a Stream of Instructions
//!
//! ```rust
//! use x86scope::{disassembler::decode_stream, Parser};
//! let code = [0x90, 0xC3]; // nop, ret
//! let mut parser = Parser::new(&code);
//! let instrs = decode_stream(&mut parser, 0x1000);
//! assert_eq!(instrs.len(), 2);
//! ```

use crate::{
    disassembler::{
        instruction::{Instruction, Mnemonic},
        prefix::{Prefixes, MAX_INSTRUCTION_LENGTH},
        registry::{DecodeContext, Lookup, OpcodeMap, Registry},
    },
    stream::Parser,
    Error, Result,
};

/// Decodes a single instruction at the current parser position.
///
/// Prefixes are consumed first, then the first registry handler accepting the opcode is
/// used to read the operands. Afterwards REP/REPNE turn string instructions into their
/// repeated forms and a segment override is attached to the memory operands that do not
/// already carry a fixed segment.
///
/// On success the parser is positioned after the instruction; on failure it is unchanged.
///
/// # Arguments
///
/// * `parser` - A parser positioned at the start of an instruction
/// * `address` - The absolute address of that position
///
/// # Errors
///
/// - [`Error::Truncated`] if the buffer ends before the instruction is complete
/// - [`Error::UnknownOpcode`] if no handler accepts the opcode, or the instruction would
///   exceed 15 bytes
/// - [`Error::Malformed`] if the encoding names a register that does not exist
pub fn decode_instruction(parser: &mut Parser, address: u32) -> Result<Instruction> {
    parser.transactional(|parser| {
        decode_at(parser, address).map_err(|error| match error {
            Error::OutOfBounds => Error::Truncated { address },
            other => other,
        })
    })
}

fn decode_at(parser: &mut Parser, address: u32) -> Result<Instruction> {
    let start = parser.pos();

    let mut prefixes = Prefixes::default();
    let mut byte = parser.read_le::<u8>()?;
    while prefixes.apply(byte) {
        if parser.pos() - start >= MAX_INSTRUCTION_LENGTH {
            return Err(Error::UnknownOpcode {
                address,
                opcode: byte,
            });
        }
        byte = parser.read_le::<u8>()?;
    }

    let (map, opcode) = if byte == 0x0F {
        (OpcodeMap::Extended, parser.read_le::<u8>()?)
    } else {
        (OpcodeMap::Primary, byte)
    };

    let next = parser.peek_byte().ok();
    let handler = match Registry::global().lookup(map, opcode, next, &prefixes) {
        Lookup::Found(handler) => handler,
        Lookup::NeedsMoreBytes => return Err(Error::Truncated { address }),
        Lookup::NotFound => return Err(Error::UnknownOpcode { address, opcode }),
    };

    let mut ctx = DecodeContext {
        parser,
        prefixes,
        address,
        start,
        opcode,
    };
    let mut operands = handler.decode_operands(&mut ctx)?;

    let size = ctx.consumed();
    if size > MAX_INSTRUCTION_LENGTH {
        return Err(Error::UnknownOpcode { address, opcode });
    }

    if let Some(segment) = prefixes.segment {
        for operand in &mut operands {
            if operand.is_memory() && operand.segment().is_none() {
                *operand = operand.with_segment(segment);
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    Ok(Instruction {
        address,
        mnemonic: apply_rep(handler.mnemonic_for(opcode), &prefixes),
        operands,
        size: size as u8,
        prefixes,
    })
}

/// Maps a string instruction to its repeated form under REP / REPNE.
///
/// `movs`, `stos` and `lods` do not test ZF, so both prefixes mean plain `rep`.
fn apply_rep(mnemonic: Mnemonic, prefixes: &Prefixes) -> Mnemonic {
    if prefixes.rep() {
        match mnemonic {
            Mnemonic::Movs => Mnemonic::RepMovs,
            Mnemonic::Stos => Mnemonic::RepStos,
            Mnemonic::Lods => Mnemonic::RepLods,
            Mnemonic::Cmps => Mnemonic::RepeCmps,
            Mnemonic::Scas => Mnemonic::RepeScas,
            other => other,
        }
    } else if prefixes.repne() {
        match mnemonic {
            Mnemonic::Movs => Mnemonic::RepMovs,
            Mnemonic::Stos => Mnemonic::RepStos,
            Mnemonic::Lods => Mnemonic::RepLods,
            Mnemonic::Cmps => Mnemonic::RepneCmps,
            Mnemonic::Scas => Mnemonic::RepneScas,
            other => other,
        }
    } else {
        mnemonic
    }
}

/// Decodes one instruction, substituting a one byte `unknown` instruction on failure.
///
/// The parser always advances by at least one byte if it had data left.
pub fn decode_instruction_lenient(parser: &mut Parser, address: u32) -> Instruction {
    match decode_instruction(parser, address) {
        Ok(instruction) => instruction,
        Err(error) => {
            tracing::debug!(address, %error, "substituting unknown instruction");
            // A failed decode leaves the cursor at the start of the instruction
            let _ = parser.advance_by(1);
            Instruction::unknown(address)
        }
    }
}

/// Decodes all instructions from the current position to the end of the buffer.
///
/// Decoding is linear: no control flow is followed, and every undecodable byte becomes a
/// one byte `unknown` instruction.
///
/// # Arguments
///
/// * `parser` - The parser to read from
/// * `address` - The absolute address of the current parser position
#[must_use]
pub fn decode_stream(parser: &mut Parser, address: u32) -> Vec<Instruction> {
    let mut current = address;
    let mut instructions = Vec::new();

    while parser.has_more_data() {
        let instruction = decode_instruction_lenient(parser, current);
        current = instruction.end();
        instructions.push(instruction);
    }

    instructions
}
