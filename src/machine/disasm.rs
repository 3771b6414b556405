//! Disassembler.
//!
//! Walks the instruction stream the same way the interpreter does, but
//! prints each instruction instead of executing it. The output reassembles
//! to the same bytes: jump targets come out as raw displacements and legacy
//! register operands as register names.

use crate::machine::errors::MachineError;
use crate::machine::isa::{Instruction, OperandKind};
use crate::machine::operand::{AddressingMode, Operand, register_name};
use crate::machine::program::{ByteCursor, Program};
use crate::status;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Version printed in the disassembly header.
pub const DISASSEMBLER_VERSION: u32 = 3;

/// Writes the text form of `program` to `out`.
///
/// Stops at the end of the stream. An unknown opcode, mode bits on an
/// instruction that takes none, or an operand cut off by the end of the file
/// is an error.
pub fn disassemble<W: Write>(program: &Program, out: &mut W) -> Result<(), MachineError> {
    writeln!(out, "# Binary file version: {}", program.version)?;
    writeln!(out, "# Disassembler version: {DISASSEMBLER_VERSION}")?;
    writeln!(out)?;

    let mut cursor = ByteCursor::new(program.as_bytes(), program.entry());
    while !cursor.is_at_end() {
        let offset = cursor.position();
        let byte = cursor.read_u8()?;
        let (opcode, mode) = Instruction::split_byte(byte);
        let instr = Instruction::try_from(opcode)
            .map_err(|_| MachineError::InvalidInstruction { opcode: byte, offset })?;

        if mode != 0 && instr.operand_kind() != Some(OperandKind::Addr) {
            return Err(MachineError::InvalidAddressingMode {
                instruction: instr.mnemonic(),
                mode,
                offset,
            });
        }

        match instr.operand_kind() {
            Some(OperandKind::Addr) => {
                let operand = Operand::decode_binary(AddressingMode::from(mode), cursor.read_i32()?);
                writeln!(out, "{} {operand}", instr.mnemonic())?;
            }
            Some(OperandKind::Rel) => {
                writeln!(out, "{} {}", instr.mnemonic(), cursor.read_i32()?)?;
            }
            Some(OperandKind::Reg) => {
                writeln!(out, "{} {}", instr.mnemonic(), register_text(cursor.read_i32()?))?;
            }
            None => writeln!(out, "{}", instr.mnemonic())?,
        }
        status!("{offset:#06x} {}", instr.mnemonic());
    }
    Ok(())
}

/// Register name when one exists, otherwise the raw index.
fn register_text(index: i32) -> String {
    u8::try_from(index)
        .map(register_name)
        .unwrap_or_else(|_| index.to_string())
}

/// Disassembles into a string.
pub fn disassemble_to_string(program: &Program) -> Result<String, MachineError> {
    let mut out = Vec::new();
    disassemble(program, &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Loads `input`, validates its header and writes the listing to `output`.
pub fn disassemble_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<(), MachineError> {
    let program = Program::load(input)?;
    let output = output.as_ref();
    let file = File::create(output).map_err(|e| MachineError::io(output, e))?;
    let mut writer = BufWriter::new(file);
    disassemble(&program, &mut writer)?;
    writer.flush().map_err(|e| MachineError::io(output, e))
}
