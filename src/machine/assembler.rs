//! Two-pass assembler.
//!
//! Converts mnemonic source into a binary [`Program`]. The first pass walks
//! every line only to learn label addresses; the second pass replays the same
//! lines with a complete [`LabelTable`] and keeps its output. Two passes are
//! enough because an instruction's encoded size depends only on its opcode,
//! never on its operand, so every offset learned in pass one is final.
//!
//! # Syntax
//!
//! ```text
//! # comment (only at the start of a line)
//! HERE loop
//!     PUSH [RAX + 1]
//!     JMPL loop
//! ```
//!
//! - One instruction per line: `MNEMONIC [operand]`, mnemonics are uppercase
//! - `HERE name` binds `name` to the offset of the next instruction
//! - Jump and call operands are either a label or a raw signed displacement
//! - `RGET`/`RSET` take a register name (`RCX`) or a register index
//! - Other operands follow the forms in [`operand`](super::operand)

use crate::machine::config::AssemblerConfig;
use crate::machine::errors::MachineError;
use crate::machine::isa::{Instruction, OperandKind};
use crate::machine::operand::{MAX_INDEX_OFFSET, MIN_INDEX_OFFSET, Operand};
use crate::machine::program::{HEADER_SIZE, Program};
use crate::utils::hash::hash_str;
use crate::utils::lines::{read_lines, trimmed_lines};
use crate::{status, warn};
use std::fmt;
use std::path::Path;

const COMMENT_CHAR: char = '#';
const LABEL_KEYWORD: &str = "HERE";

/// A label bound to an absolute program offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLabel {
    pub name_hash: u64,
    pub address: usize,
}

/// Fixed-capacity label store keyed by name hash.
///
/// Redefining a label moves it; only new names count against the capacity.
#[derive(Debug, Clone)]
pub struct LabelTable {
    labels: Vec<CodeLabel>,
    capacity: usize,
}

impl LabelTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            labels: Vec::new(),
            capacity,
        }
    }

    /// Binds `name` to `address`, replacing any earlier binding.
    pub fn define(&mut self, name: &str, address: usize) -> Result<(), MachineError> {
        let name_hash = hash_str(name);
        if let Some(label) = self.labels.iter_mut().find(|l| l.name_hash == name_hash) {
            label.address = address;
            return Ok(());
        }
        if self.labels.len() >= self.capacity {
            return Err(MachineError::LabelTableFull {
                capacity: self.capacity,
            });
        }
        self.labels.push(CodeLabel { name_hash, address });
        Ok(())
    }

    /// Returns the address bound to `name`, if any.
    pub fn get(&self, name: &str) -> Option<usize> {
        let name_hash = hash_str(name);
        self.labels
            .iter()
            .find(|l| l.name_hash == name_hash)
            .map(|l| l.address)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// One row of the human-readable listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub line: String,
    pub offset: usize,
    pub bytes: Vec<u8>,
}

impl fmt::Display for ListingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "| {:<36.36} | [0x{:08X}]", self.line, self.offset)?;
        for b in &self.bytes {
            write!(f, " {b:02X}")?;
        }
        Ok(())
    }
}

/// Result of a successful assembly.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub program: Program,
    /// Listing rows from the final pass.
    pub listing: Vec<ListingEntry>,
    /// Recoverable problems reported during the final pass.
    pub warnings: usize,
}

impl Assembly {
    /// Renders the listing file.
    pub fn listing_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.listing {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}

/// Assembler state for one run.
pub struct Assembler<'c> {
    config: &'c AssemblerConfig,
    labels: LabelTable,
    output: Vec<u8>,
    listing: Vec<ListingEntry>,
    final_pass: bool,
    warnings: usize,
    line_no: usize,
}

impl<'c> Assembler<'c> {
    pub fn new(config: &'c AssemblerConfig) -> Self {
        Self {
            config,
            labels: LabelTable::new(config.max_labels),
            output: Vec::new(),
            listing: Vec::new(),
            final_pass: false,
            warnings: 0,
            line_no: 0,
        }
    }

    /// Runs both passes over `lines` and returns the finished program.
    pub fn assemble<S: AsRef<str>>(mut self, lines: &[S]) -> Result<Assembly, MachineError> {
        self.run_pass(lines, false)?;
        self.run_pass(lines, true)?;
        status!(
            "{} bytes, {} labels, {} warnings",
            self.output.len(),
            self.labels.len(),
            self.warnings
        );
        Ok(Assembly {
            program: Program::from_body(&self.output),
            listing: self.listing,
            warnings: self.warnings,
        })
    }

    /// Runs one pass, discarding any output from an earlier pass.
    ///
    /// Labels survive between passes. Diagnostics are only reported when
    /// `final_pass` is set.
    pub fn run_pass<S: AsRef<str>>(
        &mut self,
        lines: &[S],
        final_pass: bool,
    ) -> Result<(), MachineError> {
        self.output.clear();
        self.listing.clear();
        self.warnings = 0;
        self.final_pass = final_pass;

        for (i, line) in lines.iter().enumerate() {
            self.line_no = i + 1;
            self.assemble_line(line.as_ref())?;
        }
        Ok(())
    }

    /// Bytes emitted by the most recent pass, without header.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// Absolute offset the next instruction will be written to.
    fn offset(&self) -> usize {
        HEADER_SIZE + self.output.len()
    }

    fn warn(&mut self, message: impl fmt::Display) {
        if self.final_pass {
            self.warnings += 1;
            warn!("line {}: {}", self.line_no, message);
        }
    }

    fn assemble_line(&mut self, raw: &str) -> Result<(), MachineError> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(COMMENT_CHAR) {
            return Ok(());
        }

        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map(|(w, r)| (w, r.trim_start()))
            .unwrap_or((line, ""));

        if word == LABEL_KEYWORD {
            let name = rest.split_whitespace().next().unwrap_or("");
            if name.is_empty() {
                self.warn(format_args!("{LABEL_KEYWORD} without a label name"));
                return Ok(());
            }
            let offset = self.offset();
            self.labels.define(name, offset)?;
            self.record(line, offset, Vec::new());
            return Ok(());
        }

        let Some(instr) = Instruction::from_mnemonic(word) else {
            self.warn(format_args!("unknown instruction '{word}', line skipped"));
            return Ok(());
        };

        let offset = self.offset();
        let bytes = self.encode(instr, rest, offset);

        let required = self.output.len() + bytes.len();
        if required > self.config.output_capacity {
            return Err(MachineError::OutputOverflow {
                required,
                capacity: self.config.output_capacity,
            });
        }
        self.output.extend_from_slice(&bytes);
        self.record(line, offset, bytes);
        Ok(())
    }

    fn record(&mut self, line: &str, offset: usize, bytes: Vec<u8>) {
        self.listing.push(ListingEntry {
            line: line.to_string(),
            offset,
            bytes,
        });
    }

    /// Encodes one instruction that starts at absolute `offset`.
    fn encode(&mut self, instr: Instruction, operand_text: &str, offset: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(instr.size());
        match instr.operand_kind() {
            None => {
                out.push(instr.encode_byte(0));
                if !operand_text.is_empty() && !operand_text.starts_with(COMMENT_CHAR) {
                    self.warn(format_args!(
                        "{} takes no operand, '{operand_text}' ignored",
                        instr.mnemonic()
                    ));
                }
            }
            Some(OperandKind::Addr) => {
                let operand = self.parse_addr(instr, operand_text);
                let (mode, payload) = operand.encode();
                out.push(instr.encode_byte(mode));
                out.extend_from_slice(&payload);
            }
            Some(OperandKind::Rel) => {
                let next = offset + instr.size();
                let displacement = self.parse_target(instr, operand_text, next);
                out.push(instr.encode_byte(0));
                out.extend_from_slice(&displacement.to_le_bytes());
            }
            Some(OperandKind::Reg) => {
                let index = self.parse_register(instr, operand_text);
                out.push(instr.encode_byte(0));
                out.extend_from_slice(&index.to_le_bytes());
            }
        }
        out
    }

    fn parse_addr(&mut self, instr: Instruction, text: &str) -> Operand {
        let Some((operand, used)) = Operand::parse_text(text) else {
            self.warn(format_args!(
                "{}: cannot parse operand '{text}', using 0",
                instr.mnemonic()
            ));
            return Operand::default();
        };

        let trailing = text[used..].trim_start();
        if !trailing.is_empty() && !trailing.starts_with(COMMENT_CHAR) {
            self.warn(format_args!(
                "{}: ignoring trailing text '{trailing}'",
                instr.mnemonic()
            ));
        }
        if let Operand::RegisterIndexed { offset, .. } = operand
            && !(MIN_INDEX_OFFSET..=MAX_INDEX_OFFSET).contains(&offset)
        {
            self.warn(format_args!(
                "{}: offset {offset} does not fit in 24 bits and will wrap",
                instr.mnemonic()
            ));
        }
        operand
    }

    /// Resolves a jump target to a displacement from `next`.
    fn parse_target(&mut self, instr: Instruction, text: &str, next: usize) -> i32 {
        let token = text.split_whitespace().next().unwrap_or("");
        if let Ok(displacement) = token.parse::<i32>() {
            return displacement;
        }
        if token.is_empty() {
            self.warn(format_args!("{} without a target", instr.mnemonic()));
            return 0;
        }

        match self.labels.get(token) {
            Some(address) => {
                let displacement = address as i64 - next as i64;
                if displacement == 0 {
                    self.warn(format_args!(
                        "{} {token} targets the next instruction; displacement 0 traps at runtime",
                        instr.mnemonic()
                    ));
                }
                displacement as i32
            }
            None => {
                self.warn(format_args!("undefined label '{token}'"));
                0
            }
        }
    }

    fn parse_register(&mut self, instr: Instruction, text: &str) -> i32 {
        let token = text.split_whitespace().next().unwrap_or("");
        if let Ok(index) = token.parse::<i32>() {
            return index;
        }
        match Operand::parse_text(token) {
            Some((Operand::Register(index), used)) if used == token.len() => index as i32,
            _ => {
                self.warn(format_args!(
                    "{}: expected a register, got '{token}', using 0",
                    instr.mnemonic()
                ));
                0
            }
        }
    }
}

/// Assembles source text held in memory.
pub fn assemble_source(source: &str, config: &AssemblerConfig) -> Result<Assembly, MachineError> {
    Assembler::new(config).assemble(&trimmed_lines(source))
}

/// Assembles a source file.
pub fn assemble_file(
    path: impl AsRef<Path>,
    config: &AssemblerConfig,
) -> Result<Assembly, MachineError> {
    let lines = read_lines(path)?;
    Assembler::new(config).assemble(&lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::operand::AddressingMode;

    fn assemble(source: &str) -> Assembly {
        assemble_source(source, &AssemblerConfig::default()).expect("assembly failed")
    }

    fn body(source: &str) -> Vec<u8> {
        assemble(source).program.body().to_vec()
    }

    fn op(instr: Instruction) -> u8 {
        instr.encode_byte(0)
    }

    // ==================== Label table ====================

    #[test]
    fn label_table_define_and_get() {
        let mut table = LabelTable::new(2);
        table.define("start", 16).unwrap();
        table.define("end", 40).unwrap();
        assert_eq!(table.get("start"), Some(16));
        assert_eq!(table.get("end"), Some(40));
        assert_eq!(table.get("middle"), None);
    }

    #[test]
    fn label_table_redefinition_updates() {
        let mut table = LabelTable::new(1);
        table.define("x", 16).unwrap();
        table.define("x", 21).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get("x"), Some(21));
    }

    #[test]
    fn label_table_full() {
        let mut table = LabelTable::new(1);
        table.define("a", 16).unwrap();
        assert!(matches!(
            table.define("b", 17),
            Err(MachineError::LabelTableFull { capacity: 1 })
        ));
    }

    #[test]
    fn too_many_labels_aborts_assembly() {
        let config = AssemblerConfig {
            max_labels: 2,
            ..AssemblerConfig::default()
        };
        let err = assemble_source("HERE a\nHERE b\nHERE c\nEND\n", &config).unwrap_err();
        assert!(matches!(err, MachineError::LabelTableFull { capacity: 2 }));
    }

    // ==================== Encoding ====================

    #[test]
    fn encodes_fixed_instructions() {
        assert_eq!(
            body("ADD\nSUB\nEND\n"),
            vec![op(Instruction::Add), op(Instruction::Sub), op(Instruction::End)]
        );
    }

    #[test]
    fn encodes_addressing_modes() {
        let bytes = body("PUSH 5\nPUSH [7]\nPUSH RBX\nMOVE [RCX - 1]\n");
        assert_eq!(&bytes[0..5], &[op(Instruction::Push), 5, 0, 0, 0]);
        assert_eq!(
            &bytes[5..10],
            &[Instruction::Push.encode_byte(AddressingMode::Memory as u8), 7, 0, 0, 0]
        );
        assert_eq!(
            &bytes[10..15],
            &[Instruction::Push.encode_byte(AddressingMode::Register as u8), 1, 0, 0, 0]
        );
        assert_eq!(
            &bytes[15..20],
            &[
                Instruction::Move.encode_byte(AddressingMode::RegisterIndexed as u8),
                2,
                0xFF,
                0xFF,
                0xFF
            ]
        );
    }

    #[test]
    fn encodes_legacy_register_forms() {
        let bytes = body("RGET RDX\nRSET 2\n");
        assert_eq!(&bytes[0..5], &[op(Instruction::Rget), 3, 0, 0, 0]);
        assert_eq!(&bytes[5..10], &[op(Instruction::Rset), 2, 0, 0, 0]);
    }

    #[test]
    fn raw_displacement() {
        let bytes = body("JMP -5\n");
        assert_eq!(bytes, [op(Instruction::Jmp), 0xFB, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let asm = assemble("# header\n\n   # indented comment\nEND\n");
        assert_eq!(asm.program.body(), &[op(Instruction::End)]);
        assert_eq!(asm.listing.len(), 1);
        assert_eq!(asm.warnings, 0);
    }

    #[test]
    fn trailing_comment_after_operand() {
        let asm = assemble("PUSH 65 # 'A'\n");
        assert_eq!(asm.program.body(), &[op(Instruction::Push), 65, 0, 0, 0]);
        assert_eq!(asm.warnings, 0);
    }

    #[test]
    fn unknown_mnemonic_is_skipped() {
        let asm = assemble("PUSH 1\nFROB 3\nEND\n");
        assert_eq!(asm.program.body().len(), 6);
        assert_eq!(asm.warnings, 1);
    }

    #[test]
    fn mnemonics_are_case_sensitive() {
        let asm = assemble("end\n");
        assert!(asm.program.is_empty());
        assert_eq!(asm.warnings, 1);
    }

    #[test]
    fn output_capacity_is_enforced() {
        let config = AssemblerConfig {
            output_capacity: 6,
            ..AssemblerConfig::default()
        };
        assert!(assemble_source("PUSH 1\nEND\n", &config).is_ok());
        let err = assemble_source("PUSH 1\nEND\nEND\n", &config).unwrap_err();
        assert!(matches!(
            err,
            MachineError::OutputOverflow {
                required: 7,
                capacity: 6
            }
        ));
    }

    // ==================== Labels ====================

    #[test]
    fn backward_label() {
        // HERE top = 16; JMP at 16, next = 21, displacement = -5
        let bytes = body("HERE top\nJMP top\n");
        assert_eq!(bytes, [op(Instruction::Jmp), 0xFB, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn forward_label_needs_second_pass() {
        let source = trimmed_lines("JMP skip\nPUSH 1\nOUT\nHERE skip\nPUSH 2\nOUT\nEND\n");
        let config = AssemblerConfig::default();

        let mut single = Assembler::new(&config);
        single.run_pass(&source, true).unwrap();
        let one_pass = single.output().to_vec();

        let two_pass = Assembler::new(&config).assemble(&source).unwrap();
        let two_pass = two_pass.program.body();

        assert_eq!(one_pass.len(), two_pass.len());
        assert_ne!(one_pass, two_pass);
        // JMP at 16, next at 21, skip at 16 + 5 + 5 + 1 = 27
        assert_eq!(&two_pass[0..5], &[op(Instruction::Jmp), 6, 0, 0, 0]);
        assert_eq!(&one_pass[0..5], &[op(Instruction::Jmp), 0, 0, 0, 0]);
    }

    #[test]
    fn backward_only_is_pass_independent() {
        let source = trimmed_lines("HERE a\nPUSH 1\nHERE b\nPOP\nJMP a\nJMPE b\nEND\n");
        let config = AssemblerConfig::default();

        let mut single = Assembler::new(&config);
        single.run_pass(&source, true).unwrap();

        let two_pass = Assembler::new(&config).assemble(&source).unwrap();
        assert_eq!(single.output(), two_pass.program.body());
    }

    #[test]
    fn label_offsets_include_header() {
        let config = AssemblerConfig::default();
        let mut asm = Assembler::new(&config);
        asm.run_pass(&["PUSH 1", "HERE after", "END"], false).unwrap();
        assert_eq!(asm.labels().get("after"), Some(HEADER_SIZE + 5));
    }

    #[test]
    fn undefined_label_encodes_zero_and_warns() {
        let asm = assemble("JMP nowhere\nEND\n");
        assert_eq!(&asm.program.body()[0..5], &[op(Instruction::Jmp), 0, 0, 0, 0]);
        assert_eq!(asm.warnings, 1);
    }

    #[test]
    fn jump_to_next_instruction_warns() {
        let asm = assemble("JMP next\nHERE next\nEND\n");
        assert_eq!(&asm.program.body()[1..5], &[0, 0, 0, 0]);
        assert_eq!(asm.warnings, 1);
    }

    #[test]
    fn label_redefinition_uses_last_address() {
        let bytes = body("JMP x\nHERE x\nPOP\nHERE x\nEND\n");
        // second definition at 16 + 5 + 1 = 22, next at 21
        assert_eq!(&bytes[0..5], &[op(Instruction::Jmp), 1, 0, 0, 0]);
    }

    // ==================== Listing ====================

    #[test]
    fn listing_rows() {
        let asm = assemble("PUSH 2\nHERE end\nEND\n");
        assert_eq!(asm.listing.len(), 3);
        assert_eq!(
            asm.listing[0].to_string(),
            format!("| {:<36} | [0x00000010] 08 02 00 00 00", "PUSH 2")
        );
        assert_eq!(asm.listing[1].offset, 0x15);
        assert!(asm.listing[1].bytes.is_empty());
        assert_eq!(asm.listing_text().lines().count(), 3);
    }

    #[test]
    fn listing_truncates_long_lines() {
        let entry = ListingEntry {
            line: "X".repeat(50),
            offset: 0,
            bytes: vec![],
        };
        assert_eq!(entry.to_string(), format!("| {} | [0x00000000]", "X".repeat(36)));
    }
}
