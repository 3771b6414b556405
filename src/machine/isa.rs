//! Instruction Set Architecture (ISA) definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction list and invokes a callback macro for code
//! generation, so the assembler, the interpreter, the disassembler and the
//! ISA fingerprint test all expand the same table.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding opcodes
//! - mnemonic, operand kind, stack arity and encoded size accessors
//!
//! # Bytecode Format
//!
//! Every instruction starts with one byte `opcode << 2 | mode`. The low two
//! bits carry the [`AddressingMode`](super::operand::AddressingMode) for
//! instructions whose operand kind is [`OperandKind::Addr`] and are zero for
//! everything else. Instructions with an operand follow it with a 4-byte
//! little-endian payload:
//! - `Addr`: immediate, memory index, register index or register+offset
//! - `Rel`: signed displacement from the next instruction
//! - `Reg`: legacy register index

use crate::machine::errors::MachineError;
use crate::utils::hash::hash_str;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Width of an encoded operand payload in bytes.
pub const OPERAND_SIZE: usize = 4;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry reads `Name = opcode, "MNEMONIC" => [operand], stack_inputs`,
/// where `stack_inputs` is how many operand-stack values the instruction
/// needs before it may run.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Control
            // =========================
            /// END ; halt normally
            End = 0, "END" => [], 0,
            /// ABORT ; halt with failure status
            Abort = 1, "ABORT" => [], 0,
            // =========================
            // Stack
            // =========================
            /// PUSH src ; push an immediate or the value stored at src
            Push = 2, "PUSH" => [src: Addr], 0,
            /// POP ; discard the top value
            Pop = 3, "POP" => [], 1,
            /// DUP ; push a copy of the top value
            Dup = 4, "DUP" => [], 1,
            /// MOVE dst ; pop the top value into dst
            Move = 5, "MOVE" => [dst: Addr], 1,
            // =========================
            // Arithmetic
            // =========================
            /// ADD ; a + b where b is the top value
            Add = 6, "ADD" => [], 2,
            /// SUB ; a - b
            Sub = 7, "SUB" => [], 2,
            /// MUL ; a * b
            Mul = 8, "MUL" => [], 2,
            /// DIV ; a / b (trap on division by zero)
            Div = 9, "DIV" => [], 2,
            // =========================
            // Control Flow
            // =========================
            /// JMP target ; unconditional jump
            Jmp = 10, "JMP" => [target: Rel], 0,
            /// JMPG target ; jump if a > b where a is the top value
            Jmpg = 11, "JMPG" => [target: Rel], 2,
            /// JMPL target ; jump if a < b
            Jmpl = 12, "JMPL" => [target: Rel], 2,
            /// JMPE target ; jump if a == b
            Jmpe = 13, "JMPE" => [target: Rel], 2,
            /// JMPGE target ; jump if a >= b
            Jmpge = 14, "JMPGE" => [target: Rel], 2,
            /// JMPLE target ; jump if a <= b
            Jmple = 15, "JMPLE" => [target: Rel], 2,
            /// CALL target ; push the return address on the call stack and jump
            Call = 16, "CALL" => [target: Rel], 0,
            /// RET ; jump to the address popped from the call stack
            Ret = 17, "RET" => [], 0,
            // =========================
            // Legacy register access
            // =========================
            /// RGET reg ; push the register value
            Rget = 18, "RGET" => [reg: Reg], 0,
            /// RSET reg ; copy the top value into the register
            Rset = 19, "RSET" => [reg: Reg], 1,
            // =========================
            // Console
            // =========================
            /// OUT ; print the top value as an integer
            Out = 20, "OUT" => [], 1,
            /// OUTC ; print the top value as a character
            Outc = 21, "OUTC" => [], 1,
            /// IN ; read an integer and push it
            In = 22, "IN" => [], 0,
            // =========================
            // Video and memory
            // =========================
            /// VSET ; pop key, store the top value at video[key]
            Vset = 23, "VSET" => [], 2,
            /// VGET ; pop key, push video[key]
            Vget = 24, "VGET" => [], 1,
            /// MSET ; pop key, store the top value at memory[key]
            Mset = 25, "MSET" => [], 2,
            /// MGET ; pop key, push memory[key]
            Mget = 26, "MGET" => [], 1,
            /// CCLR ; clear the terminal
            Cclr = 27, "CCLR" => [], 0,
            /// DRAW ; render video memory as ASCII art
            Draw = 28, "DRAW" => [], 0,
        }
    };
}

/// How the 4-byte payload following an opcode is interpreted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// Addressing-mode operand; the mode lives in the opcode byte.
    Addr,
    /// Signed displacement relative to the next instruction.
    Rel,
    /// Plain register index.
    Reg,
}

#[macro_export]
macro_rules! define_instructions {
    // ---------- operand kinds ----------
    (@kind) => { None };
    (@kind $kind:ident) => { Some($crate::machine::isa::OperandKind::$kind) };

    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $inputs:expr
        ),* $(,)?
    ) => {
        // =========================
        // Instruction enum
        // =========================
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = MachineError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(MachineError::InvalidInstruction {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction in opcode order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Returns the operand kind, or `None` for instructions without an operand.
            pub const fn operand_kind(&self) -> Option<OperandKind> {
                match self {
                    $( Instruction::$name => $crate::define_instructions!(@kind $($kind)*), )*
                }
            }

            /// Returns how many operand-stack values must be present before execution.
            pub const fn stack_inputs(&self) -> usize {
                match self {
                    $( Instruction::$name => $inputs, )*
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Returns the opcode number.
    pub const fn opcode(&self) -> u8 {
        *self as u8
    }

    /// Builds the leading instruction byte from this opcode and a mode tag.
    pub const fn encode_byte(&self, mode: u8) -> u8 {
        (self.opcode() << 2) | (mode & 0b11)
    }

    /// Splits an instruction byte into opcode number and mode tag.
    pub const fn split_byte(byte: u8) -> (u8, u8) {
        (byte >> 2, byte & 0b11)
    }

    /// Encoded length in bytes. Depends only on the opcode.
    pub const fn size(&self) -> usize {
        match self.operand_kind() {
            Some(_) => 1 + OPERAND_SIZE,
            None => 1,
        }
    }

    /// True for jumps and calls that take a displacement.
    pub const fn is_branch(&self) -> bool {
        matches!(self.operand_kind(), Some(OperandKind::Rel))
    }

    /// Looks up an instruction by its exact (case-sensitive) mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Instruction> {
        static BY_NAME: OnceLock<HashMap<u64, Instruction>> = OnceLock::new();
        let table = BY_NAME.get_or_init(|| {
            Instruction::ALL
                .iter()
                .map(|instr| (hash_str(instr.mnemonic()), *instr))
                .collect()
        });
        table
            .get(&hash_str(mnemonic))
            .copied()
            .filter(|instr| instr.mnemonic() == mnemonic)
    }
}
