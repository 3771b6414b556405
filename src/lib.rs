//! Toolchain for a small stack machine.
//!
//! The [`machine`] module holds everything the three tools share: the
//! instruction table, the operand codec, the protected stack, the binary
//! program header, the assembler, the interpreter and the disassembler.
//! Each tool under `src/bin/` is a thin command-line front end over it.

pub mod machine;
pub mod utils;
