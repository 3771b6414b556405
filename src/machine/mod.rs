//! Stack machine shared by the assembler, processor and disassembler.
//!
//! # Architecture
//!
//! - **Operand stack**: [`stack::ProtectedStack`] of 64-bit words, checked for
//!   corruption before every instruction
//! - **Call stack**: a second protected stack holding return addresses
//! - **Registers**: `RAX`..`RZX` by name, sized at run time
//! - **Memory**: flat `i32` cells; cells 0..4 describe the machine
//! - **Video**: `width * height` brightness cells rendered as ASCII art
//! - **Instruction format**: one byte `opcode << 2 | mode`, then an optional
//!   4-byte little-endian operand
//!
//! # Modules
//!
//! - [`assembler`]: two-pass assembly and listing generation
//! - [`config`]: run configuration for the assembler and the interpreter
//! - [`disasm`]: binary to text
//! - [`errors`]: every fatal condition the tools report
//! - [`isa`]: instruction set definition and opcode mappings
//! - [`operand`]: addressing modes and the operand codec
//! - [`program`]: binary header and bounds-checked byte cursor
//! - [`stack`]: self-verifying stack
//! - [`vm`]: the interpreter

pub mod assembler;
pub mod config;
pub mod disasm;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod operand;
pub mod program;
pub mod stack;
pub mod vm;
