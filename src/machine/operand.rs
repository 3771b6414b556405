//! Operand codec shared by the assembler, interpreter and disassembler.
//!
//! An operand is a 4-byte little-endian payload plus a 2-bit
//! [`AddressingMode`] stored in the low bits of the opcode byte. Text forms:
//!
//! | Text          | Mode              | Payload                  |
//! |---------------|-------------------|--------------------------|
//! | `42`, `'a'`   | `Immediate`       | value                    |
//! | `[42]`        | `Memory`          | memory index             |
//! | `RCX`         | `Register`        | register index           |
//! | `[RCX - 4]`   | `RegisterIndexed` | `offset << 8 \| register` |
//!
//! Registers are named `RAX`..`RZX`, the middle letter selecting index 0..25.

use crate::machine::errors::MachineError;
use std::fmt;

/// Number of register names the text syntax can express.
pub const REGISTER_NAMES: usize = 26;

/// Smallest offset a register-indexed operand can carry (24-bit signed).
pub const MIN_INDEX_OFFSET: i32 = -(1 << 23);
/// Largest offset a register-indexed operand can carry.
pub const MAX_INDEX_OFFSET: i32 = (1 << 23) - 1;

const REGISTER_BIT: u8 = 0b01;
const MEMORY_BIT: u8 = 0b10;

/// The 2-bit usage tag merged into the opcode byte.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressingMode {
    Immediate = 0,
    Register = REGISTER_BIT,
    Memory = MEMORY_BIT,
    RegisterIndexed = REGISTER_BIT | MEMORY_BIT,
}

impl From<u8> for AddressingMode {
    /// Only the low two bits are significant, so every byte maps to a mode.
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => AddressingMode::Immediate,
            REGISTER_BIT => AddressingMode::Register,
            MEMORY_BIT => AddressingMode::Memory,
            _ => AddressingMode::RegisterIndexed,
        }
    }
}

/// A decoded operand.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    /// Value used as-is.
    Immediate(i32),
    /// Absolute index into flat memory.
    Memory(i32),
    /// Register index.
    Register(u8),
    /// Memory at `registers[register] + offset`.
    RegisterIndexed { register: u8, offset: i32 },
}

impl Default for Operand {
    fn default() -> Self {
        Operand::Immediate(0)
    }
}

impl Operand {
    /// Returns the addressing mode tag of this operand.
    pub const fn mode(&self) -> AddressingMode {
        match self {
            Operand::Immediate(_) => AddressingMode::Immediate,
            Operand::Memory(_) => AddressingMode::Memory,
            Operand::Register(_) => AddressingMode::Register,
            Operand::RegisterIndexed { .. } => AddressingMode::RegisterIndexed,
        }
    }

    /// Returns the 4-byte payload.
    pub const fn payload(&self) -> i32 {
        match *self {
            Operand::Immediate(v) | Operand::Memory(v) => v,
            Operand::Register(r) => r as i32,
            Operand::RegisterIndexed { register, offset } => {
                offset.wrapping_shl(8) | register as i32
            }
        }
    }

    /// Encodes the operand as `(mode tag, little-endian payload)`.
    pub const fn encode(&self) -> (u8, [u8; 4]) {
        (self.mode() as u8, self.payload().to_le_bytes())
    }

    /// Inverse of [`encode`](Self::encode).
    pub const fn decode_binary(mode: AddressingMode, payload: i32) -> Self {
        match mode {
            AddressingMode::Immediate => Operand::Immediate(payload),
            AddressingMode::Memory => Operand::Memory(payload),
            AddressingMode::Register => Operand::Register((payload & 0xFF) as u8),
            AddressingMode::RegisterIndexed => Operand::RegisterIndexed {
                register: (payload & 0xFF) as u8,
                offset: payload >> 8,
            },
        }
    }

    /// Parses operand text leniently. Unrecognised text yields `Immediate(0)`.
    pub fn decode_text(text: &str) -> Self {
        Self::parse_text(text).map(|(op, _)| op).unwrap_or_default()
    }

    /// Tries every text form and keeps the longest match.
    ///
    /// Returns the operand and the number of bytes it consumed, or `None` if
    /// no form matched. On equal lengths the earlier form wins, in this order:
    /// `[Rx ± N]`, `[Rx]`, `[N]`, `Rx`, `N`, `'c'`, `'\c'`.
    pub fn parse_text<'t>(text: &'t str) -> Option<(Self, usize)> {
        let forms: [fn(&mut Scanner<'t>) -> Option<Operand>; 7] = [
            Scanner::register_indexed,
            Scanner::register_deref,
            Scanner::memory,
            Scanner::register,
            Scanner::immediate,
            Scanner::char_literal,
            Scanner::escape_literal,
        ];

        let mut best: Option<(Operand, usize)> = None;
        for form in forms {
            let mut scanner = Scanner::new(text);
            if let Some(op) = form(&mut scanner)
                && best.is_none_or(|(_, len)| scanner.pos > len)
            {
                best = Some((op, scanner.pos));
            }
        }
        best
    }

    /// Returns the storage cell this operand names.
    ///
    /// Immediates are not addressable; callers that only read must branch on
    /// [`Operand::Immediate`] first.
    pub fn resolve<'a>(
        &self,
        registers: &'a mut [i32],
        memory: &'a mut [i32],
    ) -> Result<&'a mut i32, MachineError> {
        match *self {
            Operand::Immediate(value) => Err(MachineError::NotAddressable { value }),
            Operand::Memory(index) => memory_cell(memory, index as i64),
            Operand::Register(register) => {
                let available = registers.len();
                registers
                    .get_mut(register as usize)
                    .ok_or(MachineError::RegisterOutOfRange {
                        index: register as usize,
                        available,
                    })
            }
            Operand::RegisterIndexed { register, offset } => {
                let base = *registers.get(register as usize).ok_or(
                    MachineError::RegisterOutOfRange {
                        index: register as usize,
                        available: registers.len(),
                    },
                )?;
                memory_cell(memory, base as i64 + offset as i64)
            }
        }
    }

    /// Reads the operand's value: the immediate itself, or the resolved cell.
    pub fn read(&self, registers: &mut [i32], memory: &mut [i32]) -> Result<i32, MachineError> {
        match *self {
            Operand::Immediate(value) => Ok(value),
            _ => self.resolve(registers, memory).map(|cell| *cell),
        }
    }
}

fn memory_cell(memory: &mut [i32], index: i64) -> Result<&mut i32, MachineError> {
    let available = memory.len();
    usize::try_from(index)
        .ok()
        .and_then(|i| memory.get_mut(i))
        .ok_or(MachineError::MemoryOutOfRange { index, available })
}

/// Formats a register index as `RxX`, or as the bare index past `RZX`.
pub fn register_name(index: u8) -> String {
    if (index as usize) < REGISTER_NAMES {
        format!("R{}X", (b'A' + index) as char)
    } else {
        index.to_string()
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Operand::Immediate(value) => {
                write!(f, "{value}")?;
                if (0x20..=0x7e).contains(&value) {
                    write!(f, " # '{}'", value as u8 as char)?;
                }
                Ok(())
            }
            Operand::Memory(index) => write!(f, "[{index}]"),
            Operand::Register(register) => f.write_str(&register_name(register)),
            Operand::RegisterIndexed { register, offset } => {
                let name = register_name(register);
                if offset < 0 {
                    write!(f, "[{name} - {}]", (offset as i64).abs())
                } else {
                    write!(f, "[{name} + {offset}]")
                }
            }
        }
    }
}

/// Byte cursor implementing the small scanf-like grammar of operand text.
///
/// A space in a pattern matches any run of whitespace, as in `scanf`.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn literal(&mut self, expected: u8) -> Option<()> {
        (self.peek()? == expected).then(|| self.pos += 1)
    }

    fn any_byte(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    /// `R%cX`
    fn register_name(&mut self) -> Option<u8> {
        self.literal(b'R')?;
        let letter = self.any_byte()?;
        self.literal(b'X')?;
        letter.is_ascii_uppercase().then(|| letter - b'A')
    }

    /// ` %d`: optional sign then digits, wrapping on overflow.
    fn integer(&mut self) -> Option<i32> {
        self.skip_ws();
        let negative = match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                true
            }
            Some(b'+') => {
                self.pos += 1;
                false
            }
            _ => false,
        };
        let start = self.pos;
        let mut value: i32 = 0;
        while let Some(digit) = self.peek().filter(u8::is_ascii_digit) {
            value = value.wrapping_mul(10).wrapping_add((digit - b'0') as i32);
            self.pos += 1;
        }
        (self.pos > start).then(|| if negative { value.wrapping_neg() } else { value })
    }

    /// ` [ R%cX %c %d ]`
    fn register_indexed(&mut self) -> Option<Operand> {
        self.skip_ws();
        self.literal(b'[')?;
        self.skip_ws();
        let register = self.register_name()?;
        self.skip_ws();
        let sign = self.any_byte()?;
        let magnitude = self.integer()?;
        self.skip_ws();
        self.literal(b']')?;
        let offset = match sign {
            b'-' => magnitude.wrapping_neg(),
            b'+' => magnitude,
            _ => return None,
        };
        Some(Operand::RegisterIndexed { register, offset })
    }

    /// ` [ R%cX ]`
    fn register_deref(&mut self) -> Option<Operand> {
        self.skip_ws();
        self.literal(b'[')?;
        self.skip_ws();
        let register = self.register_name()?;
        self.skip_ws();
        self.literal(b']')?;
        Some(Operand::RegisterIndexed {
            register,
            offset: 0,
        })
    }

    /// ` [ %d ]`
    fn memory(&mut self) -> Option<Operand> {
        self.skip_ws();
        self.literal(b'[')?;
        let index = self.integer()?;
        self.skip_ws();
        self.literal(b']')?;
        Some(Operand::Memory(index))
    }

    /// ` R%cX`
    fn register(&mut self) -> Option<Operand> {
        self.skip_ws();
        self.register_name().map(Operand::Register)
    }

    /// ` %d`
    fn immediate(&mut self) -> Option<Operand> {
        self.integer().map(Operand::Immediate)
    }

    /// ` '%c'`
    fn char_literal(&mut self) -> Option<Operand> {
        self.skip_ws();
        self.literal(b'\'')?;
        let c = self.any_byte()?;
        self.literal(b'\'')?;
        Some(Operand::Immediate(c as i32))
    }

    /// ` '\%c'`
    fn escape_literal(&mut self) -> Option<Operand> {
        self.skip_ws();
        self.literal(b'\'')?;
        self.literal(b'\\')?;
        let c = self.any_byte()?;
        self.literal(b'\'')?;
        let value = match c {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'v' => 0x0B,
            b'a' => 0x07,
            b'f' => 0x0C,
            other => other,
        };
        Some(Operand::Immediate(value as i32))
    }
}
