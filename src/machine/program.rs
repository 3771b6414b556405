//! Binary program format.
//!
//! ```text
//! [ "SPUB" ][ version: u32 LE ][ zero padding ... ][ instruction stream ]
//! |<------------------ HEADER_SIZE ------------->|
//! ```
//!
//! Offsets inside a program (labels, return addresses, the instruction
//! pointer) are measured from the start of the file, so the first
//! instruction lives at [`HEADER_SIZE`].

use crate::machine::errors::MachineError;
use crate::machine::isa::OPERAND_SIZE;
use std::fs;
use std::path::Path;

/// Magic bytes identifying an assembled program.
pub const MAGIC: [u8; 4] = *b"SPUB";

/// Current binary format version. Readers accept anything up to this.
pub const VERSION: u32 = 3;

/// Size of the fixed header, including padding.
pub const HEADER_SIZE: usize = 16;

const VERSION_OFFSET: usize = MAGIC.len();

/// Builds the fixed header for the current version.
pub fn header() -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    out[..MAGIC.len()].copy_from_slice(&MAGIC);
    out[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&VERSION.to_le_bytes());
    out
}

/// A loaded or freshly assembled program: the whole file, header included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    /// Version recorded in the header.
    pub version: u32,
    data: Vec<u8>,
}

impl Program {
    /// Wraps an instruction stream in a current-version header.
    pub fn from_body(body: &[u8]) -> Self {
        let mut data = Vec::with_capacity(HEADER_SIZE + body.len());
        data.extend_from_slice(&header());
        data.extend_from_slice(body);
        Self {
            version: VERSION,
            data,
        }
    }

    /// Validates the header and takes ownership of the file contents.
    ///
    /// Rejects short files, a wrong magic prefix, and versions newer than
    /// [`VERSION`]. Older versions are accepted.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, MachineError> {
        if data.len() < HEADER_SIZE {
            return Err(MachineError::TruncatedHeader {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }

        let mut found = [0u8; 4];
        found.copy_from_slice(&data[..MAGIC.len()]);
        if found != MAGIC {
            return Err(MachineError::BadMagic {
                found,
                expected: MAGIC,
            });
        }

        let mut version = [0u8; 4];
        version.copy_from_slice(&data[VERSION_OFFSET..VERSION_OFFSET + 4]);
        let version = u32::from_le_bytes(version);
        if version > VERSION {
            return Err(MachineError::UnsupportedVersion {
                found: version,
                supported: VERSION,
            });
        }

        Ok(Self { version, data })
    }

    /// Reads and validates a program file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MachineError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| MachineError::io(path, e))?;
        Self::from_bytes(data)
    }

    /// Writes the program (header and body) to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MachineError> {
        let path = path.as_ref();
        fs::write(path, &self.data).map_err(|e| MachineError::io(path, e))
    }

    /// The whole file, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// The instruction stream after the header.
    pub fn body(&self) -> &[u8] {
        &self.data[HEADER_SIZE..]
    }

    /// Offset of the first instruction.
    pub const fn entry(&self) -> usize {
        HEADER_SIZE
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the program has no instructions.
    pub fn is_empty(&self) -> bool {
        self.data.len() <= HEADER_SIZE
    }
}

/// Bounds-checked reader over program bytes.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Reads exactly `count` bytes and advances past them.
    pub fn read_exact(&mut self, count: usize) -> Result<&'a [u8], MachineError> {
        let start = self.pos;
        let available = self.data.len().saturating_sub(start);
        let slice = start
            .checked_add(count)
            .and_then(|end| self.data.get(start..end))
            .ok_or(MachineError::UnexpectedEndOfBytecode {
                ip: start,
                requested: count,
                available,
            })?;
        self.pos += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, MachineError> {
        Ok(self.read_exact(1)?[0])
    }

    /// Reads a little-endian operand payload.
    pub fn read_i32(&mut self) -> Result<i32, MachineError> {
        let bytes = self.read_exact(OPERAND_SIZE)?;
        let mut buf = [0u8; OPERAND_SIZE];
        buf.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let h = header();
        assert_eq!(&h[..4], b"SPUB");
        assert_eq!(&h[4..8], &VERSION.to_le_bytes());
        assert!(h[8..].iter().all(|b| *b == 0));
    }

    #[test]
    fn from_body_prepends_header() {
        let program = Program::from_body(&[1, 2, 3]);
        assert_eq!(program.len(), HEADER_SIZE + 3);
        assert_eq!(program.body(), &[1, 2, 3]);
        assert_eq!(program.entry(), HEADER_SIZE);
        let reloaded = Program::from_bytes(program.as_bytes().to_vec()).unwrap();
        assert_eq!(reloaded, program);
    }

    #[test]
    fn rejects_truncated() {
        assert!(matches!(
            Program::from_bytes(b"SPUB".to_vec()),
            Err(MachineError::TruncatedHeader {
                expected: HEADER_SIZE,
                actual: 4
            })
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut data = header().to_vec();
        data[0] = b'X';
        assert!(matches!(
            Program::from_bytes(data),
            Err(MachineError::BadMagic { .. })
        ));
    }

    #[test]
    fn version_ceiling() {
        let mut data = header().to_vec();
        data[4..8].copy_from_slice(&(VERSION + 1).to_le_bytes());
        assert!(matches!(
            Program::from_bytes(data),
            Err(MachineError::UnsupportedVersion { found, supported })
                if found == VERSION + 1 && supported == VERSION
        ));

        let mut data = header().to_vec();
        data[4..8].copy_from_slice(&1u32.to_le_bytes());
        assert_eq!(Program::from_bytes(data).unwrap().version, 1);
    }

    #[test]
    fn cursor_checked_reads() {
        let data = [7u8, 0x2A, 0, 0, 0, 0xFF];
        let mut cursor = ByteCursor::new(&data, 0);
        assert_eq!(cursor.read_u8().unwrap(), 7);
        assert_eq!(cursor.read_i32().unwrap(), 42);
        assert_eq!(cursor.position(), 5);
        assert!(matches!(
            cursor.read_i32(),
            Err(MachineError::UnexpectedEndOfBytecode {
                ip: 5,
                requested: 4,
                available: 1
            })
        ));
        assert_eq!(cursor.position(), 5);
        assert_eq!(cursor.read_u8().unwrap(), 0xFF);
        assert!(cursor.is_at_end());
    }
}
