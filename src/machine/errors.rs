use crate::machine::stack::StackStatus;
use thiserror::Error;

/// Errors raised by the assembler, interpreter and disassembler.
///
/// Every variant is fatal except where the assembler explicitly downgrades a
/// condition to a warning (unknown mnemonics, undefined labels).
#[derive(Debug, Error)]
pub enum MachineError {
    /// Bad or missing command-line input.
    #[error("usage: {reason}")]
    Usage { reason: String },

    // ==================== Format ====================
    /// File is shorter than the fixed binary header.
    #[error("truncated header: need {expected} bytes, file has {actual}")]
    TruncatedHeader { expected: usize, actual: usize },
    /// File does not start with the expected magic prefix.
    #[error("bad magic {found:02X?}, expected {expected:02X?}")]
    BadMagic { found: [u8; 4], expected: [u8; 4] },
    /// File was produced by a newer toolchain.
    #[error("unsupported binary version {found} (this tool reads up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    // ==================== Resource ====================
    /// File open/read/write failure.
    #[error("io error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Output stream (console or file) failed mid-run.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
    /// Reading the IN stream failed, including input that is not UTF-8.
    #[error("input error: {0}")]
    Input(#[source] std::io::Error),
    /// A machine size is beyond what the machine can address.
    #[error("{what} exceeds the limit of {limit}")]
    ConfigTooLarge { what: &'static str, limit: usize },
    /// The allocator refused a buffer of the requested size.
    #[error("cannot allocate {cells} cells for {what}")]
    Allocation { what: &'static str, cells: usize },
    /// Assembled program outgrew the configured output buffer.
    #[error("output buffer overflow: {required} bytes needed, capacity is {capacity}")]
    OutputOverflow { required: usize, capacity: usize },
    /// More distinct labels than the configured maximum.
    #[error("label table is full ({capacity} labels)")]
    LabelTableFull { capacity: usize },

    // ==================== Corruption ====================
    /// A protected stack failed its canary or hash check.
    #[error("{stack} stack corrupted: {status}")]
    StackCorrupted {
        stack: &'static str,
        status: StackStatus,
    },

    // ==================== Underflow ====================
    /// Instruction needed more values than the operand stack holds.
    #[error("{instruction} at offset {offset:#x}: stack underflow")]
    StackUnderflow {
        instruction: &'static str,
        offset: usize,
    },
    /// RET with an empty call stack.
    #[error("RET at offset {offset:#x} without matching CALL")]
    ReturnWithoutCall { offset: usize },
    /// CALL nested deeper than the call stack allows.
    #[error("CALL at offset {offset:#x}: call depth {depth} exceeds limit")]
    CallStackOverflow { offset: usize, depth: usize },

    // ==================== Bounds ====================
    /// Register index outside the register file.
    #[error("register index {index} out of range ({available} registers)")]
    RegisterOutOfRange { index: usize, available: usize },
    /// Memory index outside the flat memory segment.
    #[error("memory index {index} out of range ({available} cells)")]
    MemoryOutOfRange { index: i64, available: usize },
    /// Video cell index outside the framebuffer.
    #[error("video index {index} out of range ({available} cells)")]
    VideoOutOfRange { index: i64, available: usize },
    /// Immediate operand used where a storage location is required.
    #[error("immediate operand {value} is not addressable")]
    NotAddressable { value: i32 },
    /// Jump landed outside the program body.
    #[error("instruction pointer {ip} out of range after instruction at {from:#x}")]
    InstructionPointerOutOfRange { ip: i64, from: usize },
    /// Bytecode ended in the middle of an instruction.
    #[error("unexpected end of bytecode at {ip:#x}: requested {requested} bytes, {available} available")]
    UnexpectedEndOfBytecode {
        ip: usize,
        requested: usize,
        available: usize,
    },

    // ==================== Decoding ====================
    /// Opcode byte matches no instruction.
    #[error("invalid instruction {opcode:#04x} at offset {offset:#x}")]
    InvalidInstruction { opcode: u8, offset: usize },
    /// Addressing-mode bits set on an instruction that takes no operand mode.
    #[error("{instruction} at offset {offset:#x} does not accept addressing mode {mode}")]
    InvalidAddressingMode {
        instruction: &'static str,
        mode: u8,
        offset: usize,
    },
    /// Jump or call with the reserved zero displacement.
    #[error("{instruction} at offset {offset:#x} has an unresolved (zero) displacement")]
    UnresolvedJump {
        instruction: &'static str,
        offset: usize,
    },

    // ==================== Runtime ====================
    /// DIV with a zero divisor.
    #[error("division by zero at offset {offset:#x}")]
    DivisionByZero { offset: usize },
    /// Program executed ABORT.
    #[error("program aborted at offset {offset:#x}")]
    Aborted { offset: usize },
    /// IN could not read an integer.
    #[error("invalid input {text:?}: expected an integer")]
    InvalidInput { text: String },
}

impl MachineError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        MachineError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_offsets() {
        let err = MachineError::InvalidInstruction {
            opcode: 0xFC,
            offset: 0x14,
        };
        assert_eq!(err.to_string(), "invalid instruction 0xfc at offset 0x14");

        let err = MachineError::StackUnderflow {
            instruction: "ADD",
            offset: 0x10,
        };
        assert_eq!(err.to_string(), "ADD at offset 0x10: stack underflow");
    }

    #[test]
    fn io_error_names_the_path() {
        let err = MachineError::io(
            "missing.asm",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert_eq!(err.to_string(), "io error on 'missing.asm': no such file");
    }
}
