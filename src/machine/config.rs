//! Run configuration, built once from command-line flags and passed by reference.

use crate::machine::errors::MachineError;

/// Largest cell count an `i32` key can address.
pub const MAX_CELLS: usize = i32::MAX as usize;

/// Largest initial capacity accepted for either protected stack.
pub const MAX_STACK_CAPACITY: usize = 1 << 24;

/// Limits for one assembler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Most distinct labels a program may define.
    pub max_labels: usize,
    /// Largest program body, in bytes, the assembler will emit.
    pub output_capacity: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_labels: 1024,
            output_capacity: 0xFFFF,
        }
    }
}

/// Machine sizing for one interpreter run. None of it is stored in the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineConfig {
    pub registers: usize,
    pub ram_size: usize,
    pub video_width: usize,
    pub video_height: usize,
    /// Initial operand stack capacity. The stack grows past it on demand.
    pub stack_capacity: usize,
    /// Initial call stack capacity.
    pub call_stack_capacity: usize,
    /// Deepest CALL nesting before the program is stopped.
    pub max_call_depth: usize,
}

impl MachineConfig {
    /// Number of video cells, or `None` when `width * height` overflows.
    pub const fn video_cells(&self) -> Option<usize> {
        self.video_width.checked_mul(self.video_height)
    }

    /// Rejects sizes the machine cannot address.
    pub fn validate(&self) -> Result<(), MachineError> {
        let limits = [
            ("register count", Some(self.registers), MAX_CELLS),
            ("ram size", Some(self.ram_size), MAX_CELLS),
            ("video width", Some(self.video_width), MAX_CELLS),
            ("video height", Some(self.video_height), MAX_CELLS),
            ("video cell count", self.video_cells(), MAX_CELLS),
            ("stack capacity", Some(self.stack_capacity), MAX_STACK_CAPACITY),
            ("call stack capacity", Some(self.call_stack_capacity), MAX_STACK_CAPACITY),
        ];
        for (what, value, limit) in limits {
            match value {
                Some(value) if value <= limit => {}
                _ => return Err(MachineError::ConfigTooLarge { what, limit }),
            }
        }
        Ok(())
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            registers: 26,
            ram_size: 1024,
            video_width: 64,
            video_height: 32,
            stack_capacity: 1024,
            call_stack_capacity: 16,
            max_call_depth: 1 << 16,
        }
    }
}
