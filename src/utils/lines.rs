//! Line-oriented text input.

use crate::machine::errors::MachineError;
use std::fs;
use std::path::Path;

/// Splits `text` into lines with surrounding whitespace removed.
///
/// Blank lines are kept so that positions stay meaningful for diagnostics.
pub fn trimmed_lines(text: &str) -> Vec<String> {
    text.lines().map(|line| line.trim().to_string()).collect()
}

/// Reads a whole file and returns its trimmed lines.
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>, MachineError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| MachineError::io(path, e))?;
    Ok(trimmed_lines(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_keeps_blank_lines() {
        let lines = trimmed_lines("  PUSH 1  \r\n\n\tOUT\n");
        assert_eq!(lines, vec!["PUSH 1", "", "OUT"]);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_lines("/definitely/not/here.asm").unwrap_err();
        assert!(matches!(err, MachineError::Io { ref path, .. } if path.ends_with("here.asm")));
    }
}
