use super::zeroed;
use crate::machine::config::MAX_CELLS;
use crate::machine::errors::MachineError;
use std::io::{self, Write};

/// Characters ordered from darkest to brightest.
pub const PALETTE: &[u8] = br#" .'`^",:;Il!i><~+_-?][}{1)(|\/tfjrxnuvczXYUJCLQ0OZmwqpdbkhao*#MW&8%B@$"#;

/// ANSI sequence that clears the terminal and homes the cursor.
pub const CLEAR_SCREEN: &[u8] = b"\x1b[2J\x1b[H";

/// Framebuffer of brightness values, row-major.
pub struct Video {
    width: usize,
    cells: Vec<i32>,
}

impl Video {
    pub fn new(width: usize, height: usize) -> Result<Self, MachineError> {
        let count = width
            .checked_mul(height)
            .ok_or(MachineError::ConfigTooLarge {
                what: "video cell count",
                limit: MAX_CELLS,
            })?;
        Ok(Self {
            width,
            cells: zeroed("video", count)?,
        })
    }

    pub fn cells(&self) -> &[i32] {
        &self.cells
    }

    fn index(&self, key: i32) -> Result<usize, MachineError> {
        usize::try_from(key)
            .ok()
            .filter(|i| *i < self.cells.len())
            .ok_or(MachineError::VideoOutOfRange {
                index: key as i64,
                available: self.cells.len(),
            })
    }

    pub fn get(&self, key: i32) -> Result<i32, MachineError> {
        Ok(self.cells[self.index(key)?])
    }

    pub fn set(&mut self, key: i32, value: i32) -> Result<(), MachineError> {
        let i = self.index(key)?;
        self.cells[i] = value;
        Ok(())
    }

    /// Maps a cell value onto the palette, clamping out-of-range values.
    pub fn pixel(value: i32) -> u8 {
        let i = value.clamp(0, PALETTE.len() as i32 - 1) as usize;
        PALETTE[i]
    }

    /// Writes one text row per video row.
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        if self.width == 0 {
            return Ok(());
        }
        let mut line = Vec::with_capacity(self.width + 1);
        for row in self.cells.chunks(self.width) {
            line.clear();
            line.extend(row.iter().map(|v| Self::pixel(*v)));
            line.push(b'\n');
            out.write_all(&line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_length() {
        assert_eq!(PALETTE.len(), 70);
        assert_eq!(PALETTE[0], b' ');
        assert_eq!(*PALETTE.last().unwrap(), b'$');
    }

    #[test]
    fn bounds_checked() {
        let mut video = Video::new(2, 2).unwrap();
        video.set(3, 7).unwrap();
        assert_eq!(video.get(3).unwrap(), 7);
        assert!(matches!(
            video.set(4, 1),
            Err(MachineError::VideoOutOfRange {
                index: 4,
                available: 4
            })
        ));
        assert!(video.get(-1).is_err());
    }

    #[test]
    fn overflowing_size_is_an_error() {
        assert!(matches!(
            Video::new(usize::MAX / 2, 4),
            Err(MachineError::ConfigTooLarge {
                what: "video cell count",
                ..
            })
        ));
        assert!(Video::new(0, 4).unwrap().cells().is_empty());
    }

    #[test]
    fn render_clamps() {
        let mut video = Video::new(3, 2).unwrap();
        video.set(0, -5).unwrap();
        video.set(1, 1).unwrap();
        video.set(2, 1000).unwrap();
        video.set(5, 69).unwrap();
        let mut out = Vec::new();
        video.render(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), " .$\n  $\n");
    }
}
