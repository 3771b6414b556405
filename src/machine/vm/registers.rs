use super::zeroed;
use crate::machine::errors::MachineError;

/// Register file: a fixed number of `i32` cells, all starting at zero.
pub struct Registers {
    regs: Vec<i32>,
}

impl Registers {
    /// Creates a new register file with `count` registers.
    pub fn new(count: usize) -> Result<Self, MachineError> {
        Ok(Self {
            regs: zeroed("registers", count)?,
        })
    }

    fn out_of_range(&self, index: i64) -> MachineError {
        MachineError::RegisterOutOfRange {
            index: usize::try_from(index).unwrap_or(usize::MAX),
            available: self.regs.len(),
        }
    }

    /// Returns the value in register `idx`.
    ///
    /// Returns [`MachineError::RegisterOutOfRange`] if `idx` is out of bounds.
    pub fn get(&self, idx: i32) -> Result<i32, MachineError> {
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.regs.get(i))
            .copied()
            .ok_or_else(|| self.out_of_range(idx as i64))
    }

    /// Stores a value into register `idx`.
    ///
    /// Returns [`MachineError::RegisterOutOfRange`] if `idx` is out of bounds.
    pub fn set(&mut self, idx: i32, value: i32) -> Result<(), MachineError> {
        let err = self.out_of_range(idx as i64);
        let slot = usize::try_from(idx)
            .ok()
            .and_then(|i| self.regs.get_mut(i))
            .ok_or(err)?;
        *slot = value;
        Ok(())
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.regs
    }

    pub fn as_mut_slice(&mut self) -> &mut [i32] {
        &mut self.regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_set_in_range() {
        let mut regs = Registers::new(4).unwrap();
        assert_eq!(regs.get(3).unwrap(), 0);
        regs.set(3, -9).unwrap();
        assert_eq!(regs.get(3).unwrap(), -9);
        assert_eq!(regs.as_slice(), &[0, 0, 0, -9]);
    }

    #[test]
    fn out_of_range() {
        let mut regs = Registers::new(4).unwrap();
        assert!(matches!(
            regs.get(4),
            Err(MachineError::RegisterOutOfRange {
                index: 4,
                available: 4
            })
        ));
        assert!(matches!(
            regs.set(-1, 0),
            Err(MachineError::RegisterOutOfRange { available: 4, .. })
        ));
    }
}
