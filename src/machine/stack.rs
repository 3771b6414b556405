//! Self-verifying growable stack.
//!
//! [`ProtectedStack`] guards its storage two ways:
//! - canary words at both ends of the backing buffer and inside the stack
//!   header catch linear overruns (feature `canary`);
//! - an FNV-1a hash over the header and the whole buffer catches stray
//!   writes anywhere else (feature `hash`).
//!
//! Popped slots are overwritten with [`POISON`], so a dump shows which cells
//! still hold live data. Both the interpreter's operand stack and its call
//! stack are instances of this type.

use crate::utils::hash::Fnv1a;
use std::fmt::{self, Write};

/// Stack cell type.
pub type Word = i64;

/// Written into every slot that holds no live value.
pub const POISON: Word = 0xDEAD_BABE_C0FE_BEEF_u64 as Word;

/// Sentinel stored around the buffer and in the header.
pub const CANARY: u64 = 0x0BAD_CAFE_0BAD_CAFE;

/// Capacity multiplier on growth; its square is the shrink threshold.
pub const GROWTH: usize = 2;

/// Most content lines a dump prints.
const DUMP_MAX_LINES: usize = 64;

/// Number of canary words at each end of the buffer.
const GUARD: usize = if cfg!(feature = "canary") { 1 } else { 0 };

/// Bitmask of independent corruption findings. Zero means healthy.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StackStatus(u8);

impl StackStatus {
    pub const OK: StackStatus = StackStatus(0);
    pub const BIG_SIZE: StackStatus = StackStatus(1 << 1);
    pub const NULL_BUFFER: StackStatus = StackStatus(1 << 2);
    pub const L_CANARY: StackStatus = StackStatus(1 << 3);
    pub const R_CANARY: StackStatus = StackStatus(1 << 4);
    pub const BL_CANARY: StackStatus = StackStatus(1 << 5);
    pub const BR_CANARY: StackStatus = StackStatus(1 << 6);
    pub const HASH: StackStatus = StackStatus(1 << 7);

    pub const fn is_ok(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(&self, other: StackStatus) -> bool {
        self.0 & other.0 == other.0
    }

    fn set(&mut self, other: StackStatus) {
        self.0 |= other.0;
    }

    /// Human-readable description of every set bit.
    pub fn descriptions(&self) -> impl Iterator<Item = &'static str> + '_ {
        STATUS_DESCRIPTIONS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, text)| *text)
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("ok");
        }
        let text: Vec<&str> = self.descriptions().collect();
        write!(f, "{} (status {:#010b})", text.join(", "), self.0)
    }
}

static STATUS_DESCRIPTIONS: [(StackStatus, &str); 7] = [
    (StackStatus::BIG_SIZE, "size is bigger than capacity"),
    (StackStatus::NULL_BUFFER, "buffer is missing or shorter than capacity"),
    (StackStatus::L_CANARY, "left canary is corrupt"),
    (StackStatus::R_CANARY, "right canary is corrupt"),
    (StackStatus::BL_CANARY, "buffer left canary is corrupt"),
    (StackStatus::BR_CANARY, "buffer right canary is corrupt"),
    (StackStatus::HASH, "hash mismatch"),
];

/// Failure of a stack operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StackError {
    /// Pop or top on an empty stack.
    Underflow,
    /// The stack failed its integrity check before the operation.
    Corrupted(StackStatus),
}

/// Growable LIFO buffer of [`Word`]s with canaries and an integrity hash.
pub struct ProtectedStack {
    left_canary: u64,
    /// `[canary] content[capacity] [canary]`
    buffer: Vec<Word>,
    size: usize,
    capacity: usize,
    hash: u64,
    right_canary: u64,
}

impl ProtectedStack {
    /// Creates an empty stack with room for `capacity` values.
    pub fn new(capacity: usize) -> Self {
        let mut stack = Self {
            left_canary: CANARY,
            buffer: Self::alloc(capacity),
            size: 0,
            capacity,
            hash: 0,
            right_canary: CANARY,
        };
        stack.rehash();
        stack
    }

    fn alloc(capacity: usize) -> Vec<Word> {
        let mut buffer = vec![POISON; capacity + 2 * GUARD];
        if GUARD > 0 {
            let last = buffer.len() - 1;
            buffer[0] = CANARY as Word;
            buffer[last] = CANARY as Word;
        }
        buffer
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Live values, bottom first.
    pub fn as_slice(&self) -> &[Word] {
        self.buffer.get(GUARD..GUARD + self.size).unwrap_or(&[])
    }

    /// Pushes `value`, growing the buffer if full.
    pub fn push(&mut self, value: Word) -> Result<(), StackError> {
        self.verify()?;
        if self.size + 1 > self.capacity {
            self.resize(self.capacity * GROWTH + 1);
        }
        self.buffer[GUARD + self.size] = value;
        self.size += 1;
        self.rehash();
        Ok(())
    }

    /// Removes and returns the top value, poisoning its slot.
    pub fn pop(&mut self) -> Result<Word, StackError> {
        self.verify()?;
        if self.size == 0 {
            return Err(StackError::Underflow);
        }
        let slot = GUARD + self.size - 1;
        let value = std::mem::replace(&mut self.buffer[slot], POISON);
        self.size -= 1;
        if self.size * GROWTH * GROWTH < self.capacity {
            self.resize(self.capacity / GROWTH + 1);
        }
        self.rehash();
        Ok(value)
    }

    /// Returns the top value without removing it.
    pub fn top(&self) -> Result<Word, StackError> {
        self.verify()?;
        if self.size == 0 {
            return Err(StackError::Underflow);
        }
        Ok(self.buffer[GUARD + self.size - 1])
    }

    /// Returns the value `depth` slots below the top (`0` is the top).
    pub fn peek(&self, depth: usize) -> Result<Word, StackError> {
        self.verify()?;
        if depth >= self.size {
            return Err(StackError::Underflow);
        }
        Ok(self.buffer[GUARD + self.size - 1 - depth])
    }

    /// Overwrites a raw buffer slot without rehashing.
    #[cfg(test)]
    pub(crate) fn scribble(&mut self, slot: usize, value: Word) {
        self.buffer[slot] = value;
    }

    /// Releases the buffer and zeroes the metadata.
    pub fn destroy(&mut self) {
        self.buffer = Vec::new();
        self.size = 0;
        self.capacity = 0;
        self.hash = 0;
    }

    fn verify(&self) -> Result<(), StackError> {
        let status = self.status();
        if status.is_ok() {
            Ok(())
        } else {
            Err(StackError::Corrupted(status))
        }
    }

    /// Copies live content into a fresh buffer of `new_capacity` slots.
    fn resize(&mut self, new_capacity: usize) {
        let mut buffer = Self::alloc(new_capacity);
        let live = self.size.min(new_capacity);
        buffer[GUARD..GUARD + live].copy_from_slice(&self.buffer[GUARD..GUARD + live]);
        self.buffer = buffer;
        self.capacity = new_capacity;
    }

    fn compute_hash(&self) -> u64 {
        if !cfg!(feature = "hash") {
            return 0;
        }
        let mut h = Fnv1a::new();
        h.update_u64(self.left_canary)
            .update_u64(self.size as u64)
            .update_u64(self.capacity as u64)
            .update_u64(self.right_canary);
        for word in &self.buffer {
            h.update(&word.to_le_bytes());
        }
        h.finish()
    }

    fn rehash(&mut self) {
        self.hash = self.compute_hash();
    }

    /// Runs every enabled integrity check.
    pub fn status(&self) -> StackStatus {
        let mut status = StackStatus::OK;

        if self.size > self.capacity {
            status.set(StackStatus::BIG_SIZE);
        }
        let buffer_ok = self.buffer.len() == self.capacity + 2 * GUARD;
        if !buffer_ok {
            status.set(StackStatus::NULL_BUFFER);
        }

        if cfg!(feature = "canary") {
            if self.left_canary != CANARY {
                status.set(StackStatus::L_CANARY);
            }
            if self.right_canary != CANARY {
                status.set(StackStatus::R_CANARY);
            }
            if buffer_ok {
                if self.buffer.first() != Some(&(CANARY as Word)) {
                    status.set(StackStatus::BL_CANARY);
                }
                if self.buffer.last() != Some(&(CANARY as Word)) {
                    status.set(StackStatus::BR_CANARY);
                }
            }
        }

        if cfg!(feature = "hash") && self.hash != self.compute_hash() {
            status.set(StackStatus::HASH);
        }

        status
    }

    /// Renders a structural dump for diagnostics.
    pub fn dump(&self, name: &str) -> String {
        let status = self.status();
        let mut out = String::new();
        let _ = writeln!(out, "----- {name} stack dump -----");
        let _ = writeln!(
            out,
            "\tStatus: {}",
            if status.is_ok() { "OK" } else { "CORRUPT" }
        );
        for text in status.descriptions() {
            let _ = writeln!(out, "\t\t{text}");
        }
        if cfg!(feature = "canary") {
            let _ = writeln!(out, "\tLeft canary  = {:#018X}", self.left_canary);
            let _ = writeln!(out, "\tRight canary = {:#018X}", self.right_canary);
        }
        let _ = writeln!(out, "\tCapacity     = {}", self.capacity);
        let _ = writeln!(out, "\tSize         = {}", self.size);
        let _ = writeln!(out, "\tBuffer       = {} words", self.buffer.len());

        let content = self.buffer.get(GUARD..self.buffer.len().saturating_sub(GUARD));
        if GUARD > 0
            && let Some(word) = self.buffer.first()
        {
            let _ = writeln!(out, "\t\t[----] = {:#018X}", *word as u64);
        }
        for (i, word) in content.unwrap_or(&[]).iter().take(DUMP_MAX_LINES).enumerate() {
            let kind = if *word == POISON { "POISON" } else { "VALUE" };
            let live = if i < self.size { '*' } else { ' ' };
            let _ = writeln!(
                out,
                "\t\t[{i:04}]{live}= ({kind:<6}) {:#018X} {word}",
                *word as u64
            );
        }
        if self.capacity > DUMP_MAX_LINES {
            let _ = writeln!(out, "\t\t... {} more", self.capacity - DUMP_MAX_LINES);
        }
        if GUARD > 0
            && self.buffer.len() > 1
            && let Some(word) = self.buffer.last()
        {
            let _ = writeln!(out, "\t\t[####] = {:#018X}", *word as u64);
        }
        if cfg!(feature = "hash") {
            let _ = writeln!(out, "\tHash      = {:#018X}", self.hash);
            let _ = writeln!(out, "\tEst. hash = {:#018X}", self.compute_hash());
        }
        out
    }
}

impl Drop for ProtectedStack {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for ProtectedStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectedStack")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .field("content", &self.as_slice())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_lifo() {
        let mut stack = ProtectedStack::new(2);
        for v in [1, 2, 3, 4, 5] {
            stack.push(v).unwrap();
        }
        assert_eq!(stack.len(), 5);
        assert_eq!(stack.top().unwrap(), 5);
        assert_eq!(stack.peek(1).unwrap(), 4);
        for v in [5, 4, 3, 2, 1] {
            assert_eq!(stack.pop().unwrap(), v);
        }
        assert!(stack.is_empty());
        assert!(stack.status().is_ok());
    }

    #[test]
    fn growth_factor() {
        let mut stack = ProtectedStack::new(1);
        stack.push(1).unwrap();
        assert_eq!(stack.capacity(), 1);
        stack.push(2).unwrap();
        assert_eq!(stack.capacity(), 3);
        stack.push(3).unwrap();
        stack.push(4).unwrap();
        assert_eq!(stack.capacity(), 7);
        assert_eq!(stack.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn shrinks_when_mostly_empty() {
        let mut stack = ProtectedStack::new(1);
        for v in 0..16 {
            stack.push(v).unwrap();
        }
        let grown = stack.capacity();
        while stack.len() > 1 {
            stack.pop().unwrap();
        }
        assert!(stack.capacity() < grown);
        assert!(stack.len() <= stack.capacity());
        assert_eq!(stack.top().unwrap(), 0);
        assert!(stack.status().is_ok());
    }

    #[test]
    fn underflow_does_not_mutate() {
        let mut stack = ProtectedStack::new(4);
        assert_eq!(stack.pop(), Err(StackError::Underflow));
        assert_eq!(stack.top(), Err(StackError::Underflow));
        assert_eq!(stack.len(), 0);
        assert!(stack.status().is_ok());
    }

    #[test]
    fn popped_slot_is_poisoned() {
        let mut stack = ProtectedStack::new(4);
        stack.push(7).unwrap();
        stack.push(8).unwrap();
        stack.pop().unwrap();
        assert_eq!(stack.buffer[GUARD + 1], POISON);
        assert_eq!(stack.buffer[GUARD], 7);
    }

    #[test]
    fn destroy_releases_buffer() {
        let mut stack = ProtectedStack::new(4);
        stack.push(1).unwrap();
        stack.destroy();
        assert_eq!(stack.len(), 0);
        assert_eq!(stack.capacity(), 0);
        assert!(stack.buffer.is_empty());
    }

    // ==================== Corruption ====================

    #[cfg(feature = "canary")]
    #[test]
    fn detects_buffer_overrun() {
        let mut stack = ProtectedStack::new(2);
        stack.push(1).unwrap();
        let last = stack.buffer.len() - 1;
        stack.buffer[last] = 0;
        let status = stack.status();
        assert!(status.contains(StackStatus::BR_CANARY));
        assert!(!status.contains(StackStatus::BL_CANARY));
        assert_eq!(stack.push(2), Err(StackError::Corrupted(status)));
    }

    #[cfg(feature = "canary")]
    #[test]
    fn detects_buffer_underrun() {
        let mut stack = ProtectedStack::new(2);
        stack.buffer[0] ^= 1;
        assert!(stack.status().contains(StackStatus::BL_CANARY));
    }

    #[cfg(feature = "canary")]
    #[test]
    fn detects_header_canaries() {
        let mut stack = ProtectedStack::new(2);
        stack.left_canary = 0;
        stack.right_canary ^= 0x100;
        let status = stack.status();
        assert!(status.contains(StackStatus::L_CANARY));
        assert!(status.contains(StackStatus::R_CANARY));
    }

    #[cfg(feature = "hash")]
    #[test]
    fn detects_stray_write_in_content() {
        let mut stack = ProtectedStack::new(8);
        stack.push(1).unwrap();
        stack.push(2).unwrap();
        // a dead slot past the top: canaries stay intact
        stack.buffer[GUARD + 5] = 42;
        assert_eq!(stack.status(), StackStatus::HASH);
        assert!(matches!(stack.pop(), Err(StackError::Corrupted(_))));
        assert_eq!(stack.len(), 2);
    }

    #[cfg(feature = "hash")]
    #[test]
    fn detects_metadata_change() {
        let mut stack = ProtectedStack::new(8);
        stack.push(1).unwrap();
        stack.size = 2;
        assert!(stack.status().contains(StackStatus::HASH));
        stack.size = 9;
        assert!(stack.status().contains(StackStatus::BIG_SIZE));
    }

    #[test]
    fn detects_missing_buffer() {
        let mut stack = ProtectedStack::new(4);
        stack.buffer.truncate(1);
        assert!(stack.status().contains(StackStatus::NULL_BUFFER));
        assert!(stack.top().is_err());
    }

    #[test]
    fn status_display() {
        assert_eq!(StackStatus::OK.to_string(), "ok");
        let text = StackStatus::HASH.to_string();
        assert!(text.starts_with("hash mismatch"));
    }

    #[test]
    fn dump_lists_values_and_poison() {
        let mut stack = ProtectedStack::new(3);
        stack.push(5).unwrap();
        let dump = stack.dump("data");
        assert!(dump.contains("data stack dump"));
        assert!(dump.contains("Status: OK"));
        assert!(dump.contains("Size         = 1"));
        assert!(dump.contains("(VALUE ) 0x0000000000000005 5"));
        assert!(dump.contains("(POISON)"));
    }
}
