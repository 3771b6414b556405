//! FNV-1a 64-bit hashing.
//!
//! Used wherever the toolchain needs a stable, dependency-free fingerprint:
//! label names in the assembler, mnemonic lookup, and the protected stack's
//! integrity hash.

pub const FNV_OFFSET: u64 = 0xcbf29ce484222325;
pub const FNV_PRIME: u64 = 0x100000001b3;

/// Folds `bytes` into a running FNV-1a state.
pub const fn fnv1a64(mut h: u64, bytes: &[u8]) -> u64 {
    let mut i = 0;
    while i < bytes.len() {
        h ^= bytes[i] as u64;
        h = h.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    h
}

/// Hashes a string from the FNV offset basis.
pub const fn hash_str(s: &str) -> u64 {
    fnv1a64(FNV_OFFSET, s.as_bytes())
}

/// Incremental FNV-1a hasher for multi-part inputs.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a(u64);

impl Fnv1a {
    pub const fn new() -> Self {
        Self(FNV_OFFSET)
    }

    pub fn update(&mut self, bytes: &[u8]) -> &mut Self {
        self.0 = fnv1a64(self.0, bytes);
        self
    }

    pub fn update_u64(&mut self, value: u64) -> &mut Self {
        self.update(&value.to_le_bytes())
    }

    pub const fn finish(&self) -> u64 {
        self.0
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}
