//! 32-byte SHA3-256 hash type with zero-allocation operations.

use crate::types::encoding::EncodeSink;
use appchain_derive::BinaryCodec;
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::sync::OnceLock;

/// SHA3-256 hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Fixed-size 32-byte hash used throughout the engine.
///
/// This type is `Copy` for performance - hashes are passed frequently during
/// transaction processing and should live on the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// Creates a zero-valued hash (all bytes are 0x00).
    ///
    /// Used as a sentinel for the pre-genesis block hash and empty roots.
    pub const fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    /// Returns the hash as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates a new SHA3-256 hash builder for incremental hashing.
    pub fn sha3() -> HashBuilder {
        HashBuilder::new()
    }

    /// Parses a hash from its lowercase hex representation.
    pub fn from_hex(s: &str) -> Option<Hash> {
        if s.len() != HASH_LEN * 2 {
            return None;
        }
        let mut out = [0u8; HASH_LEN];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Hash(out))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Incremental SHA3-256 hash builder.
///
/// Allows feeding data in chunks and finalizing to produce a [`Hash`].
/// Implements [`EncodeSink`] so encodable types can be hashed directly
/// without intermediate byte buffers.
pub struct HashBuilder {
    hasher: Sha3_256,
}

impl HashBuilder {
    /// Creates a new hash builder with empty state.
    pub fn new() -> Self {
        Self {
            hasher: Sha3_256::new(),
        }
    }

    /// Feeds data into the hash computation.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Feeds data and returns the builder for chained calls.
    pub fn chain(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    /// Consumes the builder and returns the final hash.
    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl Default for HashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeSink for HashBuilder {
    fn write(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }
}

/// Lazily-computed hash slot for immutable values.
///
/// Content hashes are derived on first access and reused afterwards. The
/// cache is invisible to encoding, cloning and comparison so it never
/// influences the canonical form of the value that carries it.
#[derive(Debug, Default)]
pub struct HashCache(OnceLock<Hash>);

impl HashCache {
    pub fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Returns the cached hash, computing it with `f` on first use.
    pub fn get_or_compute(&self, f: impl FnOnce() -> Hash) -> Hash {
        *self.0.get_or_init(f)
    }
}

impl Clone for HashCache {
    fn clone(&self) -> Self {
        // A clone is a distinct value slot; recomputing is always sound.
        Self(OnceLock::new())
    }
}

impl PartialEq for HashCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl Eq for HashCache {}

impl crate::types::encoding::Encode for HashCache {
    fn encode<S: EncodeSink>(&self, _out: &mut S) {}
}

impl crate::types::encoding::Decode for HashCache {
    fn decode(_input: &mut &[u8]) -> Result<Self, crate::types::encoding::DecodeError> {
        Ok(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_deterministic() {
        let a = Hash::sha3().chain(b"payload").finalize();
        let b = Hash::sha3().chain(b"payload").finalize();
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_different_digests() {
        let a = Hash::sha3().chain(b"payload").finalize();
        let b = Hash::sha3().chain(b"payloae").finalize();
        assert_ne!(a, b);
    }

    #[test]
    fn incremental_matches_oneshot() {
        let mut h = Hash::sha3();
        h.update(b"split ");
        h.update(b"input");
        assert_eq!(h.finalize(), Hash::sha3().chain(b"split input").finalize());
    }

    #[test]
    fn hex_roundtrip() {
        let hash = Hash::sha3().chain(b"hex").finalize();
        let parsed = Hash::from_hex(&hash.to_string()).expect("parse");
        assert_eq!(hash, parsed);
    }

    #[test]
    fn from_hex_rejects_bad_input() {
        assert!(Hash::from_hex("abc").is_none());
        assert!(Hash::from_hex(&"zz".repeat(HASH_LEN)).is_none());
    }

    #[test]
    fn cache_computes_once() {
        let cache = HashCache::new();
        let first = cache.get_or_compute(|| Hash::sha3().chain(b"one").finalize());
        let second = cache.get_or_compute(|| Hash::sha3().chain(b"two").finalize());
        assert_eq!(first, second);
    }

    #[test]
    fn clone_resets_cache() {
        let cache = HashCache::new();
        cache.get_or_compute(|| Hash::sha3().chain(b"one").finalize());
        let cloned = cache.clone();
        let recomputed = cloned.get_or_compute(|| Hash::sha3().chain(b"two").finalize());
        assert_eq!(recomputed, Hash::sha3().chain(b"two").finalize());
    }
}
