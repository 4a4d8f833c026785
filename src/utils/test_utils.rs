//! Shared test fixtures.

#[cfg(test)]
pub mod utils {
    use crate::crypto::key_pair::PrivateKey;
    use crate::types::hash::{Hash, HASH_LEN};
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    /// Produces a fresh hash, unique within the test process.
    pub fn unique_hash() -> Hash {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut value = [0u8; HASH_LEN];
        value[..8].copy_from_slice(&n.to_le_bytes());
        Hash(value)
    }

    /// Derives a deterministic private key from a small seed.
    ///
    /// Seeds must be non-zero; the all-zero scalar is invalid.
    pub fn deterministic_key(seed: u8) -> PrivateKey {
        PrivateKey::from_bytes(&[seed; 32]).expect("non-zero seed yields a valid key")
    }
}
