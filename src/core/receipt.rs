//! Transaction execution receipts.
//!
//! Every applied transaction produces exactly one [`Receipt`], success or
//! failure - no transaction is ever silently dropped. Receipts are sealed
//! with their block at commit time and their hashes form a Merkle tree
//! whose root is recorded in the sealed block.

use crate::state::value::Value;
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use appchain_derive::BinaryCodec;

/// Execution outcome of one transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec)]
pub enum ReceiptStatus {
    Success,
    Failure,
}

/// Immutable record of one transaction's execution outcome.
#[derive(Clone, Debug, PartialEq, BinaryCodec)]
pub struct Receipt {
    /// Content hash of the transaction that produced this receipt.
    pub tx_hash: Hash,
    /// Whether the transaction executed successfully.
    pub status: ReceiptStatus,
    /// Human-readable outcome; the error description on failure.
    pub log: String,
    /// Value returned by the execution, if any.
    pub return_data: Option<Value>,
}

impl Receipt {
    /// Builds a success receipt.
    pub fn success(tx_hash: Hash, return_data: Option<Value>) -> Self {
        Self {
            tx_hash,
            status: ReceiptStatus::Success,
            log: "tx succeeded".to_string(),
            return_data,
        }
    }

    /// Builds a failure receipt carrying the error description.
    pub fn failure(tx_hash: Hash, log: impl Into<String>) -> Self {
        Self {
            tx_hash,
            status: ReceiptStatus::Failure,
            log: log.into(),
            return_data: None,
        }
    }

    /// True when the transaction executed successfully.
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }

    /// Computes a domain-separated hash of this receipt.
    pub fn hash(&self) -> Hash {
        let mut h = Hash::sha3();
        h.update(b"RECEIPT");
        self.encode(&mut h);
        h.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::Decode;

    fn sample() -> Receipt {
        Receipt::success(
            Hash::sha3().chain(b"tx1").finalize(),
            Some(Value::Int(42)),
        )
    }

    #[test]
    fn encode_decode_roundtrip() {
        let receipt = sample();
        let bytes = receipt.to_bytes();
        assert_eq!(Receipt::from_bytes(&bytes).unwrap(), receipt);
    }

    #[test]
    fn failure_carries_the_reason() {
        let receipt = Receipt::failure(Hash::zero(), "stale nonce");
        assert!(!receipt.is_success());
        assert_eq!(receipt.log, "stale nonce");
        assert_eq!(receipt.return_data, None);
    }

    #[test]
    fn hash_is_deterministic() {
        let receipt = sample();
        assert_eq!(receipt.hash(), receipt.hash());
    }

    #[test]
    fn hash_is_domain_separated() {
        let receipt = sample();

        let mut raw = Hash::sha3();
        receipt.encode(&mut raw);

        assert_ne!(receipt.hash(), raw.finalize());
    }

    #[test]
    fn different_receipts_different_hashes() {
        let base = sample();

        let mut failed = base.clone();
        failed.status = ReceiptStatus::Failure;

        let mut other_tx = base.clone();
        other_tx.tx_hash = Hash::sha3().chain(b"tx2").finalize();

        let mut other_data = base.clone();
        other_data.return_data = None;

        let hashes = [base.hash(), failed.hash(), other_tx.hash(), other_data.hash()];
        for i in 0..hashes.len() {
            for j in (i + 1)..hashes.len() {
                assert_ne!(hashes[i], hashes[j], "receipts {i} and {j} collide");
            }
        }
    }
}
