//! Merkle tree helpers for producing deterministic roots over receipts.
//!
//! Behavior:
//! - An empty list of leaves yields the all-zero hash (`Hash::zero()`).
//! - Odd layers are padded by duplicating the last leaf before hashing the pair.
//! - Tree construction is performed in-place to minimize allocations.

use crate::core::receipt::Receipt;
use crate::types::hash::Hash;

const EMPTY_VEC_HASH: Hash = Hash::zero();
const MERKLE_NODE_SEPARATION: &[u8] = b"MERKLE_RECEIPT_NODE";

/// Utility functions to build Merkle roots from hashes or receipts.
pub struct MerkleTree;

impl MerkleTree {
    fn hash_pair(left: Hash, right: Hash) -> Hash {
        let mut h = Hash::sha3();
        h.update(MERKLE_NODE_SEPARATION);
        h.update(left.as_slice());
        h.update(right.as_slice());
        h.finalize()
    }

    /// Computes a Merkle root from the provided leaf hashes.
    ///
    /// This performs an in-place reduction; when a level has an odd number
    /// of nodes the last node is duplicated for hashing that pair.
    /// Returns the zero hash when `nodes` is empty.
    pub fn from_raw(mut nodes: Vec<Hash>) -> Hash {
        if nodes.is_empty() {
            return EMPTY_VEC_HASH;
        }

        let mut len = nodes.len();

        while len > 1 {
            let mut write = 0;
            let mut read = 0;

            while read < len {
                let left = nodes[read];
                let right = if read + 1 < len {
                    nodes[read + 1]
                } else {
                    left
                };

                nodes[write] = Self::hash_pair(left, right);

                write += 1;
                read += 2;
            }

            len = write;
        }

        nodes[0]
    }

    /// Computes a Merkle root from receipts, using `receipt.hash()` as leaves.
    ///
    /// Returns the zero hash when `receipts` is empty.
    pub fn from_receipts(receipts: &[Receipt]) -> Hash {
        if receipts.is_empty() {
            return EMPTY_VEC_HASH;
        }

        let mut nodes = Vec::with_capacity(receipts.len());
        for receipt in receipts {
            nodes.push(receipt.hash());
        }

        Self::from_raw(nodes)
    }
}
