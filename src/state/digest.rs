//! World-state digest computation.
//!
//! At commit time the engine folds every account record and every
//! sanitized, serialized contract state into a sparse Merkle tree and
//! returns its root. The consensus collaborator compares this digest
//! across nodes, so the leaf set and every leaf encoding must be a pure
//! function of committed state.

use crate::types::hash::Hash;
use sparse_merkle_tree::blake2b::Blake2bHasher;
use sparse_merkle_tree::default_store::DefaultStore;
use sparse_merkle_tree::traits::Value;
use sparse_merkle_tree::{SparseMerkleTree, H256};

/// Wrapper type for byte vectors stored in the sparse Merkle tree.
#[derive(Default, Clone)]
struct SmtValue(Vec<u8>);

impl Value for SmtValue {
    fn to_h256(&self) -> H256 {
        if self.0.is_empty() {
            return H256::zero();
        }
        let mut hasher = Hash::sha3();
        hasher.update(&self.0);
        H256::from(hasher.finalize().0)
    }

    fn zero() -> Self {
        Self(Vec::new())
    }
}

fn hash_to_h256(hash: &Hash) -> H256 {
    H256::from(hash.0)
}

/// Computes the digest over the given `(key, encoded leaf)` pairs.
///
/// Returns the zero hash for an empty leaf set. Keys must already be
/// domain-separated hashes; colliding keys overwrite, which upstream code
/// treats as an invariant violation.
pub fn world_state_digest(leaves: impl IntoIterator<Item = (Hash, Vec<u8>)>) -> Hash {
    let mut tree: SparseMerkleTree<Blake2bHasher, SmtValue, DefaultStore<SmtValue>> =
        SparseMerkleTree::default();

    for (key, value) in leaves {
        tree.update(hash_to_h256(&key), SmtValue(value))
            .expect("in-memory SMT update cannot fail");
    }

    let mut root = [0u8; 32];
    root.copy_from_slice(tree.root().as_slice());
    Hash(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_key(tag: &[u8]) -> Hash {
        Hash::sha3().chain(b"TEST_LEAF").chain(tag).finalize()
    }

    #[test]
    fn empty_state_digests_to_zero() {
        assert_eq!(world_state_digest(Vec::new()), Hash::zero());
    }

    #[test]
    fn digest_is_deterministic() {
        let leaves = vec![
            (leaf_key(b"a"), b"alpha".to_vec()),
            (leaf_key(b"b"), b"beta".to_vec()),
        ];
        assert_eq!(
            world_state_digest(leaves.clone()),
            world_state_digest(leaves)
        );
    }

    #[test]
    fn digest_is_order_independent() {
        let forward = vec![
            (leaf_key(b"a"), b"alpha".to_vec()),
            (leaf_key(b"b"), b"beta".to_vec()),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        assert_eq!(world_state_digest(forward), world_state_digest(reversed));
    }

    #[test]
    fn digest_changes_with_content() {
        let base = vec![(leaf_key(b"a"), b"alpha".to_vec())];
        let changed = vec![(leaf_key(b"a"), b"delta".to_vec())];
        let extended = vec![
            (leaf_key(b"a"), b"alpha".to_vec()),
            (leaf_key(b"b"), b"beta".to_vec()),
        ];

        let digest = world_state_digest(base);
        assert_ne!(digest, world_state_digest(changed));
        assert_ne!(digest, world_state_digest(extended));
    }
}
