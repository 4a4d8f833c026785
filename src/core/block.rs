//! Block structures: the header handed in by the consensus collaborator
//! and the sealed block the engine commits.

use crate::core::receipt::Receipt;
use crate::types::hash::Hash;
use crate::types::merkle_tree::MerkleTree;
use appchain_derive::BinaryCodec;

/// Block metadata supplied by the consensus collaborator at `begin_block`.
///
/// The engine does not derive these fields; they arrive agreed-upon and
/// are echoed into the sealed block verbatim.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec)]
pub struct BlockHeader {
    /// Height of the block; strictly one greater than the previous commit.
    pub number: u64,
    /// Consensus-assigned block hash.
    pub hash: Hash,
    /// Block timestamp in seconds since the Unix epoch.
    pub timestamp: u64,
}

/// A committed block: header, the ordered transaction hashes it executed,
/// and the Merkle root over its receipts.
#[derive(Clone, Debug, PartialEq, Eq, BinaryCodec)]
pub struct SealedBlock {
    pub header: BlockHeader,
    /// Content hashes of the applied transactions, in execution order.
    pub tx_hashes: Vec<Hash>,
    /// Merkle root over the block's receipt hashes.
    pub receipt_root: Hash,
}

impl SealedBlock {
    /// Seals a block from its header, executed transactions and receipts.
    pub fn seal(header: BlockHeader, tx_hashes: Vec<Hash>, receipts: &[Receipt]) -> Self {
        Self {
            header,
            tx_hashes,
            receipt_root: MerkleTree::from_receipts(receipts),
        }
    }

    /// Number of transactions the block executed.
    pub fn tx_count(&self) -> usize {
        self.tx_hashes.len()
    }
}
