//! Append-only stores for committed blocks and sealed receipts.
//!
//! Both stores are immutable-once-written: a block number or receipt can
//! be appended exactly once, and overwrites are invariant violations
//! rather than recoverable errors. Lookups by hash/number and full
//! enumeration back the read-only query surface, so reads are lock-free
//! where possible.

use crate::core::block::SealedBlock;
use crate::core::receipt::Receipt;
use crate::types::hash::Hash;
use appchain_derive::Error;
use dashmap::DashMap;
use std::sync::Mutex;

/// Errors raised by append-only guards.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A block with this number was already committed.
    #[error("block {0} already committed")]
    DuplicateBlock(u64),
    /// The block does not extend the committed chain by exactly one.
    #[error("block {actual} does not follow committed height {expected}")]
    NonContiguousBlock { expected: u64, actual: u64 },
    /// A receipt for this transaction was already sealed.
    #[error("receipt for transaction {0} already recorded")]
    DuplicateReceipt(Hash),
}

/// Append-only block and receipt storage.
pub struct ChainStore {
    /// Committed blocks in height order; index = number - first number.
    blocks: Mutex<Vec<SealedBlock>>,
    /// Block number by consensus hash.
    by_hash: DashMap<Hash, u64>,
    /// Sealed receipts by transaction hash.
    receipts: DashMap<Hash, Receipt>,
    /// Transaction hashes in global execution order, for enumeration.
    receipt_order: Mutex<Vec<Hash>>,
}

impl ChainStore {
    pub fn new() -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            by_hash: DashMap::new(),
            receipts: DashMap::new(),
            receipt_order: Mutex::new(Vec::new()),
        }
    }

    /// Appends a committed block and seals its receipts atomically.
    ///
    /// The block must extend the committed chain by exactly one, and none
    /// of its receipts may already exist.
    pub fn append_block(
        &self,
        block: SealedBlock,
        receipts: Vec<Receipt>,
    ) -> Result<(), StoreError> {
        let mut blocks = self.blocks.lock().unwrap();

        if let Some(last) = blocks.last() {
            let expected = last.header.number + 1;
            if block.header.number != expected {
                return Err(StoreError::NonContiguousBlock {
                    expected,
                    actual: block.header.number,
                });
            }
        }
        if self.by_hash.contains_key(&block.header.hash) {
            return Err(StoreError::DuplicateBlock(block.header.number));
        }
        for receipt in &receipts {
            if self.receipts.contains_key(&receipt.tx_hash) {
                return Err(StoreError::DuplicateReceipt(receipt.tx_hash));
            }
        }

        self.by_hash.insert(block.header.hash, block.header.number);

        let mut order = self.receipt_order.lock().unwrap();
        for receipt in receipts {
            order.push(receipt.tx_hash);
            self.receipts.insert(receipt.tx_hash, receipt);
        }

        blocks.push(block);
        Ok(())
    }

    /// Height of the last committed block, if any.
    pub fn height(&self) -> Option<u64> {
        self.blocks
            .lock()
            .unwrap()
            .last()
            .map(|block| block.header.number)
    }

    /// Looks up a committed block by height.
    pub fn block_by_number(&self, number: u64) -> Option<SealedBlock> {
        let blocks = self.blocks.lock().unwrap();
        let first = blocks.first()?.header.number;
        let index = number.checked_sub(first)? as usize;
        blocks.get(index).cloned()
    }

    /// Looks up a committed block by its consensus hash.
    pub fn block_by_hash(&self, hash: Hash) -> Option<SealedBlock> {
        let number = *self.by_hash.get(&hash)?;
        self.block_by_number(number)
    }

    /// Enumerates all committed blocks in height order.
    pub fn blocks(&self) -> Vec<SealedBlock> {
        self.blocks.lock().unwrap().clone()
    }

    /// Looks up a sealed receipt by transaction hash.
    pub fn receipt(&self, tx_hash: Hash) -> Option<Receipt> {
        self.receipts.get(&tx_hash).map(|r| r.clone())
    }

    /// Enumerates all sealed receipts in execution order.
    pub fn receipts(&self) -> Vec<Receipt> {
        let order = self.receipt_order.lock().unwrap();
        order
            .iter()
            .filter_map(|hash| self.receipt(*hash))
            .collect()
    }
}

impl Default for ChainStore {
    fn default() -> Self {
        Self::new()
    }
}
