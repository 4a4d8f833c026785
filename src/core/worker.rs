//! The execution pipeline: block lifecycle, transaction application and
//! the read-only query surface.
//!
//! A single consensus collaborator drives the lifecycle sequentially:
//! `begin_block`, then `apply` per transaction in final order, then
//! `end_block` and `commit`. The worker holds the open block behind one
//! mutex and keeps it locked for the whole of each `apply`, so at most one
//! state mutation is ever in flight. Admission checks and queries only
//! read committed state and may run concurrently with the apply stream.
//!
//! Determinism rests on two rules: transactions execute exactly in the
//! order `apply` is called, and every piece of durable state is sanitized
//! and canonically serialized before it can influence the commit digest.

use crate::contract::code::{BlockEnv, CodeRegistry};
use crate::contract::registry::{ContractError, ContractRegistry};
use crate::core::block::{BlockHeader, SealedBlock};
use crate::core::chain_store::ChainStore;
use crate::core::ledger::Ledger;
use crate::core::query::{CallRequest, NodeInfo, QueryOutcome, QueryResult};
use crate::core::receipt::Receipt;
use crate::core::transaction::{Transaction, TxPayload};
use crate::state::digest::world_state_digest;
use crate::state::sanitizer::Sanitizer;
use crate::state::value::Value;
use crate::types::address::Address;
use crate::types::bytes::Bytes;
use crate::types::encoding::Decode;
use crate::types::hash::Hash;
use crate::{info, warn};
use appchain_derive::Error;
use std::mem;
use std::sync::Mutex;

/// How far past the expected nonce admission will accept a transaction.
///
/// Admission is advisory; `apply` always requires the exact next nonce.
pub const ADMIT_NONCE_LOOKAHEAD: u64 = 64;

/// Hard failures that propagate to the consensus collaborator.
///
/// These are never converted into receipts: a protocol violation poisons
/// the current block, and an invariant violation means determinism is
/// already broken and the node must halt.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// Reasons a transaction fails validation before execution.
///
/// No state changes when one of these is raised: no fee, no nonce bump.
#[derive(Debug, Error)]
pub enum InvalidTransaction {
    #[error("malformed transaction: {0}")]
    Malformed(String),
    #[error("invalid signature")]
    BadSignature,
    #[error("stale nonce: expected {expected}, got {actual}")]
    StaleNonce { expected: u64, actual: u64 },
    #[error("nonce too far ahead: expected {expected}, got {actual}")]
    NonceGap { expected: u64, actual: u64 },
    #[error("insufficient balance: have {balance}, need {required}")]
    InsufficientBalance { balance: u128, required: u128 },
}

/// Positive admission verdict for the mempool gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionResult {
    /// Content hash identifying the admitted transaction.
    pub tx_hash: Hash,
}

/// Block-level bookkeeping returned by `end_block`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct BlockTags {
    /// Number of transactions applied in the block.
    pub tx_count: u64,
    /// Sum of fees charged in the block.
    pub total_fees: u128,
}

/// The block currently being executed.
struct WorkingBlock {
    env: BlockEnv,
    tx_hashes: Vec<Hash>,
    receipts: Vec<Receipt>,
    total_fees: u128,
}

impl WorkingBlock {
    fn open(env: BlockEnv) -> Self {
        Self {
            env,
            tx_hashes: Vec::new(),
            receipts: Vec::new(),
            total_fees: 0,
        }
    }
}

/// Lifecycle state of the block context:
/// `Closed -> Open -> (apply)* -> Finalizing -> Closed`.
enum BlockPhase {
    Closed,
    Open(WorkingBlock),
    Finalizing(WorkingBlock),
}

/// The state-transition engine of a validator node.
pub struct Worker {
    ledger: Ledger,
    contracts: ContractRegistry,
    chain: ChainStore,
    sanitizer: Sanitizer,
    phase: Mutex<BlockPhase>,
    last_digest: Mutex<Hash>,
}

impl Worker {
    /// Creates a worker with built-in code units, process-wide state
    /// configuration and the given genesis allocations.
    pub fn new(initial_accounts: &[(Address, u128)]) -> Self {
        Self::with_parts(
            initial_accounts,
            CodeRegistry::with_builtins(),
            Sanitizer::from_process_config(),
        )
    }

    /// Creates a worker from explicit parts.
    ///
    /// This is the constructor an embedding runtime uses to plug in its
    /// own code registry or a non-default sanitizer.
    pub fn with_parts(
        initial_accounts: &[(Address, u128)],
        codes: CodeRegistry,
        sanitizer: Sanitizer,
    ) -> Self {
        Self {
            ledger: Ledger::with_accounts(initial_accounts),
            contracts: ContractRegistry::new(codes),
            chain: ChainStore::new(),
            sanitizer,
            phase: Mutex::new(BlockPhase::Closed),
            last_digest: Mutex::new(Hash::zero()),
        }
    }

    /// Engine metadata for the consensus collaborator.
    pub fn info(&self) -> NodeInfo {
        NodeInfo {
            name: "appchain".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            last_block_number: self.chain.height().unwrap_or(0),
            last_state_digest: *self.last_digest.lock().unwrap(),
        }
    }

    /// Balance of an address in committed state.
    pub fn balance_of(&self, address: Address) -> u128 {
        self.ledger.balance_of(address)
    }

    /// Expected nonce of the next transaction from an address.
    pub fn next_nonce(&self, address: Address) -> u64 {
        self.ledger.next_nonce(address)
    }

    /// Reads one key of a contract's committed state.
    pub fn contract_state(&self, address: Address, key: &str) -> Option<Value> {
        self.contracts.state_value(address, key)
    }

    /// Stateless-ish mempool gate: validates a raw transaction against
    /// committed state without mutating anything.
    ///
    /// The verdict is advisory; `apply` re-derives every check because the
    /// ledger may have moved since admission.
    pub fn admit(&self, raw: &[u8]) -> Result<AdmissionResult, InvalidTransaction> {
        let tx = decode_tx(raw)?;
        self.validate(&tx, false)?;
        Ok(AdmissionResult { tx_hash: tx.hash() })
    }

    /// Opens a new working block.
    pub fn begin_block(&self, header: BlockHeader) -> Result<(), EngineError> {
        let mut phase = self.phase.lock().unwrap();
        if !matches!(*phase, BlockPhase::Closed) {
            return Err(EngineError::ProtocolViolation(
                "begin_block while a block is already open".to_string(),
            ));
        }

        match self.chain.height() {
            Some(last) if header.number != last + 1 => {
                return Err(EngineError::ProtocolViolation(format!(
                    "out-of-order block height: expected {}, got {}",
                    last + 1,
                    header.number
                )));
            }
            None if header.number == 0 => {
                return Err(EngineError::ProtocolViolation(
                    "block heights start at 1".to_string(),
                ));
            }
            _ => {}
        }

        info!(
            "opening block: number={} hash={} timestamp={}",
            header.number, header.hash, header.timestamp
        );
        *phase = BlockPhase::Open(WorkingBlock::open(BlockEnv {
            number: header.number,
            hash: header.hash,
            timestamp: header.timestamp,
        }));
        Ok(())
    }

    /// Validates and executes one transaction in the open block.
    ///
    /// Always yields exactly one receipt for the transaction. Per-tx
    /// failures become failure receipts; only protocol and invariant
    /// errors escape as `Err`.
    pub fn apply(&self, raw: &[u8]) -> Result<Receipt, EngineError> {
        // The phase lock is held until the receipt is recorded: one
        // in-flight mutation at a time, in arrival order.
        let mut phase = self.phase.lock().unwrap();
        let working = match &mut *phase {
            BlockPhase::Open(working) => working,
            _ => {
                return Err(EngineError::ProtocolViolation(
                    "apply outside an open block".to_string(),
                ));
            }
        };

        let tx = match decode_tx(raw) {
            Ok(tx) => tx,
            Err(e) => {
                // Undecodable payloads still yield a receipt, addressed by
                // a hash over the raw bytes.
                let receipt = Receipt::failure(raw_payload_hash(raw), e.to_string());
                warn!("discarding undecodable transaction: {e}");
                record(working, receipt.tx_hash, 0, receipt.clone());
                return Ok(receipt);
            }
        };
        let tx_hash = tx.hash();

        // Full revalidation against the current ledger; admission results
        // are never reused.
        if let Err(e) = self.validate(&tx, true) {
            warn!("transaction {tx_hash} rejected: {e}");
            let receipt = Receipt::failure(tx_hash, e.to_string());
            record(working, tx_hash, 0, receipt.clone());
            return Ok(receipt);
        }

        let sender = tx.sender();

        // Fee first: it is kept no matter how execution ends.
        self.ledger
            .debit(sender, tx.fee)
            .map_err(|e| EngineError::InvariantViolation(format!("fee debit failed: {e}")))?;

        let env = working.env;
        let (destination, executed) = match &tx.payload {
            TxPayload::Transfer => (tx.to, Ok(None)),
            TxPayload::Deploy { code, params } => {
                match self.contracts.deploy(
                    sender,
                    tx.nonce,
                    code,
                    params.clone(),
                    env,
                    &self.sanitizer,
                ) {
                    Ok(address) => (
                        Some(address),
                        Ok(Some(Value::Blob(Bytes::new(address.0.to_vec())))),
                    ),
                    Err(ContractError::AddressCollision(address)) => {
                        return Err(EngineError::InvariantViolation(format!(
                            "contract address collision at {address}"
                        )));
                    }
                    Err(e) => (tx.to, Err(e.to_string())),
                }
            }
            TxPayload::Invoke { name, params } => {
                let to = tx.to.ok_or_else(|| {
                    EngineError::InvariantViolation(
                        "validated invoke without recipient".to_string(),
                    )
                })?;
                match self
                    .contracts
                    .invoke(to, name, sender, params.clone(), env, &self.sanitizer)
                {
                    Ok(result) => (Some(to), Ok(result)),
                    Err(e) => (Some(to), Err(e.to_string())),
                }
            }
        };

        let receipt = match executed {
            Ok(return_data) => {
                if tx.value > 0 {
                    let to = destination.ok_or_else(|| {
                        EngineError::InvariantViolation(
                            "value transfer without destination".to_string(),
                        )
                    })?;
                    self.ledger.debit(sender, tx.value).map_err(|e| {
                        EngineError::InvariantViolation(format!("value debit failed: {e}"))
                    })?;
                    self.ledger.credit(to, tx.value).map_err(|e| {
                        EngineError::InvariantViolation(format!("value credit failed: {e}"))
                    })?;
                }
                Receipt::success(tx_hash, return_data)
            }
            Err(log) => {
                // Execution failed: value and state effects are already
                // rolled back, fee and nonce increment remain.
                warn!("transaction {tx_hash} failed: {log}");
                Receipt::failure(tx_hash, log)
            }
        };

        self.ledger.increment_nonce(sender);
        record(working, tx_hash, tx.fee, receipt.clone());
        Ok(receipt)
    }

    /// Finalizes per-block bookkeeping; no transaction mutation happens
    /// here.
    pub fn end_block(&self) -> Result<BlockTags, EngineError> {
        let mut phase = self.phase.lock().unwrap();
        match mem::replace(&mut *phase, BlockPhase::Closed) {
            BlockPhase::Open(working) => {
                let tags = BlockTags {
                    tx_count: working.tx_hashes.len() as u64,
                    total_fees: working.total_fees,
                };
                *phase = BlockPhase::Finalizing(working);
                Ok(tags)
            }
            other => {
                *phase = other;
                Err(EngineError::ProtocolViolation(
                    "end_block without an open block".to_string(),
                ))
            }
        }
    }

    /// Durably commits the block: appends it to the store, seals its
    /// receipts, and returns the world-state digest.
    pub fn commit(&self) -> Result<Hash, EngineError> {
        let mut phase = self.phase.lock().unwrap();
        let working = match mem::replace(&mut *phase, BlockPhase::Closed) {
            BlockPhase::Finalizing(working) => working,
            other => {
                *phase = other;
                return Err(EngineError::ProtocolViolation(
                    "commit without a finalized block".to_string(),
                ));
            }
        };

        let header = BlockHeader {
            number: working.env.number,
            hash: working.env.hash,
            timestamp: working.env.timestamp,
        };
        let block = SealedBlock::seal(header, working.tx_hashes, &working.receipts);

        self.chain
            .append_block(block, working.receipts)
            .map_err(|e| EngineError::InvariantViolation(e.to_string()))?;

        let mut leaves = self.ledger.digest_leaves();
        leaves.extend(self.contracts.state_leaves(self.sanitizer.serializer()));
        let digest = world_state_digest(leaves);

        *self.last_digest.lock().unwrap() = digest;

        info!(
            "committed block: number={} digest={digest}",
            header.number
        );
        Ok(digest)
    }

    /// Answers a path-based read-only query.
    ///
    /// Never mutates state; view-call mutations are discarded
    /// unconditionally. Unknown paths yield [`QueryOutcome::Unsupported`].
    pub fn query(&self, path: &str, data: &[u8]) -> QueryOutcome {
        match path {
            "balance" => match Address::from_bytes(data) {
                Ok(address) => {
                    QueryOutcome::Ok(QueryResult::Balance(self.ledger.balance_of(address)))
                }
                Err(e) => malformed(e),
            },
            "node" => QueryOutcome::Ok(QueryResult::Node(self.info())),
            "tx" => match Hash::from_bytes(data) {
                Ok(hash) => QueryOutcome::Ok(QueryResult::Receipt(self.chain.receipt(hash))),
                Err(e) => malformed(e),
            },
            "txs" => QueryOutcome::Ok(QueryResult::Receipts(self.chain.receipts())),
            "blocks" => QueryOutcome::Ok(QueryResult::Blocks(self.chain.blocks())),
            "contracts" => QueryOutcome::Ok(QueryResult::Contracts(self.contracts.addresses())),
            "funcs" => match Address::from_bytes(data) {
                Ok(address) => QueryOutcome::Ok(QueryResult::Funcs(
                    self.contracts.func_names(address).unwrap_or_default(),
                )),
                Err(e) => malformed(e),
            },
            "call" => match CallRequest::from_bytes(data) {
                Ok(request) => {
                    match self.contracts.view(
                        request.address,
                        &request.name,
                        request.sender,
                        request.params,
                        self.view_env(),
                    ) {
                        Ok(result) => QueryOutcome::Ok(QueryResult::Call(result)),
                        Err(e) => QueryOutcome::Failed(e.to_string()),
                    }
                }
                Err(e) => malformed(e),
            },
            other => QueryOutcome::Unsupported(other.to_string()),
        }
    }

    /// Block environment presented to view calls: the last committed
    /// header, or a zero context before the first commit.
    fn view_env(&self) -> BlockEnv {
        self.chain
            .height()
            .and_then(|number| self.chain.block_by_number(number))
            .map(|block| BlockEnv {
                number: block.header.number,
                hash: block.header.hash,
                timestamp: block.header.timestamp,
            })
            .unwrap_or(BlockEnv {
                number: 0,
                hash: Hash::zero(),
                timestamp: 0,
            })
    }

    /// Shared validation for admission and application.
    ///
    /// `exact` selects apply semantics (nonce must equal the expected
    /// value); admission tolerates a bounded look-ahead.
    fn validate(&self, tx: &Transaction, exact: bool) -> Result<(), InvalidTransaction> {
        if !tx.verify() {
            return Err(InvalidTransaction::BadSignature);
        }

        match (&tx.payload, tx.to) {
            (TxPayload::Deploy { .. }, Some(_)) => {
                return Err(InvalidTransaction::Malformed(
                    "deployment must not name a recipient".to_string(),
                ));
            }
            (TxPayload::Transfer, None) => {
                return Err(InvalidTransaction::Malformed(
                    "transfer requires a recipient".to_string(),
                ));
            }
            (TxPayload::Invoke { .. }, None) => {
                return Err(InvalidTransaction::Malformed(
                    "invocation requires a contract recipient".to_string(),
                ));
            }
            _ => {}
        }

        let sender = tx.sender();
        let expected = self.ledger.next_nonce(sender);
        if tx.nonce < expected {
            return Err(InvalidTransaction::StaleNonce {
                expected,
                actual: tx.nonce,
            });
        }
        let limit = if exact {
            expected
        } else {
            expected.saturating_add(ADMIT_NONCE_LOOKAHEAD)
        };
        if tx.nonce > limit {
            return Err(InvalidTransaction::NonceGap {
                expected,
                actual: tx.nonce,
            });
        }

        let required = tx.value.checked_add(tx.fee).ok_or_else(|| {
            InvalidTransaction::Malformed("value plus fee overflows".to_string())
        })?;
        let balance = self.ledger.balance_of(sender);
        if balance < required {
            return Err(InvalidTransaction::InsufficientBalance { balance, required });
        }

        Ok(())
    }
}

fn decode_tx(raw: &[u8]) -> Result<Transaction, InvalidTransaction> {
    Transaction::from_bytes(raw).map_err(|e| InvalidTransaction::Malformed(e.to_string()))
}

/// Receipt identity for payloads that do not even decode.
fn raw_payload_hash(raw: &[u8]) -> Hash {
    Hash::sha3().chain(b"RAW_TX").chain(raw).finalize()
}

fn record(working: &mut WorkingBlock, tx_hash: Hash, fee: u128, receipt: Receipt) {
    working.tx_hashes.push(tx_hash);
    working.total_fees += fee;
    working.receipts.push(receipt);
}

fn malformed(e: impl std::fmt::Display) -> QueryOutcome {
    QueryOutcome::Failed(format!("malformed query data: {e}"))
}
