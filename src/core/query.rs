//! Read-only query surface types.
//!
//! Queries are path-based requests answered without mutating state. Every
//! outcome carries an explicit success/failure flag, and unknown paths
//! produce a distinguishable "unsupported" outcome instead of an error.

use crate::core::block::SealedBlock;
use crate::core::receipt::Receipt;
use crate::state::value::Value;
use crate::types::address::Address;
use crate::types::hash::Hash;
use appchain_derive::BinaryCodec;

/// Arguments of a `call` (view invocation) query, decoded from the
/// request data.
#[derive(Clone, Debug, PartialEq, BinaryCodec)]
pub struct CallRequest {
    /// Target contract.
    pub address: Address,
    /// Function to invoke.
    pub name: String,
    /// Call parameters.
    pub params: Vec<Value>,
    /// Address presented to the contract as the caller.
    pub sender: Address,
}

/// Engine metadata returned by `info()` and the `node` query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeInfo {
    /// Engine name.
    pub name: String,
    /// Engine version.
    pub version: String,
    /// Height of the last committed block; zero before the first commit.
    pub last_block_number: u64,
    /// World-state digest of the last commit.
    pub last_state_digest: Hash,
}

/// Successful query payloads, one variant per supported path.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryResult {
    Balance(u128),
    Node(NodeInfo),
    Receipt(Option<Receipt>),
    Receipts(Vec<Receipt>),
    Blocks(Vec<SealedBlock>),
    Contracts(Vec<Address>),
    Funcs(Vec<String>),
    Call(Option<Value>),
}

/// Outcome of a query request.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutcome {
    /// The query succeeded.
    Ok(QueryResult),
    /// The path was recognized but the request failed (bad arguments, a
    /// rejected view call); carries the reason.
    Failed(String),
    /// The path is not part of the query surface.
    Unsupported(String),
}

impl QueryOutcome {
    /// Explicit success flag.
    pub fn is_ok(&self) -> bool {
        matches!(self, QueryOutcome::Ok(_))
    }
}
