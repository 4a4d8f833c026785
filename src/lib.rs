//! Deterministic block-execution engine for a blockchain validator node.
//!
//! Driven by an external consensus engine through the block lifecycle
//! (admit, begin-block, apply, end-block, commit), it maintains the
//! account ledger, dispatches contract invocations, sanitizes contract
//! state before it becomes durable, and answers read-only queries.

pub mod contract;
pub mod core;
pub mod crypto;
pub mod state;
pub mod types;
pub mod utils;
