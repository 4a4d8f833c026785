//! The contract calling convention.
//!
//! Contracts are opaque callable units behind the [`ContractCode`] trait: a
//! single dispatch entry point that matches on the invocation name, plus a
//! static list of callable names so the query surface can enumerate them.
//! The engine defines this convention only - a sandboxed contract runtime
//! plugs its own code units into the [`CodeRegistry`].
//!
//! During a call, contract code sees exactly three capabilities, all served
//! by the [`InvocationFrame`]: `get_state`, `set_state` and `get_env`. The
//! frame stages writes against a working copy of the contract's state; the
//! registry decides afterwards whether that copy becomes durable.

use crate::state::value::{NodeId, StateGraph, Value};
use crate::types::address::Address;
use crate::types::hash::Hash;
use appchain_derive::{BinaryCodec, Error};
use dashmap::DashMap;
use std::sync::Arc;

/// Message name of the deployment hook, dispatched exactly once when a
/// contract is instantiated. Ownership is unset until the hook has run.
pub const DEPLOY_HOOK: &str = "__on_deployed";

/// The invocation message a contract dispatches on.
#[derive(Clone, Debug, PartialEq, BinaryCodec)]
pub struct Message {
    /// Name of the function being called.
    pub name: String,
    /// Address of the calling account.
    pub sender: Address,
    /// Typed call parameters.
    pub params: Vec<Value>,
}

/// Block context visible to contract code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockEnv {
    pub number: u64,
    pub hash: Hash,
    pub timestamp: u64,
}

/// Ephemeral invocation environment, rebuilt for every call.
#[derive(Clone, Debug)]
pub struct InvokeEnv {
    pub msg: Message,
    pub block: BlockEnv,
}

/// Errors contract code can signal from `dispatch`.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The contract declined the call, with a human-readable reason.
    #[error("{0}")]
    Rejected(String),
    /// The invocation named a function the contract does not expose.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
}

impl DispatchError {
    /// Convenience constructor for contract-side rejections.
    pub fn rejected(reason: impl Into<String>) -> DispatchError {
        DispatchError::Rejected(reason.into())
    }
}

/// The capability surface handed to contract code for one invocation.
///
/// Wraps the staged state graph and the environment. State reads and
/// writes go through the graph's named roots; node construction for
/// composite values goes through [`InvocationFrame::state_mut`].
pub struct InvocationFrame<'a> {
    env: InvokeEnv,
    state: &'a mut StateGraph,
}

impl<'a> InvocationFrame<'a> {
    pub fn new(env: InvokeEnv, state: &'a mut StateGraph) -> Self {
        Self { env, state }
    }

    /// Returns the invocation environment.
    pub fn get_env(&self) -> &InvokeEnv {
        &self.env
    }

    /// Looks up a state key, returning the node id of its value.
    pub fn get_state(&self, key: &str) -> Option<NodeId> {
        self.state.root(key)
    }

    /// Looks up a state key and expands it into an owned tree.
    ///
    /// Returns `None` for missing keys and for cyclic values, which have
    /// no tree form; read those through [`InvocationFrame::state`].
    pub fn get_state_tree(&self, key: &str) -> Option<Value> {
        self.state.extract_tree(self.state.root(key)?)
    }

    /// Binds a state key to a node of the staged graph.
    pub fn set_state(&mut self, key: &str, value: NodeId) {
        self.state.set_root(key, value);
    }

    /// Copies an owned tree into the staged graph and binds it to a key.
    pub fn set_state_tree(&mut self, key: &str, value: &Value) -> NodeId {
        let id = self.state.insert_tree(value);
        self.state.set_root(key, id);
        id
    }

    /// Read access to the staged state graph.
    pub fn state(&self) -> &StateGraph {
        self.state
    }

    /// Mutable access to the staged state graph, for building values.
    pub fn state_mut(&mut self) -> &mut StateGraph {
        self.state
    }
}

/// One deployable unit of contract code.
///
/// Implementations must be deterministic: the same message against the
/// same state must produce the same writes and the same result on every
/// node.
pub trait ContractCode: Send + Sync {
    /// Registry name a deploy transaction refers to.
    fn code_name(&self) -> &'static str;

    /// Callable function names, excluding lifecycle hooks.
    fn func_names(&self) -> &'static [&'static str];

    /// Dispatches one message against the staged state.
    fn dispatch(&self, frame: &mut InvocationFrame<'_>) -> Result<Option<Value>, DispatchError>;
}

/// Process-level registry of deployable code units.
///
/// This is the seam where an external sandboxed runtime plugs in: each of
/// its compiled artifacts registers as one named [`ContractCode`].
pub struct CodeRegistry {
    codes: DashMap<String, Arc<dyn ContractCode>>,
}

impl CodeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            codes: DashMap::new(),
        }
    }

    /// Creates a registry preloaded with the built-in code units.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(crate::contract::builtin::KeyValueStore));
        registry.register(Arc::new(crate::contract::builtin::Counter));
        registry
    }

    /// Registers a code unit under its own name, replacing any previous
    /// unit with that name.
    pub fn register(&self, code: Arc<dyn ContractCode>) {
        self.codes.insert(code.code_name().to_string(), code);
    }

    /// Resolves a code unit by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ContractCode>> {
        self.codes.get(name).map(|entry| Arc::clone(entry.value()))
    }
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
