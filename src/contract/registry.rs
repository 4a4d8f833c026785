//! The contract registry: deployed code, ownership and private state.
//!
//! The registry is the only component allowed to touch a contract's state
//! mapping. Invocations stage their writes on a working copy; the copy
//! only replaces the durable state after the dispatch succeeded *and* the
//! sanitizer accepted the result. A failed call therefore leaves no trace.

use crate::contract::code::{
    BlockEnv, CodeRegistry, ContractCode, InvocationFrame, InvokeEnv, Message, DEPLOY_HOOK,
};
use crate::state::sanitizer::Sanitizer;
use crate::state::serializer::Serializer;
use crate::state::value::{StateGraph, Value};
use crate::types::address::{Address, ADDRESS_SIZE};
use crate::types::encoding::Encode;
use crate::types::hash::Hash;
use appchain_derive::Error;
use dashmap::DashMap;
use std::sync::Arc;

/// Errors surfaced by registry operations.
#[derive(Debug, Error)]
pub enum ContractError {
    /// No contract is deployed at the address.
    #[error("unknown contract {0}")]
    UnknownContract(Address),
    /// The deploy payload names a code unit the registry does not know.
    #[error("unknown code unit `{0}`")]
    UnknownCode(String),
    /// Address derivation produced an address that is already taken.
    ///
    /// Derivation is a pure function of sender and nonce, so a collision
    /// means determinism is already broken; callers must halt.
    #[error("contract address collision at {0}")]
    AddressCollision(Address),
    /// Contract code declined the call.
    #[error("{0}")]
    Rejected(String),
    /// The mutated state failed sanitization.
    #[error("{0}")]
    Unserializable(String),
}

/// One deployed contract: code, ownership metadata and private state.
struct ContractRecord {
    code: Arc<dyn ContractCode>,
    owner: Option<Address>,
    state: StateGraph,
}

/// Registry of deployed contracts.
pub struct ContractRegistry {
    codes: CodeRegistry,
    contracts: DashMap<Address, ContractRecord>,
}

impl ContractRegistry {
    /// Creates a registry backed by the given code units.
    pub fn new(codes: CodeRegistry) -> Self {
        Self {
            codes,
            contracts: DashMap::new(),
        }
    }

    /// Derives the deterministic address for a deployment.
    ///
    /// A pure function of the deploying sender and its nonce, so every
    /// node derives the same address for the same transaction.
    pub fn derive_address(deployer: Address, nonce: u64) -> Address {
        let mut h = Hash::sha3();
        h.update(b"CONTRACT");
        deployer.encode(&mut h);
        nonce.encode(&mut h);
        let full = h.finalize();

        let mut out = [0u8; ADDRESS_SIZE];
        out.copy_from_slice(&full.as_slice()[12..]);
        Address(out)
    }

    /// Instantiates a contract and runs its deployment hook.
    ///
    /// Ownership stays unset until the hook has run; the record only
    /// becomes visible after hook and sanitization both succeed.
    pub fn deploy(
        &self,
        deployer: Address,
        nonce: u64,
        code_name: &str,
        params: Vec<Value>,
        block: BlockEnv,
        sanitizer: &Sanitizer,
    ) -> Result<Address, ContractError> {
        let address = Self::derive_address(deployer, nonce);
        if self.contracts.contains_key(&address) {
            return Err(ContractError::AddressCollision(address));
        }

        let code = self
            .codes
            .get(code_name)
            .ok_or_else(|| ContractError::UnknownCode(code_name.to_string()))?;

        let mut state = StateGraph::new();
        let env = InvokeEnv {
            msg: Message {
                name: DEPLOY_HOOK.to_string(),
                sender: deployer,
                params,
            },
            block,
        };

        let mut frame = InvocationFrame::new(env, &mut state);
        code.dispatch(&mut frame)
            .map_err(|e| ContractError::Rejected(e.to_string()))?;

        sanitizer
            .sanitize(&mut state)
            .map_err(|e| ContractError::Unserializable(e.to_string()))?;

        self.contracts.insert(
            address,
            ContractRecord {
                code,
                owner: Some(deployer),
                state,
            },
        );
        Ok(address)
    }

    /// Dispatches a state-mutating call against a deployed contract.
    ///
    /// This is the only path that mutates contract state. Writes land on a
    /// working copy and replace the durable state only after dispatch and
    /// sanitization succeed.
    pub fn invoke(
        &self,
        address: Address,
        name: &str,
        sender: Address,
        params: Vec<Value>,
        block: BlockEnv,
        sanitizer: &Sanitizer,
    ) -> Result<Option<Value>, ContractError> {
        let mut record = self
            .contracts
            .get_mut(&address)
            .ok_or(ContractError::UnknownContract(address))?;

        let mut staged = record.state.clone();
        let env = InvokeEnv {
            msg: Message {
                name: name.to_string(),
                sender,
                params,
            },
            block,
        };

        let mut frame = InvocationFrame::new(env, &mut staged);
        let result = record
            .code
            .dispatch(&mut frame)
            .map_err(|e| ContractError::Rejected(e.to_string()))?;

        sanitizer
            .sanitize(&mut staged)
            .map_err(|e| ContractError::Unserializable(e.to_string()))?;

        record.state = staged;
        Ok(result)
    }

    /// Dispatches a read-only view call.
    ///
    /// Runs against a working copy that is discarded unconditionally - a
    /// view call can never change durable state, whether it succeeds or
    /// not.
    pub fn view(
        &self,
        address: Address,
        name: &str,
        sender: Address,
        params: Vec<Value>,
        block: BlockEnv,
    ) -> Result<Option<Value>, ContractError> {
        let record = self
            .contracts
            .get(&address)
            .ok_or(ContractError::UnknownContract(address))?;

        let mut scratch = record.state.clone();
        let env = InvokeEnv {
            msg: Message {
                name: name.to_string(),
                sender,
                params,
            },
            block,
        };

        let mut frame = InvocationFrame::new(env, &mut scratch);
        record
            .code
            .dispatch(&mut frame)
            .map_err(|e| ContractError::Rejected(e.to_string()))
    }

    /// Returns the callable function names of a deployed contract.
    pub fn func_names(&self, address: Address) -> Option<Vec<String>> {
        self.contracts.get(&address).map(|record| {
            record
                .code
                .func_names()
                .iter()
                .map(|s| s.to_string())
                .collect()
        })
    }

    /// Returns all deployed contract addresses in canonical (sorted) order.
    pub fn addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = self.contracts.iter().map(|e| *e.key()).collect();
        out.sort();
        out
    }

    /// Returns the owner recorded for a contract, if deployed.
    pub fn owner(&self, address: Address) -> Option<Address> {
        self.contracts.get(&address).and_then(|record| record.owner)
    }

    /// Reads one state key of a contract as an owned tree.
    ///
    /// Intended for queries and tests; returns `None` for unknown
    /// contracts, missing keys, and cyclic values.
    pub fn state_value(&self, address: Address, key: &str) -> Option<Value> {
        let record = self.contracts.get(&address)?;
        record.state.extract_tree(record.state.root(key)?)
    }

    /// Number of deployed contracts.
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Produces the digest leaves for every deployed contract, in
    /// canonical address order.
    ///
    /// Each leaf binds the contract's code name, owner and serialized
    /// state under a domain-separated key.
    pub fn state_leaves(&self, serializer: &dyn Serializer) -> Vec<(Hash, Vec<u8>)> {
        let mut leaves = Vec::with_capacity(self.contracts.len());
        for address in self.addresses() {
            let record = match self.contracts.get(&address) {
                Some(record) => record,
                None => continue,
            };

            let state_bytes = serializer
                .serialize(&record.state)
                .expect("committed contract state was sanitized and must serialize");

            let mut value = Vec::new();
            record.code.code_name().encode(&mut value);
            record.owner.encode(&mut value);
            state_bytes.encode(&mut value);

            let mut key = Hash::sha3();
            key.update(b"CONTRACT_LEAF");
            address.encode(&mut key);
            leaves.push((key.finalize(), value));
        }
        leaves
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sanitizer::SanitizePolicy;
    use crate::state::serializer::by_name;

    fn sanitizer() -> Sanitizer {
        Sanitizer::new(SanitizePolicy::default(), by_name("binary").unwrap())
    }

    fn registry() -> ContractRegistry {
        ContractRegistry::new(CodeRegistry::with_builtins())
    }

    fn block() -> BlockEnv {
        BlockEnv {
            number: 1,
            hash: Hash::zero(),
            timestamp: 1_700_000_000,
        }
    }

    fn deployer() -> Address {
        Address([7u8; 20])
    }

    #[test]
    fn derive_address_is_deterministic() {
        let a = ContractRegistry::derive_address(deployer(), 0);
        let b = ContractRegistry::derive_address(deployer(), 0);
        assert_eq!(a, b);
    }

    #[test]
    fn derive_address_varies_with_nonce_and_sender() {
        let base = ContractRegistry::derive_address(deployer(), 0);
        assert_ne!(base, ContractRegistry::derive_address(deployer(), 1));
        assert_ne!(
            base,
            ContractRegistry::derive_address(Address([8u8; 20]), 0)
        );
    }

    #[test]
    fn deploy_runs_hook_and_sets_owner() {
        let registry = registry();
        let address = registry
            .deploy(deployer(), 0, "kv-store", vec![], block(), &sanitizer())
            .unwrap();

        assert_eq!(registry.owner(address), Some(deployer()));
        assert!(registry.state_value(address, "owner").is_some());
    }

    #[test]
    fn deploy_unknown_code_fails() {
        let registry = registry();
        assert!(matches!(
            registry.deploy(deployer(), 0, "missing", vec![], block(), &sanitizer()),
            Err(ContractError::UnknownCode(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn redeploy_same_nonce_collides() {
        let registry = registry();
        registry
            .deploy(deployer(), 0, "kv-store", vec![], block(), &sanitizer())
            .unwrap();

        assert!(matches!(
            registry.deploy(deployer(), 0, "counter", vec![], block(), &sanitizer()),
            Err(ContractError::AddressCollision(_))
        ));
    }

    #[test]
    fn invoke_persists_successful_writes() {
        let registry = registry();
        let address = registry
            .deploy(deployer(), 0, "kv-store", vec![], block(), &sanitizer())
            .unwrap();

        registry
            .invoke(
                address,
                "setValue",
                deployer(),
                vec![Value::Int(5)],
                block(),
                &sanitizer(),
            )
            .unwrap();

        assert_eq!(registry.state_value(address, "value"), Some(Value::Int(5)));
    }

    #[test]
    fn rejected_invoke_leaves_state_untouched() {
        let registry = registry();
        let address = registry
            .deploy(deployer(), 0, "kv-store", vec![], block(), &sanitizer())
            .unwrap();

        let stranger = Address([9u8; 20]);
        let err = registry
            .invoke(
                address,
                "setValue",
                stranger,
                vec![Value::Int(5)],
                block(),
                &sanitizer(),
            )
            .unwrap_err();

        assert!(matches!(err, ContractError::Rejected(_)));
        assert_eq!(registry.state_value(address, "value"), None);
    }

    #[test]
    fn view_discards_mutations() {
        let registry = registry();
        let address = registry
            .deploy(deployer(), 0, "counter", vec![], block(), &sanitizer())
            .unwrap();

        let result = registry
            .view(address, "increase", deployer(), vec![], block())
            .unwrap();
        assert_eq!(result, Some(Value::Int(1)));

        // The durable counter is still zero.
        assert_eq!(
            registry.state_value(address, "count"),
            Some(Value::Int(0))
        );
    }

    #[test]
    fn unknown_contract_is_reported() {
        let registry = registry();
        assert!(matches!(
            registry.view(Address::zero(), "count", deployer(), vec![], block()),
            Err(ContractError::UnknownContract(_))
        ));
        assert!(registry.func_names(Address::zero()).is_none());
    }

    #[test]
    fn addresses_enumerate_in_sorted_order() {
        let registry = registry();
        for nonce in 0..4 {
            registry
                .deploy(deployer(), nonce, "counter", vec![], block(), &sanitizer())
                .unwrap();
        }

        let addresses = registry.addresses();
        assert_eq!(addresses.len(), 4);
        let mut sorted = addresses.clone();
        sorted.sort();
        assert_eq!(addresses, sorted);
    }

    #[test]
    fn state_leaves_are_stable() {
        let registry = registry();
        registry
            .deploy(deployer(), 0, "kv-store", vec![], block(), &sanitizer())
            .unwrap();

        let serializer = by_name("binary").unwrap();
        let first = registry.state_leaves(serializer);
        let second = registry.state_leaves(serializer);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].0, second[0].0);
        assert_eq!(first[0].1, second[0].1);
    }
}
