//! Built-in contract code units.
//!
//! These ship with the engine so a node is usable without an external
//! contract runtime, and they double as reference implementations of the
//! calling convention.

use crate::contract::code::{ContractCode, DispatchError, InvocationFrame, DEPLOY_HOOK};
use crate::state::value::Value;
use crate::types::bytes::Bytes;

/// Owner-gated single-value store.
///
/// The deployment hook records the deployer as `owner`; only the owner may
/// overwrite `value`, anyone may read it.
pub struct KeyValueStore;

impl ContractCode for KeyValueStore {
    fn code_name(&self) -> &'static str {
        "kv-store"
    }

    fn func_names(&self) -> &'static [&'static str] {
        &["getValue", "setValue"]
    }

    fn dispatch(&self, frame: &mut InvocationFrame<'_>) -> Result<Option<Value>, DispatchError> {
        let msg = frame.get_env().msg.clone();

        match msg.name.as_str() {
            DEPLOY_HOOK => {
                let owner = Value::Blob(Bytes::new(msg.sender.0.to_vec()));
                frame.set_state_tree("owner", &owner);
                Ok(None)
            }
            "getValue" => Ok(frame.get_state_tree("value")),
            "setValue" => {
                let owner = frame.get_state_tree("owner");
                let sender = Value::Blob(Bytes::new(msg.sender.0.to_vec()));
                if owner.as_ref() != Some(&sender) {
                    return Err(DispatchError::rejected(
                        "only the contract owner can set the value",
                    ));
                }

                let Some(value) = msg.params.first() else {
                    return Err(DispatchError::rejected("a value parameter is required"));
                };
                frame.set_state_tree("value", value);
                Ok(None)
            }
            other => Err(DispatchError::UnknownFunction(other.to_string())),
        }
    }
}

/// Unrestricted shared counter.
pub struct Counter;

impl ContractCode for Counter {
    fn code_name(&self) -> &'static str {
        "counter"
    }

    fn func_names(&self) -> &'static [&'static str] {
        &["count", "increase"]
    }

    fn dispatch(&self, frame: &mut InvocationFrame<'_>) -> Result<Option<Value>, DispatchError> {
        let msg = frame.get_env().msg.clone();

        match msg.name.as_str() {
            DEPLOY_HOOK => {
                frame.set_state_tree("count", &Value::Int(0));
                Ok(None)
            }
            "count" => Ok(frame.get_state_tree("count")),
            "increase" => {
                let step = match msg.params.first() {
                    None => 1,
                    Some(Value::Int(step)) if *step > 0 => *step,
                    Some(_) => {
                        return Err(DispatchError::rejected("step must be a positive integer"));
                    }
                };

                let current = match frame.get_state_tree("count") {
                    Some(Value::Int(n)) => n,
                    _ => 0,
                };
                let next = current.saturating_add(step);
                frame.set_state_tree("count", &Value::Int(next));
                Ok(Some(Value::Int(next)))
            }
            other => Err(DispatchError::UnknownFunction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::code::{BlockEnv, InvokeEnv, Message};
    use crate::state::value::StateGraph;
    use crate::types::address::Address;
    use crate::types::hash::Hash;

    fn frame_env(name: &str, sender: Address, params: Vec<Value>) -> InvokeEnv {
        InvokeEnv {
            msg: Message {
                name: name.to_string(),
                sender,
                params,
            },
            block: BlockEnv {
                number: 1,
                hash: Hash::zero(),
                timestamp: 0,
            },
        }
    }

    fn dispatch(
        code: &dyn ContractCode,
        state: &mut StateGraph,
        name: &str,
        sender: Address,
        params: Vec<Value>,
    ) -> Result<Option<Value>, DispatchError> {
        let mut frame = InvocationFrame::new(frame_env(name, sender, params), state);
        code.dispatch(&mut frame)
    }

    #[test]
    fn kv_store_deploy_hook_records_owner() {
        let owner = Address([1u8; 20]);
        let mut state = StateGraph::new();

        dispatch(&KeyValueStore, &mut state, DEPLOY_HOOK, owner, vec![]).unwrap();

        assert!(state.root("owner").is_some());
    }

    #[test]
    fn kv_store_owner_can_set_and_read() {
        let owner = Address([1u8; 20]);
        let mut state = StateGraph::new();
        dispatch(&KeyValueStore, &mut state, DEPLOY_HOOK, owner, vec![]).unwrap();

        dispatch(
            &KeyValueStore,
            &mut state,
            "setValue",
            owner,
            vec![Value::text("stored")],
        )
        .unwrap();

        let result = dispatch(&KeyValueStore, &mut state, "getValue", owner, vec![]).unwrap();
        assert_eq!(result, Some(Value::text("stored")));
    }

    #[test]
    fn kv_store_rejects_non_owner() {
        let owner = Address([1u8; 20]);
        let stranger = Address([2u8; 20]);
        let mut state = StateGraph::new();
        dispatch(&KeyValueStore, &mut state, DEPLOY_HOOK, owner, vec![]).unwrap();

        let err = dispatch(
            &KeyValueStore,
            &mut state,
            "setValue",
            stranger,
            vec![Value::Int(1)],
        )
        .unwrap_err();

        assert!(err.to_string().contains("owner"));
        assert!(state.root("value").is_none());
    }

    #[test]
    fn kv_store_rejects_missing_parameter() {
        let owner = Address([1u8; 20]);
        let mut state = StateGraph::new();
        dispatch(&KeyValueStore, &mut state, DEPLOY_HOOK, owner, vec![]).unwrap();

        let err = dispatch(&KeyValueStore, &mut state, "setValue", owner, vec![]).unwrap_err();
        assert!(err.to_string().contains("parameter"));
    }

    #[test]
    fn kv_store_unknown_function_rejected() {
        let mut state = StateGraph::new();
        let err = dispatch(
            &KeyValueStore,
            &mut state,
            "destroy",
            Address::zero(),
            vec![],
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownFunction(_)));
    }

    #[test]
    fn counter_increases_from_zero() {
        let sender = Address([3u8; 20]);
        let mut state = StateGraph::new();
        dispatch(&Counter, &mut state, DEPLOY_HOOK, sender, vec![]).unwrap();

        let result = dispatch(&Counter, &mut state, "increase", sender, vec![]).unwrap();
        assert_eq!(result, Some(Value::Int(1)));

        let result = dispatch(
            &Counter,
            &mut state,
            "increase",
            sender,
            vec![Value::Int(10)],
        )
        .unwrap();
        assert_eq!(result, Some(Value::Int(11)));

        let count = dispatch(&Counter, &mut state, "count", sender, vec![]).unwrap();
        assert_eq!(count, Some(Value::Int(11)));
    }

    #[test]
    fn counter_rejects_bad_step() {
        let sender = Address([3u8; 20]);
        let mut state = StateGraph::new();
        dispatch(&Counter, &mut state, DEPLOY_HOOK, sender, vec![]).unwrap();

        let err = dispatch(
            &Counter,
            &mut state,
            "increase",
            sender,
            vec![Value::text("three")],
        )
        .unwrap_err();
        assert!(matches!(err, DispatchError::Rejected(_)));
    }
}
