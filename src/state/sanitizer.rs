//! State sanitization: validating and normalizing contract state before it
//! becomes durable.
//!
//! The sanitizer walks a state graph depth-first, rejects live host
//! constructs that cannot be serialized deterministically across node
//! processes, resolves shared and circular references per policy, strips
//! absent values, and finally round-trips the result through the configured
//! serializer. The round trip catches codec-specific limitations the
//! structural walk cannot see (sharing under a flat codec, non-finite
//! numbers, depth limits), so a graph that passes sanitization is known to
//! persist and hash identically everywhere.

use crate::state::serializer::Serializer;
use crate::state::value::{HandleKind, Node, NodeId, StateGraph};
use crate::utils::config::{state_config, StateConfig};
use appchain_derive::Error;
use std::collections::HashSet;
use std::fmt::Write as _;

/// Errors that make a state graph unfit for persistence.
#[derive(Debug, Error)]
pub enum SanitizeError {
    /// The graph holds a live dynamic construct at the given path.
    #[error("state contains unsupported {kind} at {path}")]
    UnsupportedType { kind: String, path: String },
    /// The graph reaches a composite value already on the current walk path.
    #[error("state contains a circular reference at {path}")]
    CircularReference { path: String },
    /// The serializer could not reproduce the graph bit-for-bit.
    #[error("state failed the serializer round trip: {0}")]
    RoundTrip(String),
}

/// Policy knobs governing sanitization, resolved once per process.
#[derive(Debug, Clone)]
pub struct SanitizePolicy {
    /// Whether a re-encountered composite on the current path is a
    /// legitimate back reference (true) or a failure (false).
    pub circular_allowed: bool,
    /// Whether absent values are removed from maps and nulled in lists.
    pub strip_absent: bool,
    /// Handle kinds that always fail validation.
    pub denied_handles: Vec<HandleKind>,
}

impl Default for SanitizePolicy {
    fn default() -> Self {
        Self {
            circular_allowed: true,
            strip_absent: true,
            denied_handles: vec![
                HandleKind::Callable,
                HandleKind::Deferred,
                HandleKind::PendingCall,
            ],
        }
    }
}

impl SanitizePolicy {
    /// Builds the policy from resolved process configuration.
    pub fn from_config(config: &StateConfig) -> Self {
        Self {
            circular_allowed: config.circular_allowed,
            strip_absent: config.strip_absent,
            ..Self::default()
        }
    }
}

/// Path to a node inside a state graph, for error reporting.
#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

fn render_path(segments: &[Segment]) -> String {
    let mut out = String::from("state");
    for segment in segments {
        match segment {
            Segment::Key(key) => {
                let _ = write!(out, ".{key}");
            }
            Segment::Index(index) => {
                let _ = write!(out, "[{index}]");
            }
        }
    }
    out
}

/// Validates and normalizes state graphs against a policy and a serializer.
///
/// The serializer is passed in by reference rather than resolved per call;
/// production code hands over the process-wide instance once at
/// construction (see [`Sanitizer::from_process_config`]).
pub struct Sanitizer {
    policy: SanitizePolicy,
    serializer: &'static dyn Serializer,
}

impl Sanitizer {
    pub fn new(policy: SanitizePolicy, serializer: &'static dyn Serializer) -> Self {
        Self { policy, serializer }
    }

    /// Builds a sanitizer from the process-wide configuration and serializer.
    pub fn from_process_config() -> Self {
        Self::new(
            SanitizePolicy::from_config(state_config()),
            crate::state::serializer::global(),
        )
    }

    /// The serializer backing round-trip checks and state persistence.
    pub fn serializer(&self) -> &'static dyn Serializer {
        self.serializer
    }

    /// Sanitizes a graph in place.
    ///
    /// On success the graph is stripped per policy, compacted into
    /// canonical form, and proven to survive a serializer round trip. On
    /// failure the graph must be discarded by the caller; partial strips
    /// may have been applied.
    pub fn sanitize(&self, graph: &mut StateGraph) -> Result<(), SanitizeError> {
        let roots: Vec<(String, NodeId)> = graph
            .roots()
            .map(|(key, id)| (key.to_string(), id))
            .collect();

        let mut visiting = HashSet::new();
        let mut seen = HashSet::new();
        let mut path = Vec::new();

        for (key, id) in roots {
            path.push(Segment::Key(key));
            self.walk(graph, id, &mut path, &mut visiting, &mut seen)?;
            path.pop();
        }

        graph.compact();
        self.check_round_trip(graph)
    }

    fn walk(
        &self,
        graph: &mut StateGraph,
        id: NodeId,
        path: &mut Vec<Segment>,
        visiting: &mut HashSet<NodeId>,
        seen: &mut HashSet<NodeId>,
    ) -> Result<(), SanitizeError> {
        // Leaves first: blobs are exempt opaque buffers, handles answer to
        // the deny-list, everything else is trivially serializable.
        match graph.node(id) {
            Node::Handle(kind) => {
                if self.policy.denied_handles.contains(kind) {
                    return Err(SanitizeError::UnsupportedType {
                        kind: kind.to_string(),
                        path: render_path(path),
                    });
                }
                return Ok(());
            }
            Node::Null
            | Node::Absent
            | Node::Bool(_)
            | Node::Int(_)
            | Node::Float(_)
            | Node::Text(_)
            | Node::Blob(_) => return Ok(()),
            Node::List(_) | Node::Map(_) => {}
        }

        // A composite already on the current path closes a cycle; one seen
        // on another branch is a shared back reference and is not re-walked.
        if visiting.contains(&id) {
            return if self.policy.circular_allowed {
                Ok(())
            } else {
                Err(SanitizeError::CircularReference {
                    path: render_path(path),
                })
            };
        }
        if !seen.insert(id) {
            return Ok(());
        }
        visiting.insert(id);

        match graph.node(id).clone() {
            Node::List(children) => {
                for (index, child) in children.into_iter().enumerate() {
                    let child = if self.policy.strip_absent
                        && matches!(graph.node(child), Node::Absent)
                    {
                        // A list cannot drop a slot without shifting later
                        // indices, so absent elements become explicit nulls.
                        let null = graph.alloc(Node::Null);
                        if let Node::List(items) = graph.node_mut(id) {
                            items[index] = null;
                        }
                        null
                    } else {
                        child
                    };

                    path.push(Segment::Index(index));
                    self.walk(graph, child, path, visiting, seen)?;
                    path.pop();
                }
            }
            Node::Map(children) => {
                for (key, child) in children {
                    if self.policy.strip_absent && matches!(graph.node(child), Node::Absent) {
                        if let Node::Map(entries) = graph.node_mut(id) {
                            entries.remove(&key);
                        }
                        continue;
                    }

                    path.push(Segment::Key(key));
                    self.walk(graph, child, path, visiting, seen)?;
                    path.pop();
                }
            }
            _ => unreachable!("only composites reach this point"),
        }

        visiting.remove(&id);
        Ok(())
    }

    /// Serializes and deserializes the graph, requiring an observably equal
    /// result. Any serializer failure or mismatch is an unserializable
    /// state, even when the structural walk passed.
    fn check_round_trip(&self, graph: &StateGraph) -> Result<(), SanitizeError> {
        let bytes = self
            .serializer
            .serialize(graph)
            .map_err(|e| SanitizeError::RoundTrip(e.to_string()))?;
        let restored = self
            .serializer
            .deserialize(&bytes)
            .map_err(|e| SanitizeError::RoundTrip(e.to_string()))?;

        if !restored.observably_equal(graph) {
            return Err(SanitizeError::RoundTrip(format!(
                "{} codec does not reproduce this graph",
                self.serializer.name()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::serializer::by_name;
    use crate::state::value::Value;
    use crate::types::bytes::Bytes;
    use std::collections::BTreeMap;

    fn binary_sanitizer(policy: SanitizePolicy) -> Sanitizer {
        Sanitizer::new(policy, by_name("binary").unwrap())
    }

    fn cyclic_graph() -> StateGraph {
        let mut graph = StateGraph::new();
        let list = graph.alloc(Node::List(vec![]));
        if let Node::List(items) = graph.node_mut(list) {
            items.push(list);
        }
        graph.set_root("root", list);
        graph
    }

    #[test]
    fn plain_graph_sanitizes() {
        let mut entries = BTreeMap::new();
        entries.insert("owner".to_string(), Value::text("alice"));
        entries.insert("count".to_string(), Value::Int(3));

        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Map(entries));
        graph.set_root("root", id);

        let sanitizer = binary_sanitizer(SanitizePolicy::default());
        assert!(sanitizer.sanitize(&mut graph).is_ok());
    }

    #[test]
    fn cycle_allowed_when_policy_permits() {
        let mut graph = cyclic_graph();
        let sanitizer = binary_sanitizer(SanitizePolicy {
            circular_allowed: true,
            ..SanitizePolicy::default()
        });
        assert!(sanitizer.sanitize(&mut graph).is_ok());
    }

    #[test]
    fn cycle_rejected_when_policy_forbids() {
        let mut graph = cyclic_graph();
        let sanitizer = binary_sanitizer(SanitizePolicy {
            circular_allowed: false,
            ..SanitizePolicy::default()
        });

        let err = sanitizer.sanitize(&mut graph).unwrap_err();
        assert!(matches!(err, SanitizeError::CircularReference { .. }));
    }

    #[test]
    fn indirect_cycle_detected() {
        let mut graph = StateGraph::new();
        let inner = graph.alloc(Node::List(vec![]));
        let outer = graph.alloc(Node::List(vec![inner]));
        if let Node::List(items) = graph.node_mut(inner) {
            items.push(outer);
        }
        graph.set_root("root", outer);

        let sanitizer = binary_sanitizer(SanitizePolicy {
            circular_allowed: false,
            ..SanitizePolicy::default()
        });
        assert!(matches!(
            sanitizer.sanitize(&mut graph),
            Err(SanitizeError::CircularReference { .. })
        ));
    }

    #[test]
    fn shared_branch_is_not_a_cycle() {
        // A diamond: two roots referencing the same list. Legitimate
        // sharing, even with circular references forbidden.
        let mut graph = StateGraph::new();
        let shared = graph.insert_tree(&Value::List(vec![Value::Int(1)]));
        graph.set_root("a", shared);
        graph.set_root("b", shared);

        let sanitizer = binary_sanitizer(SanitizePolicy {
            circular_allowed: false,
            ..SanitizePolicy::default()
        });
        assert!(sanitizer.sanitize(&mut graph).is_ok());
    }

    #[test]
    fn denied_handle_fails_with_path() {
        let mut entries = BTreeMap::new();
        entries.insert("callback".to_string(), Value::Handle(HandleKind::Callable));

        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Map(entries));
        graph.set_root("config", id);

        let sanitizer = binary_sanitizer(SanitizePolicy::default());
        let err = sanitizer.sanitize(&mut graph).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("callable reference"), "{message}");
        assert!(message.contains("state.config.callback"), "{message}");
    }

    #[test]
    fn pending_call_handle_fails() {
        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::List(vec![Value::Handle(HandleKind::PendingCall)]));
        graph.set_root("queue", id);

        let sanitizer = binary_sanitizer(SanitizePolicy::default());
        let err = sanitizer.sanitize(&mut graph).unwrap_err();
        assert!(err.to_string().contains("state.queue[0]"));
    }

    #[test]
    fn blob_is_exempt_leaf() {
        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Blob(Bytes::new(vec![1, 2, 3])));
        graph.set_root("payload", id);

        let sanitizer = binary_sanitizer(SanitizePolicy::default());
        assert!(sanitizer.sanitize(&mut graph).is_ok());
    }

    #[test]
    fn absent_map_entries_are_removed() {
        let mut entries = BTreeMap::new();
        entries.insert("kept".to_string(), Value::Int(1));
        entries.insert("dropped".to_string(), Value::Absent);

        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Map(entries));
        graph.set_root("root", id);

        binary_sanitizer(SanitizePolicy::default())
            .sanitize(&mut graph)
            .unwrap();

        let root = graph.root("root").unwrap();
        let Node::Map(entries) = graph.node(root) else {
            panic!("root should be a map");
        };
        assert!(entries.contains_key("kept"));
        assert!(!entries.contains_key("dropped"));
    }

    #[test]
    fn absent_list_elements_become_null() {
        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::List(vec![
            Value::Int(1),
            Value::Absent,
            Value::Int(3),
        ]));
        graph.set_root("root", id);

        binary_sanitizer(SanitizePolicy::default())
            .sanitize(&mut graph)
            .unwrap();

        let root = graph.root("root").unwrap();
        let extracted = graph.extract_tree(root).unwrap();
        assert_eq!(
            extracted,
            Value::List(vec![Value::Int(1), Value::Null, Value::Int(3)]),
            "positions must not shift"
        );
    }

    #[test]
    fn absent_kept_when_strip_disabled() {
        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::List(vec![Value::Absent]));
        graph.set_root("root", id);

        binary_sanitizer(SanitizePolicy {
            strip_absent: false,
            ..SanitizePolicy::default()
        })
        .sanitize(&mut graph)
        .unwrap();

        let root = graph.root("root").unwrap();
        let extracted = graph.extract_tree(root).unwrap();
        assert_eq!(extracted, Value::List(vec![Value::Absent]));
    }

    #[test]
    fn round_trip_check_catches_codec_limits() {
        // Sharing passes the structural walk but the json codec flattens
        // it, so the round-trip comparison must reject the graph.
        let mut graph = StateGraph::new();
        let shared = graph.insert_tree(&Value::List(vec![Value::Int(1)]));
        let outer = graph.alloc(Node::List(vec![shared, shared]));
        graph.set_root("root", outer);

        let sanitizer = Sanitizer::new(SanitizePolicy::default(), by_name("json").unwrap());
        assert!(matches!(
            sanitizer.sanitize(&mut graph),
            Err(SanitizeError::RoundTrip(_))
        ));
    }

    #[test]
    fn json_codec_rejects_non_finite_floats() {
        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Float(f64::INFINITY));
        graph.set_root("x", id);

        let sanitizer = Sanitizer::new(SanitizePolicy::default(), by_name("json").unwrap());
        assert!(matches!(
            sanitizer.sanitize(&mut graph),
            Err(SanitizeError::RoundTrip(_))
        ));
    }

    #[test]
    fn sanitized_graph_round_trips_idempotently() {
        let mut entries = BTreeMap::new();
        entries.insert(
            "values".to_string(),
            Value::List(vec![Value::Int(1), Value::text("two"), Value::Null]),
        );

        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Map(entries));
        graph.set_root("root", id);

        let serializer = by_name("binary").unwrap();
        let sanitizer = Sanitizer::new(SanitizePolicy::default(), serializer);
        sanitizer.sanitize(&mut graph).unwrap();

        let bytes = serializer.serialize(&graph).unwrap();
        let restored = serializer.deserialize(&bytes).unwrap();
        assert!(restored.observably_equal(&graph));
    }

    #[test]
    fn shared_reference_preserved_through_round_trip() {
        let mut graph = StateGraph::new();
        let shared = graph.insert_tree(&Value::List(vec![Value::Int(42)]));
        let outer = graph.alloc(Node::List(vec![shared, shared]));
        graph.set_root("root", outer);

        let serializer = by_name("binary").unwrap();
        let sanitizer = Sanitizer::new(
            SanitizePolicy {
                circular_allowed: true,
                ..SanitizePolicy::default()
            },
            serializer,
        );
        sanitizer.sanitize(&mut graph).unwrap();

        let restored = serializer
            .deserialize(&serializer.serialize(&graph).unwrap())
            .unwrap();
        assert!(restored.observably_equal(&graph), "sharing must survive");
    }
}
