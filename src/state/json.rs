//! Plain-text JSON codec for state graphs.
//!
//! Human-readable but strictly less capable than the binary codec: JSON has
//! no sharing, no cycles, no non-finite floats and no distinct "absent"
//! marker. Values outside that envelope fail here even when the structural
//! sanitizer pass admits them - the sanitizer's round-trip check is what
//! surfaces these codec-specific limits.
//!
//! Blobs are encoded as a single-key object `{"$blob": "<hex>"}`. A map
//! that genuinely contains only that key is indistinguishable from a blob
//! and will fail the round-trip comparison; that ambiguity is part of this
//! codec's envelope.

use crate::state::serializer::{Serializer, SerializerError};
use crate::state::value::{Node, NodeId, StateGraph};
use crate::types::bytes::Bytes;
use serde_json::{json, Map as JsonMap, Number, Value as JsonValue};

const BLOB_KEY: &str = "$blob";

/// The `json` serializer: plain text, no sharing, finite numbers only.
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize(&self, graph: &StateGraph) -> Result<Vec<u8>, SerializerError> {
        let mut top = JsonMap::new();
        for (key, id) in graph.roots() {
            let mut path = Vec::new();
            top.insert(key.to_string(), expand(graph, id, &mut path)?);
        }

        serde_json::to_vec(&JsonValue::Object(top))
            .map_err(|e| SerializerError::Codec(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<StateGraph, SerializerError> {
        let value: JsonValue =
            serde_json::from_slice(bytes).map_err(|e| SerializerError::Codec(e.to_string()))?;

        let JsonValue::Object(top) = value else {
            return Err(SerializerError::Codec(
                "top level must be an object".to_string(),
            ));
        };

        let mut graph = StateGraph::new();
        for (key, value) in top {
            let id = build(&mut graph, &value)?;
            graph.set_root(key, id);
        }
        Ok(graph)
    }
}

/// Expands a graph value into a JSON tree, duplicating shared nodes and
/// failing on cycles.
fn expand(
    graph: &StateGraph,
    id: NodeId,
    path: &mut Vec<NodeId>,
) -> Result<JsonValue, SerializerError> {
    if path.contains(&id) {
        return Err(SerializerError::Cycle);
    }

    Ok(match graph.node(id) {
        Node::Null => JsonValue::Null,
        Node::Absent => {
            return Err(SerializerError::Unsupported {
                kind: "absent value".to_string(),
            });
        }
        Node::Bool(b) => JsonValue::Bool(*b),
        Node::Int(i) => JsonValue::Number(Number::from(*i)),
        Node::Float(x) => match Number::from_f64(*x) {
            Some(n) => JsonValue::Number(n),
            None => {
                return Err(SerializerError::Unsupported {
                    kind: "non-finite number".to_string(),
                });
            }
        },
        Node::Text(s) => JsonValue::String(s.clone()),
        Node::Blob(b) => json!({ BLOB_KEY: hex_encode(b) }),
        Node::Handle(kind) => {
            return Err(SerializerError::Unsupported {
                kind: kind.to_string(),
            });
        }
        Node::List(items) => {
            path.push(id);
            let mut out = Vec::with_capacity(items.len());
            for &child in items {
                out.push(expand(graph, child, path)?);
            }
            path.pop();
            JsonValue::Array(out)
        }
        Node::Map(entries) => {
            path.push(id);
            let mut out = JsonMap::new();
            for (key, &child) in entries {
                out.insert(key.clone(), expand(graph, child, path)?);
            }
            path.pop();
            JsonValue::Object(out)
        }
    })
}

/// Rebuilds graph nodes from a JSON tree.
fn build(graph: &mut StateGraph, value: &JsonValue) -> Result<NodeId, SerializerError> {
    let node = match value {
        JsonValue::Null => Node::Null,
        JsonValue::Bool(b) => Node::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Node::Int(i)
            } else if let Some(x) = n.as_f64() {
                Node::Float(x)
            } else {
                return Err(SerializerError::Codec(format!(
                    "number {n} outside representable range"
                )));
            }
        }
        JsonValue::String(s) => Node::Text(s.clone()),
        JsonValue::Array(items) => {
            let mut children = Vec::with_capacity(items.len());
            for item in items {
                children.push(build(graph, item)?);
            }
            Node::List(children)
        }
        JsonValue::Object(entries) => {
            if entries.len() == 1 {
                if let Some(JsonValue::String(hex)) = entries.get(BLOB_KEY) {
                    let bytes = hex_decode(hex).ok_or_else(|| {
                        SerializerError::Codec("malformed blob encoding".to_string())
                    })?;
                    let id = graph.alloc(Node::Blob(Bytes::new(bytes)));
                    return Ok(id);
                }
            }
            let mut children = std::collections::BTreeMap::new();
            for (key, child) in entries {
                children.insert(key.clone(), build(graph, child)?);
            }
            Node::Map(children)
        }
    };
    Ok(graph.alloc(node))
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
