//! Structured binary codec for state graphs.
//!
//! The graph is first rewritten into canonical form (dense depth-first node
//! numbering over sorted root keys), then emitted linearly. Child references
//! are the canonical indices, so sharing and cycles survive the round trip
//! and equal graphs always produce identical bytes.
//!
//! Format: `[version u8][node count][nodes][roots]` with each node as a tag
//! byte followed by its payload.

use crate::state::serializer::{Serializer, SerializerError};
use crate::state::value::{Node, NodeId, StateGraph};
use crate::types::bytes::Bytes;
use crate::types::encoding::{Decode, Encode};
use std::collections::BTreeMap;

const FORMAT_VERSION: u8 = 1;

const TAG_NULL: u8 = 0;
const TAG_ABSENT: u8 = 1;
const TAG_BOOL: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_TEXT: u8 = 5;
const TAG_BLOB: u8 = 6;
const TAG_LIST: u8 = 7;
const TAG_MAP: u8 = 8;

/// The `binary` serializer: deterministic, sharing-preserving, compact.
pub struct BinarySerializer;

impl Serializer for BinarySerializer {
    fn name(&self) -> &'static str {
        "binary"
    }

    fn serialize(&self, graph: &StateGraph) -> Result<Vec<u8>, SerializerError> {
        // Canonicalize a working copy so node ids are dense and stable.
        let mut canonical = graph.clone();
        canonical.compact();

        let mut out = Vec::new();
        FORMAT_VERSION.encode(&mut out);
        canonical.node_count().encode(&mut out);

        for index in 0..canonical.node_count() {
            encode_node(&canonical, NodeId(index as u32), &mut out)?;
        }

        let roots: BTreeMap<String, NodeId> = canonical
            .roots()
            .map(|(key, id)| (key.to_string(), id))
            .collect();
        roots.encode(&mut out);

        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<StateGraph, SerializerError> {
        let mut input = bytes;

        let version = u8::decode(&mut input).map_err(codec_err)?;
        if version != FORMAT_VERSION {
            return Err(SerializerError::Codec(format!(
                "unsupported format version {version}"
            )));
        }

        let count = usize::decode(&mut input).map_err(codec_err)?;
        let mut graph = StateGraph::new();
        for _ in 0..count {
            let node = decode_node(&mut input, count)?;
            graph.alloc(node);
        }

        let roots = BTreeMap::<String, NodeId>::decode(&mut input).map_err(codec_err)?;
        for (key, id) in roots {
            check_id(id, count)?;
            graph.set_root(key, id);
        }

        if !input.is_empty() {
            return Err(SerializerError::Codec("trailing bytes".to_string()));
        }

        Ok(graph)
    }
}

fn codec_err(err: crate::types::encoding::DecodeError) -> SerializerError {
    SerializerError::Codec(err.to_string())
}

fn check_id(id: NodeId, count: usize) -> Result<(), SerializerError> {
    if (id.0 as usize) < count {
        Ok(())
    } else {
        Err(SerializerError::Codec(format!(
            "node reference {} out of range",
            id.0
        )))
    }
}

fn encode_node(
    graph: &StateGraph,
    id: NodeId,
    out: &mut Vec<u8>,
) -> Result<(), SerializerError> {
    match graph.node(id) {
        Node::Null => TAG_NULL.encode(out),
        Node::Absent => TAG_ABSENT.encode(out),
        Node::Bool(b) => {
            TAG_BOOL.encode(out);
            b.encode(out);
        }
        Node::Int(i) => {
            TAG_INT.encode(out);
            i.encode(out);
        }
        Node::Float(x) => {
            TAG_FLOAT.encode(out);
            x.encode(out);
        }
        Node::Text(s) => {
            TAG_TEXT.encode(out);
            s.encode(out);
        }
        Node::Blob(b) => {
            TAG_BLOB.encode(out);
            b.encode(out);
        }
        Node::List(items) => {
            TAG_LIST.encode(out);
            items.encode(out);
        }
        Node::Map(entries) => {
            TAG_MAP.encode(out);
            entries.encode(out);
        }
        Node::Handle(kind) => {
            // A live host handle has no meaning in another process.
            return Err(SerializerError::Unsupported {
                kind: kind.to_string(),
            });
        }
    }
    Ok(())
}

fn decode_node(input: &mut &[u8], count: usize) -> Result<Node, SerializerError> {
    let tag = u8::decode(input).map_err(codec_err)?;
    let node = match tag {
        TAG_NULL => Node::Null,
        TAG_ABSENT => Node::Absent,
        TAG_BOOL => Node::Bool(bool::decode(input).map_err(codec_err)?),
        TAG_INT => Node::Int(i64::decode(input).map_err(codec_err)?),
        TAG_FLOAT => Node::Float(f64::decode(input).map_err(codec_err)?),
        TAG_TEXT => Node::Text(String::decode(input).map_err(codec_err)?),
        TAG_BLOB => Node::Blob(Bytes::decode(input).map_err(codec_err)?),
        TAG_LIST => {
            let items = Vec::<NodeId>::decode(input).map_err(codec_err)?;
            for &id in &items {
                check_id(id, count)?;
            }
            Node::List(items)
        }
        TAG_MAP => {
            let entries = BTreeMap::<String, NodeId>::decode(input).map_err(codec_err)?;
            for &id in entries.values() {
                check_id(id, count)?;
            }
            Node::Map(entries)
        }
        other => {
            return Err(SerializerError::Codec(format!("unknown node tag {other}")));
        }
    };
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::value::{HandleKind, Value};

    fn roundtrip(graph: &StateGraph) -> StateGraph {
        let bytes = BinarySerializer.serialize(graph).expect("serialize");
        BinarySerializer.deserialize(&bytes).expect("deserialize")
    }

    #[test]
    fn scalar_roundtrip() {
        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Int(-17));
        graph.set_root("n", id);

        assert!(roundtrip(&graph).observably_equal(&graph));
    }

    #[test]
    fn nested_roundtrip() {
        let mut entries = BTreeMap::new();
        entries.insert("list".to_string(), Value::List(vec![Value::Null, Value::Bool(true)]));
        entries.insert("blob".to_string(), Value::Blob(Bytes::new(vec![0u8, 255])));
        entries.insert("text".to_string(), Value::text("hello"));

        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Map(entries));
        graph.set_root("root", id);

        assert!(roundtrip(&graph).observably_equal(&graph));
    }

    #[test]
    fn sharing_survives_roundtrip() {
        let mut graph = StateGraph::new();
        let shared = graph.insert_tree(&Value::text("shared"));
        let a = graph.alloc(Node::List(vec![shared]));
        let b = graph.alloc(Node::List(vec![shared]));
        graph.set_root("a", a);
        graph.set_root("b", b);

        assert!(roundtrip(&graph).observably_equal(&graph));
    }

    #[test]
    fn cycle_survives_roundtrip() {
        let mut graph = StateGraph::new();
        let list = graph.alloc(Node::List(vec![]));
        if let Node::List(items) = graph.node_mut(list) {
            items.push(list);
        }
        graph.set_root("root", list);

        assert!(roundtrip(&graph).observably_equal(&graph));
    }

    #[test]
    fn equal_graphs_serialize_identically() {
        let build = |padding: bool| {
            let mut graph = StateGraph::new();
            if padding {
                // Garbage changes allocation history but not content.
                graph.alloc(Node::Int(12345));
            }
            let id = graph.insert_tree(&Value::List(vec![Value::Int(1), Value::Int(2)]));
            graph.set_root("k", id);
            graph
        };

        let a = BinarySerializer.serialize(&build(false)).unwrap();
        let b = BinarySerializer.serialize(&build(true)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn handle_is_rejected() {
        let mut graph = StateGraph::new();
        let id = graph.alloc(Node::Handle(HandleKind::Callable));
        graph.set_root("fn", id);

        assert!(matches!(
            BinarySerializer.serialize(&graph),
            Err(SerializerError::Unsupported { .. })
        ));
    }

    #[test]
    fn nan_float_roundtrips_bitwise() {
        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Float(f64::NAN));
        graph.set_root("x", id);

        assert!(roundtrip(&graph).observably_equal(&graph));
    }

    #[test]
    fn deserialize_rejects_out_of_range_reference() {
        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::List(vec![Value::Int(1)]));
        graph.set_root("k", id);

        let mut bytes = BinarySerializer.serialize(&graph).unwrap();
        // Corrupt the trailing root id to point past the node table.
        let len = bytes.len();
        bytes[len - 4..].copy_from_slice(&u32::MAX.to_le_bytes());

        assert!(BinarySerializer.deserialize(&bytes).is_err());
    }

    #[test]
    fn deserialize_rejects_trailing_bytes() {
        let mut graph = StateGraph::new();
        let id = graph.insert_tree(&Value::Null);
        graph.set_root("k", id);

        let mut bytes = BinarySerializer.serialize(&graph).unwrap();
        bytes.push(0xEE);
        assert!(matches!(
            BinarySerializer.deserialize(&bytes),
            Err(SerializerError::Codec(_))
        ));
    }
}
