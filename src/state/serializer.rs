//! Named state serializers and process-wide selection.
//!
//! Every durable form of contract state flows through one [`Serializer`]:
//! sanitization round trips, persistence, and the commit digest. The
//! serializer is chosen once per process from configuration and cached for
//! the process lifetime - selection is never reconsidered per call, since a
//! node that switched codecs mid-run would stop agreeing with its peers.

use crate::state::binary::BinarySerializer;
use crate::state::json::JsonSerializer;
use crate::state::value::StateGraph;
use crate::utils::config::state_config;
use appchain_derive::Error;
use std::sync::OnceLock;

/// Errors produced while encoding or decoding a state graph.
#[derive(Debug, Error)]
pub enum SerializerError {
    /// The graph contains a value this codec cannot represent.
    #[error("cannot serialize {kind}")]
    Unsupported { kind: String },
    /// The codec cannot represent a cyclic value.
    #[error("cannot serialize a cyclic value")]
    Cycle,
    /// Malformed or inconsistent encoded input.
    #[error("codec error: {0}")]
    Codec(String),
}

/// A named codec turning state graphs into bytes and back.
///
/// Implementations must be deterministic: equal graphs (same values, same
/// sharing relation) must serialize to identical bytes on every node.
pub trait Serializer: Send + Sync {
    /// Registry name of this serializer.
    fn name(&self) -> &'static str;

    /// Encodes a graph, failing on values the codec cannot represent.
    fn serialize(&self, graph: &StateGraph) -> Result<Vec<u8>, SerializerError>;

    /// Decodes a graph previously produced by `serialize`.
    fn deserialize(&self, bytes: &[u8]) -> Result<StateGraph, SerializerError>;
}

static BINARY: BinarySerializer = BinarySerializer;
static JSON: JsonSerializer = JsonSerializer;

/// Looks up a serializer by registry name.
pub fn by_name(name: &str) -> Option<&'static dyn Serializer> {
    match name {
        "binary" => Some(&BINARY),
        "json" => Some(&JSON),
        _ => None,
    }
}

static GLOBAL: OnceLock<&'static dyn Serializer> = OnceLock::new();

/// Returns the process-wide serializer, resolving it from configuration on
/// first call.
///
/// Panics when the configured name is unknown: running with an undefined
/// codec would fork this node's state from the network.
pub fn global() -> &'static dyn Serializer {
    *GLOBAL.get_or_init(|| {
        let name = state_config().serializer.as_str();
        match by_name(name) {
            Some(serializer) => serializer,
            None => panic!("unknown state serializer `{name}`; expected `binary` or `json`"),
        }
    })
}
