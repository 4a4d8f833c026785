//! Arena-backed value graphs for contract state.
//!
//! Contract state is held in a closed, tagged value model: scalars, opaque
//! blobs, lists, string-keyed maps, and live host handles. Composite nodes
//! reference their children by arena id, which makes sharing and cycles
//! explicit - two parents holding the same [`NodeId`] *are* the same value,
//! and reference identity is the id itself. Constructs outside this model
//! cannot be represented at all, so no runtime type sniffing is needed to
//! find them.

use crate::types::bytes::Bytes;
use appchain_derive::BinaryCodec;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Opaque handle to a node inside a [`StateGraph`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, BinaryCodec)]
pub struct NodeId(pub(crate) u32);

/// Categories of live host constructs that may transiently appear in
/// working state but can never be persisted.
///
/// These are the dynamic values a contract runtime can hand out - function
/// references, lazily-evaluated wrappers, handles to computations that have
/// not finished. The sanitizer keeps them out of durable state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BinaryCodec)]
pub enum HandleKind {
    /// A live callable (function or closure) reference.
    Callable,
    /// A lazy or proxy-like wrapper whose value is produced on demand.
    Deferred,
    /// A handle to an asynchronous computation that has not completed.
    PendingCall,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandleKind::Callable => write!(f, "callable reference"),
            HandleKind::Deferred => write!(f, "deferred wrapper"),
            HandleKind::PendingCall => write!(f, "pending call handle"),
        }
    }
}

/// One node of a state graph.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Explicit null value.
    Null,
    /// "No value" marker, distinct from null; see the sanitizer's
    /// strip-absent policy.
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Opaque byte buffer. Treated as a leaf: never walked, always allowed.
    Blob(Bytes),
    /// Ordered sequence of child nodes.
    List(Vec<NodeId>),
    /// String-keyed mapping; `BTreeMap` keeps iteration order canonical.
    Map(BTreeMap<String, NodeId>),
    /// Live host construct; rejected by sanitization.
    Handle(HandleKind),
}

impl Node {
    /// Composite nodes have children and participate in cycle detection.
    pub fn is_composite(&self) -> bool {
        matches!(self, Node::List(_) | Node::Map(_))
    }
}

/// An owned value tree, used at the boundaries of the system: invocation
/// parameters, return data, and ergonomic construction of graph values.
///
/// Trees cannot express sharing or cycles - converting a cyclic graph value
/// back into a tree fails rather than recursing forever.
#[derive(Clone, Debug, PartialEq, BinaryCodec)]
pub enum Value {
    Null,
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Blob(Bytes),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Handle(HandleKind),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }
}

/// A keyed state mapping backed by a node arena.
///
/// The graph owns every node a contract's state can reach; named roots are
/// the contract's top-level state keys. Cloning the graph produces an
/// isolated working copy, which is how per-invocation staging works.
#[derive(Clone, Debug, Default)]
pub struct StateGraph {
    nodes: Vec<Node>,
    roots: BTreeMap<String, NodeId>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the arena, reachable or not.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Allocates a node and returns its id.
    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Returns the node behind `id`.
    ///
    /// Ids are only ever produced by this graph's `alloc`, so an
    /// out-of-range id is a logic error and panics.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    /// Mutable access to the node behind `id`.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    /// Binds a root key to a node.
    pub fn set_root(&mut self, key: impl Into<String>, id: NodeId) {
        self.roots.insert(key.into(), id);
    }

    /// Looks up a root key.
    pub fn root(&self, key: &str) -> Option<NodeId> {
        self.roots.get(key).copied()
    }

    /// Removes a root key, returning its previous binding.
    pub fn remove_root(&mut self, key: &str) -> Option<NodeId> {
        self.roots.remove(key)
    }

    /// Iterates root bindings in canonical (sorted) order.
    pub fn roots(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.roots.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Copies an owned tree into the arena, returning the root id.
    pub fn insert_tree(&mut self, value: &Value) -> NodeId {
        let node = match value {
            Value::Null => Node::Null,
            Value::Absent => Node::Absent,
            Value::Bool(b) => Node::Bool(*b),
            Value::Int(i) => Node::Int(*i),
            Value::Float(x) => Node::Float(*x),
            Value::Text(s) => Node::Text(s.clone()),
            Value::Blob(b) => Node::Blob(b.clone()),
            Value::Handle(kind) => Node::Handle(*kind),
            Value::List(items) => {
                let children = items.iter().map(|v| self.insert_tree(v)).collect();
                Node::List(children)
            }
            Value::Map(entries) => {
                let children = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.insert_tree(v)))
                    .collect();
                Node::Map(children)
            }
        };
        self.alloc(node)
    }

    /// Expands a graph value into an owned tree.
    ///
    /// Returns `None` when the value is cyclic - a tree cannot express it.
    /// Shared (acyclic) nodes are duplicated.
    pub fn extract_tree(&self, id: NodeId) -> Option<Value> {
        self.extract_inner(id, &mut Vec::new())
    }

    fn extract_inner(&self, id: NodeId, path: &mut Vec<NodeId>) -> Option<Value> {
        if path.contains(&id) {
            return None;
        }

        Some(match self.node(id) {
            Node::Null => Value::Null,
            Node::Absent => Value::Absent,
            Node::Bool(b) => Value::Bool(*b),
            Node::Int(i) => Value::Int(*i),
            Node::Float(x) => Value::Float(*x),
            Node::Text(s) => Value::Text(s.clone()),
            Node::Blob(b) => Value::Blob(b.clone()),
            Node::Handle(kind) => Value::Handle(*kind),
            Node::List(items) => {
                path.push(id);
                let mut out = Vec::with_capacity(items.len());
                for &child in items {
                    out.push(self.extract_inner(child, path)?);
                }
                path.pop();
                Value::List(out)
            }
            Node::Map(entries) => {
                path.push(id);
                let mut out = BTreeMap::new();
                for (key, &child) in entries {
                    out.insert(key.clone(), self.extract_inner(child, path)?);
                }
                path.pop();
                Value::Map(out)
            }
        })
    }

    /// Structural equality that also requires the same sharing relation.
    ///
    /// Two graphs are observably equal when their root keys match and a
    /// single bijection between node ids makes every reachable pair equal.
    /// A value shared in one graph but duplicated in the other is *not*
    /// observably equal, and cycles compare without diverging.
    pub fn observably_equal(&self, other: &StateGraph) -> bool {
        if self.roots.len() != other.roots.len() {
            return false;
        }

        let mut forward: HashMap<NodeId, NodeId> = HashMap::new();
        let mut backward: HashMap<NodeId, NodeId> = HashMap::new();

        for ((key_a, &root_a), (key_b, &root_b)) in self.roots.iter().zip(other.roots.iter()) {
            if key_a != key_b {
                return false;
            }
            if !self.equal_inner(root_a, other, root_b, &mut forward, &mut backward) {
                return false;
            }
        }
        true
    }

    fn equal_inner(
        &self,
        a: NodeId,
        other: &StateGraph,
        b: NodeId,
        forward: &mut HashMap<NodeId, NodeId>,
        backward: &mut HashMap<NodeId, NodeId>,
    ) -> bool {
        match (forward.get(&a), backward.get(&b)) {
            (Some(&mapped), Some(&mapped_back)) => return mapped == b && mapped_back == a,
            (None, None) => {}
            // One side already paired with a different node: sharing differs.
            _ => return false,
        }
        forward.insert(a, b);
        backward.insert(b, a);

        match (self.node(a), other.node(b)) {
            (Node::Null, Node::Null) | (Node::Absent, Node::Absent) => true,
            (Node::Bool(x), Node::Bool(y)) => x == y,
            (Node::Int(x), Node::Int(y)) => x == y,
            // Bit equality: NaN payloads and signed zeros must survive.
            (Node::Float(x), Node::Float(y)) => x.to_bits() == y.to_bits(),
            (Node::Text(x), Node::Text(y)) => x == y,
            (Node::Blob(x), Node::Blob(y)) => x == y,
            (Node::Handle(x), Node::Handle(y)) => x == y,
            (Node::List(xs), Node::List(ys)) => {
                xs.len() == ys.len()
                    && xs
                        .iter()
                        .zip(ys.iter())
                        .all(|(&x, &y)| self.equal_inner(x, other, y, forward, backward))
            }
            (Node::Map(xs), Node::Map(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().zip(ys.iter()).all(|((kx, &x), (ky, &y))| {
                        kx == ky && self.equal_inner(x, other, y, forward, backward)
                    })
            }
            _ => false,
        }
    }

    /// Rewrites the arena into canonical form: nodes reachable from the
    /// roots, numbered in depth-first order over sorted root keys, garbage
    /// dropped. Sharing and cycles are preserved through the id remap.
    pub fn compact(&mut self) {
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        let mut order: Vec<NodeId> = Vec::new();

        for (_, root) in self.roots.iter() {
            Self::assign_ids(&self.nodes, *root, &mut remap, &mut order);
        }

        let mut nodes = Vec::with_capacity(order.len());
        for &old_id in &order {
            let node = match &self.nodes[old_id.0 as usize] {
                Node::List(items) => Node::List(items.iter().map(|c| remap[c]).collect()),
                Node::Map(entries) => Node::Map(
                    entries
                        .iter()
                        .map(|(k, c)| (k.clone(), remap[c]))
                        .collect(),
                ),
                other => other.clone(),
            };
            nodes.push(node);
        }

        self.nodes = nodes;
        for (_, root) in self.roots.iter_mut() {
            let mapped = remap[&*root];
            *root = mapped;
        }
    }

    fn assign_ids(
        nodes: &[Node],
        id: NodeId,
        remap: &mut HashMap<NodeId, NodeId>,
        order: &mut Vec<NodeId>,
    ) {
        if remap.contains_key(&id) {
            return;
        }
        remap.insert(id, NodeId(order.len() as u32));
        order.push(id);

        match &nodes[id.0 as usize] {
            Node::List(items) => {
                for &child in items {
                    Self::assign_ids(nodes, child, remap, order);
                }
            }
            Node::Map(entries) => {
                for &child in entries.values() {
                    Self::assign_ids(nodes, child, remap, order);
                }
            }
            _ => {}
        }
    }
}
