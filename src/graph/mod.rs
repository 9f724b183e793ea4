use crate::error::CacheError;
use indexmap::IndexMap;
use itertools::Itertools;
use lazy_static::lazy_static;
use serde::{Serialize, Serializer};
use serde_json_bytes::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

pub mod node;
pub mod snapshot;

/// Stable identifier of a node in the normalized graph.
///
/// Three flavors share this representation and differ only by construction:
/// well-known static roots (see [`struct@QUERY_ROOT_ID`]), entity ids taken from
/// payload objects, and parameterized-value ids derived by
/// [`parameterized_node_id`]. The textual form is an external contract:
/// callers may persist ids and compare them across writes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        NodeId(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId::new(id)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

lazy_static! {
    /// Root node of query operations.
    pub static ref QUERY_ROOT_ID: NodeId = NodeId::new("QueryRoot");
    /// Root node of mutation operations.
    pub static ref MUTATION_ROOT_ID: NodeId = NodeId::new("MutationRoot");
    /// Root node of subscription operations.
    pub static ref SUBSCRIPTION_ROOT_ID: NodeId = NodeId::new("SubscriptionRoot");
}

/// Observable kind of a node snapshot. The kind does not affect merge
/// semantics; it records how the node came to exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum NodeKind {
    #[strum(to_string = "EntityNodeSnapshot")]
    Entity,
    #[strum(to_string = "ParameterizedValueSnapshot")]
    ParameterizedValue,
}

/// One step inside a node's value: an object key or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{key}"),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Sequence of steps from a node's root to a position inside its value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NodePath(Vec<PathSegment>);

impl NodePath {
    pub fn new(segments: impl IntoIterator<Item = PathSegment>) -> Self {
        NodePath(segments.into_iter().collect())
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// This path extended by one more step.
    pub fn child(&self, segment: impl Into<PathSegment>) -> NodePath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        NodePath(segments)
    }

    /// Whether `prefix` covers this path (equal paths count).
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.0 {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<PathSegment> for NodePath {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        NodePath(iter.into_iter().collect())
    }
}

/// One directed edge of the graph: a reference to `id` occupying `path`
/// inside the holding node's value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct NodeReference {
    pub id: NodeId,
    pub path: NodePath,
}

/// A field's arguments with variables and defaults already substituted.
/// Optional arguments the operation omitted are present with a `null` value.
pub type FieldArguments = IndexMap<String, JsonValue>;

/// Deterministic id for the value node of a parameterized field.
///
/// The canonical form concatenates the container id, the JSON serialization
/// of the field path (field names and array indices), and the JSON
/// serialization of the argument map with keys sorted lexicographically at
/// every level. Equivalent inputs always produce the same id.
pub fn parameterized_node_id(
    container: &NodeId,
    path: &NodePath,
    arguments: &FieldArguments,
) -> Result<NodeId, CacheError> {
    let path_json = serde_json::to_string(path)
        .map_err(|err| CacheError::internal(format!("failed to serialize field path: {err}")))?;
    let arguments_json = serde_json::to_string(&canonical_arguments(arguments))
        .map_err(|err| CacheError::internal(format!("failed to serialize arguments: {err}")))?;
    Ok(NodeId::new(format!(
        "{container}❖{path_json}❖{arguments_json}"
    )))
}

fn canonical_arguments(arguments: &FieldArguments) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    for (key, value) in arguments
        .iter()
        .sorted_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()))
    {
        object.insert(key.clone(), canonical_json(value));
    }
    serde_json::Value::Object(object)
}

/// Canonical form of one argument value: object keys sorted at every level,
/// and a finite float with zero fractional part in `i64` range collapsed to
/// the integer it denotes, so that `1.0` and `1` address the same node while
/// `"1"` remains distinct.
fn canonical_json(value: &JsonValue) -> serde_json::Value {
    match value {
        JsonValue::Null => serde_json::Value::Null,
        JsonValue::Bool(b) => serde_json::Value::Bool(*b),
        JsonValue::Number(n) => serde_json::Value::Number(canonical_number(n)),
        JsonValue::String(s) => serde_json::Value::String(s.as_str().to_owned()),
        JsonValue::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonical_json).collect())
        }
        JsonValue::Object(fields) => {
            let mut object = serde_json::Map::new();
            for (key, item) in fields
                .iter()
                .sorted_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()))
            {
                object.insert(key.as_str().to_owned(), canonical_json(item));
            }
            serde_json::Value::Object(object)
        }
    }
}

fn canonical_number(number: &serde_json::Number) -> serde_json::Number {
    if number.as_i64().is_none() && number.as_u64().is_none() {
        if let Some(float) = number.as_f64() {
            if float.is_finite() && float.fract() == 0.0 && float.abs() <= i64::MAX as f64 {
                return serde_json::Number::from(float as i64);
            }
        }
    }
    number.clone()
}
