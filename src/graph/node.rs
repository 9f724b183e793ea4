use crate::graph::{NodeKind, NodePath, NodeReference, PathSegment};
use indexmap::IndexMap;
use serde_json_bytes::{ByteString, Value as JsonValue};

/// JSON tree stored inside a node snapshot.
///
/// This mirrors a JSON value with one extra state: [`NodeValue::Hole`], a
/// position whose content lives in a child node (the edge is recorded in the
/// holder's outbound references) or that was never written. Holes are
/// omitted from object projections and project as `null` inside arrays.
/// A [`NodeValue::Json`] leaf holds whatever a leaf field produced — for
/// custom scalars that can itself be a composite JSON value, stored opaquely.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum NodeValue {
    #[default]
    Hole,
    Json(JsonValue),
    Array(Vec<NodeValue>),
    Object(IndexMap<ByteString, NodeValue>),
}

impl NodeValue {
    pub fn is_hole(&self) -> bool {
        matches!(self, NodeValue::Hole)
    }

    /// The value at `path`, or `None` if the path crosses a position that
    /// does not exist.
    pub fn get(&self, path: &[PathSegment]) -> Option<&NodeValue> {
        let Some((segment, rest)) = path.split_first() else {
            return Some(self);
        };
        match (self, segment) {
            (NodeValue::Object(fields), PathSegment::Key(key)) => {
                fields.get(key.as_str())?.get(rest)
            }
            (NodeValue::Array(items), PathSegment::Index(index)) => items.get(*index)?.get(rest),
            _ => None,
        }
    }

    /// Replaces the value at `path`, materializing containers along the way:
    /// a key step turns non-objects into objects, an index step turns
    /// non-arrays into arrays padded with holes.
    pub fn set(&mut self, path: &[PathSegment], value: NodeValue) {
        *self.entry(path) = value;
    }

    /// Hollows out the position at `path`: object keys are removed, array
    /// elements become holes. Positions that do not exist are left alone.
    pub fn clear(&mut self, path: &[PathSegment]) {
        let Some((last, parent_path)) = path.split_last() else {
            *self = NodeValue::Hole;
            return;
        };
        let Some(parent) = self.get_mut(parent_path) else {
            return;
        };
        match (parent, last) {
            (NodeValue::Object(fields), PathSegment::Key(key)) => {
                fields.shift_remove(key.as_str());
            }
            (NodeValue::Array(items), PathSegment::Index(index)) => {
                if let Some(item) = items.get_mut(*index) {
                    *item = NodeValue::Hole;
                }
            }
            _ => {}
        }
    }

    fn get_mut(&mut self, path: &[PathSegment]) -> Option<&mut NodeValue> {
        let Some((segment, rest)) = path.split_first() else {
            return Some(self);
        };
        match (self, segment) {
            (NodeValue::Object(fields), PathSegment::Key(key)) => {
                fields.get_mut(key.as_str())?.get_mut(rest)
            }
            (NodeValue::Array(items), PathSegment::Index(index)) => {
                items.get_mut(*index)?.get_mut(rest)
            }
            _ => None,
        }
    }

    fn entry(&mut self, path: &[PathSegment]) -> &mut NodeValue {
        let Some((segment, rest)) = path.split_first() else {
            return self;
        };
        match segment {
            PathSegment::Key(key) => {
                if !matches!(self, NodeValue::Object(_)) {
                    *self = NodeValue::Object(IndexMap::new());
                }
                let NodeValue::Object(fields) = self else {
                    unreachable!()
                };
                fields
                    .entry(ByteString::from(key.as_str()))
                    .or_insert(NodeValue::Hole)
                    .entry(rest)
            }
            PathSegment::Index(index) => {
                if !matches!(self, NodeValue::Array(_)) {
                    *self = NodeValue::Array(Vec::new());
                }
                let NodeValue::Array(items) = self else {
                    unreachable!()
                };
                if items.len() <= *index {
                    items.resize(*index + 1, NodeValue::Hole);
                }
                items[*index].entry(rest)
            }
        }
    }
}

/// One node's record: its value plus both directions of the reference index.
///
/// Published snapshots never mutate these; the editor works on private
/// clones and re-publishes them behind fresh `Arc`s at commit.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeSnapshot {
    pub kind: NodeKind,
    pub value: NodeValue,
    /// Edges from parents holding a reference to this node.
    pub inbound: Vec<NodeReference>,
    /// Edges to the children referenced from inside this node's value.
    pub outbound: Vec<NodeReference>,
}

impl NodeSnapshot {
    pub fn new(kind: NodeKind) -> Self {
        NodeSnapshot {
            kind,
            value: NodeValue::Hole,
            inbound: Vec::new(),
            outbound: Vec::new(),
        }
    }

    /// The outbound reference occupying exactly `path`, if any.
    pub fn outbound_at(&self, path: &NodePath) -> Option<&NodeReference> {
        self.outbound.iter().find(|reference| reference.path == *path)
    }

    /// A node that carries no value and no edges; such nodes are not worth
    /// publishing.
    pub fn is_vacant(&self) -> bool {
        self.value.is_hole() && self.inbound.is_empty() && self.outbound.is_empty()
    }
}
