use crate::graph::node::{NodeSnapshot, NodeValue};
use crate::graph::{NodeId, NodeKind, PathSegment};
use indexmap::{IndexMap, IndexSet};
use serde_json_bytes::{Map as JsonMap, Value as JsonValue};
use std::sync::Arc;

/// Immutable mapping of node ids to node snapshots.
///
/// Snapshots share unchanged nodes with the snapshots they were derived
/// from: a node untouched by a write keeps the same `Arc` identity in the
/// new snapshot, which is what makes edited-set computation exact.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    nodes: IndexMap<NodeId, Arc<NodeSnapshot>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Snapshot::default()
    }

    pub(crate) fn from_nodes(nodes: IndexMap<NodeId, Arc<NodeSnapshot>>) -> Self {
        Snapshot { nodes }
    }

    pub(crate) fn nodes(&self) -> &IndexMap<NodeId, Arc<NodeSnapshot>> {
        &self.nodes
    }

    /// The raw record for `id`, inbound/outbound edges included.
    pub fn get_node_snapshot(&self, id: &NodeId) -> Option<&Arc<NodeSnapshot>> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The node's reconstructed JSON value, with referenced children
    /// projected in place of the holes that stand for them.
    ///
    /// The graph admits cycles; a reference back into a node that is
    /// already being projected renders as `null` rather than recursing.
    pub fn get(&self, id: &NodeId) -> Option<JsonValue> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        let mut active = IndexSet::new();
        Some(self.project(id, &mut active))
    }

    fn project(&self, id: &NodeId, active: &mut IndexSet<NodeId>) -> JsonValue {
        let Some(node) = self.nodes.get(id) else {
            return JsonValue::Null;
        };
        if !active.insert(id.clone()) {
            return JsonValue::Null;
        }
        // A root-path edge stands in for the node's entire value.
        let mut value = match node.outbound.iter().find(|r| r.path.is_empty()) {
            Some(reference) => self.project(&reference.id, active),
            None => project_value(&node.value),
        };
        for reference in &node.outbound {
            if reference.path.is_empty() {
                continue;
            }
            // Parameterized children are addressed by their own id and never
            // surface through their container's projection.
            if self.is_parameterized(&reference.id) {
                continue;
            }
            let child = self.project(&reference.id, active);
            set_json(&mut value, reference.path.segments(), child);
        }
        active.pop();
        value
    }

    fn is_parameterized(&self, id: &NodeId) -> bool {
        self.nodes
            .get(id)
            .map_or(false, |node| node.kind == NodeKind::ParameterizedValue)
    }
}

fn project_value(value: &NodeValue) -> JsonValue {
    match value {
        NodeValue::Hole => JsonValue::Null,
        NodeValue::Json(json) => json.clone(),
        NodeValue::Array(items) => JsonValue::Array(items.iter().map(project_value).collect()),
        NodeValue::Object(fields) => {
            let mut object = JsonMap::new();
            for (key, item) in fields {
                if !item.is_hole() {
                    object.insert(key.clone(), project_value(item));
                }
            }
            JsonValue::Object(object)
        }
    }
}

/// Writes `child` at `path` inside `value`, materializing the containers a
/// hole or `null` left unexpressed.
fn set_json(value: &mut JsonValue, path: &[PathSegment], child: JsonValue) {
    let Some((segment, rest)) = path.split_first() else {
        *value = child;
        return;
    };
    match segment {
        PathSegment::Key(key) => {
            if !matches!(value, JsonValue::Object(_)) {
                *value = JsonValue::Object(JsonMap::new());
            }
            let JsonValue::Object(fields) = value else {
                unreachable!()
            };
            if fields.get(key.as_str()).is_none() {
                fields.insert(key.as_str(), JsonValue::Null);
            }
            if let Some(slot) = fields.get_mut(key.as_str()) {
                set_json(slot, rest, child);
            }
        }
        PathSegment::Index(index) => {
            if !matches!(value, JsonValue::Array(_)) {
                *value = JsonValue::Array(Vec::new());
            }
            let JsonValue::Array(items) = value else {
                unreachable!()
            };
            if items.len() <= *index {
                items.resize(*index + 1, JsonValue::Null);
            }
            set_json(&mut items[*index], rest, child);
        }
    }
}
