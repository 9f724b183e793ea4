use crate::context::CacheContext;
use crate::error::CacheError;
use crate::graph::node::{NodeSnapshot, NodeValue};
use crate::graph::snapshot::Snapshot;
use crate::graph::{
    parameterized_node_id, NodeId, NodeKind, NodePath, NodeReference, PathSegment,
};
use crate::operation::{ResolvedOperation, ResolvedSelectionSet};
use crate::JsonObject;
use indexmap::{IndexMap, IndexSet};
use serde_json_bytes::Value as JsonValue;
use std::sync::Arc;
use tracing::trace;

/// Copy-on-write merge over a base snapshot.
///
/// The editor never mutates `base`: the first mutation of any node clones
/// its record into the working set, and `commit` overlays the clones that
/// still differ after reconciliation. One editor serves exactly one write;
/// `commit` consumes it.
pub(crate) struct SnapshotEditor<'a> {
    context: &'a CacheContext,
    base: &'a Snapshot,
    working: IndexMap<NodeId, NodeSnapshot>,
    edited: IndexSet<NodeId>,
}

impl<'a> SnapshotEditor<'a> {
    pub(crate) fn new(context: &'a CacheContext, base: &'a Snapshot) -> Self {
        SnapshotEditor {
            context,
            base,
            working: IndexMap::new(),
            edited: IndexSet::new(),
        }
    }

    /// Walks the operation's selection tree over `payload`, merging every
    /// selected position into the working set. The walk is selection-driven:
    /// payload fields outside the selection are never touched.
    pub(crate) fn merge_payload(
        &mut self,
        operation: &ResolvedOperation,
        payload: &JsonValue,
    ) -> Result<(), CacheError> {
        let JsonValue::Object(fields) = payload else {
            return Err(CacheError::MalformedPayload {
                path: NodePath::default(),
                message: "payload root must be an object".to_owned(),
            });
        };
        self.merge_fields(
            &operation.root_id,
            NodeKind::Entity,
            &NodePath::default(),
            &operation.selection_set,
            fields,
            &NodePath::default(),
        )
    }

    /// Freezes the surviving working set into a new snapshot plus the
    /// edited-id set.
    pub(crate) fn commit(mut self) -> (Snapshot, IndexSet<NodeId>) {
        self.reconcile();
        let mut nodes = self.base.nodes().clone();
        for (id, node) in self.working {
            nodes.insert(id, Arc::new(node));
        }
        (Snapshot::from_nodes(nodes), self.edited)
    }

    // Selection walk ------------------------------------------------------

    /// Merges an object payload into node `id`, each selected field landing
    /// at `prefix` + its response key. `at` is the payload-absolute path,
    /// carried for error reporting only.
    fn merge_fields(
        &mut self,
        id: &NodeId,
        kind: NodeKind,
        prefix: &NodePath,
        selection_set: &ResolvedSelectionSet,
        payload: &JsonObject,
        at: &NodePath,
    ) -> Result<(), CacheError> {
        for (response_key, field) in &selection_set.selections {
            // A key the payload omits leaves the prior value untouched.
            let Some(value) = payload.get(response_key.as_str()) else {
                continue;
            };
            let path = prefix.child(response_key.as_str());
            let at = at.child(response_key.as_str());
            match &field.arguments {
                Some(arguments) => {
                    // The field's value lives in its own node; the container
                    // keeps only the outbound edge, never the field key.
                    let param_id = parameterized_node_id(id, &path, arguments)?;
                    self.set_reference(id, kind, &path, &param_id, NodeKind::ParameterizedValue);
                    self.merge_value(
                        &param_id,
                        NodeKind::ParameterizedValue,
                        &NodePath::default(),
                        &field.selection_set,
                        value,
                        &at,
                    )?;
                }
                None => {
                    self.merge_value(id, kind, &path, &field.selection_set, value, &at)?;
                }
            }
        }
        Ok(())
    }

    /// Merges one payload value into node `id` at `path`.
    fn merge_value(
        &mut self,
        id: &NodeId,
        kind: NodeKind,
        path: &NodePath,
        selection_set: &ResolvedSelectionSet,
        value: &JsonValue,
        at: &NodePath,
    ) -> Result<(), CacheError> {
        match value {
            JsonValue::Null => {
                self.write_leaf(id, kind, path, value);
                Ok(())
            }
            JsonValue::Object(fields) => {
                if selection_set.is_empty() {
                    // Leaf field carrying a composite custom scalar: stored
                    // opaquely, replacing whatever was there.
                    self.write_leaf(id, kind, path, value);
                    Ok(())
                } else if let Some(entity_id) =
                    self.context.resolver().entity_id(selection_set, fields)
                {
                    self.set_reference(id, kind, path, &entity_id, NodeKind::Entity);
                    self.merge_fields(
                        &entity_id,
                        NodeKind::Entity,
                        &NodePath::default(),
                        selection_set,
                        fields,
                        at,
                    )
                } else if let Some(prior_id) = self.reference_target_at(id, path) {
                    // No id in the payload, but the position already points
                    // at a node: merge into it, the edge itself unchanged.
                    self.merge_fields(
                        &prior_id,
                        NodeKind::Entity,
                        &NodePath::default(),
                        selection_set,
                        fields,
                        at,
                    )
                } else {
                    self.merge_fields(id, kind, path, selection_set, fields, at)
                }
            }
            JsonValue::Array(items) => {
                if selection_set.is_empty() {
                    self.write_leaf(id, kind, path, value);
                    Ok(())
                } else {
                    self.write_array(id, kind, path, selection_set, items, at)
                }
            }
            JsonValue::Bool(_) | JsonValue::Number(_) | JsonValue::String(_) => {
                if !selection_set.is_empty() {
                    return Err(CacheError::MalformedPayload {
                        path: at.clone(),
                        message: "selection expects an object here, payload holds a scalar"
                            .to_owned(),
                    });
                }
                self.write_leaf(id, kind, path, value);
                Ok(())
            }
        }
    }

    /// An incoming array replaces the outgoing array wholesale: the skeleton
    /// takes the new length and every element is merged at its index.
    /// References that the new shape no longer covers are dropped.
    fn write_array(
        &mut self,
        id: &NodeId,
        kind: NodeKind,
        path: &NodePath,
        selection_set: &ResolvedSelectionSet,
        items: &[JsonValue],
        at: &NodePath,
    ) -> Result<(), CacheError> {
        self.remove_references_not_in_array(id, kind, path, items.len());
        self.node_mut(id, kind)
            .value
            .set(path.segments(), NodeValue::Array(vec![NodeValue::Hole; items.len()]));
        for (index, item) in items.iter().enumerate() {
            self.merge_value(
                id,
                kind,
                &path.child(index),
                selection_set,
                item,
                &at.child(index),
            )?;
        }
        Ok(())
    }

    /// Writes a leaf value (scalars, `null`, opaque composites) at `path`,
    /// displacing any references the position previously carried.
    fn write_leaf(&mut self, id: &NodeId, kind: NodeKind, path: &NodePath, value: &JsonValue) {
        self.remove_references_under(id, kind, path);
        self.node_mut(id, kind)
            .value
            .set(path.segments(), NodeValue::Json(value.clone()));
    }

    // Reference index -----------------------------------------------------

    /// Points `path` inside `container` at `target`, keeping both directions
    /// of the index consistent: a previous reference at the same path loses
    /// its inbound mirror, references nested under the path are dropped, and
    /// re-adding an identical edge touches nothing.
    fn set_reference(
        &mut self,
        container: &NodeId,
        container_kind: NodeKind,
        path: &NodePath,
        target: &NodeId,
        target_kind: NodeKind,
    ) {
        let stale: Vec<NodeReference> = self
            .node(container)
            .map(|node| {
                node.outbound
                    .iter()
                    .filter(|r| {
                        r.path.starts_with(path) && !(r.path == *path && r.id == *target)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for reference in stale {
            self.remove_reference(container, container_kind, &reference);
        }
        // The only edge that can remain at `path` is the identical one.
        let already_present = self
            .node(container)
            .map_or(false, |node| node.outbound_at(path).is_some());
        if !already_present {
            self.add_reference(container, container_kind, path, target, target_kind);
        }
        // The referenced position is a hole in the container's own value.
        let needs_clear = self
            .node(container)
            .and_then(|node| node.value.get(path.segments()))
            .map_or(false, |value| !value.is_hole());
        if needs_clear {
            self.node_mut(container, container_kind)
                .value
                .clear(path.segments());
        }
    }

    fn add_reference(
        &mut self,
        container: &NodeId,
        container_kind: NodeKind,
        path: &NodePath,
        target: &NodeId,
        target_kind: NodeKind,
    ) {
        self.node_mut(container, container_kind)
            .outbound
            .push(NodeReference {
                id: target.clone(),
                path: path.clone(),
            });
        let back = NodeReference {
            id: container.clone(),
            path: path.clone(),
        };
        let target_node = self.node_mut(target, target_kind);
        if !target_node.inbound.contains(&back) {
            target_node.inbound.push(back);
        }
    }

    /// Removes one outbound edge and its inbound mirror.
    fn remove_reference(
        &mut self,
        container: &NodeId,
        container_kind: NodeKind,
        reference: &NodeReference,
    ) {
        self.node_mut(container, container_kind)
            .outbound
            .retain(|r| r != reference);
        let back = NodeReference {
            id: container.clone(),
            path: reference.path.clone(),
        };
        self.node_mut(&reference.id, NodeKind::Entity)
            .inbound
            .retain(|r| *r != back);
    }

    /// Drops every outbound edge at or under `path`.
    fn remove_references_under(&mut self, container: &NodeId, kind: NodeKind, path: &NodePath) {
        let doomed: Vec<NodeReference> = match self.node(container) {
            Some(node) => node
                .outbound
                .iter()
                .filter(|r| r.path.starts_with(path))
                .cloned()
                .collect(),
            None => return,
        };
        for reference in doomed {
            self.remove_reference(container, kind, &reference);
        }
    }

    /// Drops the outbound edges under `path` that an incoming array of
    /// `len` elements no longer covers: everything except edges nested at an
    /// index below `len`.
    fn remove_references_not_in_array(
        &mut self,
        container: &NodeId,
        kind: NodeKind,
        path: &NodePath,
        len: usize,
    ) {
        let doomed: Vec<NodeReference> = match self.node(container) {
            Some(node) => node
                .outbound
                .iter()
                .filter(|r| {
                    r.path.starts_with(path)
                        && !matches!(
                            r.path.segments().get(path.len()),
                            Some(PathSegment::Index(index)) if *index < len
                        )
                })
                .cloned()
                .collect(),
            None => return,
        };
        for reference in doomed {
            self.remove_reference(container, kind, &reference);
        }
    }

    fn reference_target_at(&self, id: &NodeId, path: &NodePath) -> Option<NodeId> {
        self.node(id)
            .and_then(|node| node.outbound_at(path))
            .map(|reference| reference.id.clone())
    }

    // Working set ---------------------------------------------------------

    fn node(&self, id: &NodeId) -> Option<&NodeSnapshot> {
        self.working
            .get(id)
            .or_else(|| self.base.get_node_snapshot(id).map(Arc::as_ref))
    }

    /// Clones `id` into the working set on first touch (copy-on-write);
    /// absent nodes are created with `kind`.
    fn node_mut(&mut self, id: &NodeId, kind: NodeKind) -> &mut NodeSnapshot {
        if !self.working.contains_key(id) {
            let node = match self.base.get_node_snapshot(id) {
                Some(existing) => existing.as_ref().clone(),
                None => NodeSnapshot::new(kind),
            };
            trace!(node = %id, "cloned into working set");
            self.working.insert(id.clone(), node);
            self.edited.insert(id.clone());
        }
        &mut self.working[id]
    }

    // Reconciliation ------------------------------------------------------

    /// Reverts working clones that ended up equivalent to their base
    /// counterpart, restoring base identity for them; newly created nodes
    /// that stayed vacant are discarded outright. What survives is exactly
    /// the edited set.
    fn reconcile(&mut self) {
        let ids: Vec<NodeId> = self.working.keys().cloned().collect();
        for id in ids {
            let revert = match self.base.get_node_snapshot(&id) {
                Some(base) => {
                    let working = &self.working[&id];
                    working.kind == base.kind
                        && working.value == base.value
                        && same_reference_set(&working.outbound, &base.outbound)
                        && same_reference_set(&working.inbound, &base.inbound)
                }
                None => self.working[&id].is_vacant(),
            };
            if revert {
                self.working.shift_remove(&id);
                self.edited.shift_remove(&id);
            }
        }
    }
}

/// Inbound/outbound arrays are semantically unordered; two records are
/// equivalent when they hold the same set of edges.
fn same_reference_set(a: &[NodeReference], b: &[NodeReference]) -> bool {
    a.len() == b.len() && a.iter().all(|reference| b.contains(reference))
}
