use crate::context::{CacheContext, WriteRecord};
use crate::error::CacheError;
use crate::graph::snapshot::Snapshot;
use crate::graph::NodeId;
use crate::operation::ResolvedOperation;
use indexmap::{IndexMap, IndexSet};
use serde_json_bytes::Value as JsonValue;
use tracing::debug;

mod editor;

use editor::SnapshotEditor;

/// Outcome of a successful write.
#[derive(Clone, Debug)]
pub struct WriteResult {
    pub snapshot: Snapshot,
    /// Ids whose node snapshot identity changed relative to the base.
    pub edited_node_ids: IndexSet<NodeId>,
}

/// Merges `payload`, shaped by `operation`, into `base` and returns the new
/// snapshot together with the set of edited node ids.
///
/// `base` is never mutated, and unchanged nodes keep their identity in the
/// result. On error nothing is published: the base snapshot is the only
/// snapshot there is.
pub fn write(
    context: &CacheContext,
    base: &Snapshot,
    operation: &ResolvedOperation,
    payload: &JsonValue,
) -> Result<WriteResult, CacheError> {
    let mut editor = SnapshotEditor::new(context, base);
    editor.merge_payload(operation, payload)?;
    let (snapshot, edited_node_ids) = editor.commit();

    let old_values: IndexMap<NodeId, Option<JsonValue>> = edited_node_ids
        .iter()
        .map(|id| (id.clone(), base.get(id)))
        .collect();
    let new_values: IndexMap<NodeId, Option<JsonValue>> = edited_node_ids
        .iter()
        .map(|id| (id.clone(), snapshot.get(id)))
        .collect();
    context.record_write(WriteRecord {
        old_values,
        new_values,
        payload: payload.clone(),
        operation: operation.clone(),
    });

    debug!(
        root = %operation.root_id,
        edited = edited_node_ids.len(),
        "write committed"
    );
    Ok(WriteResult {
        snapshot,
        edited_node_ids,
    })
}
