use crate::graph::NodeId;
use crate::operation::{ResolvedOperation, ResolvedSelectionSet};
use crate::JsonObject;
use indexmap::IndexMap;
use serde_json_bytes::Value as JsonValue;
use std::fmt;
use std::sync::Mutex;

/// Decides whether a payload object addresses an entity, and under which id.
///
/// The write path consults this at every object position that carries a
/// selection; returning `None` keeps the object inline in its container.
pub trait EntityIdResolver: Send + Sync {
    fn entity_id(&self, selection: &ResolvedSelectionSet, object: &JsonObject) -> Option<NodeId>;
}

/// Default policy: a payload object is an entity when the selection selects
/// a field named `id` and the payload carries a string or number for it; the
/// node id is that value, stringified.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdFieldResolver;

impl EntityIdResolver for IdFieldResolver {
    fn entity_id(&self, selection: &ResolvedSelectionSet, object: &JsonObject) -> Option<NodeId> {
        if !selection.selects_field("id") {
            return None;
        }
        match object.get("id") {
            Some(JsonValue::String(id)) => Some(NodeId::new(id.as_str())),
            Some(JsonValue::Number(id)) => Some(NodeId::new(id.to_string())),
            _ => None,
        }
    }
}

/// Diagnostic record of the most recent successful write. Written by the
/// write path for the benefit of external layers; never read back by it.
#[derive(Clone, Debug)]
pub struct WriteRecord {
    /// Projections of the edited ids against the base snapshot; `None` for
    /// ids the base did not contain.
    pub old_values: IndexMap<NodeId, Option<JsonValue>>,
    /// Projections of the edited ids against the committed snapshot.
    pub new_values: IndexMap<NodeId, Option<JsonValue>>,
    pub payload: JsonValue,
    pub operation: ResolvedOperation,
}

/// Carrier for the policies and bookkeeping a write runs under.
pub struct CacheContext {
    resolver: Box<dyn EntityIdResolver>,
    previous_write: Mutex<Option<WriteRecord>>,
}

impl CacheContext {
    pub fn new() -> Self {
        CacheContext::with_resolver(IdFieldResolver)
    }

    pub fn with_resolver(resolver: impl EntityIdResolver + 'static) -> Self {
        CacheContext {
            resolver: Box::new(resolver),
            previous_write: Mutex::new(None),
        }
    }

    pub fn resolver(&self) -> &dyn EntityIdResolver {
        self.resolver.as_ref()
    }

    /// The record of the most recent successful write, if any.
    pub fn previous_write(&self) -> Option<WriteRecord> {
        match self.previous_write.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn record_write(&self, record: WriteRecord) {
        match self.previous_write.lock() {
            Ok(mut slot) => *slot = Some(record),
            Err(poisoned) => *poisoned.into_inner() = Some(record),
        }
    }
}

impl Default for CacheContext {
    fn default() -> Self {
        CacheContext::new()
    }
}

impl fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheContext")
            .field("previous_write", &self.previous_write)
            .finish_non_exhaustive()
    }
}
