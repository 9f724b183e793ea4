//! Write path of a normalized GraphQL response cache.
//!
//! A [`Snapshot`] is an immutable graph of per-node records keyed by stable
//! ids. [`write`] merges a JSON payload, shaped by a [`ResolvedOperation`],
//! into a base snapshot and produces a new snapshot plus the set of node ids
//! whose record changed. Unchanged subgraphs keep their identity between the
//! two snapshots, which is what lets an observer layer diff them cheaply.

pub mod context;
pub mod error;
pub mod graph;
pub mod operation;
pub mod write;

pub use crate::context::{CacheContext, EntityIdResolver, IdFieldResolver, WriteRecord};
pub use crate::error::CacheError;
pub use crate::graph::node::{NodeSnapshot, NodeValue};
pub use crate::graph::snapshot::Snapshot;
pub use crate::graph::{
    parameterized_node_id, FieldArguments, NodeId, NodeKind, NodePath, NodeReference, PathSegment,
    MUTATION_ROOT_ID, QUERY_ROOT_ID, SUBSCRIPTION_ROOT_ID,
};
pub use crate::operation::{ResolvedField, ResolvedOperation, ResolvedSelectionSet};
pub use crate::write::{write, WriteResult};

/// JSON object map as carried by payloads and variable sets.
pub type JsonObject = serde_json_bytes::Map<serde_json_bytes::ByteString, serde_json_bytes::Value>;
