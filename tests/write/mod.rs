mod errors;
mod invariants;

use apollo_cache::{FieldArguments, NodeId, ResolvedOperation};
use serde_json_bytes::Value as JsonValue;

/// Parses a combined schema + operation document and resolves its single
/// operation against `variables`.
pub fn resolve(document: &str, variables: JsonValue) -> ResolvedOperation {
    let (_schema, executable_document) =
        apollo_compiler::parse_mixed_validate(document, "document.graphql")
            .expect("document should parse and validate");
    let JsonValue::Object(variables) = variables else {
        panic!("variables must be an object literal")
    };
    ResolvedOperation::from_document(&executable_document, None, &variables)
        .expect("operation should resolve")
}

pub fn arguments(value: JsonValue) -> FieldArguments {
    let JsonValue::Object(fields) = value else {
        panic!("arguments must be an object literal")
    };
    fields
        .iter()
        .map(|(key, value)| (key.as_str().to_owned(), value.clone()))
        .collect()
}

/// Edited ids as a sorted list of strings, for order-insensitive asserts.
pub fn sorted_ids<'a>(ids: impl IntoIterator<Item = &'a NodeId>) -> Vec<String> {
    let mut ids: Vec<String> = ids.into_iter().map(|id| id.as_str().to_owned()).collect();
    ids.sort();
    ids
}
