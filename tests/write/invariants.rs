use super::{resolve, sorted_ids};
use apollo_cache::{
    write, CacheContext, NodeId, NodeReference, Snapshot, WriteResult, QUERY_ROOT_ID,
};
use serde_json_bytes::{json, Value as JsonValue};
use std::sync::Arc;

const CATALOG: &str = r#"
query Catalog($section: String!) {
  shelf(section: $section) {
    id
    label
    items {
      id
      title
      related(limit: 2) {
        id
        title
      }
    }
  }
}

type Query {
  shelf(section: String): Shelf
}

type Shelf {
  id: ID!
  label: String
  items: [Item]
}

type Item {
  id: ID!
  title: String
  related(limit: Int): [Item]
}
"#;

fn catalog_payload() -> JsonValue {
    json!({"shelf": {
        "id": "shelf:a",
        "label": "A",
        "items": [
            {"id": "item:1", "title": "One", "related": [{"id": "item:2", "title": "Two"}]},
            {"id": "item:2", "title": "Two", "related": [{"id": "item:1", "title": "One"}]},
        ],
    }})
}

fn written_catalog() -> (CacheContext, WriteResult) {
    let context = CacheContext::new();
    let result = write(
        &context,
        &Snapshot::new(),
        &resolve(CATALOG, json!({"section": "a"})),
        &catalog_payload(),
    )
    .unwrap();
    (context, result)
}

/// For every outbound edge the target records the mirrored inbound edge,
/// and vice versa.
fn assert_reference_symmetry(snapshot: &Snapshot) {
    for id in snapshot.ids() {
        let node = snapshot.get_node_snapshot(id).unwrap();
        for reference in &node.outbound {
            let target = snapshot
                .get_node_snapshot(&reference.id)
                .unwrap_or_else(|| panic!("{id} references missing node {}", reference.id));
            let mirrored = NodeReference {
                id: id.clone(),
                path: reference.path.clone(),
            };
            assert!(
                target.inbound.contains(&mirrored),
                "{} lacks inbound mirror of {id} at {}",
                reference.id,
                reference.path
            );
        }
        for reference in &node.inbound {
            let holder = snapshot
                .get_node_snapshot(&reference.id)
                .unwrap_or_else(|| panic!("{id} claims inbound from missing node {}", reference.id));
            let forward = NodeReference {
                id: id.clone(),
                path: reference.path.clone(),
            };
            assert!(
                holder.outbound.contains(&forward),
                "{} lacks outbound mirror of {id} at {}",
                reference.id,
                reference.path
            );
        }
    }
}

#[test]
fn references_stay_symmetric_across_writes() {
    let (context, baseline) = written_catalog();
    assert_reference_symmetry(&baseline.snapshot);

    // Shrink the item list and retarget the shelf reference.
    let result = write(
        &context,
        &baseline.snapshot,
        &resolve(CATALOG, json!({"section": "a"})),
        &json!({"shelf": {
            "id": "shelf:b",
            "label": "B",
            "items": [
                {"id": "item:2", "title": "Two", "related": []},
            ],
        }}),
    )
    .unwrap();
    assert_reference_symmetry(&result.snapshot);
}

#[test]
fn nodes_outside_the_edited_set_keep_their_identity() {
    let (context, baseline) = written_catalog();

    let result = write(
        &context,
        &baseline.snapshot,
        &resolve(CATALOG, json!({"section": "a"})),
        &json!({"shelf": {"id": "shelf:a", "label": "A*"}}),
    )
    .unwrap();

    for id in baseline.snapshot.ids() {
        if result.edited_node_ids.contains(id) {
            continue;
        }
        assert!(
            Arc::ptr_eq(
                baseline.snapshot.get_node_snapshot(id).unwrap(),
                result.snapshot.get_node_snapshot(id).unwrap(),
            ),
            "{id} changed identity without being edited"
        );
    }
    assert_eq!(
        sorted_ids(&result.edited_node_ids),
        sorted_ids([&NodeId::new("shelf:a")])
    );
}

#[test]
fn repeated_writes_are_idempotent() {
    let (context, baseline) = written_catalog();

    let result = write(
        &context,
        &baseline.snapshot,
        &resolve(CATALOG, json!({"section": "a"})),
        &catalog_payload(),
    )
    .unwrap();

    assert!(result.edited_node_ids.is_empty());
    for id in baseline.snapshot.ids() {
        assert!(Arc::ptr_eq(
            baseline.snapshot.get_node_snapshot(id).unwrap(),
            result.snapshot.get_node_snapshot(id).unwrap(),
        ));
    }
}

#[test]
fn writes_are_deterministic() {
    let (_, first) = written_catalog();
    let (_, second) = written_catalog();

    assert_eq!(
        sorted_ids(&first.edited_node_ids),
        sorted_ids(&second.edited_node_ids)
    );
    assert_eq!(
        sorted_ids(first.snapshot.ids()),
        sorted_ids(second.snapshot.ids())
    );
    for id in first.snapshot.ids() {
        assert_eq!(first.snapshot.get(id), second.snapshot.get(id), "{id}");
        assert_eq!(
            first.snapshot.get_node_snapshot(id).unwrap().as_ref(),
            second.snapshot.get_node_snapshot(id).unwrap().as_ref(),
            "{id}"
        );
    }
}

#[test]
fn parameterized_containers_conceal_the_field() {
    let (_, result) = written_catalog();

    let root = result.snapshot.get_node_snapshot(&QUERY_ROOT_ID).unwrap();
    assert_eq!(root.value.get(&["shelf".into()]), None);
    // The projection hides it too: the field only materializes through the
    // parameterized node's own id.
    match result.snapshot.get(&QUERY_ROOT_ID) {
        Some(JsonValue::Object(fields)) => assert!(fields.get("shelf").is_none()),
        Some(JsonValue::Null) | None => {}
        Some(other) => panic!("unexpected root projection: {other:?}"),
    }
}

#[test]
fn previous_write_records_the_last_successful_write() {
    let (context, baseline) = written_catalog();

    let record = context.previous_write().expect("write should be recorded");
    assert_eq!(record.payload, catalog_payload());
    assert_eq!(
        sorted_ids(record.new_values.keys()),
        sorted_ids(&baseline.edited_node_ids)
    );
    // First write against an empty base: no node has an old value.
    assert!(record.old_values.values().all(Option::is_none));
    assert_eq!(
        record.new_values[&NodeId::new("item:1")],
        baseline.snapshot.get(&NodeId::new("item:1"))
    );
}
