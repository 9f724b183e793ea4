use super::resolve;
use apollo_cache::{write, CacheContext, CacheError, NodePath, Snapshot};
use serde_json_bytes::json;

const VIEWER: &str = r#"
query Viewer {
  viewer {
    id
    name
  }
}

type Query {
  viewer: Foo
}

type Foo {
  id: ID!
  name: String
}
"#;

#[test]
fn rejects_a_non_object_payload_root() {
    let context = CacheContext::new();
    let error = write(
        &context,
        &Snapshot::new(),
        &resolve(VIEWER, json!({})),
        &json!(["not", "an", "object"]),
    )
    .unwrap_err();
    assert_eq!(
        error,
        CacheError::MalformedPayload {
            path: NodePath::default(),
            message: "payload root must be an object".to_owned(),
        }
    );
}

#[test]
fn rejects_a_scalar_where_the_selection_expects_an_object() {
    let context = CacheContext::new();
    let error = write(
        &context,
        &Snapshot::new(),
        &resolve(VIEWER, json!({})),
        &json!({"viewer": "scalar"}),
    )
    .unwrap_err();
    let CacheError::MalformedPayload { path, .. } = error else {
        panic!("expected a malformed-payload error")
    };
    assert_eq!(path, NodePath::new(["viewer".into()]));
}

#[test]
fn scalars_inside_arrays_report_their_index() {
    let document = r#"
query Items {
  items {
    id
    name
  }
}

type Query {
  items: [Foo]
}

type Foo {
  id: ID!
  name: String
}
"#;
    let context = CacheContext::new();
    let error = write(
        &context,
        &Snapshot::new(),
        &resolve(document, json!({})),
        &json!({"items": [{"id": 1, "name": "ok"}, 7]}),
    )
    .unwrap_err();
    let CacheError::MalformedPayload { path, .. } = error else {
        panic!("expected a malformed-payload error")
    };
    assert_eq!(path, NodePath::new(["items".into(), 1.into()]));
}

#[test]
fn failed_writes_publish_nothing() {
    let context = CacheContext::new();
    let baseline = write(
        &context,
        &Snapshot::new(),
        &resolve(VIEWER, json!({})),
        &json!({"viewer": {"id": 1, "name": "Foo"}}),
    )
    .unwrap();
    let record_before = context.previous_write().unwrap();

    // The first field merges cleanly before the second one fails; none of it
    // may surface.
    let document = r#"
query Both {
  viewer {
    id
    name
  }
  other {
    id
  }
}

type Query {
  viewer: Foo
  other: Foo
}

type Foo {
  id: ID!
  name: String
}
"#;
    let error = write(
        &context,
        &baseline.snapshot,
        &resolve(document, json!({})),
        &json!({"viewer": {"id": 1, "name": "changed"}, "other": true}),
    )
    .unwrap_err();
    assert!(matches!(error, CacheError::MalformedPayload { .. }));

    // The base snapshot is untouched and the diagnostic slot still holds the
    // previous successful write.
    assert_eq!(
        baseline.snapshot.get(&apollo_cache::NodeId::new("1")),
        Some(json!({"id": 1, "name": "Foo"}))
    );
    assert_eq!(
        context.previous_write().unwrap().payload,
        record_before.payload
    );
}
