mod common;

use std::sync::Arc;

use eventstore_backend_postgres::{IndexStrategy, PostgresStore};
use eventstore_core::query::{AppendCondition, Query, QueryItem};
use eventstore_core::{DcbEvent, DcbRecorder, StoreError};
use tonic::Code;

fn ev(t: &str, tags: &[&str]) -> DcbEvent {
    DcbEvent::new(t, vec![], tags.iter().copied())
}

/// Runs the behavioral scenario suite (spec scenarios A-F) against any
/// `DcbRecorder`, scoped to events tagged `scope`. Both TS and TT
/// encodings run this same suite to enforce behavioral parity by
/// construction rather than by inspection.
async fn scenario_suite(store: Arc<dyn DcbRecorder>, scope: &str) {
    let scope_a = format!("{scope}-a");
    let scope_b = format!("{scope}-b");

    let (_, head_before) = store.read(None, None, None).await.expect("baseline read");
    let floor = head_before.unwrap_or(0);

    // Scenario A: basic read/write.
    let pos = store
        .append(vec![ev("Type1", &[&scope_a])], None)
        .await
        .expect("append one event");
    assert_eq!(pos, floor + 1);

    let pos = store
        .append(
            vec![ev("Type2", &[&scope_a, "tagA"]), ev("Type3", &[&scope_a, "tagB"])],
            None,
        )
        .await
        .expect("append two events");
    assert_eq!(pos, floor + 3);

    let query = Query::new([QueryItem::with_tags([scope_a.as_str()])]);
    let (events, head) = store
        .read(Some(query.clone()), None, None)
        .await
        .expect("scoped read");
    assert_eq!(events.len(), 3);
    assert_eq!(head, Some(floor + 3));

    // Scenario B: OR across items.
    let query = Query::new([
        QueryItem::with_tags([scope_a.as_str(), "tagA"]),
        QueryItem::with_tags([scope_a.as_str(), "tagB"]),
    ]);
    let (events, _) = store
        .read(Some(query), None, None)
        .await
        .expect("or read");
    assert_eq!(events.len(), 2);

    // Scenario C: AND inside an item.
    let query = Query::new([QueryItem::with_tags([scope_a.as_str(), "tagA"])]);
    let (events, _) = store
        .read(Some(query), None, None)
        .await
        .expect("and read");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.r#type, "Type2");

    // Scenario D: condition fails when a matching event already exists.
    let (_, head_before_d) = store
        .read(
            Some(Query::new([QueryItem::with_tags([scope_b.as_str()])])),
            None,
            None,
        )
        .await
        .expect("pre-check");
    let floor_b = head_before_d.unwrap_or(0);

    store
        .append(vec![ev("Created", &[&scope_b])], None)
        .await
        .expect("seed scope_b");

    let condition = AppendCondition::new(
        Query::new([QueryItem::with_tags([scope_b.as_str()])]),
        Some(floor_b),
    );
    let err = store
        .append(vec![ev("Duplicate", &[&scope_b])], Some(condition))
        .await
        .expect_err("condition should fail");
    assert!(matches!(err, StoreError::Integrity { .. }));
    assert_eq!(err.to_status().code(), Code::Aborted);

    // Scenario E: condition succeeds once floor is advanced past the conflict.
    let (_, head_after_seed) = store
        .read(
            Some(Query::new([QueryItem::with_tags([scope_b.as_str()])])),
            None,
            None,
        )
        .await
        .expect("post-seed read");
    let condition = AppendCondition::new(
        Query::new([QueryItem::with_tags([scope_b.as_str()])]),
        head_after_seed,
    );
    let pos = store
        .append(vec![ev("Confirmed", &[&scope_b])], Some(condition))
        .await
        .expect("condition should now succeed");
    assert!(pos > head_after_seed.unwrap_or(0));

    // Scenario F: empty batch is a programming error.
    let err = store.append(vec![], None).await.expect_err("empty batch");
    assert!(matches!(err, StoreError::Programming(_)));

    // Invariant: limited read reports head as the last *returned* position.
    let (events, head) = store
        .read(Some(query_for(&scope_a)), None, Some(1))
        .await
        .expect("limited read");
    assert_eq!(events.len(), 1);
    assert_eq!(head, Some(events[0].position));
}

fn query_for(scope: &str) -> Query {
    Query::new([QueryItem::with_tags([scope])])
}

#[tokio::test]
async fn ts_scenarios() {
    let url = common::get_test_database_url().await;
    let store = PostgresStore::connect_for_tests(&url, IndexStrategy::Ts)
        .await
        .expect("connect ts");
    scenario_suite(store as Arc<dyn DcbRecorder>, "it-ts-scope").await;
}

#[tokio::test]
async fn tt_scenarios() {
    let url = common::get_test_database_url().await;
    let store = PostgresStore::connect_for_tests(&url, IndexStrategy::Tt)
        .await
        .expect("connect tt");
    scenario_suite(store as Arc<dyn DcbRecorder>, "it-tt-scope").await;
}

#[tokio::test]
async fn tt_tagged_query_treats_duplicate_tags_as_a_set() {
    let url = common::get_test_database_url().await;
    let store = PostgresStore::connect_for_tests(&url, IndexStrategy::Tt)
        .await
        .expect("connect tt");

    let (_, head_before) = store.read(None, None, None).await.expect("baseline read");
    let floor = head_before.unwrap_or(0);

    store
        .append(vec![ev("Type1", &["dup-scope-tag"])], None)
        .await
        .expect("append one event");

    // A query item repeating the same tag must match the same events a
    // de-duplicated item would (spec.md §3: tags are "semantically a set
    // for matching"), not fail to match because COUNT(DISTINCT tag) < 2.
    let query = Query::new([QueryItem::with_tags(["dup-scope-tag", "dup-scope-tag"])]);
    let (events, _) = store
        .read(Some(query), None, None)
        .await
        .expect("duplicate-tag read");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].position, floor + 1);
}

#[tokio::test]
async fn tt_rejects_unsupported_query_shapes() {
    let url = common::get_test_database_url().await;
    let store = PostgresStore::connect_for_tests(&url, IndexStrategy::Tt)
        .await
        .expect("connect tt");

    let query = Query::new([
        QueryItem::with_tags(["tt-unsupported-a"]),
        QueryItem::new(["SomeType"], Vec::<String>::new()),
    ]);
    let err = store
        .read(Some(query), None, None)
        .await
        .expect_err("mixed tagged/type-only shape is unsupported");
    assert!(matches!(err, StoreError::NotSupported(_)));
    assert_eq!(err.to_status().code(), Code::Unimplemented);
}
