//! Schema merge and the change feed → pipeline → broadcast chain.

use std::collections::BTreeMap;
use std::time::Duration;

use gateway_registry::error::{RegistryError, SchemaError};
use gateway_registry::repository::VersionToken;
use gateway_registry::resources::ResourceGroupPatch;
use gateway_registry::sync::{ChangeFeed, SchemaBroadcast, SchemaSyncPipeline};
use gateway_registry::validation::{merge_and_print, validate_resource_group};
use tokio::sync::broadcast;

mod common;
use common::{policies, policy, schema, schemas, Harness};

fn fragments(items: &[(&str, &str)]) -> BTreeMap<String, String> {
    items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn test_root_types_are_unioned_across_sources() {
    let merged = merge_and_print(&fragments(&[
        ("A", "type Query{a:String}"),
        ("B", "type Query{b:String}"),
    ]))
    .unwrap();
    assert_eq!(merged, "type Query {\n  a: String\n  b: String\n}");
}

#[test]
fn test_differing_definitions_name_both_sources() {
    let group = schemas(vec![
        schema("one", "type Money { amount: Int }"),
        schema("two", "type Money { amount: Int currency: String }"),
    ]);
    let err = validate_resource_group(&group).unwrap_err();
    match err {
        RegistryError::Schema(SchemaError::Conflict {
            definition,
            first_source,
            second_source,
        }) => {
            assert_eq!(definition, "Money");
            assert_eq!((first_source.as_str(), second_source.as_str()), ("ns/one", "ns/two"));
        }
        other => panic!("expected a schema conflict, got {:?}", other),
    }

    let identical = schemas(vec![
        schema("one", "type Money { amount: Int }"),
        schema("two", "type Money { amount: Int }"),
    ]);
    validate_resource_group(&identical).unwrap();
}

#[tokio::test]
async fn test_duplicate_publish_notifies_once_and_replays_to_late_joiners() {
    let broadcast = SchemaBroadcast::new();
    let mut early = broadcast.subscribe();
    let version = VersionToken::default();

    assert!(broadcast.publish(version.clone(), "type Query { a: String }".into()).is_some());
    assert!(broadcast.publish(version, "type Query { a: String }".into()).is_none());

    let first = early.recv().await.unwrap();
    assert_eq!(first.sequence, 1);
    assert!(tokio::time::timeout(Duration::from_millis(50), early.recv()).await.is_err());

    let mut late = broadcast.subscribe();
    let replayed = tokio::time::timeout(Duration::from_millis(50), late.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replayed, first);
}

#[tokio::test]
async fn test_commits_flow_to_subscribers() {
    let harness = Harness::new();
    let schema_broadcast = SchemaBroadcast::new();
    let (_shutdown, shutdown_rx) = broadcast::channel(1);

    let snapshots = ChangeFeed::new(harness.repository().clone(), Duration::from_millis(25), false).spawn(shutdown_rx);
    tokio::spawn(SchemaSyncPipeline::new(schema_broadcast.clone()).run(snapshots));
    let mut subscriber = schema_broadcast.subscribe();

    harness
        .registry
        .update(&ResourceGroupPatch::upsert(schemas(vec![schema("a", "type Query { a: String }")])))
        .await
        .unwrap();
    let first = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.sdl, "type Query {\n  a: String\n}");
    assert_eq!(first.version.generation, 1);

    // A commit that leaves the merged text alone publishes nothing.
    harness
        .registry
        .update(&ResourceGroupPatch::upsert(policies(vec![policy("p", "package p")])))
        .await
        .unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(150), subscriber.recv()).await.is_err());

    harness
        .registry
        .update(&ResourceGroupPatch::upsert(schemas(vec![schema("b", "type Query { b: Int }")])))
        .await
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(2), subscriber.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.sequence, 2);
    assert_eq!(second.version.generation, 3);
    assert_eq!(second.sdl, "type Query {\n  a: String\n  b: Int\n}");
}
