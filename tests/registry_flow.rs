//! End-to-end behavior of the validate-then-commit protocol.

use std::sync::atomic::Ordering;
use std::time::Duration;

use gateway_registry::error::RegistryError;
use gateway_registry::registry::{Operation, Target, Verb};
use gateway_registry::resources::{ResourceGroupPatch, ResourceMetadata, ResourceRemovals, Schema};

mod common;
use common::{fast_retries, policies, policy, schema, schemas, Harness};

fn delete_policies(names: &[&str]) -> ResourceGroupPatch {
    ResourceGroupPatch::remove(ResourceRemovals {
        policies: names.iter().map(|n| ResourceMetadata::new("ns", *n)).collect(),
        ..Default::default()
    })
}

#[tokio::test]
async fn test_each_update_is_readable_with_a_greater_version() {
    let harness = Harness::new();
    let (_, mut previous) = harness.repository().fetch_latest().await.unwrap();

    let steps = [
        schemas(vec![schema("a", "type Query { a: String }")]),
        schemas(vec![schema("b", "type Query { b: String }")]),
        schemas(vec![schema("a", "type Query { a: Int }")]),
    ];

    let mut expected = Vec::new();
    for step in steps {
        let token = harness.registry.update(&ResourceGroupPatch::upsert(step.clone())).await.unwrap();
        assert!(token > previous);

        for s in step.schemas {
            match expected.iter().position(|e: &Schema| e.metadata == s.metadata) {
                Some(i) => expected[i] = s,
                None => expected.push(s),
            }
        }

        let (group, fetched) = harness.repository().fetch_latest().await.unwrap();
        assert_eq!(fetched, token);
        assert_eq!(group.schemas, expected);
        previous = token;
    }
}

#[tokio::test]
async fn test_concurrent_updates_are_serialized_without_lost_writes() {
    let harness = Harness::new();
    let n = 10;

    let mut handles = Vec::new();
    for i in 0..n {
        let registry = harness.registry.clone();
        handles.push(tokio::spawn(async move {
            let fragment = schema(&format!("s{}", i), &format!("type T{} {{ f: String }}", i));
            registry.update(&ResourceGroupPatch::upsert(schemas(vec![fragment]))).await
        }));
    }

    let mut generations = Vec::new();
    for handle in handles {
        generations.push(handle.await.unwrap().unwrap().generation);
    }
    generations.sort();
    assert_eq!(generations, (1..=n as u64).collect::<Vec<_>>());

    let (group, token) = harness.repository().fetch_latest().await.unwrap();
    assert_eq!(token.generation, n as u64);
    assert_eq!(group.schemas.len(), n);
    assert!(!harness.store.events().contains(&"conflict".to_string()));
}

#[tokio::test]
async fn test_one_bad_policy_aborts_the_whole_batch() {
    let harness = Harness::new();
    harness
        .registry
        .update(&ResourceGroupPatch::upsert(schemas(vec![schema("a", "type Query { a: String }")])))
        .await
        .unwrap();
    let before = harness.repository().fetch_latest().await.unwrap();
    let events_before = harness.store.events();

    let batch = policies(vec![
        policy("p1", "package p1"),
        policy("p2", "package p2"),
        policy("p3", "package p3 syntax error"),
        policy("p4", "package p4"),
        policy("p5", "package p5"),
    ]);
    let err = harness.registry.update(&ResourceGroupPatch::upsert(batch)).await.unwrap_err();

    match &err {
        RegistryError::Compile { metadata, message } => {
            assert_eq!(metadata, &ResourceMetadata::new("ns", "p3"));
            assert!(message.contains("rego_parse_error"));
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
    assert_eq!(harness.repository().fetch_latest().await.unwrap(), before);
    assert_eq!(harness.store.events(), events_before);
    assert!(harness.scratch_files().is_empty(), "scratch left behind: {:?}", harness.scratch_files());
}

#[tokio::test]
async fn test_attachments_follow_commits() {
    let harness = Harness::new();
    harness
        .registry
        .update(&ResourceGroupPatch::upsert(policies(vec![policy("p", "package p")])))
        .await
        .unwrap();

    assert_eq!(harness.store.events(), vec!["commit", "save ns.p.tar.gz"]);
    assert_eq!(harness.store.attachment("ns.p.tar.gz").unwrap(), b"bundle:package p");
    assert!(harness.scratch_files().is_empty());

    // Unchanged policies are not recompiled.
    harness
        .registry
        .update(&ResourceGroupPatch::upsert(schemas(vec![schema("a", "type Query { a: String }")])))
        .await
        .unwrap();
    assert_eq!(harness.compiler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dropped_caller_does_not_stop_persist_after_commit() {
    let harness = Harness::new();
    let gate = harness.store.hold_attachment_writes();
    let update = Operation {
        verb: Verb::Update,
        target: Target::Policies,
    };
    let patch = ResourceGroupPatch::upsert(policies(vec![policy("p", "package p")]));

    // The caller goes away while the attachment write is parked.
    tokio::select! {
        result = harness.registry.execute(update, patch) => panic!("update finished early: {:?}", result),
        _ = gate.reached() => {}
    }
    assert_eq!(harness.store.events(), vec!["commit"]);

    gate.release();
    tokio::time::timeout(Duration::from_secs(5), async {
        while harness.store.attachment("ns.p.tar.gz").is_none() || !harness.scratch_files().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("attachment was never persisted");

    assert_eq!(harness.store.events(), vec!["commit", "save ns.p.tar.gz"]);
    assert_eq!(harness.store.attachment("ns.p.tar.gz").unwrap(), b"bundle:package p");
}

#[tokio::test]
async fn test_deleted_policy_loses_its_attachment_only_after_commit() {
    let harness = Harness::new();
    harness
        .registry
        .update(&ResourceGroupPatch::upsert(policies(vec![policy("p", "package p")])))
        .await
        .unwrap();

    // A failing commit must leave the attachment alone.
    harness.store.fail_resource_writes(true);
    let err = harness.registry.update(&delete_policies(&["p"])).await.unwrap_err();
    assert!(matches!(err, RegistryError::Storage(_)));
    assert!(harness.store.attachment("ns.p.tar.gz").is_some());
    assert_eq!(harness.repository().fetch_latest().await.unwrap().0.policies.len(), 1);

    harness.store.fail_resource_writes(false);
    harness.registry.update(&delete_policies(&["p"])).await.unwrap();
    assert!(harness.store.attachment("ns.p.tar.gz").is_none());

    let events = harness.store.events();
    let last_commit = events.iter().rposition(|e| e == "commit").unwrap();
    let delete = events.iter().position(|e| e == "delete ns.p.tar.gz").unwrap();
    assert!(delete > last_commit, "events: {:?}", events);
}

#[tokio::test]
async fn test_version_conflicts_are_retried() {
    let harness = Harness::with_retries(fast_retries(3));
    harness.store.inject_conflicts(2);

    let token = harness
        .registry
        .update(&ResourceGroupPatch::upsert(schemas(vec![schema("a", "type Query { a: String }")])))
        .await
        .unwrap();
    assert_eq!(token.generation, 1);
    assert_eq!(harness.store.events(), vec!["conflict", "conflict", "commit"]);
}

#[tokio::test]
async fn test_persistent_conflict_reaches_the_caller() {
    let harness = Harness::with_retries(fast_retries(2));
    harness.store.inject_conflicts(5);

    let err = harness
        .registry
        .update(&ResourceGroupPatch::upsert(policies(vec![policy("p", "package p")])))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::VersionConflict { .. }));
    assert_eq!(err.kind(), "VersionConflict");
    assert!(harness.store.attachment("ns.p.tar.gz").is_none());
    assert!(harness.scratch_files().is_empty());
}

#[tokio::test]
async fn test_validate_only_never_writes() {
    let harness = Harness::new();
    let validate = Operation {
        verb: Verb::Validate,
        target: Target::Policies,
    };

    let patch = ResourceGroupPatch::upsert(policies(vec![policy("p", "package p")]));
    harness.registry.execute(validate, patch).await.unwrap();

    let bad = ResourceGroupPatch::upsert(policies(vec![policy("q", "syntax error")]));
    let err = harness.registry.execute(validate, bad).await.unwrap_err();
    assert_eq!(err.kind(), "CompileError");

    assert!(harness.store.events().is_empty());
    assert!(harness.scratch_files().is_empty());
    assert_eq!(harness.repository().fetch_latest().await.unwrap().1.generation, 0);
}

#[tokio::test]
async fn test_conflicting_schema_is_rejected_before_commit() {
    let harness = Harness::new();
    harness
        .registry
        .update(&ResourceGroupPatch::upsert(schemas(vec![schema("a", "type User { id: ID! }")])))
        .await
        .unwrap();

    let err = harness
        .registry
        .update(&ResourceGroupPatch::upsert(schemas(vec![schema("b", "type User { id: ID! name: String }")])))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "SchemaError");
    let message = err.to_string();
    assert!(message.contains("ns/a") && message.contains("ns/b"), "{}", message);

    // An identical redefinition merges.
    harness
        .registry
        .update(&ResourceGroupPatch::upsert(schemas(vec![schema("c", "type User { id: ID! }")])))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reconcile_repairs_the_persist_gap() {
    let harness = Harness::new();

    harness.store.fail_attachment_writes(true);
    let err = harness
        .registry
        .update(&ResourceGroupPatch::upsert(policies(vec![policy("p", "package p")])))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Storage(_)));

    // The commit went through; only the attachment is missing.
    assert_eq!(harness.repository().fetch_latest().await.unwrap().0.policies.len(), 1);
    assert!(harness.store.attachment("ns.p.tar.gz").is_none());
    assert!(harness.scratch_files().is_empty());

    harness.store.fail_attachment_writes(false);
    let report = harness.registry.reconcile().await.unwrap();
    assert_eq!(report.regenerated, vec!["ns.p.tar.gz".to_string()]);
    assert!(report.removed.is_empty());
    assert!(harness.store.attachment("ns.p.tar.gz").is_some());

    let again = harness.registry.reconcile().await.unwrap();
    assert!(again.is_clean());
}
