//! Integration tests for the in-memory entity store:
//! - ownership-based access checks
//! - atomic status transitions under contention
//! - log ordering and offset reads
//! - timing-map merges

use std::collections::BTreeMap;
use std::sync::Arc;

use assert_matches::assert_matches;

use nimbus_core::error::CoreError;
use nimbus_core::identity::{AccessLevel, Identity};
use nimbus_core::log::LogRecord;
use nimbus_core::status::ClusterStatus;
use nimbus_store::memory::MemoryStore;
use nimbus_store::models::{Cluster, SshHost, UpdateCluster};
use nimbus_store::store::EntityStore;

fn alice() -> Identity {
    Identity::user("alice")
}

fn trad_cluster(name: &str) -> Cluster {
    Cluster::new_traditional(
        name.to_string(),
        SshHost {
            username: "alice".to_string(),
            hostname: "head.example.org".to_string(),
        },
    )
}

#[tokio::test]
async fn load_respects_ownership() {
    let store = MemoryStore::new();
    let cluster = store
        .create_cluster(&alice(), trad_cluster("mine"))
        .await
        .unwrap();

    // The owner sees it at every level.
    store
        .load_cluster(&alice(), cluster.id, AccessLevel::Admin)
        .await
        .unwrap();

    // Another user gets NotFound, not a permission error.
    let err = store
        .load_cluster(&Identity::user("bob"), cluster.id, AccessLevel::Read)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::NotFound { entity: "cluster", .. });
}

#[tokio::test]
async fn task_identity_acts_as_owner() {
    let store = MemoryStore::new();
    let cluster = store
        .create_cluster(&alice(), trad_cluster("mine"))
        .await
        .unwrap();

    store
        .load_cluster(&Identity::task("alice"), cluster.id, AccessLevel::Write)
        .await
        .unwrap();
}

#[tokio::test]
async fn transition_rejects_wrong_source_state() {
    let store = MemoryStore::new();
    let cluster = store
        .create_cluster(&alice(), trad_cluster("c"))
        .await
        .unwrap();

    let err = store
        .transition_cluster(
            &alice(),
            cluster.id,
            &[ClusterStatus::Running],
            ClusterStatus::Terminating,
        )
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::PreconditionFailed(_));

    // Status unchanged.
    let loaded = store
        .load_cluster(&alice(), cluster.id, AccessLevel::Read)
        .await
        .unwrap();
    assert_eq!(loaded.status, ClusterStatus::Created);
}

#[tokio::test]
async fn concurrent_transitions_yield_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let cluster = store
        .create_cluster(&alice(), trad_cluster("contended"))
        .await
        .unwrap();

    let a = {
        let store = Arc::clone(&store);
        let id = cluster.id;
        tokio::spawn(async move {
            store
                .transition_cluster(
                    &alice(),
                    id,
                    &[ClusterStatus::Created],
                    ClusterStatus::Starting,
                )
                .await
        })
    };
    let b = {
        let store = Arc::clone(&store);
        let id = cluster.id;
        tokio::spawn(async move {
            store
                .transition_cluster(
                    &alice(),
                    id,
                    &[ClusterStatus::Created],
                    ClusterStatus::Starting,
                )
                .await
        })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one transition must win");
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(CoreError::PreconditionFailed(_)))));
}

#[tokio::test]
async fn update_merges_timings_and_validates_status() {
    let store = MemoryStore::new();
    let cluster = store
        .create_cluster(&alice(), trad_cluster("t"))
        .await
        .unwrap();

    store
        .transition_cluster(
            &alice(),
            cluster.id,
            &[ClusterStatus::Created],
            ClusterStatus::Starting,
        )
        .await
        .unwrap();

    let updated = store
        .update_cluster(
            &Identity::task("alice"),
            cluster.id,
            UpdateCluster {
                status: Some(ClusterStatus::Running),
                timings: Some(BTreeMap::from([("provision".to_string(), 1200)])),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, ClusterStatus::Running);

    // A second delta merges; earlier keys survive.
    let updated = store
        .update_cluster(
            &Identity::task("alice"),
            cluster.id,
            UpdateCluster {
                status: None,
                timings: Some(BTreeMap::from([("bootstrap".to_string(), 300)])),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.timings["provision"], 1200);
    assert_eq!(updated.timings["bootstrap"], 300);

    // Running -> Starting is not in the graph.
    let err = store
        .update_cluster(
            &Identity::task("alice"),
            cluster.id,
            UpdateCluster {
                status: Some(ClusterStatus::Starting),
                timings: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::PreconditionFailed(_));
}

#[tokio::test]
async fn log_preserves_order_and_offsets() {
    let store = MemoryStore::new();
    let cluster = store
        .create_cluster(&alice(), trad_cluster("logged"))
        .await
        .unwrap();

    for i in 0..5 {
        store
            .append_log(&alice(), cluster.id, LogRecord::info(format!("line {i}")))
            .await
            .unwrap();
    }

    let full = store.read_log(&alice(), cluster.id, 0).await.unwrap();
    assert_eq!(full.len(), 5);
    assert_eq!(full[0].message, "line 0");
    assert_eq!(full[4].message, "line 4");

    let tail = store.read_log(&alice(), cluster.id, 3).await.unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].message, "line 3");

    // Past the end: empty, not an error.
    let empty = store.read_log(&alice(), cluster.id, 99).await.unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn config_documents_round_trip_and_delete() {
    let store = MemoryStore::new();
    let content: nimbus_core::config::ConfigContent =
        serde_json::from_str(r#"{"cluster":[{"name":"smp","min":"2"}]}"#).unwrap();

    let config = store
        .create_config(&alice(), content.clone())
        .await
        .unwrap();
    assert_eq!(store.load_config(config.id).await.unwrap().content, content);

    store.delete_config(config.id).await.unwrap();
    let err = store.load_config(config.id).await.unwrap_err();
    assert_matches!(err, CoreError::NotFound { entity: "config", .. });
}

#[tokio::test]
async fn missing_entities_fail_not_found() {
    let store = MemoryStore::new();
    let id = nimbus_core::types::new_entity_id();

    assert_matches!(
        store
            .load_cluster(&alice(), id, AccessLevel::Read)
            .await
            .unwrap_err(),
        CoreError::NotFound { .. }
    );
    assert_matches!(
        store
            .load_job(&alice(), id, AccessLevel::Read)
            .await
            .unwrap_err(),
        CoreError::NotFound { .. }
    );
    assert_matches!(
        store
            .read_log(&alice(), id, 0)
            .await
            .unwrap_err(),
        CoreError::NotFound { .. }
    );
}
