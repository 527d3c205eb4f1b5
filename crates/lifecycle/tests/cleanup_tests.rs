//! Integration tests for cleanup sweeps.

mod common;

use common::{TestHarness, child_record, root_record};
use registrar_core::EntityKind;
use registrar_metadata::repos::{RecordRepo, TombstoneRepo};
use time::{Duration, OffsetDateTime};

/// Create a record and backdate its soft-deletion by `age_days`.
async fn seed_deleted_record(harness: &TestHarness, unique_id: &str, age_days: i64) -> uuid::Uuid {
    let record = root_record(EntityKind::Scenario, unique_id, "sweep fodder");
    harness
        .store
        .create_record(&record)
        .await
        .expect("Create record failed");
    harness
        .store
        .soft_delete_cascade(
            EntityKind::Scenario,
            record.record_id,
            None,
            None,
            OffsetDateTime::now_utc() - Duration::days(age_days),
        )
        .await
        .expect("Soft delete failed");
    record.record_id
}

#[tokio::test]
async fn test_retention_boundary() {
    let harness = TestHarness::new().await;

    // Soft-deleted 29 days ago: inside the 30-day window, survives.
    let young = seed_deleted_record(&harness, "SCEN-YOUNGAAAA", 29).await;
    // Soft-deleted 31 days ago: past the window, purged.
    let old = seed_deleted_record(&harness, "SCEN-OLDAAAAAA", 31).await;

    let job = harness.service.run_cleanup(30).await.expect("Cleanup failed");
    assert_eq!(job.retention_threshold_days, 30);
    assert_eq!(job.candidate_count, 1);
    assert_eq!(job.purged_count, 1);
    assert!(job.errors.is_empty());

    assert!(
        harness
            .store
            .get_record(EntityKind::Scenario, young)
            .await
            .expect("Get record failed")
            .is_some()
    );
    assert!(
        harness
            .store
            .get_record(EntityKind::Scenario, old)
            .await
            .expect("Get record failed")
            .is_none()
    );
    assert!(
        harness
            .store
            .is_tombstoned(EntityKind::Scenario, old)
            .await
            .expect("Tombstone check failed")
    );
}

#[tokio::test]
async fn test_second_run_purges_nothing() {
    let harness = TestHarness::new().await;

    for i in 0..3 {
        seed_deleted_record(&harness, &format!("SCEN-TWICE{i}AAA"), 40).await;
    }

    let first = harness.service.run_cleanup(30).await.expect("Cleanup failed");
    assert_eq!(first.purged_count, 3);

    let second = harness.service.run_cleanup(30).await.expect("Cleanup failed");
    assert_eq!(second.candidate_count, 0);
    assert_eq!(second.purged_count, 0);
    assert!(second.errors.is_empty());
}

#[tokio::test]
async fn test_bad_record_does_not_abort_sweep() {
    let harness = TestHarness::new().await;

    let poisoned = seed_deleted_record(&harness, "SCEN-POISAAAAA", 45).await;
    let a = seed_deleted_record(&harness, "SCEN-FINEAAAA1", 50).await;
    let b = seed_deleted_record(&harness, "SCEN-FINEAAAA2", 35).await;
    harness.store.fail_purge_of(poisoned);

    let job = harness.service.run_cleanup(30).await.expect("Cleanup failed");
    assert_eq!(job.candidate_count, 3);
    assert_eq!(job.purged_count, 2);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].contains(&poisoned.to_string()));

    // The failing record is untouched, still awaiting the next sweep.
    let survivor = harness
        .store
        .get_record(EntityKind::Scenario, poisoned)
        .await
        .expect("Get record failed")
        .expect("Poisoned record must survive");
    assert!(!survivor.is_active());
    for id in [a, b] {
        assert!(
            harness
                .store
                .get_record(EntityKind::Scenario, id)
                .await
                .expect("Get record failed")
                .is_none()
        );
    }

    // Once the failure clears, the next sweep finishes the job.
    harness.store.fail_purge_for.lock().unwrap().clear();
    let job = harness.service.run_cleanup(30).await.expect("Cleanup failed");
    assert_eq!(job.purged_count, 1);
    assert!(job.errors.is_empty());
}

#[tokio::test]
async fn test_cleanup_purges_cascaded_tree() {
    let harness = TestHarness::new().await;
    let store = &harness.store;

    let scenario = root_record(EntityKind::Scenario, "SCEN-TREEAAAA1", "whole tree");
    let scene = child_record(EntityKind::Scene, "SCNE-TREEAAAA2", "scene", &scenario);
    let attachment = child_record(EntityKind::Attachment, "FILE-TREEAAAA3", "file", &scene);
    for row in [&scenario, &scene, &attachment] {
        store.create_record(row).await.expect("Create record failed");
    }

    store
        .soft_delete_cascade(
            EntityKind::Scenario,
            scenario.record_id,
            None,
            Some("course retired"),
            OffsetDateTime::now_utc() - Duration::days(60),
        )
        .await
        .expect("Soft delete failed");

    let job = harness.service.run_cleanup(30).await.expect("Cleanup failed");
    assert_eq!(job.candidate_count, 3);
    assert_eq!(job.purged_count, 3);

    let tombstones = store.list_tombstones(10).await.expect("List tombstones failed");
    assert_eq!(tombstones.len(), 3);

    let snapshot = harness.service.stats().await.expect("Stats failed");
    for kind_stats in &snapshot.kinds {
        assert_eq!(kind_stats.active_count, 0);
        assert_eq!(kind_stats.soft_deleted_count, 0);
    }
}

#[tokio::test]
async fn test_recent_deletions_are_not_candidates() {
    let harness = TestHarness::new().await;

    seed_deleted_record(&harness, "SCEN-FRESHAAAA", 1).await;

    let job = harness.service.run_cleanup(30).await.expect("Cleanup failed");
    assert_eq!(job.candidate_count, 0);
    assert_eq!(job.purged_count, 0);

    // A shorter operator-selected threshold does reach it.
    let job = harness.service.run_cleanup(0).await.expect("Cleanup failed");
    assert_eq!(job.purged_count, 1);
}
