// tests/integration/restore_test.rs

//! Restore flows: job-scoped and out-of-band, with lineage preservation.

use super::fixtures::engine;
use sylved::core::errors::SylveError;
use sylved::core::executor::lineage;

const REMOTE_DATASET: &str = "tank/Backups/srvA/data";

#[tokio::test]
async fn test_restore_preserves_existing_destination() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;

    // The job replicated once; the live dataset has moved on since.
    ctx.ssh.seed_dataset(REMOTE_DATASET, &["zelta_20260301010000_1"]);
    ctx.zfs.seed_dataset("zroot/data", &["zelta_20260301010000_1", "local_only_changes"]);

    let report = ctx
        .state
        .executor
        .restore_job(&job, &target, "zelta_20260301010000_1")
        .await
        .unwrap();

    // The prior dataset was rotated aside, not deleted.
    let preserved = report.preserved.expect("destination existed, must be preserved");
    assert!(preserved.starts_with("zroot/data.pre_sylve_"));
    assert_eq!(lineage::classify_dataset(&preserved), lineage::Lineage::Preserved);
    assert!(ctx.zfs.has_dataset(&preserved));
    assert!(
        ctx.zfs
            .snapshots_of(&preserved)
            .iter()
            .any(|f| f.ends_with("@local_only_changes"))
    );

    // The destination is a fresh receive of the requested snapshot.
    let restored = ctx.zfs.snapshots_of("zroot/data");
    assert_eq!(restored.len(), 1);
    assert_eq!(lineage::short_name(&restored[0]), "zelta_20260301010000_1");

    // The restore landed in the replication ledger.
    let events = ctx.state.store.list_replication_events(None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "restore");
    assert_eq!(events[0].status, "success");
    assert_eq!(events[0].job_id, Some(job.id));
    assert!(events[0].message.contains(&preserved));
}

#[tokio::test]
async fn test_restore_into_fresh_destination() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    ctx.ssh.seed_dataset("tank/Backups/oob", &["snapX"]);

    let report = ctx
        .state
        .executor
        .restore_oob(&target, "tank/Backups/oob", "snapX", "zroot/restored")
        .await
        .unwrap();

    assert!(report.preserved.is_none());
    let restored = ctx.zfs.snapshots_of("zroot/restored");
    assert_eq!(restored, vec!["zroot/restored@snapX".to_string()]);
}

#[tokio::test]
async fn test_restore_missing_snapshot_fails_and_is_recorded() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    ctx.ssh.seed_dataset("tank/Backups/oob", &["snapX"]);

    let err = ctx
        .state
        .executor
        .restore_oob(&target, "tank/Backups/oob", "nope", "zroot/restored")
        .await
        .unwrap_err();
    assert!(matches!(err, SylveError::SendRecvFailed(_)));

    let events = ctx.state.store.list_replication_events(None).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, "failed");
    assert!(events[0].message.contains("does not exist"));
}

#[tokio::test]
async fn test_restore_by_job_id_resolves_coordinates() {
    let ctx = engine("nodeA").await;
    ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;
    ctx.ssh.seed_dataset(REMOTE_DATASET, &["zelta_20260301010000_1"]);

    let report = ctx
        .state
        .restore_job(job.id, "zelta_20260301010000_1")
        .await
        .unwrap();
    assert_eq!(report.destination, "zroot/data");
    assert!(report.preserved.is_none());
    assert_eq!(ctx.zfs.snapshots_of("zroot/data").len(), 1);

    let err = ctx.state.restore_job(99, "whatever").await.unwrap_err();
    assert!(err.to_string().contains("unknown job"));
}

#[tokio::test]
async fn test_two_restores_preserve_two_lineages() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;
    ctx.ssh.seed_dataset(REMOTE_DATASET, &["zelta_20260301010000_1"]);
    ctx.zfs.seed_dataset("zroot/data", &["gen1"]);

    let first = ctx
        .state
        .executor
        .restore_job(&job, &target, "zelta_20260301010000_1")
        .await
        .unwrap();
    let second = ctx
        .state
        .executor
        .restore_job(&job, &target, "zelta_20260301010000_1")
        .await
        .unwrap();

    // Both rotations still exist under distinct random suffixes.
    let p1 = first.preserved.unwrap();
    let p2 = second.preserved.unwrap();
    assert_ne!(p1, p2);
    assert!(ctx.zfs.has_dataset(&p1));
    assert!(ctx.zfs.has_dataset(&p2));
}
