// tests/integration/executor_test.rs

//! End-to-end executor runs against the fake pool and remote.

use super::fixtures::engine;
use std::sync::atomic::Ordering;
use std::time::Duration;
use sylved::core::executor::lineage;
use sylved::core::models::{BackupEventStatus, BackupJobMode};
use sylved::core::store::EventFilter;
use tokio_util::sync::CancellationToken;

const REMOTE_DATASET: &str = "tank/Backups/srvA/data";

#[tokio::test]
async fn test_full_then_incremental_send() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/data", &[]);

    // First run: no base anywhere, so a full send materialises the remote
    // dataset with the fresh snapshot.
    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, CancellationToken::new()).await;
    assert_eq!(report.status, BackupEventStatus::Success);
    assert!(report.error.is_empty(), "unexpected warning: {}", report.error);

    let local = ctx.zfs.snapshots_of("zroot/data");
    assert_eq!(local.len(), 1);
    let first_short = lineage::short_name(&local[0]).to_string();
    assert!(lineage::belongs_to_job(&first_short, job.id));

    let remote = ctx.ssh.snapshots_of(REMOTE_DATASET);
    assert_eq!(remote.len(), 1);
    assert_eq!(lineage::short_name(&remote[0]), first_short);

    let events = ctx
        .state
        .store
        .list_events(&EventFilter {
            job_id: Some(job.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, BackupEventStatus::Success);
    assert!(events[0].completed_at.is_some());
    assert_eq!(events[0].target_endpoint, "root@10.0.0.5:tank/Backups/srvA/data");

    // Second run a tick later: the common base makes it incremental, and the
    // remote chain grows by exactly the new snapshot.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, CancellationToken::new()).await;
    assert_eq!(report.status, BackupEventStatus::Success);

    let remote = ctx.ssh.snapshots_of(REMOTE_DATASET);
    assert_eq!(remote.len(), 2);
    assert_eq!(lineage::short_name(&remote[0]), first_short);
}

#[tokio::test]
async fn test_prune_keeps_last_k_on_active_lineage() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let mut job = ctx.dataset_job(1, 1);
    job.prune_keep_last = 3;
    job.prune_target = true;
    ctx.create_job(&job).await;

    // Three prior runs already replicated, plus an out-of-band snapshot that
    // must survive pruning.
    let seeded = [
        "manual_keepme",
        "zelta_20260301010000_1",
        "zelta_20260301020000_1",
        "zelta_20260301030000_1",
    ];
    ctx.zfs.seed_dataset("zroot/data", &seeded);
    ctx.ssh.seed_dataset(
        REMOTE_DATASET,
        &seeded[1..],
    );

    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, CancellationToken::new()).await;
    assert_eq!(report.status, BackupEventStatus::Success);

    // Four active snapshots existed after the run; prune keeps the last 3.
    let local = ctx.zfs.snapshots_of("zroot/data");
    let active: Vec<_> = local
        .iter()
        .filter(|f| lineage::belongs_to_job(lineage::short_name(f), job.id))
        .collect();
    assert_eq!(active.len(), 3);
    assert!(!local.iter().any(|f| f.ends_with("zelta_20260301010000_1")));
    assert!(local.iter().any(|f| f.ends_with("@manual_keepme")));

    let remote = ctx.ssh.snapshots_of(REMOTE_DATASET);
    let remote_active: Vec<_> = remote
        .iter()
        .filter(|f| lineage::belongs_to_job(lineage::short_name(f), job.id))
        .collect();
    assert_eq!(remote_active.len(), 3);
}

#[tokio::test]
async fn test_unreachable_target_fails_but_keeps_snapshot() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/data", &[]);
    ctx.ssh.set_reachable(false);

    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, CancellationToken::new()).await;
    assert_eq!(report.status, BackupEventStatus::Failed);
    assert!(report.error.contains("transport_failed"), "got: {}", report.error);

    // The source snapshot stays, ready to serve as the next incremental base.
    assert_eq!(ctx.zfs.snapshots_of("zroot/data").len(), 1);
    assert!(!ctx.ssh.has_dataset(REMOTE_DATASET));

    let events = ctx
        .state
        .store
        .list_events(&EventFilter {
            job_id: Some(job.id),
            status: Some(BackupEventStatus::Failed),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert!(events[0].error.contains("transport_failed"));
}

#[tokio::test]
async fn test_jail_mode_quiesces_and_resumes() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let mut job = ctx.dataset_job(2, 1);
    job.mode = BackupJobMode::Jail;
    job.source_dataset = String::new();
    job.jail_root_dataset = "zroot/sylve/jails/105".to_string();
    job.dest_suffix = "srvA/jail105".to_string();
    job.stop_before_backup = true;
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/sylve/jails/105", &[]);
    ctx.jail.set_running(105);

    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, CancellationToken::new()).await;
    assert_eq!(report.status, BackupEventStatus::Success);

    // Stopped before the snapshot, restarted after the send completed.
    assert_eq!(*ctx.jail.log.lock(), vec!["stop 105".to_string(), "start 105".to_string()]);
    assert!(ctx.jail.running.lock().contains(&105));
    assert_eq!(ctx.zfs.snapshots_of("zroot/sylve/jails/105").len(), 1);
    assert!(ctx.ssh.has_dataset("tank/Backups/srvA/jail105"));
}

#[tokio::test]
async fn test_jail_quiesce_failure_aborts_before_snapshot() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let mut job = ctx.dataset_job(2, 1);
    job.mode = BackupJobMode::Jail;
    job.jail_root_dataset = "zroot/sylve/jails/105".to_string();
    job.stop_before_backup = true;
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/sylve/jails/105", &[]);
    ctx.jail.set_running(105);
    ctx.jail.stop_fails.store(true, Ordering::Relaxed);

    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, CancellationToken::new()).await;
    assert_eq!(report.status, BackupEventStatus::Failed);
    assert!(report.error.starts_with("jail_quiesce_failed"));
    assert!(ctx.zfs.snapshots_of("zroot/sylve/jails/105").is_empty());
}

#[tokio::test]
async fn test_stopped_jail_is_not_restarted() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let mut job = ctx.dataset_job(2, 1);
    job.mode = BackupJobMode::Jail;
    job.jail_root_dataset = "zroot/sylve/jails/106".to_string();
    job.stop_before_backup = true;
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/sylve/jails/106", &[]);

    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, CancellationToken::new()).await;
    assert_eq!(report.status, BackupEventStatus::Success);
    // The jail was already down: no stop, no start.
    assert!(ctx.jail.log.lock().is_empty());
}

#[tokio::test]
async fn test_base_missing_on_target_without_fallback() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let mut job = ctx.dataset_job(1, 1);
    job.allow_full_fallback = false;
    ctx.create_job(&job).await;

    // Local history exists, remote carries only foreign snapshots: an
    // incremental is impossible and fallback is disabled.
    ctx.zfs.seed_dataset("zroot/data", &["zelta_20260301010000_1"]);
    ctx.ssh.seed_dataset(REMOTE_DATASET, &["zelta_20260301010000_9"]);

    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, CancellationToken::new()).await;
    assert_eq!(report.status, BackupEventStatus::Failed);
    assert!(report.error.starts_with("base_missing_on_target"));
}

#[tokio::test]
async fn test_base_missing_on_target_with_fallback_sends_full() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;

    ctx.zfs.seed_dataset("zroot/data", &["zelta_20260301010000_1"]);
    ctx.ssh.seed_dataset(REMOTE_DATASET, &["zelta_20260301010000_9"]);

    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, CancellationToken::new()).await;
    assert_eq!(report.status, BackupEventStatus::Success);
    let remote = ctx.ssh.snapshots_of(REMOTE_DATASET);
    assert!(remote.iter().any(|f| lineage::belongs_to_job(lineage::short_name(f), job.id)));
}

#[tokio::test]
async fn test_canceled_run_reports_canceled() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/data", &[]);

    let cancel = CancellationToken::new();
    cancel.cancel();

    ctx.open_event(&job, &target).await;
    let report = ctx.state.executor.run(&job, &target, cancel).await;
    assert_eq!(report.status, BackupEventStatus::Failed);
    assert_eq!(report.error, "canceled");
    // Cancellation observed before the snapshot step: nothing to clean up.
    assert!(ctx.zfs.snapshots_of("zroot/data").is_empty());

    let events = ctx
        .state
        .store
        .list_events(&EventFilter {
            job_id: Some(job.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events[0].status, BackupEventStatus::Failed);
    assert_eq!(events[0].error, "canceled");
}

#[tokio::test]
async fn test_check_target_probes_backup_root() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    ctx.ssh.seed_dataset("tank/Backups", &[]);
    ctx.state.executor.check_target(&target).await.unwrap();
    assert!(
        ctx.ssh
            .exec_log
            .lock()
            .iter()
            .any(|cmd| cmd.contains("zfs list") && cmd.contains("tank/Backups"))
    );

    ctx.ssh.set_reachable(false);
    let err = ctx.state.executor.check_target(&target).await.unwrap_err();
    assert!(err.to_string().contains("transport_failed"));
}
