// tests/integration/scheduler_test.rs

//! Scheduler passes: due-job selection, cron rescheduling, lease gating.

use super::fixtures::{TestCtx, engine};
use chrono::{Duration as ChronoDuration, Utc};
use std::time::Duration;
use sylved::core::command::{action, kind};
use sylved::core::executor::lineage;
use sylved::core::models::{
    BackupEventStatus, BackupJob, GuestType, ReplicationLease, ReplicationPolicy,
};
use sylved::core::scheduler::{Scheduler, next_after};
use sylved::core::store::EventFilter;

const REMOTE_DATASET: &str = "tank/Backups/srvA/data";

async fn make_due(ctx: &TestCtx, job: &BackupJob) {
    let mut due = job.clone();
    due.next_run_at = Some(Utc::now() - ChronoDuration::seconds(30));
    ctx.state
        .proposer
        .propose(kind::BACKUP_JOB, action::UPDATE, &due)
        .await
        .unwrap();
}

/// Polls the store until the job reaches a terminal status.
async fn wait_for_completion(ctx: &TestCtx, job_id: i64) -> BackupJob {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = ctx.state.store.get_job(job_id).await.unwrap().unwrap();
        if !job.last_status.is_empty() && !ctx.state.running_jobs.contains_key(&job_id) {
            return job;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("job {job_id} never completed");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_first_tick_schedules_without_dispatch() {
    let ctx = engine("nodeA").await;
    ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;

    let scheduler = Scheduler::new(ctx.state.clone());
    scheduler.tick().await;

    let stored = ctx.state.store.get_job(1).await.unwrap().unwrap();
    let next = stored.next_run_at.expect("first tick must set next_run_at");
    assert!(next > Utc::now());

    // No run was opened.
    let events = ctx.state.store.list_events(&EventFilter::default()).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_due_job_runs_and_reschedules() {
    let ctx = engine("nodeA").await;
    let _target = ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/data", &[]);
    make_due(&ctx, &job).await;

    let scheduler = Scheduler::new(ctx.state.clone());
    scheduler.tick().await;
    let done = wait_for_completion(&ctx, job.id).await;

    assert_eq!(done.last_status, "success");
    assert!(done.last_error.is_empty());
    let started = done.last_run_at.expect("last_run_at recorded");

    // Cron monotonicity: the new next_run_at is the first tick strictly
    // after the run started.
    assert_eq!(
        done.next_run_at.unwrap(),
        next_after(&job.cron_expr, started).unwrap()
    );

    // Source snapshot and replicated dataset both exist.
    let local = ctx.zfs.snapshots_of("zroot/data");
    assert_eq!(local.len(), 1);
    assert!(lineage::belongs_to_job(lineage::short_name(&local[0]), job.id));
    assert_eq!(ctx.ssh.snapshots_of(REMOTE_DATASET).len(), 1);

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
}

#[tokio::test]
async fn test_failed_run_surfaces_in_job_and_ledger() {
    let ctx = engine("nodeA").await;
    ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/data", &[]);
    ctx.ssh.set_reachable(false);
    make_due(&ctx, &job).await;

    let scheduler = Scheduler::new(ctx.state.clone());
    scheduler.tick().await;
    let done = wait_for_completion(&ctx, job.id).await;

    assert_eq!(done.last_status, "failed");
    assert!(done.last_error.contains("transport_failed"));
    // The schedule marches on regardless of the failure.
    assert!(done.next_run_at.unwrap() > done.last_run_at.unwrap());
}

#[tokio::test]
async fn test_future_job_is_left_alone() {
    let ctx = engine("nodeA").await;
    ctx.create_target(1, "offsite").await;
    let mut job = ctx.dataset_job(1, 1);
    job.next_run_at = Some(Utc::now() + ChronoDuration::hours(1));
    ctx.create_job(&job).await;

    let scheduler = Scheduler::new(ctx.state.clone());
    scheduler.tick().await;

    let events = ctx.state.store.list_events(&EventFilter::default()).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_foreign_runner_is_skipped() {
    let ctx = engine("nodeA").await;
    ctx.create_target(1, "offsite").await;
    let mut job = ctx.dataset_job(1, 1);
    job.runner_node_id = ctx.state.node_id + 1;
    job.next_run_at = Some(Utc::now() - ChronoDuration::seconds(30));
    ctx.create_job(&job).await;

    let scheduler = Scheduler::new(ctx.state.clone());
    scheduler.tick().await;

    let events = ctx.state.store.list_events(&EventFilter::default()).await.unwrap();
    assert!(events.is_empty());
}

async fn policy_job(ctx: &TestCtx) -> BackupJob {
    let policy = ReplicationPolicy {
        id: 3,
        name: "jail-ha".to_string(),
        guest_type: GuestType::Jail,
        guest_id: 105,
        source_node_id: ctx.state.node_id,
        active_node_id: ctx.state.node_id,
        cron_expr: "0 * * * *".to_string(),
        enabled: true,
        ..Default::default()
    };
    ctx.state
        .proposer
        .propose(kind::REPLICATION_POLICY, action::CREATE, &policy)
        .await
        .unwrap();

    let mut job = ctx.dataset_job(1, 1);
    job.policy_id = Some(3);
    ctx.create_job(&job).await;
    job
}

#[tokio::test]
async fn test_policy_job_takes_and_releases_lease() {
    let ctx = engine("nodeA").await;
    ctx.create_target(1, "offsite").await;
    let job = policy_job(&ctx).await;
    ctx.zfs.seed_dataset("zroot/data", &[]);
    make_due(&ctx, &job).await;

    let scheduler = Scheduler::new(ctx.state.clone());
    scheduler.tick().await;
    let done = wait_for_completion(&ctx, job.id).await;
    assert_eq!(done.last_status, "success");

    // The lease is dropped once the run finishes.
    assert!(ctx.state.store.get_lease(3).await.unwrap().is_none());
}

#[tokio::test]
async fn test_held_lease_skips_tick_without_event() {
    let ctx = engine("nodeA").await;
    ctx.create_target(1, "offsite").await;
    let job = policy_job(&ctx).await;
    make_due(&ctx, &job).await;

    // Another node holds a valid lease for the policy.
    let foreign = ReplicationLease {
        policy_id: 3,
        guest_type: GuestType::Jail,
        guest_id: 105,
        owner_node_id: ctx.state.node_id + 1,
        expires_at: Some(Utc::now() + ChronoDuration::seconds(60)),
        version: 5,
        ..Default::default()
    };
    ctx.state
        .proposer
        .propose(kind::REPLICATION_LEASE, action::UPSERT, &foreign)
        .await
        .unwrap();

    let scheduler = Scheduler::new(ctx.state.clone());
    scheduler.tick().await;

    // No event was created and the foreign lease is untouched.
    let events = ctx.state.store.list_events(&EventFilter::default()).await.unwrap();
    assert!(events.is_empty());
    let lease = ctx.state.store.get_lease(3).await.unwrap().unwrap();
    assert_eq!(lease.owner_node_id, ctx.state.node_id + 1);
    assert_eq!(lease.version, 5);
}

#[tokio::test]
async fn test_run_now_bypasses_schedule() {
    let ctx = engine("nodeA").await;
    ctx.create_target(1, "offsite").await;
    let mut job = ctx.dataset_job(1, 1);
    job.next_run_at = Some(Utc::now() + ChronoDuration::hours(6));
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/data", &[]);

    let scheduler = Scheduler::new(ctx.state.clone());
    scheduler.run_now(job.id).await.unwrap();
    let done = wait_for_completion(&ctx, job.id).await;
    assert_eq!(done.last_status, "success");
    assert_eq!(ctx.zfs.snapshots_of("zroot/data").len(), 1);
}

#[tokio::test]
async fn test_duplicate_dispatch_is_blocked_by_run_slot() {
    let ctx = engine("nodeA").await;
    let target = ctx.create_target(1, "offsite").await;
    let job = ctx.dataset_job(1, 1);
    ctx.create_job(&job).await;
    ctx.zfs.seed_dataset("zroot/data", &[]);

    // Simulate an in-flight run holding the slot.
    ctx.state.running_jobs.insert(job.id, ());
    make_due(&ctx, &job).await;

    let scheduler = Scheduler::new(ctx.state.clone());
    scheduler.tick().await;
    let events = ctx.state.store.list_events(&EventFilter::default()).await.unwrap();
    assert!(events.is_empty());
    ctx.state.running_jobs.remove(&job.id);

    // With the slot free the next tick dispatches normally.
    scheduler.tick().await;
    let done = wait_for_completion(&ctx, job.id).await;
    assert_eq!(done.last_status, "success");
    let _ = target;
}
