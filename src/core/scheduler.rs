// src/core/scheduler.rs

//! The per-node cron scheduler: picks due jobs pinned to this node, takes
//! the policy lease when one applies, opens the run's ledger event, and
//! dispatches to the executor.
//!
//! Individual job failures never stop the scheduler; they surface only
//! through the event ledger and the job's `last_error`.

use crate::core::command::{action, kind};
use crate::core::errors::SylveError;
use crate::core::models::{BackupEvent, BackupEventStatus, BackupJob};
use crate::core::state::NodeState;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Validates a standard 5-field cron expression.
pub fn validate_cron(expr: &str) -> Result<(), SylveError> {
    parse_cron(expr).map(|_| ())
}

/// The first tick strictly after `after`, in UTC.
pub fn next_after(expr: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>, SylveError> {
    let schedule = parse_cron(expr)?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| SylveError::InvalidCron(format!("'{expr}' has no future occurrence")))
}

/// The `cron` crate wants a seconds field; users write the conventional
/// 5-field form, so a zero-seconds field is prepended here.
fn parse_cron(expr: &str) -> Result<Schedule, SylveError> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(SylveError::InvalidCron(format!(
            "expected 5 fields, got {fields} in '{expr}'"
        )));
    }
    Ok(Schedule::from_str(&format!("0 {expr}"))?)
}

pub struct Scheduler {
    state: Arc<NodeState>,
}

impl Scheduler {
    pub fn new(state: Arc<NodeState>) -> Self {
        Self { state }
    }

    /// Runs the ticker loop until shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let tick = Duration::from_secs(self.state.config.scheduler.tick_interval_secs);
        info!(interval_secs = tick.as_secs(), "backup scheduler started");
        let mut interval = tokio::time::interval(tick);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("backup scheduler shutting down");
                    // Running executor tasks observe this token and finish
                    // with `canceled`.
                    self.state.cancel_root.cancel();
                    return;
                }
            }
        }
    }

    /// One scheduler pass: evaluates every runnable job pinned to this node.
    pub async fn tick(&self) {
        let jobs = match self.state.store.list_runnable_jobs(self.state.node_id).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "scheduler failed to list jobs");
                return;
            }
        };

        let now = Utc::now();
        for job in jobs {
            let job_id = job.id;
            if let Err(e) = self.consider(job, now).await {
                match e {
                    SylveError::LeaseHeld { .. } | SylveError::HandlerRejected(_) => {
                        debug!(job_id, error = %e, "job skipped this tick");
                    }
                    other => warn!(job_id, error = %other, "job dispatch failed"),
                }
            }
        }
    }

    async fn consider(&self, job: BackupJob, now: DateTime<Utc>) -> Result<(), SylveError> {
        match job.next_run_at {
            None => {
                // Newly created or restored jobs get a schedule first; they
                // run on a later tick.
                let mut updated = job.clone();
                updated.next_run_at = Some(next_after(&job.cron_expr, now)?);
                self.state
                    .proposer
                    .propose(kind::BACKUP_JOB, action::UPDATE, &updated)
                    .await?;
                debug!(job_id = job.id, next_run_at = ?updated.next_run_at, "job scheduled");
                return Ok(());
            }
            Some(due) if due <= now => {}
            Some(_) => return Ok(()),
        }
        self.dispatch(job).await
    }

    /// Fires a job immediately, outside its schedule, through the identical
    /// lease/event/executor path.
    pub async fn run_now(&self, job_id: i64) -> Result<(), SylveError> {
        let job = self
            .state
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| SylveError::InvalidRequest(format!("unknown job {job_id}")))?;
        self.dispatch(job).await
    }

    async fn dispatch(&self, job: BackupJob) -> Result<(), SylveError> {
        // In-process run slot: one active run per job on this node.
        if self.state.running_jobs.contains_key(&job.id) {
            debug!(job_id = job.id, "job already running, skipping");
            return Ok(());
        }

        // Policy-bound jobs take the distributed lease first; a held lease
        // skips this tick without opening an event.
        if let Some(policy_id) = job.policy_id {
            let policy = self.state.store.get_policy(policy_id).await?;
            let (guest_type, guest_id) = policy
                .map(|p| (p.guest_type, p.guest_id))
                .unwrap_or_default();
            self.state
                .leases
                .acquire(
                    policy_id,
                    guest_type,
                    guest_id,
                    Duration::from_secs(self.state.config.scheduler.lease_ttl_secs),
                    "scheduled_backup",
                    &self.state.config.node.name,
                )
                .await?;
        }

        let target = self
            .state
            .store
            .get_target(job.target_id)
            .await?
            .ok_or_else(|| {
                SylveError::InvalidRequest(format!("job {} has unknown target", job.id))
            })?;

        let started = Utc::now();
        let event = BackupEvent {
            id: 0,
            job_id: Some(job.id),
            source_dataset: job.source().to_string(),
            target_endpoint: target.endpoint(&job.dest_suffix),
            mode: job.mode,
            status: BackupEventStatus::Running,
            error: String::new(),
            output: String::new(),
            started_at: Some(started),
            completed_at: None,
        };
        self.state
            .proposer
            .propose(kind::BACKUP_EVENT, action::CREATE, &event)
            .await?;

        self.state.running_jobs.insert(job.id, ());
        info!(job_id = job.id, target = %target.name, "dispatching backup run");

        let state = self.state.clone();
        let cancel = self.state.cancel_root.child_token();
        self.state.run_tasks.lock().await.spawn(async move {
            let report = state.executor.run(&job, &target, cancel).await;

            let mut updated = job.clone();
            updated.last_run_at = Some(started);
            updated.last_status = match report.status {
                BackupEventStatus::Success => "success".to_string(),
                _ => "failed".to_string(),
            };
            updated.last_error = report.error.clone();
            // Monotonic: the next tick is strictly after this run's start.
            updated.next_run_at = next_after(&job.cron_expr, started).ok();
            if let Err(e) = state
                .proposer
                .propose(kind::BACKUP_JOB, action::UPDATE, &updated)
                .await
            {
                warn!(job_id = job.id, error = %e, "failed to update job after run");
            }

            if let Some(policy_id) = job.policy_id {
                if let Err(e) = state.leases.release(policy_id).await {
                    warn!(policy_id, error = %e, "failed to release lease after run");
                }
            }
            state.running_jobs.remove(&job.id);
        });

        Ok(())
    }
}
