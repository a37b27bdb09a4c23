// src/core/executor/mod.rs

//! Executes a single backup run: snapshot, incremental discovery, ZFS
//! send|recv over SSH, prune, jail quiesce/resume, and event completion.
//!
//! An executor failure is never fatal to the scheduler; it surfaces through
//! the event ledger and the job's `last_error`.

pub mod lineage;
mod restore;

pub use restore::RestoreReport;

use crate::core::command::{action, kind};
use crate::core::errors::SylveError;
use crate::core::jail::{JailController, ctid_from_dataset};
use crate::core::models::{BackupEventStatus, BackupJob, BackupJobMode, BackupTarget};
use crate::core::propose::Proposer;
use crate::core::ssh::{ExecOutput, SshEndpoint, SshTransport};
use crate::core::zfs::{self, ZfsExecutor};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bound on the stderr/output text stored per event.
const OUTPUT_TAIL_MAX: usize = 64 * 1024;

/// SSH exit code for a failed connection (as opposed to a failed remote
/// command).
const SSH_CONNECT_FAILURE: i32 = 255;

const CONNECT_ATTEMPTS: u32 = 3;
const CONNECT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Terminal report of one run, consumed by the scheduler to update the job.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub status: BackupEventStatus,
    pub error: String,
    pub output: String,
    /// The source snapshot created by this run, if any.
    pub snapshot: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompleteEventPayload<'a> {
    job_id: i64,
    status: BackupEventStatus,
    error: &'a str,
    output: &'a str,
    completed_at: chrono::DateTime<chrono::Utc>,
}

pub struct Executor {
    zfs: Arc<dyn ZfsExecutor>,
    ssh: Arc<dyn SshTransport>,
    jail: Arc<dyn JailController>,
    proposer: Arc<Proposer>,
}

struct JailGuard {
    ctid: u32,
    was_running: bool,
}

impl Executor {
    pub fn new(
        zfs: Arc<dyn ZfsExecutor>,
        ssh: Arc<dyn SshTransport>,
        jail: Arc<dyn JailController>,
        proposer: Arc<Proposer>,
    ) -> Self {
        Self {
            zfs,
            ssh,
            jail,
            proposer,
        }
    }

    /// Runs one backup for `job` and records the terminal event. Always
    /// returns a report; failures are folded into it.
    pub async fn run(
        &self,
        job: &BackupJob,
        target: &BackupTarget,
        cancel: CancellationToken,
    ) -> RunReport {
        let mut output = String::new();
        let mut created_snapshot: Option<String> = None;
        let mut jail_guard: Option<JailGuard> = None;

        let result = self
            .run_inner(job, target, &cancel, &mut output, &mut created_snapshot, &mut jail_guard)
            .await;

        // A cancelled run cleans up the snapshot it created so the next
        // scheduled attempt starts from the previous base.
        if matches!(result, Err(SylveError::Canceled)) {
            if let Some(snap) = &created_snapshot {
                if let Err(e) = self.zfs.destroy(snap, true).await {
                    warn!(snapshot = %snap, error = %e, "cleanup of canceled run failed");
                }
            }
        }

        // Resume the jail no matter how the run ended. A restart failure
        // after a successful send is a warning, not a failure.
        let mut resume_warning = String::new();
        if let Some(guard) = jail_guard {
            if guard.was_running {
                if let Err(e) = self.jail.start(guard.ctid).await {
                    warn!(ctid = guard.ctid, error = %e, "jail restart failed after backup");
                    resume_warning = format!("jail_restart_failed: {e}");
                }
            }
        }

        let report = match result {
            Ok(()) => RunReport {
                status: BackupEventStatus::Success,
                error: resume_warning,
                output: zfs::tail_utf8(output.as_bytes(), OUTPUT_TAIL_MAX),
                snapshot: created_snapshot,
            },
            Err(e) => RunReport {
                status: BackupEventStatus::Failed,
                error: e.to_string(),
                output: zfs::tail_utf8(output.as_bytes(), OUTPUT_TAIL_MAX),
                snapshot: created_snapshot,
            },
        };

        if let Err(e) = self.complete_event(job.id, &report).await {
            warn!(job_id = job.id, error = %e, "failed to record terminal event");
        }
        report
    }

    async fn run_inner(
        &self,
        job: &BackupJob,
        target: &BackupTarget,
        cancel: &CancellationToken,
        output: &mut String,
        created_snapshot: &mut Option<String>,
        jail_guard: &mut Option<JailGuard>,
    ) -> Result<(), SylveError> {
        // (a) Source resolution and jail quiesce.
        let source = job.source();
        let recursive_send = job.mode == BackupJobMode::Jail;

        if job.mode == BackupJobMode::Jail && job.stop_before_backup {
            let ctid = ctid_from_dataset(&job.jail_root_dataset)?;
            let was_running = self
                .jail
                .is_running(ctid)
                .await
                .map_err(|e| SylveError::JailQuiesceFailed(e.to_string()))?;
            if was_running {
                self.jail
                    .stop(ctid)
                    .await
                    .map_err(|e| SylveError::JailQuiesceFailed(e.to_string()))?;
                info!(job_id = job.id, ctid, "jail quiesced for backup");
            }
            *jail_guard = Some(JailGuard { ctid, was_running });
        }

        if cancel.is_cancelled() {
            return Err(SylveError::Canceled);
        }

        // (b) Snapshot creation. Always recursive so jail children ride along.
        let short = lineage::snapshot_short_name(Utc::now(), job.id);
        self.zfs.snapshot(source, &short, true).await?;
        let full = format!("{source}@{short}");
        *created_snapshot = Some(full.clone());
        info!(job_id = job.id, snapshot = %full, "source snapshot created");

        // (c) Incremental discovery, filtered to this job's lineage.
        let local = self.zfs.list_snapshots(source).await?;
        let endpoint = SshEndpoint::from_target(target);
        let remote_dataset = target.dataset_path(&job.dest_suffix);
        let remote = self.list_remote_snapshots(&endpoint, &remote_dataset).await?;

        let base = lineage::latest_common_base(&local, &remote, job.id, &short);
        let has_prior_local = local
            .iter()
            .any(|f| lineage::short_name(f) != short && lineage::belongs_to_job(lineage::short_name(f), job.id));
        if base.is_none() && has_prior_local && !remote.is_empty() {
            // Remote carries data but none of our bases; an incremental send
            // is impossible.
            if !job.allow_full_fallback {
                return Err(SylveError::BaseMissingOnTarget(format!(
                    "no common base for job {} on {}",
                    job.id, remote_dataset
                )));
            }
            warn!(job_id = job.id, "no common base on target, falling back to full send");
        }
        let base_full = base.as_ref().map(|b| format!("{source}@{b}"));

        // (d) Wire send: local `zfs send` piped into a remote `zfs recv -F`.
        self.stream_to_target(
            &endpoint,
            &remote_dataset,
            base_full.as_deref(),
            &full,
            recursive_send,
            cancel,
            output,
        )
        .await?;
        info!(
            job_id = job.id,
            base = base.as_deref().unwrap_or("<full>"),
            endpoint = %target.endpoint(&job.dest_suffix),
            "send/recv completed"
        );

        // (e) Prune, never fatal.
        if job.prune_keep_last > 0 {
            self.prune(job, &endpoint, source, &remote_dataset, output).await;
        }

        Ok(())
    }

    /// Lists the remote dataset's snapshots; an unreachable host is an error,
    /// a missing dataset is just an empty list (first send creates it).
    async fn list_remote_snapshots(
        &self,
        endpoint: &SshEndpoint,
        dataset: &str,
    ) -> Result<Vec<String>, SylveError> {
        let cmd = format!("zfs {}", zfs::list_snapshots_args(dataset).join(" "));
        let out = self.exec_with_retry(endpoint, &cmd).await?;
        if out.success() {
            Ok(zfs::parse_snapshot_list(&out.stdout))
        } else {
            Ok(Vec::new())
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn stream_to_target(
        &self,
        endpoint: &SshEndpoint,
        remote_dataset: &str,
        base: Option<&str>,
        snapshot: &str,
        recursive: bool,
        cancel: &CancellationToken,
        output: &mut String,
    ) -> Result<(), SylveError> {
        let recv_cmd = format!("zfs {}", zfs::recv_args(remote_dataset, true).join(" "));
        let session = self.ssh.open_session(endpoint, &recv_cmd).await?;
        let send = self.zfs.open_send(base, snapshot, recursive).await?;

        let mut stdout = send.stdout;
        let mut stdin = session.stdin;
        let copy = async move {
            tokio::io::copy(&mut stdout, &mut stdin).await?;
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(SylveError::Canceled),
            res = copy => {
                res.map_err(|e| SylveError::SendRecvFailed(format!("pipeline: {e}")))?;
            }
        }

        let send_exit = send.wait.await?;
        let recv_exit = session.wait.await?;
        if !send_exit.stderr_tail.is_empty() {
            output.push_str(&send_exit.stderr_tail);
            output.push('\n');
        }
        if !recv_exit.stderr_tail.is_empty() {
            output.push_str(&recv_exit.stderr_tail);
            output.push('\n');
        }

        if !send_exit.success() {
            return Err(SylveError::SendRecvFailed(send_exit.stderr_tail));
        }
        if !recv_exit.success() {
            if recv_exit.code == SSH_CONNECT_FAILURE {
                return Err(SylveError::RemoteUnreachable(recv_exit.stderr_tail));
            }
            let stderr = recv_exit.stderr_tail;
            if stderr.contains("exists") || stderr.contains("destination") {
                return Err(SylveError::DatasetConflict(stderr));
            }
            return Err(SylveError::SendRecvFailed(stderr));
        }
        Ok(())
    }

    /// Prunes the active lineage down to `prune_keep_last` snapshots on the
    /// source, and on the target when configured. Failures are recorded as
    /// warnings in the run output.
    async fn prune(
        &self,
        job: &BackupJob,
        endpoint: &SshEndpoint,
        source: &str,
        remote_dataset: &str,
        output: &mut String,
    ) {
        let keep = job.prune_keep_last as usize;

        match self.zfs.list_snapshots(source).await {
            Ok(local) => {
                for victim in lineage::prune_victims(&local, job.id, keep) {
                    if let Err(e) = self.zfs.destroy(&victim, job.mode == BackupJobMode::Jail).await
                    {
                        warn!(snapshot = %victim, error = %e, "source prune failed");
                        output.push_str(&format!("prune_warning: {victim}: {e}\n"));
                    }
                }
            }
            Err(e) => {
                output.push_str(&format!("prune_warning: list source snapshots: {e}\n"));
            }
        }

        if !job.prune_target {
            return;
        }
        match self.list_remote_snapshots(endpoint, remote_dataset).await {
            Ok(remote) => {
                for victim in lineage::prune_victims(&remote, job.id, keep) {
                    let cmd = format!(
                        "zfs {}",
                        zfs::destroy_args(&victim, job.mode == BackupJobMode::Jail).join(" ")
                    );
                    match self.ssh.exec(endpoint, &cmd).await {
                        Ok(out) if out.success() => {}
                        Ok(out) => {
                            warn!(snapshot = %victim, stderr = %out.stderr, "target prune failed");
                            output.push_str(&format!("prune_warning: {victim}: {}\n", out.stderr));
                        }
                        Err(e) => {
                            warn!(snapshot = %victim, error = %e, "target prune failed");
                            output.push_str(&format!("prune_warning: {victim}: {e}\n"));
                        }
                    }
                }
            }
            Err(e) => {
                output.push_str(&format!("prune_warning: list target snapshots: {e}\n"));
            }
        }
    }

    /// (g) Terminal event update through the FSM.
    async fn complete_event(&self, job_id: i64, report: &RunReport) -> Result<(), SylveError> {
        self.proposer
            .propose(
                kind::BACKUP_EVENT,
                action::UPDATE,
                &CompleteEventPayload {
                    job_id,
                    status: report.status,
                    error: &report.error,
                    output: &report.output,
                    completed_at: Utc::now(),
                },
            )
            .await
    }

    /// Reachability probe used at target-create time: list the backup root
    /// over SSH and report whether the host answered.
    pub async fn check_target(&self, target: &BackupTarget) -> Result<(), SylveError> {
        let endpoint = SshEndpoint::from_target(target);
        let cmd = format!("zfs list -H -o name {}", target.backup_root);
        let out = self.exec_with_retry(&endpoint, &cmd).await?;
        if out.success() {
            Ok(())
        } else {
            Err(SylveError::RemoteUnreachable(out.stderr))
        }
    }

    /// One-shot remote command with bounded exponential backoff on the
    /// connection-open step only; a remote command that runs and fails is
    /// returned as-is, never retried.
    async fn exec_with_retry(
        &self,
        endpoint: &SshEndpoint,
        cmd: &str,
    ) -> Result<ExecOutput, SylveError> {
        let mut delay = CONNECT_BACKOFF_BASE;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.ssh.exec(endpoint, cmd).await;
            match result {
                Ok(out) if out.code != SSH_CONNECT_FAILURE => return Ok(out),
                Ok(out) => {
                    if attempt >= CONNECT_ATTEMPTS {
                        return Err(SylveError::RemoteUnreachable(out.stderr));
                    }
                }
                Err(e) => {
                    if attempt >= CONNECT_ATTEMPTS {
                        return Err(e);
                    }
                }
            }
            warn!(host = %endpoint.host, attempt, "ssh connect failed, backing off");
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }
}
