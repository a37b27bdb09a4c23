// src/core/executor/restore.rs

//! Restoration from a target, job-scoped or out-of-band.
//!
//! A pre-existing destination is renamed to `<destination>.pre_sylve_<id>`
//! before the receive and kept around for manual recovery; restore never
//! deletes preserved datasets.

use super::Executor;
use super::lineage;
use crate::core::command::{action, kind};
use crate::core::errors::SylveError;
use crate::core::models::{BackupJob, BackupTarget, ReplicationEvent};
use crate::core::ssh::SshEndpoint;
use crate::core::zfs;
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// What a restore did, for callers and the ledger.
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub destination: String,
    /// The rotated-away prior dataset, when one existed.
    pub preserved: Option<String>,
}

impl Executor {
    /// Restores a job's destination dataset from one of its replicated
    /// snapshots back onto the job's source dataset.
    pub async fn restore_job(
        &self,
        job: &BackupJob,
        target: &BackupTarget,
        snapshot: &str,
    ) -> Result<RestoreReport, SylveError> {
        let remote_dataset = target.dataset_path(&job.dest_suffix);
        self.restore_inner(
            target,
            &remote_dataset,
            snapshot,
            job.source(),
            Some(job.id),
            job.policy_id,
        )
        .await
    }

    /// Out-of-band restore: no originating job, all coordinates supplied by
    /// the operator.
    pub async fn restore_oob(
        &self,
        target: &BackupTarget,
        remote_dataset: &str,
        snapshot: &str,
        destination: &str,
    ) -> Result<RestoreReport, SylveError> {
        self.restore_inner(target, remote_dataset, snapshot, destination, None, None)
            .await
    }

    async fn restore_inner(
        &self,
        target: &BackupTarget,
        remote_dataset: &str,
        snapshot: &str,
        destination: &str,
        job_id: Option<i64>,
        policy_id: Option<i64>,
    ) -> Result<RestoreReport, SylveError> {
        let started = Utc::now();
        let result = self
            .do_restore(target, remote_dataset, snapshot, destination)
            .await;

        let (status, message) = match &result {
            Ok(report) => (
                "success".to_string(),
                match &report.preserved {
                    Some(p) => format!("restored {snapshot} to {destination}; prior dataset preserved as {p}"),
                    None => format!("restored {snapshot} to {destination}"),
                },
            ),
            Err(e) => ("failed".to_string(), e.to_string()),
        };

        let event = ReplicationEvent {
            id: 0,
            policy_id,
            job_id,
            event_type: "restore".to_string(),
            status,
            message,
            created_at: Some(started),
            completed_at: Some(Utc::now()),
        };
        if let Err(e) = self
            .proposer
            .propose(kind::REPLICATION_EVENT, action::CREATE, &event)
            .await
        {
            warn!(error = %e, "failed to record restore event");
        }

        result
    }

    async fn do_restore(
        &self,
        target: &BackupTarget,
        remote_dataset: &str,
        snapshot: &str,
        destination: &str,
    ) -> Result<RestoreReport, SylveError> {
        let endpoint = SshEndpoint::from_target(target);
        let snapshot = lineage::short_name(snapshot);

        // Rotate a pre-existing destination out of the way; the receive then
        // materialises a fresh dataset.
        let preserved = if self.zfs.dataset_exists(destination).await? {
            let rand_id: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(8)
                .map(char::from)
                .collect::<String>()
                .to_lowercase();
            let name = lineage::preserved_dataset_name(destination, &rand_id);
            self.zfs.rename(destination, &name).await?;
            info!(from = %destination, to = %name, "preserved prior dataset before restore");
            Some(name)
        } else {
            None
        };

        // Remote `zfs send` piped into a local `zfs recv -F`.
        let send_cmd = format!(
            "zfs {}",
            zfs::send_args(None, &format!("{remote_dataset}@{snapshot}"), false).join(" ")
        );
        let session = self.ssh.open_session(&endpoint, &send_cmd).await?;
        let recv = self.zfs.open_recv(destination, true).await?;

        let mut stdout = session.stdout;
        let mut stdin = recv.stdin;
        tokio::io::copy(&mut stdout, &mut stdin)
            .await
            .map_err(|e| SylveError::SendRecvFailed(format!("restore pipeline: {e}")))?;
        stdin
            .shutdown()
            .await
            .map_err(|e| SylveError::SendRecvFailed(format!("restore pipeline: {e}")))?;

        let remote_exit = session.wait.await?;
        let recv_exit = recv.wait.await?;
        if !remote_exit.success() {
            if remote_exit.code == 255 {
                return Err(SylveError::RemoteUnreachable(remote_exit.stderr_tail));
            }
            return Err(SylveError::SendRecvFailed(remote_exit.stderr_tail));
        }
        if !recv_exit.success() {
            return Err(SylveError::SendRecvFailed(recv_exit.stderr_tail));
        }

        info!(snapshot, destination, "restore completed");
        Ok(RestoreReport {
            destination: destination.to_string(),
            preserved,
        })
    }
}
