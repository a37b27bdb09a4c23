// src/core/store/snapshot.rs

//! Whole-store capture and restore for FSM snapshotting.
//!
//! Capture reads every replicated table in a stable order so identical
//! command histories produce byte-identical snapshots on every node.
//! Restore deletes in FK-safe order and re-inserts with original ids.

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::{
    BackupEvent, BackupJob, BackupTarget, ClusterOptions, ClusterSshIdentity, Note,
    ReplicationEvent, ReplicationLease, ReplicationPolicy,
};
use serde::{Deserialize, Serialize};

/// The canonical snapshot shape: every replicated table, policies carrying
/// their embedded target lists.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct FsmSnapshot {
    pub notes: Vec<Note>,
    pub options: Option<ClusterOptions>,
    pub backup_targets: Vec<BackupTarget>,
    pub backup_jobs: Vec<BackupJob>,
    pub backup_events: Vec<BackupEvent>,
    pub replication_policies: Vec<ReplicationPolicy>,
    pub replication_leases: Vec<ReplicationLease>,
    pub replication_events: Vec<ReplicationEvent>,
    pub ssh_identities: Vec<ClusterSshIdentity>,
}

impl FsmSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, SylveError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SylveError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl Store {
    pub async fn capture_snapshot(&self) -> Result<FsmSnapshot, SylveError> {
        Ok(FsmSnapshot {
            notes: self.list_notes().await?,
            options: self.get_options().await?,
            backup_targets: self.list_targets().await?,
            backup_jobs: self.list_jobs().await?,
            backup_events: self.list_all_events_ordered().await?,
            replication_policies: self.list_policies().await?,
            replication_leases: self.list_leases().await?,
            replication_events: self.list_all_replication_events_ordered().await?,
            ssh_identities: self.list_identities().await?,
        })
    }

    /// Replaces the entire store contents with the snapshot, atomically.
    pub async fn restore_snapshot(&self, snap: &FsmSnapshot) -> Result<(), SylveError> {
        let mut tx = self.pool().begin().await?;

        // Delete order: children before parents.
        for table in [
            "backup_events",
            "replication_events",
            "replication_leases",
            "replication_policy_targets",
            "replication_policies",
            "cluster_ssh_identities",
            "backup_jobs",
            "backup_targets",
            "notes",
            "options",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }

        for n in &snap.notes {
            sqlx::query(
                "INSERT INTO notes (id, title, content, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(n.id)
            .bind(&n.title)
            .bind(&n.content)
            .bind(n.created_at)
            .bind(n.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        if let Some(o) = &snap.options {
            sqlx::query("INSERT INTO options (id, cluster_name, updated_at) VALUES (1, ?, ?)")
                .bind(&o.cluster_name)
                .bind(o.updated_at)
                .execute(&mut *tx)
                .await?;
        }

        for t in &snap.backup_targets {
            sqlx::query(
                "INSERT INTO backup_targets
                    (id, name, ssh_host, ssh_port, ssh_key_path, backup_root,
                     description, enabled, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(t.id)
            .bind(&t.name)
            .bind(&t.ssh_host)
            .bind(t.ssh_port)
            .bind(&t.ssh_key_path)
            .bind(&t.backup_root)
            .bind(&t.description)
            .bind(t.enabled)
            .bind(t.created_at)
            .bind(t.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        for j in &snap.backup_jobs {
            sqlx::query(
                "INSERT INTO backup_jobs
                    (id, name, target_id, runner_node_id, policy_id, mode,
                     source_dataset, jail_root_dataset, friendly_src, dest_suffix,
                     prune_keep_last, prune_target, stop_before_backup,
                     allow_full_fallback, cron_expr, enabled, last_run_at,
                     next_run_at, last_status, last_error)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(j.id)
            .bind(&j.name)
            .bind(j.target_id)
            .bind(j.runner_node_id)
            .bind(j.policy_id)
            .bind(j.mode)
            .bind(&j.source_dataset)
            .bind(&j.jail_root_dataset)
            .bind(&j.friendly_src)
            .bind(&j.dest_suffix)
            .bind(j.prune_keep_last)
            .bind(j.prune_target)
            .bind(j.stop_before_backup)
            .bind(j.allow_full_fallback)
            .bind(&j.cron_expr)
            .bind(j.enabled)
            .bind(j.last_run_at)
            .bind(j.next_run_at)
            .bind(&j.last_status)
            .bind(&j.last_error)
            .execute(&mut *tx)
            .await?;
        }

        for i in &snap.ssh_identities {
            sqlx::query(
                "INSERT INTO cluster_ssh_identities
                    (node_uuid, node_name, public_key, private_key_path, updated_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&i.node_uuid)
            .bind(&i.node_name)
            .bind(&i.public_key)
            .bind(&i.private_key_path)
            .bind(i.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        for p in &snap.replication_policies {
            sqlx::query(
                "INSERT INTO replication_policies
                    (id, name, guest_type, guest_id, source_node_id, active_node_id,
                     source_mode, failback_mode, cron_expr, enabled)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(p.id)
            .bind(&p.name)
            .bind(p.guest_type)
            .bind(p.guest_id)
            .bind(p.source_node_id)
            .bind(p.active_node_id)
            .bind(p.source_mode)
            .bind(p.failback_mode)
            .bind(&p.cron_expr)
            .bind(p.enabled)
            .execute(&mut *tx)
            .await?;
            for t in &p.targets {
                sqlx::query(
                    "INSERT INTO replication_policy_targets (policy_id, node_id, weight)
                     VALUES (?, ?, ?)",
                )
                .bind(p.id)
                .bind(t.node_id)
                .bind(t.weight)
                .execute(&mut *tx)
                .await?;
            }
        }

        for l in &snap.replication_leases {
            sqlx::query(
                "INSERT INTO replication_leases
                    (policy_id, guest_type, guest_id, owner_node_id, expires_at,
                     version, last_reason, last_actor)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(l.policy_id)
            .bind(l.guest_type)
            .bind(l.guest_id)
            .bind(l.owner_node_id)
            .bind(l.expires_at)
            .bind(l.version)
            .bind(&l.last_reason)
            .bind(&l.last_actor)
            .execute(&mut *tx)
            .await?;
        }

        for e in &snap.replication_events {
            sqlx::query(
                "INSERT INTO replication_events
                    (id, policy_id, job_id, event_type, status, message,
                     created_at, completed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(e.id)
            .bind(e.policy_id)
            .bind(e.job_id)
            .bind(&e.event_type)
            .bind(&e.status)
            .bind(&e.message)
            .bind(e.created_at)
            .bind(e.completed_at)
            .execute(&mut *tx)
            .await?;
        }

        for e in &snap.backup_events {
            sqlx::query(
                "INSERT INTO backup_events
                    (id, job_id, source_dataset, target_endpoint, mode, status,
                     error, output, started_at, completed_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(e.id)
            .bind(e.job_id)
            .bind(&e.source_dataset)
            .bind(&e.target_endpoint)
            .bind(e.mode)
            .bind(e.status)
            .bind(&e.error)
            .bind(&e.output)
            .bind(e.started_at)
            .bind(e.completed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_all_events_ordered(&self) -> Result<Vec<BackupEvent>, SylveError> {
        let rows =
            sqlx::query_as::<_, BackupEvent>("SELECT * FROM backup_events ORDER BY id")
                .fetch_all(self.pool())
                .await?;
        Ok(rows)
    }

    async fn list_all_replication_events_ordered(
        &self,
    ) -> Result<Vec<ReplicationEvent>, SylveError> {
        let rows = sqlx::query_as::<_, ReplicationEvent>(
            "SELECT * FROM replication_events ORDER BY id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
