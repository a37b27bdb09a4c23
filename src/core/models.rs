// src/core/models.rs

//! The replicated data model: every entity that flows through the FSM.
//!
//! Wire payloads use `lowerCamelCase` field names; the store columns use
//! `snake_case`. Both mappings live here so handlers and repositories share
//! one set of structs.

use crate::core::errors::SylveError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a backup job resolves its source dataset.
#[derive(
    Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BackupJobMode {
    #[default]
    Dataset,
    Jail,
}

impl BackupJobMode {
    /// Parses a wire-level mode string. `vm` is a recognised-but-unsupported
    /// mode and is rejected explicitly rather than as an unknown token.
    pub fn parse(s: &str) -> Result<Self, SylveError> {
        match s {
            "dataset" => Ok(BackupJobMode::Dataset),
            "jail" => Ok(BackupJobMode::Jail),
            other => Err(SylveError::InvalidBackupJobMode(other.to_string())),
        }
    }
}

/// Terminal and in-flight states of a single backup execution.
#[derive(
    Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum BackupEventStatus {
    #[default]
    Running,
    Success,
    Failed,
}

#[derive(
    Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum GuestType {
    Vm,
    #[default]
    Jail,
}

/// Whether a policy replicates from whichever node is active, or always from
/// a pinned primary.
#[derive(
    Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SourceMode {
    #[default]
    FollowActive,
    PinnedPrimary,
}

#[derive(
    Serialize, Deserialize, sqlx::Type, Debug, Clone, Copy, PartialEq, Eq, Hash, Default,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum FailbackMode {
    #[default]
    Manual,
    Auto,
}

/// A remote ZFS-capable host that receives replicated datasets.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupTarget {
    pub id: i64,
    pub name: String,
    /// `user@host` form, as consumed by the SSH transport.
    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_key_path: Option<String>,
    /// Pool/dataset prefix every job suffix is appended to.
    pub backup_root: String,
    pub description: String,
    pub enabled: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BackupTarget {
    /// The `zfs recv` destination, in `sshHost:backupRoot[/suffix]` form.
    pub fn endpoint(&self, suffix: &str) -> String {
        format!("{}:{}", self.ssh_host, self.dataset_path(suffix))
    }

    /// The remote dataset path for a job suffix, without the host part.
    pub fn dataset_path(&self, suffix: &str) -> String {
        if suffix.is_empty() {
            self.backup_root.clone()
        } else {
            format!("{}/{}", self.backup_root, suffix)
        }
    }
}

/// One scheduled replication of a dataset (or jail rootfs) to a target.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupJob {
    pub id: i64,
    pub name: String,
    pub target_id: i64,
    /// The node that physically executes this job.
    pub runner_node_id: i64,
    /// Optional owning replication policy; when set the scheduler must hold
    /// the policy lease before dispatching.
    pub policy_id: Option<i64>,
    pub mode: BackupJobMode,
    pub source_dataset: String,
    pub jail_root_dataset: String,
    /// Display-only source label.
    pub friendly_src: String,
    /// Appended to the target's `backup_root`.
    pub dest_suffix: String,
    pub prune_keep_last: i64,
    pub prune_target: bool,
    pub stop_before_backup: bool,
    pub allow_full_fallback: bool,
    pub cron_expr: String,
    pub enabled: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_status: String,
    pub last_error: String,
}

impl BackupJob {
    /// The dataset this job snapshots and sends.
    pub fn source(&self) -> &str {
        match self.mode {
            BackupJobMode::Dataset => &self.source_dataset,
            BackupJobMode::Jail => &self.jail_root_dataset,
        }
    }

    pub fn validate(&self) -> Result<(), SylveError> {
        match self.mode {
            BackupJobMode::Dataset if self.source_dataset.is_empty() => {
                return Err(SylveError::InvalidRequest(
                    "sourceDataset is required for dataset mode".into(),
                ));
            }
            BackupJobMode::Jail if self.jail_root_dataset.is_empty() => {
                return Err(SylveError::InvalidRequest(
                    "jailRootDataset is required for jail mode".into(),
                ));
            }
            _ => {}
        }
        crate::core::scheduler::validate_cron(&self.cron_expr)?;
        Ok(())
    }
}

/// One execution of a backup job, appended to the event ledger.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupEvent {
    pub id: i64,
    pub job_id: Option<i64>,
    pub source_dataset: String,
    pub target_endpoint: String,
    pub mode: BackupJobMode,
    pub status: BackupEventStatus,
    pub error: String,
    pub output: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Higher-level HA replication of a VM/jail between cluster members.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicationPolicy {
    pub id: i64,
    pub name: String,
    pub guest_type: GuestType,
    pub guest_id: i64,
    pub source_node_id: i64,
    pub active_node_id: i64,
    pub source_mode: SourceMode,
    pub failback_mode: FailbackMode,
    pub cron_expr: String,
    pub enabled: bool,
    /// Weighted node list; replaced wholesale on every policy upsert.
    #[sqlx(skip)]
    #[serde(default)]
    pub targets: Vec<ReplicationPolicyTarget>,
}

/// A weighted member of a policy's target node list.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicationPolicyTarget {
    pub policy_id: i64,
    pub node_id: i64,
    pub weight: i64,
}

/// Single-writer ownership token for a policy. At most one row per policy;
/// valid iff `now < expires_at`; `version` is strictly increasing.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicationLease {
    pub policy_id: i64,
    pub guest_type: GuestType,
    pub guest_id: i64,
    pub owner_node_id: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub last_reason: String,
    pub last_actor: String,
}

impl ReplicationLease {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|e| now < e).unwrap_or(false)
    }
}

/// Policy-level ledger entries, including out-of-band restores.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicationEvent {
    pub id: i64,
    pub policy_id: Option<i64>,
    pub job_id: Option<i64>,
    pub event_type: String,
    pub status: String,
    pub message: String,
    pub created_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-node SSH identity used for pair-wise replication, keyed by node UUID.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterSshIdentity {
    pub node_uuid: String,
    pub node_name: String,
    pub public_key: String,
    pub private_key_path: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A free-form cluster-wide note.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// The singleton cluster options row. Its primary key is fixed at 1.
#[derive(Serialize, Deserialize, sqlx::FromRow, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterOptions {
    pub id: i64,
    pub cluster_name: String,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            id: 1,
            cluster_name: String::new(),
            updated_at: None,
        }
    }
}
