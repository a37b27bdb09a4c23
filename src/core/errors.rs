// src/core/errors.rs

//! Defines the primary error type for the entire engine.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the engine.
/// Display strings double as the stable error kinds recorded in the event
/// ledger and returned to proposers, so they must stay machine-matchable.
#[derive(Error, Debug, Clone)]
pub enum SylveError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Database Error: {0}")]
    Database(String),

    #[error("invalid_request: {0}")]
    InvalidRequest(String),

    #[error("invalid_cron_expression: {0}")]
    InvalidCron(String),

    #[error("invalid_backup_job_mode: {0}")]
    InvalidBackupJobMode(String),

    #[error("not_leader")]
    NotLeader { leader: Option<String> },

    #[error("no handler for {0}")]
    NoHandler(String),

    /// A semantic rejection from an FSM handler, e.g.
    /// `target_in_use_by_backup_jobs` or `backup_job_running`. The inner
    /// string is the stable rejection code.
    #[error("{0}")]
    HandlerRejected(String),

    #[error("lease_held_by={owner_node_id} until {expires_at}")]
    LeaseHeld {
        owner_node_id: u64,
        expires_at: DateTime<Utc>,
    },

    #[error("snapshot_create_failed: {0}")]
    SnapshotCreateFailed(String),

    #[error("transport_failed: remote_unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("transport_failed: send_recv_failed: {0}")]
    SendRecvFailed(String),

    #[error("dataset_conflict: {0}")]
    DatasetConflict(String),

    #[error("jail_quiesce_failed: {0}")]
    JailQuiesceFailed(String),

    #[error("base_missing_on_target: {0}")]
    BaseMissingOnTarget(String),

    #[error("canceled")]
    Canceled,

    #[error("proposal timed out after {0}ms")]
    Timeout(u64),

    #[error("Raft Error: {0}")]
    Raft(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

impl SylveError {
    /// True when the failure came from the wire or the remote side, meaning a
    /// later scheduled run may succeed without operator intervention.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SylveError::RemoteUnreachable(_) | SylveError::SendRecvFailed(_)
        )
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for SylveError {
    fn from(e: std::io::Error) -> Self {
        SylveError::Io(Arc::new(e))
    }
}

impl From<sqlx::Error> for SylveError {
    fn from(e: sqlx::Error) -> Self {
        SylveError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for SylveError {
    fn from(e: serde_json::Error) -> Self {
        SylveError::InvalidRequest(format!("malformed JSON payload: {e}"))
    }
}

impl From<reqwest::Error> for SylveError {
    fn from(e: reqwest::Error) -> Self {
        SylveError::Raft(format!("leader forward failed: {e}"))
    }
}

impl From<cron::error::Error> for SylveError {
    fn from(e: cron::error::Error) -> Self {
        SylveError::InvalidCron(e.to_string())
    }
}
