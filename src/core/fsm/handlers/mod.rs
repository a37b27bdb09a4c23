// src/core/fsm/handlers/mod.rs

//! Per-entity command handlers. Each one decodes its payload, validates, and
//! mutates the store. Rejections carry stable codes (`backup_job_running`,
//! `target_in_use_by_backup_jobs`, ...) that flow back to the proposer.

pub mod event;
pub mod identity;
pub mod job;
pub mod lease;
pub mod note;
pub mod options;
pub mod policy;
pub mod replication_event;
pub mod target;

use crate::core::errors::SylveError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Decodes a handler payload, mapping failures to `invalid_request`.
pub(crate) fn decode<T: DeserializeOwned>(data: &Value) -> Result<T, SylveError> {
    serde_json::from_value(data.clone())
        .map_err(|e| SylveError::InvalidRequest(format!("bad payload: {e}")))
}

pub(crate) fn unknown_action(kind: &str, action: &str) -> SylveError {
    SylveError::InvalidRequest(format!("unknown action '{action}' for {kind}"))
}
