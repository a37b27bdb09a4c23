// src/core/command.rs

//! The command envelope replicated through the Raft log, and the registry of
//! well-known command types and actions.
//!
//! Handlers must be strictly deterministic, so anything non-deterministic
//! (timestamps, generated names) is embedded in the payload by the proposer
//! before the envelope is submitted.

use crate::core::errors::SylveError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known command types, one per replicated entity.
pub mod kind {
    pub const NOTE: &str = "note";
    pub const OPTIONS: &str = "options";
    pub const BACKUP_TARGET: &str = "backup_target";
    pub const BACKUP_JOB: &str = "backup_job";
    pub const BACKUP_EVENT: &str = "backup_event";
    pub const REPLICATION_POLICY: &str = "replication_policy";
    pub const REPLICATION_LEASE: &str = "replication_lease";
    pub const REPLICATION_EVENT: &str = "replication_event";
    pub const CLUSTER_SSH_IDENTITY: &str = "cluster_ssh_identity";
}

/// Well-known actions. Not every type supports every action; unsupported
/// combinations are rejected by the handler.
pub mod action {
    pub const CREATE: &str = "create";
    pub const UPDATE: &str = "update";
    pub const DELETE: &str = "delete";
    pub const BULK_DELETE: &str = "bulk_delete";
    pub const UPSERT: &str = "upsert";
    pub const SET: &str = "set";
}

/// The unit of replication: `(type, action, data)` where `data` is the
/// JSON-encoded entity payload.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CommandEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub action: String,
    pub data: Value,
}

impl CommandEnvelope {
    pub fn new<T: Serialize>(kind: &str, action: &str, payload: &T) -> Result<Self, SylveError> {
        Ok(Self {
            kind: kind.to_string(),
            action: action.to_string(),
            data: serde_json::to_value(payload)?,
        })
    }

    /// Decodes a wire-level envelope, failing fast on malformed JSON.
    pub fn decode(bytes: &[u8]) -> Result<Self, SylveError> {
        serde_json::from_slice(bytes).map_err(|e| {
            SylveError::InvalidRequest(format!("malformed command envelope: {e}"))
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, SylveError> {
        Ok(serde_json::to_vec(self)?)
    }
}
