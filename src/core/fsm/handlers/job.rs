// src/core/fsm/handlers/job.rs

use super::{decode, unknown_action};
use crate::core::command::action;
use crate::core::errors::SylveError;
use crate::core::fsm::CommandHandler;
use crate::core::models::{BackupJob, BackupJobMode};
use crate::core::store::Store;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct DeleteJob {
    id: i64,
}

pub struct BackupJobHandler;

#[async_trait]
impl CommandHandler for BackupJobHandler {
    async fn apply(&self, store: &Store, act: &str, data: &Value) -> Result<(), SylveError> {
        match act {
            action::CREATE | action::UPDATE => {
                // Check the mode token before the full decode so `vm` (and
                // other unsupported modes) get their dedicated rejection.
                if let Some(mode) = data.get("mode").and_then(Value::as_str) {
                    BackupJobMode::parse(mode)?;
                }
                let job: BackupJob = decode(data)?;
                job.validate()?;
                if store.get_target(job.target_id).await?.is_none() {
                    return Err(SylveError::InvalidRequest(format!(
                        "unknown backup target {}",
                        job.target_id
                    )));
                }
                store.upsert_job(&job).await
            }
            action::DELETE => {
                let p: DeleteJob = decode(data)?;
                if store.count_running_events(p.id).await? > 0 {
                    return Err(SylveError::HandlerRejected("backup_job_running".into()));
                }
                store.delete_job_cascade(p.id).await
            }
            other => Err(unknown_action("backup_job", other)),
        }
    }
}
