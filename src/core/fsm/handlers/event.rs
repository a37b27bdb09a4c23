// src/core/fsm/handlers/event.rs

use super::{decode, unknown_action};
use crate::core::command::action;
use crate::core::errors::SylveError;
use crate::core::fsm::CommandHandler;
use crate::core::models::{BackupEvent, BackupEventStatus};
use crate::core::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// Terminal update addressed at the unique running event of a job.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteEvent {
    job_id: i64,
    status: BackupEventStatus,
    #[serde(default)]
    error: String,
    #[serde(default)]
    output: String,
    completed_at: DateTime<Utc>,
}

pub struct BackupEventHandler;

#[async_trait]
impl CommandHandler for BackupEventHandler {
    async fn apply(&self, store: &Store, act: &str, data: &Value) -> Result<(), SylveError> {
        match act {
            action::CREATE => {
                let event: BackupEvent = decode(data)?;
                // At most one running event per job, enforced here so the
                // proposer sees the rejection synchronously.
                if let Some(job_id) = event.job_id {
                    if store.count_running_events(job_id).await? > 0 {
                        return Err(SylveError::HandlerRejected("backup_job_running".into()));
                    }
                }
                store.insert_event(&event).await?;
                Ok(())
            }
            action::UPDATE => {
                let p: CompleteEvent = decode(data)?;
                if p.status == BackupEventStatus::Running {
                    return Err(SylveError::InvalidRequest(
                        "event update must carry a terminal status".into(),
                    ));
                }
                store
                    .complete_running_event(p.job_id, p.status, &p.error, &p.output, p.completed_at)
                    .await
            }
            other => Err(unknown_action("backup_event", other)),
        }
    }
}
