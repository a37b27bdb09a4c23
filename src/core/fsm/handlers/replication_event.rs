// src/core/fsm/handlers/replication_event.rs

use super::{decode, unknown_action};
use crate::core::command::action;
use crate::core::errors::SylveError;
use crate::core::fsm::CommandHandler;
use crate::core::models::ReplicationEvent;
use crate::core::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateReplicationEvent {
    id: i64,
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
}

pub struct ReplicationEventHandler;

#[async_trait]
impl CommandHandler for ReplicationEventHandler {
    async fn apply(&self, store: &Store, act: &str, data: &Value) -> Result<(), SylveError> {
        match act {
            action::CREATE => {
                let event: ReplicationEvent = decode(data)?;
                if event.event_type.is_empty() {
                    return Err(SylveError::InvalidRequest("eventType is required".into()));
                }
                store.insert_replication_event(&event).await?;
                Ok(())
            }
            action::UPDATE => {
                let p: UpdateReplicationEvent = decode(data)?;
                store
                    .update_replication_event(p.id, &p.status, &p.message, p.completed_at)
                    .await
            }
            other => Err(unknown_action("replication_event", other)),
        }
    }
}
