// src/core/fsm/handlers/target.rs

use super::{decode, unknown_action};
use crate::core::command::action;
use crate::core::errors::SylveError;
use crate::core::fsm::CommandHandler;
use crate::core::models::BackupTarget;
use crate::core::store::Store;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct DeleteTarget {
    id: i64,
}

pub struct BackupTargetHandler;

#[async_trait]
impl CommandHandler for BackupTargetHandler {
    async fn apply(&self, store: &Store, act: &str, data: &Value) -> Result<(), SylveError> {
        match act {
            action::CREATE | action::UPDATE => {
                let mut t: BackupTarget = decode(data)?;
                if t.name.is_empty() {
                    return Err(SylveError::InvalidRequest("target name is required".into()));
                }
                if t.ssh_host.is_empty() || t.backup_root.is_empty() {
                    return Err(SylveError::InvalidRequest(
                        "sshHost and backupRoot are required".into(),
                    ));
                }
                if t.ssh_port == 0 {
                    t.ssh_port = 22;
                }
                store.upsert_target(&t).await
            }
            action::DELETE => {
                let p: DeleteTarget = decode(data)?;
                if store.count_jobs_for_target(p.id).await? > 0 {
                    return Err(SylveError::HandlerRejected(
                        "target_in_use_by_backup_jobs".into(),
                    ));
                }
                store.delete_target(p.id).await
            }
            other => Err(unknown_action("backup_target", other)),
        }
    }
}
