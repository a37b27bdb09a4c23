// src/core/fsm/handlers/policy.rs

use super::{decode, unknown_action};
use crate::core::command::action;
use crate::core::errors::SylveError;
use crate::core::fsm::CommandHandler;
use crate::core::models::ReplicationPolicy;
use crate::core::store::Store;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct DeletePolicy {
    id: i64,
}

pub struct ReplicationPolicyHandler;

#[async_trait]
impl CommandHandler for ReplicationPolicyHandler {
    async fn apply(&self, store: &Store, act: &str, data: &Value) -> Result<(), SylveError> {
        match act {
            action::CREATE | action::UPDATE => {
                let policy: ReplicationPolicy = decode(data)?;
                if policy.name.is_empty() {
                    return Err(SylveError::InvalidRequest("policy name is required".into()));
                }
                crate::core::scheduler::validate_cron(&policy.cron_expr)?;
                store.upsert_policy_with_targets(&policy).await
            }
            action::DELETE => {
                let p: DeletePolicy = decode(data)?;
                store.delete_policy_cascade(p.id).await
            }
            other => Err(unknown_action("replication_policy", other)),
        }
    }
}
