// src/core/fsm/handlers/lease.rs

use super::{decode, unknown_action};
use crate::core::command::action;
use crate::core::errors::SylveError;
use crate::core::fsm::CommandHandler;
use crate::core::models::ReplicationLease;
use crate::core::store::Store;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteLease {
    policy_id: i64,
}

pub struct ReplicationLeaseHandler;

#[async_trait]
impl CommandHandler for ReplicationLeaseHandler {
    async fn apply(&self, store: &Store, act: &str, data: &Value) -> Result<(), SylveError> {
        match act {
            action::UPSERT => {
                let lease: ReplicationLease = decode(data)?;
                if lease.policy_id <= 0 || lease.owner_node_id <= 0 {
                    return Err(SylveError::InvalidRequest(
                        "policyId and ownerNodeId are required".into(),
                    ));
                }
                if lease.expires_at.is_none() {
                    return Err(SylveError::InvalidRequest("expiresAt is required".into()));
                }
                store.upsert_lease(&lease).await
            }
            action::DELETE => {
                let p: DeleteLease = decode(data)?;
                store.delete_lease(p.policy_id).await
            }
            other => Err(unknown_action("replication_lease", other)),
        }
    }
}
