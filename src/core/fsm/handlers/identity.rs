// src/core/fsm/handlers/identity.rs

use super::{decode, unknown_action};
use crate::core::command::action;
use crate::core::errors::SylveError;
use crate::core::fsm::CommandHandler;
use crate::core::models::ClusterSshIdentity;
use crate::core::store::Store;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteIdentity {
    node_uuid: String,
}

pub struct SshIdentityHandler;

#[async_trait]
impl CommandHandler for SshIdentityHandler {
    async fn apply(&self, store: &Store, act: &str, data: &Value) -> Result<(), SylveError> {
        match act {
            action::UPSERT => {
                let identity: ClusterSshIdentity = decode(data)?;
                if identity.node_uuid.is_empty() {
                    return Err(SylveError::InvalidRequest("nodeUuid is required".into()));
                }
                store.upsert_identity(&identity).await
            }
            action::DELETE => {
                let p: DeleteIdentity = decode(data)?;
                store.delete_identity(&p.node_uuid).await
            }
            other => Err(unknown_action("cluster_ssh_identity", other)),
        }
    }
}
