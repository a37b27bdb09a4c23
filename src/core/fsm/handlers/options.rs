// src/core/fsm/handlers/options.rs

use super::{decode, unknown_action};
use crate::core::command::action;
use crate::core::errors::SylveError;
use crate::core::fsm::CommandHandler;
use crate::core::models::ClusterOptions;
use crate::core::store::Store;
use async_trait::async_trait;
use serde_json::Value;

pub struct OptionsHandler;

#[async_trait]
impl CommandHandler for OptionsHandler {
    async fn apply(&self, store: &Store, act: &str, data: &Value) -> Result<(), SylveError> {
        match act {
            action::SET => {
                let opts: ClusterOptions = decode(data)?;
                store.set_options(&opts).await
            }
            other => Err(unknown_action("options", other)),
        }
    }
}
