// src/core/jail.rs

//! Jail quiesce/resume around jail-mode backups.

use crate::core::errors::SylveError;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait JailController: Send + Sync {
    async fn is_running(&self, ctid: u32) -> Result<bool, SylveError>;
    async fn stop(&self, ctid: u32) -> Result<(), SylveError>;
    async fn start(&self, ctid: u32) -> Result<(), SylveError>;
}

/// The CTID is the final path component of a jail root dataset, e.g.
/// `zroot/sylve/jails/105` -> 105.
pub fn ctid_from_dataset(dataset: &str) -> Result<u32, SylveError> {
    dataset
        .rsplit('/')
        .next()
        .and_then(|tail| tail.parse::<u32>().ok())
        .ok_or_else(|| {
            SylveError::JailQuiesceFailed(format!("no ctid in dataset '{dataset}'"))
        })
}

/// Production controller driving the FreeBSD rc jail machinery.
pub struct RcJail;

#[async_trait]
impl JailController for RcJail {
    async fn is_running(&self, ctid: u32) -> Result<bool, SylveError> {
        let out = Command::new("jls")
            .args(["-j", &ctid.to_string()])
            .output()
            .await
            .map_err(|e| SylveError::Internal(format!("spawn jls: {e}")))?;
        Ok(out.status.success())
    }

    async fn stop(&self, ctid: u32) -> Result<(), SylveError> {
        debug!(ctid, "stopping jail");
        let out = Command::new("jail")
            .args(["-r", &ctid.to_string()])
            .output()
            .await
            .map_err(|e| SylveError::JailQuiesceFailed(format!("spawn jail -r: {e}")))?;
        if !out.status.success() {
            return Err(SylveError::JailQuiesceFailed(
                String::from_utf8_lossy(&out.stderr).into_owned(),
            ));
        }
        Ok(())
    }

    async fn start(&self, ctid: u32) -> Result<(), SylveError> {
        debug!(ctid, "starting jail");
        let out = Command::new("service")
            .args(["jail", "onestart", &ctid.to_string()])
            .output()
            .await
            .map_err(|e| SylveError::Internal(format!("spawn service jail: {e}")))?;
        if !out.status.success() {
            return Err(SylveError::Internal(
                String::from_utf8_lossy(&out.stderr).into_owned(),
            ));
        }
        Ok(())
    }
}
