// src/core/ssh.rs

//! The SSH transport capability: one-shot remote commands and long-lived
//! piped sessions against backup targets.

use crate::core::errors::SylveError;
use crate::core::models::BackupTarget;
use crate::core::zfs::{ProcExit, tail_utf8};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::Command;
use tracing::debug;

/// Where and how to connect. Derived from a `BackupTarget` row.
#[derive(Debug, Clone, PartialEq)]
pub struct SshEndpoint {
    /// `user@host` form.
    pub host: String,
    pub port: u16,
    pub key_path: Option<String>,
}

impl SshEndpoint {
    pub fn from_target(t: &BackupTarget) -> Self {
        Self {
            host: t.ssh_host.clone(),
            port: if t.ssh_port == 0 { 22 } else { t.ssh_port },
            key_path: t.ssh_key_path.clone(),
        }
    }
}

/// Captured result of a one-shot remote command.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// A live remote command with both pipes attached, used for send/recv
/// streaming in either direction.
pub struct SshSession {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub wait: BoxFuture<'static, Result<ProcExit, SylveError>>,
}

#[async_trait]
pub trait SshTransport: Send + Sync {
    /// Opens a session running `command` on the remote host.
    async fn open_session(
        &self,
        endpoint: &SshEndpoint,
        command: &str,
    ) -> Result<SshSession, SylveError>;

    /// Runs `command` remotely and waits for it.
    async fn exec(&self, endpoint: &SshEndpoint, command: &str)
    -> Result<ExecOutput, SylveError>;
}

const STDERR_TAIL_MAX: usize = 8 * 1024;

/// Production transport shelling out to `ssh(1)` in batch mode.
pub struct OpenSsh {
    pub connect_timeout_secs: u32,
}

impl Default for OpenSsh {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
        }
    }
}

impl OpenSsh {
    /// Non-interactive argument set; host key acceptance is first-use.
    fn build_args(&self, endpoint: &SshEndpoint, command: &str) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            endpoint.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(key) = &endpoint.key_path {
            args.push("-i".to_string());
            args.push(key.clone());
        }
        args.push(endpoint.host.clone());
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl SshTransport for OpenSsh {
    async fn open_session(
        &self,
        endpoint: &SshEndpoint,
        command: &str,
    ) -> Result<SshSession, SylveError> {
        let args = self.build_args(endpoint, command);
        debug!(host = %endpoint.host, cmd = %command, "opening ssh session");
        let mut child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SylveError::RemoteUnreachable(format!("spawn ssh: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SylveError::Internal("ssh stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SylveError::Internal("ssh stdout unavailable".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SylveError::Internal("ssh stderr unavailable".into()))?;

        let wait = Box::pin(async move {
            let mut err_buf = Vec::new();
            let _ = stderr.read_to_end(&mut err_buf).await;
            let status = child
                .wait()
                .await
                .map_err(|e| SylveError::Internal(format!("wait ssh: {e}")))?;
            Ok(ProcExit {
                code: status.code().unwrap_or(-1),
                stderr_tail: tail_utf8(&err_buf, STDERR_TAIL_MAX),
            })
        });

        Ok(SshSession {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            wait,
        })
    }

    async fn exec(
        &self,
        endpoint: &SshEndpoint,
        command: &str,
    ) -> Result<ExecOutput, SylveError> {
        let args = self.build_args(endpoint, command);
        debug!(host = %endpoint.host, cmd = %command, "ssh exec");
        let out = Command::new("ssh")
            .args(&args)
            .output()
            .await
            .map_err(|e| SylveError::RemoteUnreachable(format!("spawn ssh: {e}")))?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: tail_utf8(&out.stderr, STDERR_TAIL_MAX),
            code: out.status.code().unwrap_or(-1),
        })
    }
}
