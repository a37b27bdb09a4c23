// src/core/zfs.rs

//! The local ZFS capability: snapshot management plus send/recv process
//! streams. The executor composes these with the SSH transport; everything
//! effectful is behind the trait so tests can substitute an in-memory pool.

use crate::core::errors::SylveError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::process::Command;
use tracing::debug;

/// Exit state of a finished pipeline process.
#[derive(Debug, Clone, Default)]
pub struct ProcExit {
    pub code: i32,
    pub stderr_tail: String,
}

impl ProcExit {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// A running `zfs send`: a byte stream plus its completion future.
pub struct ZfsSend {
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub wait: BoxFuture<'static, Result<ProcExit, SylveError>>,
}

/// A running `zfs recv`: a byte sink plus its completion future.
pub struct ZfsRecv {
    pub stdin: Box<dyn AsyncWrite + Send + Unpin>,
    pub wait: BoxFuture<'static, Result<ProcExit, SylveError>>,
}

#[async_trait]
pub trait ZfsExecutor: Send + Sync {
    /// Creates `dataset@name`, recursively when asked.
    async fn snapshot(&self, dataset: &str, name: &str, recursive: bool)
    -> Result<(), SylveError>;

    /// Full snapshot names (`dataset@snap`) of the dataset itself, in
    /// creation order, oldest first.
    async fn list_snapshots(&self, dataset: &str) -> Result<Vec<String>, SylveError>;

    async fn destroy(&self, snapshot: &str, recursive: bool) -> Result<(), SylveError>;

    /// Atomic dataset rename, used for pre-restore preservation.
    async fn rename(&self, old: &str, new: &str) -> Result<(), SylveError>;

    async fn dataset_exists(&self, dataset: &str) -> Result<bool, SylveError>;

    /// Spawns `zfs send`, full or incremental from `base`.
    async fn open_send(
        &self,
        base: Option<&str>,
        snapshot: &str,
        recursive: bool,
    ) -> Result<ZfsSend, SylveError>;

    /// Spawns a local `zfs recv` into `destination` (restore path).
    async fn open_recv(&self, destination: &str, force: bool) -> Result<ZfsRecv, SylveError>;
}

/// `zfs send` argv, shared by the local executor and remote command lines.
pub fn send_args(base: Option<&str>, snapshot: &str, recursive: bool) -> Vec<String> {
    let mut args = vec!["send".to_string()];
    if recursive {
        args.push("-R".to_string());
    }
    if let Some(base) = base {
        args.push("-I".to_string());
        args.push(base.to_string());
    }
    args.push(snapshot.to_string());
    args
}

/// `zfs recv` argv.
pub fn recv_args(destination: &str, force: bool) -> Vec<String> {
    let mut args = vec!["recv".to_string()];
    if force {
        args.push("-F".to_string());
    }
    args.push(destination.to_string());
    args
}

/// `zfs list` argv for the snapshots of a single dataset, creation order.
pub fn list_snapshots_args(dataset: &str) -> Vec<String> {
    vec![
        "list".to_string(),
        "-H".to_string(),
        "-o".to_string(),
        "name".to_string(),
        "-s".to_string(),
        "creation".to_string(),
        "-t".to_string(),
        "snapshot".to_string(),
        "-d".to_string(),
        "1".to_string(),
        dataset.to_string(),
    ]
}

/// `zfs destroy` argv.
pub fn destroy_args(snapshot: &str, recursive: bool) -> Vec<String> {
    let mut args = vec!["destroy".to_string()];
    if recursive {
        args.push("-r".to_string());
    }
    args.push(snapshot.to_string());
    args
}

const STDERR_TAIL_MAX: usize = 8 * 1024;

/// Production implementation shelling out to `zfs(8)`.
pub struct ZfsCli;

impl ZfsCli {
    async fn run(&self, args: &[String]) -> Result<ProcExit, SylveError> {
        debug!(cmd = %format!("zfs {}", args.join(" ")), "running zfs");
        let out = Command::new("zfs")
            .args(args)
            .output()
            .await
            .map_err(|e| SylveError::Internal(format!("failed to spawn zfs: {e}")))?;
        Ok(ProcExit {
            code: out.status.code().unwrap_or(-1),
            stderr_tail: tail_utf8(&out.stderr, STDERR_TAIL_MAX),
        })
    }
}

#[async_trait]
impl ZfsExecutor for ZfsCli {
    async fn snapshot(
        &self,
        dataset: &str,
        name: &str,
        recursive: bool,
    ) -> Result<(), SylveError> {
        let mut args = vec!["snapshot".to_string()];
        if recursive {
            args.push("-r".to_string());
        }
        args.push(format!("{dataset}@{name}"));
        let exit = self.run(&args).await?;
        if !exit.success() {
            return Err(SylveError::SnapshotCreateFailed(exit.stderr_tail));
        }
        Ok(())
    }

    async fn list_snapshots(&self, dataset: &str) -> Result<Vec<String>, SylveError> {
        let args = list_snapshots_args(dataset);
        let out = Command::new("zfs")
            .args(&args)
            .output()
            .await
            .map_err(|e| SylveError::Internal(format!("failed to spawn zfs: {e}")))?;
        if !out.status.success() {
            // A missing dataset has no snapshots.
            return Ok(Vec::new());
        }
        Ok(parse_snapshot_list(&String::from_utf8_lossy(&out.stdout)))
    }

    async fn destroy(&self, snapshot: &str, recursive: bool) -> Result<(), SylveError> {
        let exit = self.run(&destroy_args(snapshot, recursive)).await?;
        if !exit.success() {
            return Err(SylveError::Internal(format!(
                "zfs destroy {snapshot} failed: {}",
                exit.stderr_tail
            )));
        }
        Ok(())
    }

    async fn rename(&self, old: &str, new: &str) -> Result<(), SylveError> {
        let exit = self
            .run(&["rename".to_string(), old.to_string(), new.to_string()])
            .await?;
        if !exit.success() {
            return Err(SylveError::DatasetConflict(format!(
                "rename {old} -> {new} failed: {}",
                exit.stderr_tail
            )));
        }
        Ok(())
    }

    async fn dataset_exists(&self, dataset: &str) -> Result<bool, SylveError> {
        let out = Command::new("zfs")
            .args(["list", "-H", "-o", "name", dataset])
            .output()
            .await
            .map_err(|e| SylveError::Internal(format!("failed to spawn zfs: {e}")))?;
        Ok(out.status.success())
    }

    async fn open_send(
        &self,
        base: Option<&str>,
        snapshot: &str,
        recursive: bool,
    ) -> Result<ZfsSend, SylveError> {
        let args = send_args(base, snapshot, recursive);
        debug!(cmd = %format!("zfs {}", args.join(" ")), "opening zfs send");
        let mut child = Command::new("zfs")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SylveError::SnapshotCreateFailed(format!("spawn zfs send: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SylveError::Internal("zfs send stdout unavailable".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SylveError::Internal("zfs send stderr unavailable".into()))?;

        let wait = Box::pin(async move {
            let mut err_buf = Vec::new();
            let _ = stderr.read_to_end(&mut err_buf).await;
            let status = child
                .wait()
                .await
                .map_err(|e| SylveError::Internal(format!("wait zfs send: {e}")))?;
            Ok(ProcExit {
                code: status.code().unwrap_or(-1),
                stderr_tail: tail_utf8(&err_buf, STDERR_TAIL_MAX),
            })
        });

        Ok(ZfsSend {
            stdout: Box::new(stdout),
            wait,
        })
    }

    async fn open_recv(&self, destination: &str, force: bool) -> Result<ZfsRecv, SylveError> {
        let args = recv_args(destination, force);
        debug!(cmd = %format!("zfs {}", args.join(" ")), "opening zfs recv");
        let mut child = Command::new("zfs")
            .args(&args)
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SylveError::Internal(format!("spawn zfs recv: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SylveError::Internal("zfs recv stdin unavailable".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| SylveError::Internal("zfs recv stderr unavailable".into()))?;

        let wait = Box::pin(async move {
            let mut err_buf = Vec::new();
            let _ = stderr.read_to_end(&mut err_buf).await;
            let status = child
                .wait()
                .await
                .map_err(|e| SylveError::Internal(format!("wait zfs recv: {e}")))?;
            Ok(ProcExit {
                code: status.code().unwrap_or(-1),
                stderr_tail: tail_utf8(&err_buf, STDERR_TAIL_MAX),
            })
        });

        Ok(ZfsRecv {
            stdin: Box::new(stdin),
            wait,
        })
    }
}

/// One snapshot name per line, blank lines dropped.
pub fn parse_snapshot_list(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// UTF-8 lossy tail of a byte buffer, bounded to `max` bytes.
pub fn tail_utf8(bytes: &[u8], max: usize) -> String {
    let start = bytes.len().saturating_sub(max);
    String::from_utf8_lossy(&bytes[start..]).into_owned()
}
