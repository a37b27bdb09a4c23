// tests/integration/fixtures.rs

//! Shared fixtures: an in-memory ZFS pool, a fake remote target, a fake jail
//! controller, and a fully wired single-node engine over a scratch database.
//!
//! The fake send/recv pipeline ships a JSON manifest of snapshot names
//! through the real byte-stream plumbing, so the executor's copy loop and
//! wait ordering are exercised end to end.

use chrono::Utc;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use sylved::config::Config;
use sylved::core::command::{action, kind};
use sylved::core::errors::SylveError;
use sylved::core::jail::JailController;
use sylved::core::models::{BackupEvent, BackupEventStatus, BackupJob, BackupJobMode, BackupTarget};
use sylved::core::ssh::{ExecOutput, SshEndpoint, SshSession, SshTransport};
use sylved::core::state::NodeState;
use sylved::core::zfs::{ProcExit, ZfsExecutor, ZfsRecv, ZfsSend};
use async_trait::async_trait;
use tokio::io::AsyncReadExt;

/// Payload the fake pipeline ships instead of a real ZFS stream.
#[derive(Serialize, Deserialize)]
struct Manifest {
    snapshots: Vec<String>,
}

fn dataset_of(full_snapshot: &str) -> &str {
    full_snapshot.split_once('@').map(|(d, _)| d).unwrap_or(full_snapshot)
}

fn short_of(full_snapshot: &str) -> &str {
    full_snapshot.split_once('@').map(|(_, s)| s).unwrap_or(full_snapshot)
}

// --- Fake local ZFS pool ---

#[derive(Default)]
pub struct FakeZfs {
    /// dataset -> full snapshot names, creation order. Shared with the
    /// 'static wait futures of the fake recv pipeline.
    pub datasets: Arc<Mutex<BTreeMap<String, Vec<String>>>>,
    pub fail_snapshot: AtomicBool,
    pub fail_send: AtomicBool,
}

impl FakeZfs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_dataset(&self, dataset: &str, shorts: &[&str]) {
        let full: Vec<String> = shorts.iter().map(|s| format!("{dataset}@{s}")).collect();
        self.datasets.lock().insert(dataset.to_string(), full);
    }

    pub fn snapshots_of(&self, dataset: &str) -> Vec<String> {
        self.datasets.lock().get(dataset).cloned().unwrap_or_default()
    }

    pub fn has_dataset(&self, dataset: &str) -> bool {
        self.datasets.lock().contains_key(dataset)
    }
}

#[async_trait]
impl ZfsExecutor for FakeZfs {
    async fn snapshot(&self, dataset: &str, name: &str, _recursive: bool) -> Result<(), SylveError> {
        if self.fail_snapshot.load(Ordering::Relaxed) {
            return Err(SylveError::SnapshotCreateFailed("injected failure".into()));
        }
        let mut datasets = self.datasets.lock();
        let entry = datasets.entry(dataset.to_string()).or_default();
        let full = format!("{dataset}@{name}");
        if entry.contains(&full) {
            return Err(SylveError::SnapshotCreateFailed(format!("{full} already exists")));
        }
        entry.push(full);
        Ok(())
    }

    async fn list_snapshots(&self, dataset: &str) -> Result<Vec<String>, SylveError> {
        Ok(self.snapshots_of(dataset))
    }

    async fn destroy(&self, snapshot: &str, _recursive: bool) -> Result<(), SylveError> {
        let mut datasets = self.datasets.lock();
        let entry = datasets
            .get_mut(dataset_of(snapshot))
            .ok_or_else(|| SylveError::Internal(format!("no dataset for {snapshot}")))?;
        let before = entry.len();
        entry.retain(|s| s != snapshot);
        if entry.len() == before {
            return Err(SylveError::Internal(format!("{snapshot} does not exist")));
        }
        Ok(())
    }

    async fn rename(&self, old: &str, new: &str) -> Result<(), SylveError> {
        let mut datasets = self.datasets.lock();
        let snaps = datasets
            .remove(old)
            .ok_or_else(|| SylveError::DatasetConflict(format!("{old} does not exist")))?;
        let renamed = snaps
            .into_iter()
            .map(|s| format!("{new}@{}", short_of(&s)))
            .collect();
        datasets.insert(new.to_string(), renamed);
        Ok(())
    }

    async fn dataset_exists(&self, dataset: &str) -> Result<bool, SylveError> {
        Ok(self.has_dataset(dataset))
    }

    async fn open_send(
        &self,
        base: Option<&str>,
        snapshot: &str,
        _recursive: bool,
    ) -> Result<ZfsSend, SylveError> {
        let dataset = dataset_of(snapshot);
        let snaps = self.snapshots_of(dataset);
        let shorts: Vec<String> = match base {
            // Incremental: everything after the base, up to and including N.
            Some(base) => {
                let base_short = short_of(base).to_string();
                let target_short = short_of(snapshot).to_string();
                let mut out = Vec::new();
                let mut past_base = false;
                for s in &snaps {
                    let short = short_of(s).to_string();
                    if past_base {
                        out.push(short.clone());
                    }
                    if short == base_short {
                        past_base = true;
                    }
                    if past_base && short == target_short {
                        break;
                    }
                }
                out
            }
            None => vec![short_of(snapshot).to_string()],
        };

        let fail = self.fail_send.load(Ordering::Relaxed);
        let bytes = serde_json::to_vec(&Manifest { snapshots: shorts }).unwrap();
        let wait: BoxFuture<'static, Result<ProcExit, SylveError>> = Box::pin(async move {
            Ok(if fail {
                ProcExit {
                    code: 1,
                    stderr_tail: "cannot send: injected failure".into(),
                }
            } else {
                ProcExit::default()
            })
        });
        Ok(ZfsSend {
            stdout: Box::new(Cursor::new(bytes)),
            wait,
        })
    }

    async fn open_recv(&self, destination: &str, _force: bool) -> Result<ZfsRecv, SylveError> {
        let (stdin, mut pipe) = tokio::io::duplex(64 * 1024);
        let destination = destination.to_string();
        let datasets = self.datasets.clone();
        let wait: BoxFuture<'static, Result<ProcExit, SylveError>> = Box::pin(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            match serde_json::from_slice::<Manifest>(&buf) {
                Ok(manifest) => {
                    let full = manifest
                        .snapshots
                        .iter()
                        .map(|s| format!("{destination}@{s}"))
                        .collect();
                    datasets.lock().insert(destination, full);
                    Ok(ProcExit::default())
                }
                Err(e) => Ok(ProcExit {
                    code: 1,
                    stderr_tail: format!("cannot receive: {e}"),
                }),
            }
        });
        Ok(ZfsRecv {
            stdin: Box::new(stdin),
            wait,
        })
    }
}

// --- Fake remote target ---

#[derive(Default)]
pub struct FakeSsh {
    /// remote dataset path -> full snapshot names.
    pub datasets: Arc<Mutex<BTreeMap<String, Vec<String>>>>,
    pub reachable: AtomicBool,
    /// Commands the executor ran remotely, for assertions.
    pub exec_log: Mutex<Vec<String>>,
}

impl FakeSsh {
    pub fn new() -> Arc<Self> {
        let ssh = Self::default();
        ssh.reachable.store(true, Ordering::Relaxed);
        Arc::new(ssh)
    }

    pub fn seed_dataset(&self, dataset: &str, shorts: &[&str]) {
        let full: Vec<String> = shorts.iter().map(|s| format!("{dataset}@{s}")).collect();
        self.datasets.lock().insert(dataset.to_string(), full);
    }

    pub fn snapshots_of(&self, dataset: &str) -> Vec<String> {
        self.datasets.lock().get(dataset).cloned().unwrap_or_default()
    }

    pub fn has_dataset(&self, dataset: &str) -> bool {
        self.datasets.lock().contains_key(dataset)
    }

    pub fn set_reachable(&self, up: bool) {
        self.reachable.store(up, Ordering::Relaxed);
    }
}

#[async_trait]
impl SshTransport for FakeSsh {
    async fn open_session(
        &self,
        _endpoint: &SshEndpoint,
        command: &str,
    ) -> Result<SshSession, SylveError> {
        if !self.reachable.load(Ordering::Relaxed) {
            return Err(SylveError::RemoteUnreachable("connection refused".into()));
        }
        let tokens: Vec<&str> = command.split_whitespace().collect();

        if command.contains(" recv ") {
            // Remote `zfs recv -F <dest>` fed by the executor's copy loop.
            let destination = tokens.last().unwrap().to_string();
            let (stdin, mut pipe) = tokio::io::duplex(64 * 1024);
            let datasets = self.datasets.clone();
            let wait: BoxFuture<'static, Result<ProcExit, SylveError>> = Box::pin(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                match serde_json::from_slice::<Manifest>(&buf) {
                    Ok(manifest) => {
                        let mut datasets = datasets.lock();
                        let entry = datasets.entry(destination.clone()).or_default();
                        for short in manifest.snapshots {
                            let full = format!("{destination}@{short}");
                            if !entry.contains(&full) {
                                entry.push(full);
                            }
                        }
                        Ok(ProcExit::default())
                    }
                    Err(e) => Ok(ProcExit {
                        code: 1,
                        stderr_tail: format!("cannot receive: {e}"),
                    }),
                }
            });
            return Ok(SshSession {
                stdin: Box::new(stdin),
                stdout: Box::new(Cursor::new(Vec::new())),
                wait,
            });
        }

        if command.contains(" send ") {
            // Remote `zfs send <dataset@snap>` streamed back for restore.
            let snapshot = tokens.last().unwrap().to_string();
            let exists = self
                .datasets
                .lock()
                .get(dataset_of(&snapshot))
                .map(|snaps| snaps.contains(&snapshot))
                .unwrap_or(false);
            let (bytes, exit) = if exists {
                (
                    serde_json::to_vec(&Manifest {
                        snapshots: vec![short_of(&snapshot).to_string()],
                    })
                    .unwrap(),
                    ProcExit::default(),
                )
            } else {
                (
                    Vec::new(),
                    ProcExit {
                        code: 1,
                        stderr_tail: format!("cannot open '{snapshot}': snapshot does not exist"),
                    },
                )
            };
            let (stdin, _pipe) = tokio::io::duplex(1024);
            let wait: BoxFuture<'static, Result<ProcExit, SylveError>> =
                Box::pin(async move { Ok(exit) });
            return Ok(SshSession {
                stdin: Box::new(stdin),
                stdout: Box::new(Cursor::new(bytes)),
                wait,
            });
        }

        Err(SylveError::Internal(format!("unexpected session command: {command}")))
    }

    async fn exec(&self, _endpoint: &SshEndpoint, command: &str) -> Result<ExecOutput, SylveError> {
        self.exec_log.lock().push(command.to_string());
        if !self.reachable.load(Ordering::Relaxed) {
            return Ok(ExecOutput {
                stdout: String::new(),
                stderr: "ssh: connect to host: Connection refused".into(),
                code: 255,
            });
        }
        let tokens: Vec<&str> = command.split_whitespace().collect();
        let last = tokens.last().unwrap().to_string();

        if command.starts_with("zfs list") {
            return Ok(match self.datasets.lock().get(&last) {
                Some(snaps) => ExecOutput {
                    stdout: snaps.join("\n"),
                    stderr: String::new(),
                    code: 0,
                },
                None => ExecOutput {
                    stdout: String::new(),
                    stderr: format!("cannot open '{last}': dataset does not exist"),
                    code: 1,
                },
            });
        }

        if command.starts_with("zfs destroy") {
            let mut datasets = self.datasets.lock();
            if let Some(entry) = datasets.get_mut(dataset_of(&last)) {
                entry.retain(|s| s != &last);
            }
            return Ok(ExecOutput::default());
        }

        Ok(ExecOutput::default())
    }
}

// --- Fake jail controller ---

#[derive(Default)]
pub struct FakeJail {
    pub running: Mutex<HashSet<u32>>,
    pub stop_fails: AtomicBool,
    /// Ordered record of stop/start calls.
    pub log: Mutex<Vec<String>>,
}

impl FakeJail {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_running(&self, ctid: u32) {
        self.running.lock().insert(ctid);
    }
}

#[async_trait]
impl JailController for FakeJail {
    async fn is_running(&self, ctid: u32) -> Result<bool, SylveError> {
        Ok(self.running.lock().contains(&ctid))
    }

    async fn stop(&self, ctid: u32) -> Result<(), SylveError> {
        if self.stop_fails.load(Ordering::Relaxed) {
            return Err(SylveError::JailQuiesceFailed("injected stop failure".into()));
        }
        self.log.lock().push(format!("stop {ctid}"));
        self.running.lock().remove(&ctid);
        Ok(())
    }

    async fn start(&self, ctid: u32) -> Result<(), SylveError> {
        self.log.lock().push(format!("start {ctid}"));
        self.running.lock().insert(ctid);
        Ok(())
    }
}

// --- Wired single-node engine ---

pub struct TestCtx {
    pub state: Arc<NodeState>,
    pub zfs: Arc<FakeZfs>,
    pub ssh: Arc<FakeSsh>,
    pub jail: Arc<FakeJail>,
    _tmp: tempfile::TempDir,
}

pub async fn engine(node_name: &str) -> TestCtx {
    let tmp = tempfile::tempdir().unwrap();
    let db = tmp.path().join("sylve.db");
    let config = Config::standalone(node_name, db.to_str().unwrap());

    let zfs = FakeZfs::new();
    let ssh = FakeSsh::new();
    let jail = FakeJail::new();
    let state = NodeState::initialize_with(config, zfs.clone(), ssh.clone(), jail.clone())
        .await
        .unwrap();

    TestCtx {
        state,
        zfs,
        ssh,
        jail,
        _tmp: tmp,
    }
}

impl TestCtx {
    pub async fn create_target(&self, id: i64, name: &str) -> BackupTarget {
        let target = BackupTarget {
            id,
            name: name.to_string(),
            ssh_host: "root@10.0.0.5".to_string(),
            ssh_port: 22,
            backup_root: "tank/Backups".to_string(),
            enabled: true,
            created_at: Some(Utc::now()),
            ..Default::default()
        };
        self.state
            .proposer
            .propose(kind::BACKUP_TARGET, action::CREATE, &target)
            .await
            .unwrap();
        target
    }

    pub async fn create_job(&self, job: &BackupJob) {
        self.state
            .proposer
            .propose(kind::BACKUP_JOB, action::CREATE, job)
            .await
            .unwrap();
    }

    pub fn dataset_job(&self, id: i64, target_id: i64) -> BackupJob {
        BackupJob {
            id,
            name: format!("hourly-{id}"),
            target_id,
            runner_node_id: self.state.node_id,
            mode: BackupJobMode::Dataset,
            source_dataset: "zroot/data".to_string(),
            dest_suffix: "srvA/data".to_string(),
            prune_keep_last: 3,
            cron_expr: "0 * * * *".to_string(),
            enabled: true,
            allow_full_fallback: true,
            ..Default::default()
        }
    }

    /// Opens a `running` ledger event the way the scheduler does before
    /// dispatching.
    pub async fn open_event(&self, job: &BackupJob, target: &BackupTarget) {
        let event = BackupEvent {
            job_id: Some(job.id),
            source_dataset: job.source().to_string(),
            target_endpoint: target.endpoint(&job.dest_suffix),
            mode: job.mode,
            status: BackupEventStatus::Running,
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        self.state
            .proposer
            .propose(kind::BACKUP_EVENT, action::CREATE, &event)
            .await
            .unwrap();
    }
}
