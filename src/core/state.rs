// src/core/state.rs

//! Defines the central `NodeState` struct, holding all shared node-wide
//! components, and the factory that wires them together.

use crate::config::Config;
use crate::core::errors::SylveError;
use crate::core::executor::{Executor, RestoreReport};
use crate::core::fsm::Dispatcher;
use crate::core::jail::{JailController, RcJail};
use crate::core::lease::LeaseManager;
use crate::core::propose::Proposer;
use crate::core::raft::{self, RaftNode, node_id_from_name};
use crate::core::ssh::{OpenSsh, SshTransport};
use crate::core::store::Store;
use crate::core::zfs::{ZfsCli, ZfsExecutor};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

/// The central struct holding all shared, node-wide state. Wrapped in an
/// `Arc` and passed to every background task.
pub struct NodeState {
    pub config: Config,
    /// Stable id derived from the node name; doubles as `runner_node_id`.
    pub node_id: i64,
    /// UUID identifying this node's SSH identity row.
    pub node_uuid: String,
    /// Unique id for this process instance, used in logs and lease actors.
    pub run_id: String,
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub proposer: Arc<Proposer>,
    pub leases: Arc<LeaseManager>,
    pub executor: Arc<Executor>,
    /// `None` in single-node mode.
    pub raft: Option<Arc<RaftNode>>,
    /// In-process run slots: jobs currently executing on this node.
    pub running_jobs: DashMap<i64, ()>,
    /// Tracks in-flight executor tasks for graceful shutdown.
    pub run_tasks: Mutex<JoinSet<()>>,
    /// Cancels every in-flight run on shutdown.
    pub cancel_root: CancellationToken,
}

impl NodeState {
    /// Initializes the store, FSM, consensus and executor stack from the
    /// given configuration, with the production capability implementations.
    pub async fn initialize(config: Config) -> Result<Arc<Self>, SylveError> {
        let zfs: Arc<dyn ZfsExecutor> = Arc::new(ZfsCli);
        let ssh: Arc<dyn SshTransport> = Arc::new(OpenSsh {
            connect_timeout_secs: config.ssh.connect_timeout_secs,
        });
        let jail: Arc<dyn JailController> = Arc::new(RcJail);
        Self::initialize_with(config, zfs, ssh, jail).await
    }

    /// Initialization seam taking explicit capabilities; tests inject fakes.
    pub async fn initialize_with(
        config: Config,
        zfs: Arc<dyn ZfsExecutor>,
        ssh: Arc<dyn SshTransport>,
        jail: Arc<dyn JailController>,
    ) -> Result<Arc<Self>, SylveError> {
        let node_id = node_id_from_name(&config.node.name) as i64;

        // A fresh run id per process instance.
        let mut run_id_bytes = [0u8; 20];
        getrandom::fill(&mut run_id_bytes)
            .map_err(|e| SylveError::Internal(e.to_string()))?;
        let run_id = hex::encode(run_id_bytes);

        let node_uuid = if config.node.uuid.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            config.node.uuid.clone()
        };

        let store = Arc::new(Store::open(Path::new(&config.database.path)).await?);
        let dispatcher = Dispatcher::with_default_handlers(store.clone());

        let raft = if config.raft.enabled {
            let peers: Vec<(u64, String)> = config
                .raft
                .peers
                .iter()
                .map(|p| (node_id_from_name(&p.name), p.addr.clone()))
                .collect();
            Some(
                raft::start(
                    node_id as u64,
                    &peers,
                    dispatcher.clone(),
                    config.raft.heartbeat_interval_ms,
                    (
                        config.raft.election_timeout_min_ms,
                        config.raft.election_timeout_max_ms,
                    ),
                )
                .await?,
            )
        } else {
            info!("raft disabled; proposals apply locally");
            None
        };

        let proposer = Arc::new(Proposer::new(
            dispatcher.clone(),
            raft.clone(),
            Duration::from_millis(config.raft.propose_timeout_ms),
        ));
        let leases = Arc::new(LeaseManager::new(store.clone(), proposer.clone(), node_id));
        let executor = Arc::new(Executor::new(zfs, ssh, jail, proposer.clone()));

        info!(node = %config.node.name, node_id, run_id = %run_id, "node state initialized");
        Ok(Arc::new(Self {
            config,
            node_id,
            node_uuid,
            run_id,
            store,
            dispatcher,
            proposer,
            leases,
            executor,
            raft,
            running_jobs: DashMap::new(),
            run_tasks: Mutex::new(JoinSet::new()),
            cancel_root: CancellationToken::new(),
        }))
    }

    /// Restores a job's destination from one of its replicated snapshots.
    pub async fn restore_job(
        &self,
        job_id: i64,
        snapshot: &str,
    ) -> Result<RestoreReport, SylveError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| SylveError::InvalidRequest(format!("unknown job {job_id}")))?;
        let target = self
            .store
            .get_target(job.target_id)
            .await?
            .ok_or_else(|| {
                SylveError::InvalidRequest(format!("job {job_id} has unknown target"))
            })?;
        self.executor.restore_job(&job, &target, snapshot).await
    }

    /// Out-of-band restore from an arbitrary dataset on a known target.
    pub async fn restore_oob(
        &self,
        target_id: i64,
        dataset: &str,
        snapshot: &str,
        destination: &str,
    ) -> Result<RestoreReport, SylveError> {
        let target = self
            .store
            .get_target(target_id)
            .await?
            .ok_or_else(|| SylveError::InvalidRequest(format!("unknown target {target_id}")))?;
        self.executor
            .restore_oob(&target, dataset, snapshot, destination)
            .await
    }
}
