// src/core/raft/mod.rs

//! Consensus wiring. The `openraft` crate supplies elections and log
//! replication; this module binds it to the FSM dispatcher (storage) and to
//! the cluster's HTTP peer endpoints (network).
//!
//! openraft's storage/network traits use RPITIT, so the implementations in
//! this module use plain `async fn` rather than `#[async_trait]`.

pub mod network;
pub mod storage;

use crate::core::command::CommandEnvelope;
use crate::core::errors::SylveError;
use crate::core::fsm::{AppliedResponse, Dispatcher};
use network::HttpNetworkFactory;
use openraft::storage::Adaptor;
use openraft::{BasicNode, Entry, TokioRuntime};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use storage::FsmStorage;
use tracing::info;

openraft::declare_raft_types!(
    pub TypeConfig:
        D            = CommandEnvelope,
        R            = AppliedResponse,
        NodeId       = u64,
        Node         = BasicNode,
        Entry        = Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = TokioRuntime,
);

pub type NodeId = u64;
pub type RaftInstance = openraft::Raft<TypeConfig>;

/// Derives a stable node id from the configured node name. The high bit is
/// cleared so ids survive the i64 columns of the store.
pub fn node_id_from_name(name: &str) -> NodeId {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    name.hash(&mut h);
    h.finish() & (i64::MAX as u64)
}

/// A running Raft node handle shared across the engine.
#[derive(Clone)]
pub struct RaftNode {
    pub raft: Arc<RaftInstance>,
    pub node_id: NodeId,
}

impl RaftNode {
    pub fn is_leader(&self) -> bool {
        self.raft.metrics().borrow().current_leader == Some(self.node_id)
    }

    pub fn current_leader(&self) -> Option<NodeId> {
        self.raft.metrics().borrow().current_leader
    }

    /// The RPC address of the current leader, if one is known.
    pub fn leader_addr(&self) -> Option<String> {
        let metrics = self.raft.metrics().borrow().clone();
        let leader = metrics.current_leader?;
        metrics
            .membership_config
            .membership()
            .get_node(&leader)
            .map(|n| n.addr.clone())
    }
}

/// Starts a Raft node over the given peer set and dispatcher.
///
/// `peers` is `(node_id, rpc_addr)` for every node including this one. The
/// lowest-id node bootstraps the initial membership; re-initialisation on
/// restart is harmless and logged.
pub async fn start(
    node_id: NodeId,
    peers: &[(NodeId, String)],
    dispatcher: Arc<Dispatcher>,
    heartbeat_interval_ms: u64,
    election_timeout_ms: (u64, u64),
) -> Result<Arc<RaftNode>, SylveError> {
    let config = Arc::new(
        openraft::Config {
            cluster_name: "sylved".to_string(),
            heartbeat_interval: heartbeat_interval_ms,
            election_timeout_min: election_timeout_ms.0,
            election_timeout_max: election_timeout_ms.1,
            ..Default::default()
        }
        .validate()
        .map_err(|e| SylveError::Raft(format!("invalid raft config: {e}")))?,
    );

    let storage = FsmStorage::new(dispatcher);
    let (log_store, state_machine) = Adaptor::new(storage);

    let raft = Arc::new(
        openraft::Raft::new(
            node_id,
            config,
            HttpNetworkFactory::new(),
            log_store,
            state_machine,
        )
        .await
        .map_err(|e| SylveError::Raft(format!("failed to create raft instance: {e}")))?,
    );

    if !peers.is_empty() {
        let members: BTreeMap<NodeId, BasicNode> = peers
            .iter()
            .map(|(id, addr)| (*id, BasicNode { addr: addr.clone() }))
            .collect();
        let min_id = peers.iter().map(|(id, _)| *id).min().unwrap_or(node_id);
        if node_id == min_id {
            if let Err(e) = raft.initialize(members).await {
                info!(error = %e, "raft already initialised (ignoring on restart)");
            }
        }
    }

    info!(node_id, peers = peers.len(), "raft node started");
    Ok(Arc::new(RaftNode {
        raft,
        node_id,
    }))
}
