// src/core/raft/network.rs

//! Peer-to-peer transport for openraft, carried over the cluster's internal
//! HTTP endpoints as JSON bodies.

use super::{NodeId, TypeConfig};
use openraft::error::{InstallSnapshotError, RPCError, RaftError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::{AnyError, BasicNode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const APPEND_ENTRIES_PATH: &str = "/raft/append-entries";
pub const VOTE_PATH: &str = "/raft/vote";
pub const INSTALL_SNAPSHOT_PATH: &str = "/raft/install-snapshot";

fn unreachable(msg: impl std::fmt::Display) -> Unreachable {
    Unreachable::new(&AnyError::error(msg.to_string()))
}

/// Per-peer HTTP client.
pub struct HttpRaftNetwork {
    target_addr: String,
    client: reqwest::Client,
}

impl HttpRaftNetwork {
    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        req: &Req,
    ) -> Result<Resp, Unreachable> {
        let url = format!("http://{}{}", self.target_addr, path);
        let resp = self
            .client
            .post(&url)
            .json(req)
            .send()
            .await
            .map_err(|e| unreachable(e))?;
        if !resp.status().is_success() {
            return Err(unreachable(format!(
                "peer {} returned {}",
                self.target_addr,
                resp.status()
            )));
        }
        resp.json::<Resp>().await.map_err(|e| unreachable(e))
    }
}

impl RaftNetwork<TypeConfig> for HttpRaftNetwork {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        self.post(APPEND_ENTRIES_PATH, &rpc)
            .await
            .map_err(RPCError::Unreachable)
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, RPCError<NodeId, BasicNode, RaftError<NodeId>>> {
        self.post(VOTE_PATH, &rpc).await.map_err(RPCError::Unreachable)
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<NodeId>,
        RPCError<NodeId, BasicNode, RaftError<NodeId, InstallSnapshotError>>,
    > {
        self.post(INSTALL_SNAPSHOT_PATH, &rpc)
            .await
            .map_err(RPCError::Unreachable)
    }
}

/// Creates per-peer network clients with bounded connect/request timeouts so
/// heartbeats fail fast instead of stalling an election.
pub struct HttpNetworkFactory {
    client: reqwest::Client,
}

impl HttpNetworkFactory {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(4))
            .build()
            .expect("reqwest client construction cannot fail with static options");
        Self { client }
    }
}

impl Default for HttpNetworkFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl RaftNetworkFactory<TypeConfig> for HttpNetworkFactory {
    type Network = HttpRaftNetwork;

    async fn new_client(&mut self, _target: NodeId, node: &BasicNode) -> Self::Network {
        HttpRaftNetwork {
            target_addr: node.addr.clone(),
            client: self.client.clone(),
        }
    }
}
