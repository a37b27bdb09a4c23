// src/core/propose.rs

//! The proposer: the single entry point for state mutations.
//!
//! Single-node deployments bypass consensus and invoke the FSM directly.
//! In cluster mode the leader appends to the Raft log; followers forward the
//! envelope to the leader and return its result verbatim.

use crate::core::command::CommandEnvelope;
use crate::core::errors::SylveError;
use crate::core::fsm::{AppliedResponse, Dispatcher};
use crate::core::raft::RaftNode;
use openraft::error::{ClientWriteError, RaftError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const PROPOSE_PATH: &str = "/v1/propose";

pub struct Proposer {
    dispatcher: Arc<Dispatcher>,
    raft: Option<Arc<RaftNode>>,
    http: reqwest::Client,
    apply_timeout: Duration,
}

impl Proposer {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        raft: Option<Arc<RaftNode>>,
        apply_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            raft,
            http: reqwest::Client::new(),
            apply_timeout,
        }
    }

    /// Encodes and submits a state mutation. Returns once the command has
    /// been applied (or rejected) on the state machine.
    pub async fn propose<T: Serialize>(
        &self,
        kind: &str,
        action: &str,
        payload: &T,
    ) -> Result<(), SylveError> {
        let env = CommandEnvelope::new(kind, action, payload)?;
        self.propose_envelope(env).await
    }

    pub async fn propose_envelope(&self, env: CommandEnvelope) -> Result<(), SylveError> {
        match &self.raft {
            // Raft disabled: apply locally, bypassing log replication.
            None => self.dispatcher.apply(&env).await,
            Some(node) => {
                if !node.is_leader() {
                    if let Some(addr) = node.leader_addr() {
                        return self.forward_to(&addr, &env).await;
                    }
                }
                self.client_write(node, env).await
            }
        }
    }

    async fn client_write(
        &self,
        node: &Arc<RaftNode>,
        env: CommandEnvelope,
    ) -> Result<(), SylveError> {
        let write = node.raft.client_write(env.clone());
        let result = tokio::time::timeout(self.apply_timeout, write)
            .await
            .map_err(|_| SylveError::Timeout(self.apply_timeout.as_millis() as u64))?;

        match result {
            Ok(resp) => applied_to_result(resp.data),
            Err(RaftError::APIError(ClientWriteError::ForwardToLeader(fwd))) => {
                // Lost leadership between the role check and the write.
                match fwd.leader_node {
                    Some(leader) => self.forward_to(&leader.addr, &env).await,
                    None => Err(SylveError::NotLeader { leader: None }),
                }
            }
            Err(e) => Err(SylveError::Raft(e.to_string())),
        }
    }

    async fn forward_to(&self, addr: &str, env: &CommandEnvelope) -> Result<(), SylveError> {
        debug!(leader = %addr, kind = %env.kind, action = %env.action, "forwarding proposal");
        let url = format!("http://{addr}{PROPOSE_PATH}");
        let resp = self
            .http
            .post(&url)
            .json(env)
            .timeout(self.apply_timeout)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SylveError::Raft(format!(
                "leader {addr} returned {}",
                resp.status()
            )));
        }
        let applied: AppliedResponse = resp.json().await?;
        applied_to_result(applied)
    }
}

fn applied_to_result(r: AppliedResponse) -> Result<(), SylveError> {
    if r.ok {
        Ok(())
    } else {
        Err(SylveError::HandlerRejected(
            r.error.unwrap_or_else(|| "unknown handler error".to_string()),
        ))
    }
}
