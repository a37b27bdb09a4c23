// src/server/rpc.rs

//! The internal cluster RPC listener: Raft peer traffic plus leader-forwarded
//! proposals, JSON over HTTP.

use crate::core::command::CommandEnvelope;
use crate::core::fsm::AppliedResponse;
use crate::core::propose::PROPOSE_PATH;
use crate::core::raft::TypeConfig;
use crate::core::raft::network::{APPEND_ENTRIES_PATH, INSTALL_SNAPSHOT_PATH, VOTE_PATH};
use crate::core::state::NodeState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use openraft::raft::{AppendEntriesRequest, InstallSnapshotRequest, VoteRequest};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

pub fn router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route(PROPOSE_PATH, post(propose))
        .route(APPEND_ENTRIES_PATH, post(append_entries))
        .route(VOTE_PATH, post(vote))
        .route(INSTALL_SNAPSHOT_PATH, post(install_snapshot))
        .with_state(state)
}

async fn propose(
    State(state): State<Arc<NodeState>>,
    Json(env): Json<CommandEnvelope>,
) -> Json<AppliedResponse> {
    let result = state.proposer.propose_envelope(env).await;
    Json(AppliedResponse::from_result(&result))
}

async fn append_entries(
    State(state): State<Arc<NodeState>>,
    Json(rpc): Json<AppendEntriesRequest<TypeConfig>>,
) -> Response {
    let Some(raft) = &state.raft else {
        return (StatusCode::SERVICE_UNAVAILABLE, "raft disabled").into_response();
    };
    match raft.raft.append_entries(rpc).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn vote(
    State(state): State<Arc<NodeState>>,
    Json(rpc): Json<VoteRequest<u64>>,
) -> Response {
    let Some(raft) = &state.raft else {
        return (StatusCode::SERVICE_UNAVAILABLE, "raft disabled").into_response();
    };
    match raft.raft.vote(rpc).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn install_snapshot(
    State(state): State<Arc<NodeState>>,
    Json(rpc): Json<InstallSnapshotRequest<TypeConfig>>,
) -> Response {
    let Some(raft) = &state.raft else {
        return (StatusCode::SERVICE_UNAVAILABLE, "raft disabled").into_response();
    };
    match raft.raft.install_snapshot(rpc).await {
        Ok(resp) => Json(resp).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Runs the RPC listener until shutdown.
pub async fn serve(state: Arc<NodeState>, mut shutdown_rx: broadcast::Receiver<()>) {
    let addr = state.config.node.listen_addr.clone();
    let app = router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr = %addr, error = %e, "failed to bind RPC listener");
            return;
        }
    };
    info!(addr = %addr, "cluster RPC listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("RPC listener shutting down");
        })
        .await
    {
        error!(error = %e, "RPC listener failed");
    }
}
