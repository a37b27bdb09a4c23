// src/server/spawner.rs

//! Spawns the node's long-running background tasks.

use super::rpc;
use crate::core::scheduler::Scheduler;
use crate::core::state::NodeState;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;

pub fn spawn_all(
    state: &Arc<NodeState>,
    shutdown_tx: &broadcast::Sender<()>,
    background_tasks: &mut JoinSet<Result<()>>,
) {
    // --- Cluster RPC listener ---
    let rpc_state = state.clone();
    let shutdown_rx_rpc = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        rpc::serve(rpc_state, shutdown_rx_rpc).await;
        Ok(())
    });

    // --- Backup scheduler ---
    let scheduler = Scheduler::new(state.clone());
    let shutdown_rx_sched = shutdown_tx.subscribe();
    background_tasks.spawn(async move {
        scheduler.run(shutdown_rx_sched).await;
        Ok(())
    });

    info!("all background tasks have been spawned");
}
