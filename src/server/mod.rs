// src/server/mod.rs

//! Node assembly: initializes state, spawns background tasks, and handles
//! graceful shutdown.

mod rpc;
mod spawner;

use crate::config::Config;
use crate::core::state::NodeState;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// How long shutdown waits for in-flight backup runs to observe their
/// cancellation token and finalize their events.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The main startup function; runs until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<()> {
    let state = NodeState::initialize(config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let mut background_tasks: JoinSet<Result<()>> = JoinSet::new();
    spawner::spawn_all(&state, &shutdown_tx, &mut background_tasks);

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(());
    state.cancel_root.cancel();

    // Drain executor tasks first so canceled runs get their terminal events.
    let drain_runs = async {
        let mut tasks = state.run_tasks.lock().await;
        while tasks.join_next().await.is_some() {}
    };
    if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, drain_runs)
        .await
        .is_err()
    {
        warn!("timed out waiting for running backups to stop");
    }

    let drain_background = async {
        while let Some(res) = background_tasks.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "background task ended abnormally");
            }
        }
    };
    if tokio::time::timeout(SHUTDOWN_DRAIN_TIMEOUT, drain_background)
        .await
        .is_err()
    {
        warn!("timed out waiting for background tasks");
    }

    state.store.close().await;
    info!("shutdown complete");
    Ok(())
}
