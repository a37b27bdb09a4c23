// src/core/store/mod.rs

//! The durable per-node relational store (SQLite via sqlx).
//!
//! Every table is written exclusively from inside an FSM `apply`, so the
//! store itself enforces no cross-node coordination; it only provides
//! transactions, uniqueness and foreign-key constraints for a single node.

mod events;
mod identities;
mod jobs;
mod leases;
mod migrations;
mod notes;
mod options;
mod policies;
mod replication_events;
mod snapshot;
mod targets;

pub use events::EventFilter;
pub use snapshot::FsmSnapshot;

use crate::core::errors::SylveError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Connection-pool wrapper owning the node's database file.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if missing) the database file and runs migrations.
    pub async fn open(path: &Path) -> Result<Self, SylveError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!("Store opened at {}", path.display());
        Ok(store)
    }

    /// An in-memory store for tests and ephemeral nodes.
    pub async fn open_in_memory() -> Result<Self, SylveError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);
        // A single connection keeps the in-memory database alive and visible
        // to every caller.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), SylveError> {
        migrations::run(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
