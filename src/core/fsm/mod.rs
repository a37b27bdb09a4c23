// src/core/fsm/mod.rs

//! The replicated state machine: decodes committed command envelopes and
//! routes them to per-entity handlers that mutate the store.
//!
//! Apply and snapshot hold the same state-machine mutex, so a snapshot is
//! always a causally consistent view and apply is single-writer against the
//! store. Handler errors are returned to the proposer but never abort the
//! consensus layer.

pub mod handlers;

use crate::core::command::{CommandEnvelope, kind};
use crate::core::errors::SylveError;
use crate::core::store::{FsmSnapshot, Store};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// The result of applying one envelope, carried back through the Raft client
/// write path to the proposer.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AppliedResponse {
    pub ok: bool,
    pub error: Option<String>,
}

impl AppliedResponse {
    pub fn from_result(res: &Result<(), SylveError>) -> Self {
        match res {
            Ok(()) => Self {
                ok: true,
                error: None,
            },
            Err(e) => Self {
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// One replicated entity's command processor. Implementations must be
/// deterministic: same store state + same payload => same effect.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn apply(&self, store: &Store, action: &str, data: &Value) -> Result<(), SylveError>;
}

/// Routes committed envelopes to registered handlers.
pub struct Dispatcher {
    store: Arc<Store>,
    /// Registered at startup, read on every apply.
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
    /// Serializes apply against snapshot/restore.
    state_lock: Mutex<()>,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            handlers: RwLock::new(HashMap::new()),
            state_lock: Mutex::new(()),
        }
    }

    /// Builds a dispatcher with every production handler registered.
    pub fn with_default_handlers(store: Arc<Store>) -> Arc<Self> {
        let d = Self::new(store);
        d.register(kind::NOTE, Arc::new(handlers::note::NoteHandler));
        d.register(kind::OPTIONS, Arc::new(handlers::options::OptionsHandler));
        d.register(
            kind::BACKUP_TARGET,
            Arc::new(handlers::target::BackupTargetHandler),
        );
        d.register(kind::BACKUP_JOB, Arc::new(handlers::job::BackupJobHandler));
        d.register(
            kind::BACKUP_EVENT,
            Arc::new(handlers::event::BackupEventHandler),
        );
        d.register(
            kind::REPLICATION_POLICY,
            Arc::new(handlers::policy::ReplicationPolicyHandler),
        );
        d.register(
            kind::REPLICATION_LEASE,
            Arc::new(handlers::lease::ReplicationLeaseHandler),
        );
        d.register(
            kind::REPLICATION_EVENT,
            Arc::new(handlers::replication_event::ReplicationEventHandler),
        );
        d.register(
            kind::CLUSTER_SSH_IDENTITY,
            Arc::new(handlers::identity::SshIdentityHandler),
        );
        Arc::new(d)
    }

    pub fn register(&self, kind: &str, handler: Arc<dyn CommandHandler>) {
        self.handlers.write().insert(kind.to_string(), handler);
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Applies one committed envelope under the state-machine mutex.
    pub async fn apply(&self, env: &CommandEnvelope) -> Result<(), SylveError> {
        let handler = {
            let handlers = self.handlers.read();
            handlers.get(env.kind.as_str()).cloned()
        };
        let handler = handler.ok_or_else(|| SylveError::NoHandler(env.kind.clone()))?;

        let _guard = self.state_lock.lock().await;
        debug!(kind = %env.kind, action = %env.action, "applying command");
        handler.apply(&self.store, &env.action, &env.data).await
    }

    /// Decodes raw bytes and applies, failing fast on malformed envelopes.
    pub async fn apply_raw(&self, bytes: &[u8]) -> Result<(), SylveError> {
        let env = CommandEnvelope::decode(bytes)?;
        self.apply(&env).await
    }

    /// Captures a consistent snapshot of the whole store.
    pub async fn snapshot(&self) -> Result<FsmSnapshot, SylveError> {
        let _guard = self.state_lock.lock().await;
        self.store.capture_snapshot().await
    }

    /// Replaces store contents from a snapshot.
    pub async fn restore(&self, snap: &FsmSnapshot) -> Result<(), SylveError> {
        let _guard = self.state_lock.lock().await;
        self.store.restore_snapshot(snap).await
    }
}
