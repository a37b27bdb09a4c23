// src/core/lease.rs

//! Distributed leases guaranteeing at-most-one node runs replication for a
//! policy at a time.
//!
//! The lease row is replicated through the FSM; the wall clock plus the
//! replicated `expires_at` is authoritative, so no leader-side heartbeats
//! are needed. Concurrent acquisitions are resolved by log order: losers see
//! the winner's row on their next read.

use crate::core::command::{action, kind};
use crate::core::errors::SylveError;
use crate::core::models::{GuestType, ReplicationLease};
use crate::core::propose::Proposer;
use crate::core::store::Store;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteLease {
    policy_id: i64,
}

pub struct LeaseManager {
    store: Arc<Store>,
    proposer: Arc<Proposer>,
    node_id: i64,
}

impl LeaseManager {
    pub fn new(store: Arc<Store>, proposer: Arc<Proposer>, node_id: i64) -> Self {
        Self {
            store,
            proposer,
            node_id,
        }
    }

    /// Acquires the policy lease for this node, or reports the holder.
    pub async fn acquire(
        &self,
        policy_id: i64,
        guest_type: GuestType,
        guest_id: i64,
        ttl: Duration,
        reason: &str,
        actor: &str,
    ) -> Result<ReplicationLease, SylveError> {
        let now = Utc::now();
        let current = self.store.get_lease(policy_id).await?;

        if let Some(cur) = &current {
            if cur.owner_node_id != self.node_id && cur.is_valid_at(now) {
                return Err(SylveError::LeaseHeld {
                    owner_node_id: cur.owner_node_id as u64,
                    expires_at: cur.expires_at.unwrap_or(now),
                });
            }
        }

        let lease = ReplicationLease {
            policy_id,
            guest_type,
            guest_id,
            owner_node_id: self.node_id,
            expires_at: Some(now + ChronoDuration::from_std(ttl).unwrap_or_default()),
            version: current.as_ref().map(|c| c.version).unwrap_or(0) + 1,
            last_reason: reason.to_string(),
            last_actor: actor.to_string(),
        };
        self.proposer
            .propose(kind::REPLICATION_LEASE, action::UPSERT, &lease)
            .await?;
        info!(policy_id, node_id = self.node_id, version = lease.version, "lease acquired");
        Ok(lease)
    }

    /// Extends a lease this node already owns.
    pub async fn renew(&self, policy_id: i64, ttl: Duration) -> Result<ReplicationLease, SylveError> {
        let now = Utc::now();
        let current = self
            .store
            .get_lease(policy_id)
            .await?
            .ok_or_else(|| SylveError::InvalidRequest(format!("no lease for policy {policy_id}")))?;
        if current.owner_node_id != self.node_id {
            return Err(SylveError::LeaseHeld {
                owner_node_id: current.owner_node_id as u64,
                expires_at: current.expires_at.unwrap_or(now),
            });
        }

        let lease = ReplicationLease {
            expires_at: Some(now + ChronoDuration::from_std(ttl).unwrap_or_default()),
            version: current.version + 1,
            ..current
        };
        self.proposer
            .propose(kind::REPLICATION_LEASE, action::UPSERT, &lease)
            .await?;
        debug!(policy_id, version = lease.version, "lease renewed");
        Ok(lease)
    }

    /// Drops the lease if this node owns it. Releasing someone else's lease
    /// is a no-op, not an error.
    pub async fn release(&self, policy_id: i64) -> Result<(), SylveError> {
        let Some(current) = self.store.get_lease(policy_id).await? else {
            return Ok(());
        };
        if current.owner_node_id != self.node_id {
            return Ok(());
        }
        self.proposer
            .propose(
                kind::REPLICATION_LEASE,
                action::DELETE,
                &DeleteLease { policy_id },
            )
            .await?;
        debug!(policy_id, "lease released");
        Ok(())
    }
}
