// src/core/store/policies.rs

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::{ReplicationPolicy, ReplicationPolicyTarget};

impl Store {
    /// Upserts a policy and replaces its full target list in one transaction,
    /// so observers never see a policy with a partial target set.
    pub async fn upsert_policy_with_targets(
        &self,
        p: &ReplicationPolicy,
    ) -> Result<(), SylveError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO replication_policies
                (id, name, guest_type, guest_id, source_node_id, active_node_id,
                 source_mode, failback_mode, cron_expr, enabled)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                guest_type = excluded.guest_type,
                guest_id = excluded.guest_id,
                source_node_id = excluded.source_node_id,
                active_node_id = excluded.active_node_id,
                source_mode = excluded.source_mode,
                failback_mode = excluded.failback_mode,
                cron_expr = excluded.cron_expr,
                enabled = excluded.enabled",
        )
        .bind(p.id)
        .bind(&p.name)
        .bind(p.guest_type)
        .bind(p.guest_id)
        .bind(p.source_node_id)
        .bind(p.active_node_id)
        .bind(p.source_mode)
        .bind(p.failback_mode)
        .bind(&p.cron_expr)
        .bind(p.enabled)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM replication_policy_targets WHERE policy_id = ?")
            .bind(p.id)
            .execute(&mut *tx)
            .await?;
        for t in &p.targets {
            sqlx::query(
                "INSERT INTO replication_policy_targets (policy_id, node_id, weight)
                 VALUES (?, ?, ?)",
            )
            .bind(p.id)
            .bind(t.node_id)
            .bind(t.weight)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Deletes a policy together with its targets and lease, atomically.
    pub async fn delete_policy_cascade(&self, id: i64) -> Result<(), SylveError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM replication_leases WHERE policy_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM replication_policy_targets WHERE policy_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM replication_policies WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_policy(&self, id: i64) -> Result<Option<ReplicationPolicy>, SylveError> {
        let row = sqlx::query_as::<_, ReplicationPolicy>(
            "SELECT * FROM replication_policies WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(mut p) => {
                p.targets = self.policy_targets(p.id).await?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }

    pub async fn list_policies(&self) -> Result<Vec<ReplicationPolicy>, SylveError> {
        let mut rows = sqlx::query_as::<_, ReplicationPolicy>(
            "SELECT * FROM replication_policies ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        for p in &mut rows {
            p.targets = self.policy_targets(p.id).await?;
        }
        Ok(rows)
    }

    async fn policy_targets(
        &self,
        policy_id: i64,
    ) -> Result<Vec<ReplicationPolicyTarget>, SylveError> {
        let rows = sqlx::query_as::<_, ReplicationPolicyTarget>(
            "SELECT * FROM replication_policy_targets WHERE policy_id = ? ORDER BY node_id",
        )
        .bind(policy_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
