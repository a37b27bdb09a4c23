// src/core/store/leases.rs

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::ReplicationLease;

impl Store {
    pub async fn upsert_lease(&self, l: &ReplicationLease) -> Result<(), SylveError> {
        sqlx::query(
            "INSERT INTO replication_leases
                (policy_id, guest_type, guest_id, owner_node_id, expires_at,
                 version, last_reason, last_actor)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(policy_id) DO UPDATE SET
                guest_type = excluded.guest_type,
                guest_id = excluded.guest_id,
                owner_node_id = excluded.owner_node_id,
                expires_at = excluded.expires_at,
                version = excluded.version,
                last_reason = excluded.last_reason,
                last_actor = excluded.last_actor",
        )
        .bind(l.policy_id)
        .bind(l.guest_type)
        .bind(l.guest_id)
        .bind(l.owner_node_id)
        .bind(l.expires_at)
        .bind(l.version)
        .bind(&l.last_reason)
        .bind(&l.last_actor)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_lease(&self, policy_id: i64) -> Result<Option<ReplicationLease>, SylveError> {
        let row = sqlx::query_as::<_, ReplicationLease>(
            "SELECT * FROM replication_leases WHERE policy_id = ?",
        )
        .bind(policy_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_lease(&self, policy_id: i64) -> Result<(), SylveError> {
        sqlx::query("DELETE FROM replication_leases WHERE policy_id = ?")
            .bind(policy_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_leases(&self) -> Result<Vec<ReplicationLease>, SylveError> {
        let rows = sqlx::query_as::<_, ReplicationLease>(
            "SELECT * FROM replication_leases ORDER BY policy_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
