// src/core/store/replication_events.rs

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::ReplicationEvent;
use chrono::{DateTime, Utc};

impl Store {
    pub async fn insert_replication_event(
        &self,
        e: &ReplicationEvent,
    ) -> Result<i64, SylveError> {
        let res = sqlx::query(
            "INSERT INTO replication_events
                (policy_id, job_id, event_type, status, message, created_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(e.policy_id)
        .bind(e.job_id)
        .bind(&e.event_type)
        .bind(&e.status)
        .bind(&e.message)
        .bind(e.created_at)
        .bind(e.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    /// Updates whitelisted columns only; everything else is immutable once
    /// appended.
    pub async fn update_replication_event(
        &self,
        id: i64,
        status: &str,
        message: &str,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), SylveError> {
        sqlx::query(
            "UPDATE replication_events
             SET status = ?, message = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(status)
        .bind(message)
        .bind(completed_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_replication_events(
        &self,
        policy_id: Option<i64>,
    ) -> Result<Vec<ReplicationEvent>, SylveError> {
        let rows = match policy_id {
            Some(pid) => {
                sqlx::query_as::<_, ReplicationEvent>(
                    "SELECT * FROM replication_events WHERE policy_id = ? ORDER BY id DESC",
                )
                .bind(pid)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReplicationEvent>(
                    "SELECT * FROM replication_events ORDER BY id DESC",
                )
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }
}
