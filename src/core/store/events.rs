// src/core/store/events.rs

//! Ledger rows for backup executions, plus the read API used by observers.

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::{BackupEvent, BackupEventStatus};
use chrono::{DateTime, Utc};

/// Filters for ledger queries. All fields are optional and ANDed together.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub job_id: Option<i64>,
    pub status: Option<BackupEventStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl Store {
    /// Appends an event row. The id is store-assigned, which is deterministic
    /// across nodes because inserts happen in Raft commit order.
    pub async fn insert_event(&self, e: &BackupEvent) -> Result<i64, SylveError> {
        let res = sqlx::query(
            "INSERT INTO backup_events
                (job_id, source_dataset, target_endpoint, mode, status,
                 error, output, started_at, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(e.job_id)
        .bind(&e.source_dataset)
        .bind(&e.target_endpoint)
        .bind(e.mode)
        .bind(e.status)
        .bind(&e.error)
        .bind(&e.output)
        .bind(e.started_at)
        .bind(e.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    /// The single in-flight event for a job, if any.
    pub async fn running_event_for_job(
        &self,
        job_id: i64,
    ) -> Result<Option<BackupEvent>, SylveError> {
        let row = sqlx::query_as::<_, BackupEvent>(
            "SELECT * FROM backup_events WHERE job_id = ? AND status = 'running'",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Completes the running event of a job with a terminal status.
    pub async fn complete_running_event(
        &self,
        job_id: i64,
        status: BackupEventStatus,
        error: &str,
        output: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), SylveError> {
        sqlx::query(
            "UPDATE backup_events
             SET status = ?, error = ?, output = ?, completed_at = ?
             WHERE job_id = ? AND status = 'running'",
        )
        .bind(status)
        .bind(error)
        .bind(output)
        .bind(completed_at)
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list_events(&self, f: &EventFilter) -> Result<Vec<BackupEvent>, SylveError> {
        let mut sql = String::from("SELECT * FROM backup_events WHERE 1 = 1");
        if f.job_id.is_some() {
            sql.push_str(" AND job_id = ?");
        }
        if f.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if f.since.is_some() {
            sql.push_str(" AND started_at >= ?");
        }
        if f.until.is_some() {
            sql.push_str(" AND started_at <= ?");
        }
        sql.push_str(" ORDER BY id DESC");
        if f.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, BackupEvent>(&sql);
        if let Some(job_id) = f.job_id {
            q = q.bind(job_id);
        }
        if let Some(status) = f.status {
            q = q.bind(status);
        }
        if let Some(since) = f.since {
            q = q.bind(since);
        }
        if let Some(until) = f.until {
            q = q.bind(until);
        }
        if let Some(limit) = f.limit {
            q = q.bind(limit);
        }
        Ok(q.fetch_all(&self.pool).await?)
    }

    pub async fn count_running_events(&self, job_id: i64) -> Result<i64, SylveError> {
        let n: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM backup_events WHERE job_id = ? AND status = 'running'",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(n.0)
    }
}
