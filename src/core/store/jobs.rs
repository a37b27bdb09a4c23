// src/core/store/jobs.rs

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::BackupJob;

impl Store {
    pub async fn upsert_job(&self, j: &BackupJob) -> Result<(), SylveError> {
        sqlx::query(
            "INSERT INTO backup_jobs
                (id, name, target_id, runner_node_id, policy_id, mode,
                 source_dataset, jail_root_dataset, friendly_src, dest_suffix,
                 prune_keep_last, prune_target, stop_before_backup,
                 allow_full_fallback, cron_expr, enabled, last_run_at,
                 next_run_at, last_status, last_error)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                target_id = excluded.target_id,
                runner_node_id = excluded.runner_node_id,
                policy_id = excluded.policy_id,
                mode = excluded.mode,
                source_dataset = excluded.source_dataset,
                jail_root_dataset = excluded.jail_root_dataset,
                friendly_src = excluded.friendly_src,
                dest_suffix = excluded.dest_suffix,
                prune_keep_last = excluded.prune_keep_last,
                prune_target = excluded.prune_target,
                stop_before_backup = excluded.stop_before_backup,
                allow_full_fallback = excluded.allow_full_fallback,
                cron_expr = excluded.cron_expr,
                enabled = excluded.enabled,
                last_run_at = excluded.last_run_at,
                next_run_at = excluded.next_run_at,
                last_status = excluded.last_status,
                last_error = excluded.last_error",
        )
        .bind(j.id)
        .bind(&j.name)
        .bind(j.target_id)
        .bind(j.runner_node_id)
        .bind(j.policy_id)
        .bind(j.mode)
        .bind(&j.source_dataset)
        .bind(&j.jail_root_dataset)
        .bind(&j.friendly_src)
        .bind(&j.dest_suffix)
        .bind(j.prune_keep_last)
        .bind(j.prune_target)
        .bind(j.stop_before_backup)
        .bind(j.allow_full_fallback)
        .bind(&j.cron_expr)
        .bind(j.enabled)
        .bind(j.last_run_at)
        .bind(j.next_run_at)
        .bind(&j.last_status)
        .bind(&j.last_error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_job(&self, id: i64) -> Result<Option<BackupJob>, SylveError> {
        let row = sqlx::query_as::<_, BackupJob>("SELECT * FROM backup_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_jobs(&self) -> Result<Vec<BackupJob>, SylveError> {
        let rows = sqlx::query_as::<_, BackupJob>("SELECT * FROM backup_jobs ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Enabled jobs pinned to the given runner node, in id order.
    pub async fn list_runnable_jobs(&self, node_id: i64) -> Result<Vec<BackupJob>, SylveError> {
        let rows = sqlx::query_as::<_, BackupJob>(
            "SELECT * FROM backup_jobs
             WHERE enabled = 1 AND runner_node_id = ?
             ORDER BY id",
        )
        .bind(node_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Deletes a job and its events atomically.
    pub async fn delete_job_cascade(&self, id: i64) -> Result<(), SylveError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM backup_events WHERE job_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM backup_jobs WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
