// src/core/store/targets.rs

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::BackupTarget;

impl Store {
    pub async fn upsert_target(&self, t: &BackupTarget) -> Result<(), SylveError> {
        sqlx::query(
            "INSERT INTO backup_targets
                (id, name, ssh_host, ssh_port, ssh_key_path, backup_root,
                 description, enabled, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                ssh_host = excluded.ssh_host,
                ssh_port = excluded.ssh_port,
                ssh_key_path = excluded.ssh_key_path,
                backup_root = excluded.backup_root,
                description = excluded.description,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at",
        )
        .bind(t.id)
        .bind(&t.name)
        .bind(&t.ssh_host)
        .bind(t.ssh_port)
        .bind(&t.ssh_key_path)
        .bind(&t.backup_root)
        .bind(&t.description)
        .bind(t.enabled)
        .bind(t.created_at)
        .bind(t.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_target(&self, id: i64) -> Result<Option<BackupTarget>, SylveError> {
        let row = sqlx::query_as::<_, BackupTarget>("SELECT * FROM backup_targets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_targets(&self) -> Result<Vec<BackupTarget>, SylveError> {
        let rows =
            sqlx::query_as::<_, BackupTarget>("SELECT * FROM backup_targets ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    pub async fn delete_target(&self, id: i64) -> Result<(), SylveError> {
        sqlx::query("DELETE FROM backup_targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of jobs referencing a target; a non-zero count blocks deletion.
    pub async fn count_jobs_for_target(&self, target_id: i64) -> Result<i64, SylveError> {
        let n: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM backup_jobs WHERE target_id = ?")
                .bind(target_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(n.0)
    }
}
