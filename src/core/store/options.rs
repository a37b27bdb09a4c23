// src/core/store/options.rs

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::ClusterOptions;

impl Store {
    /// Writes the singleton options row. The primary key is pinned to 1.
    pub async fn set_options(&self, o: &ClusterOptions) -> Result<(), SylveError> {
        sqlx::query(
            "INSERT INTO options (id, cluster_name, updated_at)
             VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                cluster_name = excluded.cluster_name,
                updated_at = excluded.updated_at",
        )
        .bind(&o.cluster_name)
        .bind(o.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_options(&self) -> Result<Option<ClusterOptions>, SylveError> {
        let row = sqlx::query_as::<_, ClusterOptions>("SELECT * FROM options WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}
