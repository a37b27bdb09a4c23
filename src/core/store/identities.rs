// src/core/store/identities.rs

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::ClusterSshIdentity;

impl Store {
    pub async fn upsert_identity(&self, i: &ClusterSshIdentity) -> Result<(), SylveError> {
        sqlx::query(
            "INSERT INTO cluster_ssh_identities
                (node_uuid, node_name, public_key, private_key_path, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(node_uuid) DO UPDATE SET
                node_name = excluded.node_name,
                public_key = excluded.public_key,
                private_key_path = excluded.private_key_path,
                updated_at = excluded.updated_at",
        )
        .bind(&i.node_uuid)
        .bind(&i.node_name)
        .bind(&i.public_key)
        .bind(&i.private_key_path)
        .bind(i.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_identity(&self, node_uuid: &str) -> Result<(), SylveError> {
        sqlx::query("DELETE FROM cluster_ssh_identities WHERE node_uuid = ?")
            .bind(node_uuid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_identities(&self) -> Result<Vec<ClusterSshIdentity>, SylveError> {
        let rows = sqlx::query_as::<_, ClusterSshIdentity>(
            "SELECT * FROM cluster_ssh_identities ORDER BY node_uuid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
