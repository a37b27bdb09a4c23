// src/core/store/notes.rs

use super::Store;
use crate::core::errors::SylveError;
use crate::core::models::Note;

impl Store {
    pub async fn upsert_note(&self, n: &Note) -> Result<(), SylveError> {
        sqlx::query(
            "INSERT INTO notes (id, title, content, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                updated_at = excluded.updated_at",
        )
        .bind(n.id)
        .bind(&n.title)
        .bind(&n.content)
        .bind(n.created_at)
        .bind(n.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_note(&self, id: i64) -> Result<(), SylveError> {
        sqlx::query("DELETE FROM notes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn bulk_delete_notes(&self, ids: &[i64]) -> Result<(), SylveError> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM notes WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list_notes(&self) -> Result<Vec<Note>, SylveError> {
        let rows = sqlx::query_as::<_, Note>("SELECT * FROM notes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
