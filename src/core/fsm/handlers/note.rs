// src/core/fsm/handlers/note.rs

use super::{decode, unknown_action};
use crate::core::command::action;
use crate::core::errors::SylveError;
use crate::core::fsm::CommandHandler;
use crate::core::models::Note;
use crate::core::store::Store;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize)]
struct DeleteNote {
    id: i64,
}

#[derive(Deserialize)]
struct BulkDeleteNotes {
    ids: Vec<i64>,
}

pub struct NoteHandler;

#[async_trait]
impl CommandHandler for NoteHandler {
    async fn apply(&self, store: &Store, act: &str, data: &Value) -> Result<(), SylveError> {
        match act {
            action::CREATE | action::UPDATE => {
                let note: Note = decode(data)?;
                store.upsert_note(&note).await
            }
            action::DELETE => {
                let p: DeleteNote = decode(data)?;
                store.delete_note(p.id).await
            }
            action::BULK_DELETE => {
                let p: BulkDeleteNotes = decode(data)?;
                store.bulk_delete_notes(&p.ids).await
            }
            other => Err(unknown_action("note", other)),
        }
    }
}
