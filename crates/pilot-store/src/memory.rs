//! Minimal append-only project memory: short free-text notes, capped per
//! project. No embeddings or relevance scoring — just the last N notes in
//! insertion order, surfaced back to a Runner as context.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Store;
use crate::error::Result;

pub const MAX_NOTES_PER_PROJECT: i64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryNote {
    pub id: String,
    pub project_path: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

fn row_to_note(row: &Row) -> rusqlite::Result<MemoryNote> {
    let created_at: String = row.get("created_at")?;
    Ok(MemoryNote {
        id: row.get("id")?,
        project_path: row.get("project_path")?,
        text: row.get("text")?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

impl Store {
    /// Appends a note, then trims the project's oldest notes down to
    /// `MAX_NOTES_PER_PROJECT`.
    pub async fn append_memory_note(&self, project_path: &str, text: &str) -> Result<MemoryNote> {
        let note = MemoryNote {
            id: Uuid::new_v4().to_string(),
            project_path: project_path.to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO memory_notes (id, project_path, text, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![note.id, note.project_path, note.text, note.created_at.to_rfc3339()],
        )?;
        conn.execute(
            "DELETE FROM memory_notes WHERE project_path = ?1 AND id NOT IN (
                SELECT id FROM memory_notes WHERE project_path = ?1
                ORDER BY created_at DESC LIMIT ?2
            )",
            params![project_path, MAX_NOTES_PER_PROJECT],
        )?;
        Ok(note)
    }

    pub async fn list_memory_notes(&self, project_path: &str) -> Result<Vec<MemoryNote>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, project_path, text, created_at FROM memory_notes \
             WHERE project_path = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![project_path], row_to_note)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_caps_notes_per_project() {
        let store = Store::open_in_memory().await.unwrap();
        for i in 0..(MAX_NOTES_PER_PROJECT + 10) {
            store
                .append_memory_note("/repo", &format!("note {i}"))
                .await
                .unwrap();
        }
        let notes = store.list_memory_notes("/repo").await.unwrap();
        assert_eq!(notes.len(), MAX_NOTES_PER_PROJECT as usize);
        assert_eq!(notes.last().unwrap().text, "note 209");
    }
}
