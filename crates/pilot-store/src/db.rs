//! Connection setup and additive schema migrations.
//!
//! Every migration is `CREATE TABLE IF NOT EXISTS` plus `ALTER TABLE ADD
//! COLUMN`, tolerating the "duplicate column name" error sqlite returns when
//! the column already exists. This is simpler than the table_info pre-check
//! some sibling stores use, and is sufficient since columns are only ever
//! added, never renamed or dropped.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::Mutex;

use crate::error::{Result, StoreError};

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::InvalidRow(e.to_string()))?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute("PRAGMA synchronous = NORMAL", [])?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().await;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS projects (
                path TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                org_id TEXT,
                default_branch TEXT NOT NULL,
                context_id TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                context_id TEXT NOT NULL,
                project_path TEXT,
                created_at TEXT NOT NULL,
                last_active_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_context ON sessions(context_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                task_id TEXT NOT NULL,
                project_path TEXT NOT NULL,
                status TEXT NOT NULL,
                output TEXT,
                error TEXT,
                duration_ms INTEGER,
                pr_url TEXT,
                commit_sha TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT,
                tokens_input INTEGER,
                tokens_output INTEGER,
                tokens_total INTEGER,
                estimated_cost_usd REAL,
                files_changed INTEGER,
                lines_added INTEGER,
                lines_removed INTEGER,
                model_name TEXT,
                task_title TEXT NOT NULL,
                task_description TEXT NOT NULL,
                task_branch TEXT,
                task_base_branch TEXT,
                task_create_pr INTEGER NOT NULL DEFAULT 0,
                task_verbose INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_executions_project ON executions(project_path)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)",
            [],
        )?;
        add_column_if_missing(&conn, "executions", "applied_pattern_ids", "TEXT")?;
        add_column_if_missing(&conn, "executions", "context_id", "TEXT NOT NULL DEFAULT ''")?;
        add_column_if_missing(&conn, "executions", "thread_id", "TEXT")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cross_patterns (
                id TEXT PRIMARY KEY,
                pattern_type TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                context TEXT NOT NULL,
                examples TEXT NOT NULL,
                confidence REAL NOT NULL,
                occurrences INTEGER NOT NULL DEFAULT 1,
                is_anti_pattern INTEGER NOT NULL DEFAULT 0,
                scope TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_patterns_scope ON cross_patterns(scope)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pattern_project_links (
                pattern_id TEXT NOT NULL,
                project_path TEXT NOT NULL,
                uses INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                last_used TEXT NOT NULL,
                PRIMARY KEY (pattern_id, project_path),
                FOREIGN KEY (pattern_id) REFERENCES cross_patterns(id) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS pattern_feedback (
                id TEXT PRIMARY KEY,
                pattern_id TEXT NOT NULL,
                execution_id TEXT NOT NULL,
                project_path TEXT NOT NULL,
                outcome TEXT NOT NULL,
                confidence_delta REAL NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (pattern_id) REFERENCES cross_patterns(id) ON DELETE CASCADE
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_feedback_pattern ON pattern_feedback(pattern_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS usage_events (
                id TEXT PRIMARY KEY,
                org_id TEXT,
                project_path TEXT NOT NULL,
                execution_id TEXT,
                event_type TEXT NOT NULL,
                quantity REAL NOT NULL,
                unit TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_usage_project ON usage_events(project_path)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_usage_org ON usage_events(org_id)",
            [],
        )?;
        add_column_if_missing(&conn, "usage_events", "user_id", "TEXT")?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_usage_user ON usage_events(user_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS memory_notes (
                id TEXT PRIMARY KEY,
                project_path TEXT NOT NULL,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_memory_project ON memory_notes(project_path, created_at)",
            [],
        )?;

        Ok(())
    }
}

/// Adds `column` to `table` if it doesn't already exist, tolerating sqlite's
/// "duplicate column name" error on repeated startup.
fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    sql_type: &str,
) -> Result<()> {
    let stmt = format!("ALTER TABLE {table} ADD COLUMN {column} {sql_type}");
    match conn.execute(&stmt, []) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(_, Some(msg)))
            if msg.to_lowercase().contains("duplicate column name") =>
        {
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }
}
