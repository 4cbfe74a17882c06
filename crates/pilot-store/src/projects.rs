use chrono::{DateTime, Utc};
use pilot_types::{Project, Session};
use rusqlite::{params, Row};

use crate::db::Store;
use crate::error::{Result, StoreError};

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    let created_at: String = row.get("created_at")?;
    Ok(Project {
        path: row.get("path")?,
        name: row.get("name")?,
        org_id: row.get("org_id")?,
        default_branch: row.get("default_branch")?,
        context_id: row.get("context_id")?,
        created_at: parse_ts(&created_at),
    })
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let created_at: String = row.get("created_at")?;
    let last_active_at: String = row.get("last_active_at")?;
    Ok(Session {
        id: row.get("id")?,
        context_id: row.get("context_id")?,
        project_path: row.get("project_path")?,
        created_at: parse_ts(&created_at),
        last_active_at: parse_ts(&last_active_at),
    })
}

impl Store {
    pub async fn upsert_project(&self, project: &Project) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO projects (path, name, org_id, default_branch, context_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(path) DO UPDATE SET
                name = excluded.name,
                org_id = excluded.org_id,
                default_branch = excluded.default_branch,
                context_id = excluded.context_id",
            params![
                project.path,
                project.name,
                project.org_id,
                project.default_branch,
                project.context_id,
                project.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_project(&self, path: &str) -> Result<Project> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT path, name, org_id, default_branch, context_id, created_at \
             FROM projects WHERE path = ?1",
            params![path],
            row_to_project,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(format!("project {path}")),
            other => other.into(),
        })
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT path, name, org_id, default_branch, context_id, created_at \
             FROM projects ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map([], row_to_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn get_or_create_session(&self, context_id: &str) -> Result<Session> {
        {
            let conn = self.conn.lock().await;
            let existing = conn.query_row(
                "SELECT id, context_id, project_path, created_at, last_active_at \
                 FROM sessions WHERE context_id = ?1",
                params![context_id],
                row_to_session,
            );
            match existing {
                Ok(session) => return Ok(session),
                Err(rusqlite::Error::QueryReturnedNoRows) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let session = Session::new(uuid::Uuid::new_v4().to_string(), context_id.to_string());
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (id, context_id, project_path, created_at, last_active_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.context_id,
                session.project_path,
                session.created_at.to_rfc3339(),
                session.last_active_at.to_rfc3339(),
            ],
        )?;
        Ok(session)
    }

    pub async fn set_session_project(&self, session_id: &str, project_path: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET project_path = ?1, last_active_at = ?2 WHERE id = ?3",
            params![project_path, Utc::now().to_rfc3339(), session_id],
        )?;
        Ok(())
    }
}
