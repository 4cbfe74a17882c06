use chrono::{DateTime, Utc};
use pilot_types::{DeferredTask, Execution, ExecutionMetrics, ExecutionStatus};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::Store;
use crate::error::{Result, StoreError};

fn row_to_execution(row: &Row) -> rusqlite::Result<Execution> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(Execution {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        project_path: row.get("project_path")?,
        context_id: row.get("context_id")?,
        thread_id: row.get("thread_id")?,
        status: status.parse().unwrap_or(ExecutionStatus::Pending),
        output: row.get("output")?,
        error: row.get("error")?,
        duration_ms: row.get("duration_ms")?,
        pr_url: row.get("pr_url")?,
        commit_sha: row.get("commit_sha")?,
        created_at: parse_ts(&created_at),
        completed_at: completed_at.as_deref().map(parse_ts),
        metrics: ExecutionMetrics {
            tokens_input: row.get("tokens_input")?,
            tokens_output: row.get("tokens_output")?,
            tokens_total: row.get("tokens_total")?,
            estimated_cost_usd: row.get("estimated_cost_usd")?,
            files_changed: row.get("files_changed")?,
            lines_added: row.get("lines_added")?,
            lines_removed: row.get("lines_removed")?,
            model_name: row.get("model_name")?,
        },
        task: DeferredTask {
            title: row.get("task_title")?,
            description: row.get("task_description")?,
            branch: row.get("task_branch")?,
            base_branch: row.get("task_base_branch")?,
            create_pr: row.get::<_, i64>("task_create_pr")? != 0,
            verbose: row.get::<_, i64>("task_verbose")? != 0,
        },
    })
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

const SELECT_COLUMNS: &str = "id, task_id, project_path, status, output, error, duration_ms, \
    pr_url, commit_sha, created_at, completed_at, tokens_input, tokens_output, tokens_total, \
    estimated_cost_usd, files_changed, lines_added, lines_removed, model_name, task_title, \
    task_description, task_branch, task_base_branch, task_create_pr, task_verbose, \
    applied_pattern_ids, context_id, thread_id";

impl Store {
    pub async fn insert_execution(&self, execution: &Execution) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            &format!(
                "INSERT INTO executions ({SELECT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, \
                 ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, \
                 ?24, ?25, ?26, ?27, ?28)"
            ),
            params![
                execution.id,
                execution.task_id,
                execution.project_path,
                execution.status.to_string(),
                execution.output,
                execution.error,
                execution.duration_ms,
                execution.pr_url,
                execution.commit_sha,
                execution.created_at.to_rfc3339(),
                execution.completed_at.map(|t| t.to_rfc3339()),
                execution.metrics.tokens_input,
                execution.metrics.tokens_output,
                execution.metrics.tokens_total,
                execution.metrics.estimated_cost_usd,
                execution.metrics.files_changed,
                execution.metrics.lines_added,
                execution.metrics.lines_removed,
                execution.metrics.model_name,
                execution.task.title,
                execution.task.description,
                execution.task.branch,
                execution.task.base_branch,
                execution.task.create_pr as i64,
                execution.task.verbose as i64,
                Option::<String>::None,
                execution.context_id,
                execution.thread_id,
            ],
        )?;
        Ok(())
    }

    pub async fn get_execution(&self, id: &str) -> Result<Execution> {
        let conn = self.conn.lock().await;
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM executions WHERE id = ?1"),
            params![id],
            row_to_execution,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound(format!("execution {id}"))
            }
            other => other.into(),
        })
    }

    /// Transitions an execution to cancelled with an explanatory error —
    /// used both for `/stop` and for crash-recovery of orphaned rows.
    pub async fn cancel_execution(&self, id: &str, error: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE executions SET status = ?1, error = ?2, completed_at = ?3 WHERE id = ?4",
            params![
                ExecutionStatus::Cancelled.to_string(),
                error,
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        Ok(())
    }

    /// Atomically claims the oldest queued/pending execution for a project,
    /// transitioning it to running so no two workers can pick up the same
    /// row. Returns `None` if the project has nothing left to run.
    pub async fn claim_next_execution(&self, project_path: &str) -> Result<Option<Execution>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let claimed_id: Option<String> = tx
            .query_row(
                "SELECT id FROM executions
                 WHERE project_path = ?1 AND status IN ('queued', 'pending')
                 ORDER BY created_at ASC LIMIT 1",
                params![project_path],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = claimed_id else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE executions SET status = ?1 WHERE id = ?2",
            params![ExecutionStatus::Running.to_string(), id],
        )?;

        let execution = tx.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM executions WHERE id = ?1"),
            params![id],
            row_to_execution,
        )?;

        tx.commit()?;
        Ok(Some(execution))
    }

    /// Records the terminal outcome of a Runner invocation against an
    /// execution row, reconciling `tokens_total` and stamping `completed_at`.
    pub async fn complete_execution(
        &self,
        id: &str,
        result: &pilot_types::ExecutionResult,
    ) -> Result<()> {
        let metrics = ExecutionMetrics {
            tokens_input: result.tokens_input,
            tokens_output: result.tokens_output,
            tokens_total: None,
            estimated_cost_usd: None,
            files_changed: None,
            lines_added: None,
            lines_removed: None,
            model_name: result.model.clone(),
        }
        .with_reconciled_total();

        let status = if result.success {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };

        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE executions SET
                status = ?1, output = ?2, error = ?3, duration_ms = ?4, pr_url = ?5,
                commit_sha = ?6, completed_at = ?7, tokens_input = ?8, tokens_output = ?9,
                tokens_total = ?10, model_name = ?11, applied_pattern_ids = ?12
             WHERE id = ?13",
            params![
                status.to_string(),
                result.output,
                result.error,
                result.duration_ms,
                result.pr_url,
                result.commit_sha,
                Utc::now().to_rfc3339(),
                metrics.tokens_input,
                metrics.tokens_output,
                metrics.tokens_total,
                metrics.model_name,
                serde_json::to_string(&result.applied_pattern_ids)?,
                id,
            ],
        )?;
        Ok(())
    }

    pub async fn list_executions_for_project(
        &self,
        project_path: &str,
        limit: i64,
    ) -> Result<Vec<Execution>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM executions WHERE project_path = ?1 \
             ORDER BY created_at DESC LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![project_path, limit], row_to_execution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Rows left `running` by a process that crashed mid-execution, older
    /// than `stale_after`. Called once at startup so the queue can cancel
    /// them instead of leaving them stuck forever.
    pub async fn list_stale_running_executions(
        &self,
        stale_after: chrono::Duration,
    ) -> Result<Vec<Execution>> {
        let conn = self.conn.lock().await;
        let cutoff = (Utc::now() - stale_after).to_rfc3339();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM executions \
             WHERE status = 'running' AND created_at <= ?1"
        ))?;
        let rows = stmt
            .query_map(params![cutoff], row_to_execution)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
