//! The execution record — the system of record for one task attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "queued" => Ok(ExecutionStatus::Queued),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Token/cost/diff metrics attached to a completed (or partially run) execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub tokens_input: Option<i64>,
    pub tokens_output: Option<i64>,
    pub tokens_total: Option<i64>,
    pub estimated_cost_usd: Option<f64>,
    pub files_changed: Option<i64>,
    pub lines_added: Option<i64>,
    pub lines_removed: Option<i64>,
    pub model_name: Option<String>,
}

impl ExecutionMetrics {
    /// Reconciles tokens_total from input+output whenever both are known.
    pub fn with_reconciled_total(mut self) -> Self {
        if let (Some(i), Some(o)) = (self.tokens_input, self.tokens_output) {
            self.tokens_total = Some(i + o);
        }
        self
    }
}

/// Deferred-execution task fields carried on an Execution row: the description
/// of the work to perform, captured at confirmation time and consumed by the
/// QueueManager when the row is finally run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredTask {
    pub title: String,
    pub description: String,
    pub branch: Option<String>,
    pub base_branch: Option<String>,
    pub create_pr: bool,
    pub verbose: bool,
}

/// The system of record for one task attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub task_id: String,
    pub project_path: String,
    /// Chat context the confirmation originated from, so the QueueManager
    /// can deliver the eventual result to the right place.
    pub context_id: String,
    pub thread_id: Option<String>,
    pub status: ExecutionStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    pub pr_url: Option<String>,
    pub commit_sha: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metrics: ExecutionMetrics,
    pub task: DeferredTask,
}

impl Execution {
    pub fn new(
        id: String,
        task_id: String,
        project_path: String,
        context_id: String,
        thread_id: Option<String>,
        task: DeferredTask,
    ) -> Self {
        Self {
            id,
            task_id,
            project_path,
            context_id,
            thread_id,
            status: ExecutionStatus::Queued,
            output: None,
            error: None,
            duration_ms: None,
            pr_url: None,
            commit_sha: None,
            created_at: Utc::now(),
            completed_at: None,
            metrics: ExecutionMetrics::default(),
            task,
        }
    }
}

/// Result returned by a Runner invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub tokens_input: Option<i64>,
    pub tokens_output: Option<i64>,
    pub duration_ms: i64,
    pub pr_url: Option<String>,
    pub commit_sha: Option<String>,
    pub model: Option<String>,
    /// Pattern ids the Runner claims to have applied during this execution —
    /// the basis for LearningLoop feedback writes.
    #[serde(default)]
    pub applied_pattern_ids: Vec<String>,
}
