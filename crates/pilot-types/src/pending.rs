//! A transient confirmation-awaiting record held until a user approves or
//! rejects a proposed task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTask {
    pub task_id: String,
    pub description: String,
    pub context_id: String,
    pub thread_id: Option<String>,
    /// Opaque reference to the confirmation message, returned by
    /// `Messenger::send_confirmation`, so later updates can target it.
    pub message_ref: Option<String>,
    pub requester_id: String,
    pub created_at: DateTime<Utc>,
    /// Set by `/nopr` or `/pr` to override ephemeral-task detection;
    /// `None` leaves the decision to the description regex.
    pub forced_create_pr: Option<bool>,
}

impl PendingTask {
    pub fn new(
        task_id: String,
        description: String,
        context_id: String,
        thread_id: Option<String>,
        requester_id: String,
    ) -> Self {
        Self {
            task_id,
            description,
            context_id,
            thread_id,
            message_ref: None,
            requester_id,
            created_at: Utc::now(),
            forced_create_pr: None,
        }
    }

    /// True once this record has sat unconfirmed for at least `ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.created_at) >= ttl
    }
}
