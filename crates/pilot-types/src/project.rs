//! Project registration and chat-session entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered codebase the orchestrator may run tasks against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub path: String,
    pub name: String,
    pub org_id: Option<String>,
    pub default_branch: String,
    pub context_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(path: String, name: String, default_branch: String) -> Self {
        Self {
            path,
            name,
            org_id: None,
            default_branch,
            context_id: None,
            created_at: Utc::now(),
        }
    }
}

/// A running conversation thread bound to a chat context, tracking the
/// project currently in scope for that context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub context_id: String,
    pub project_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: String, context_id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            context_id,
            project_path: None,
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }
}
