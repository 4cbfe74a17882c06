//! Metering events for task, compute and token usage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventType {
    Task,
    Compute,
    TokenInput,
    TokenOutput,
}

impl std::fmt::Display for UsageEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UsageEventType::Task => "task",
            UsageEventType::Compute => "compute",
            UsageEventType::TokenInput => "token_input",
            UsageEventType::TokenOutput => "token_output",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UsageEventType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(UsageEventType::Task),
            "compute" => Ok(UsageEventType::Compute),
            "token_input" => Ok(UsageEventType::TokenInput),
            "token_output" => Ok(UsageEventType::TokenOutput),
            other => Err(format!("unknown usage event type: {other}")),
        }
    }
}

/// One billable or measurable event, recorded against an org/project pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: String,
    pub org_id: Option<String>,
    pub user_id: Option<String>,
    pub project_path: String,
    pub execution_id: Option<String>,
    pub event_type: UsageEventType,
    pub quantity: f64,
    pub unit: String,
    pub created_at: DateTime<Utc>,
}
