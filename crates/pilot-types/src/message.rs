//! Inbound chat messages and classified intent.

use serde::{Deserialize, Serialize};

/// One inbound message handed to the dispatcher by a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub context_id: String,
    pub sender_id: String,
    pub sender_display_name: String,
    pub thread_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Question,
    Research,
    Planning,
    Chat,
    Task,
    Command,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Intent::Greeting => "greeting",
            Intent::Question => "question",
            Intent::Research => "research",
            Intent::Planning => "planning",
            Intent::Chat => "chat",
            Intent::Task => "task",
            Intent::Command => "command",
        };
        write!(f, "{s}")
    }
}

impl Intent {
    /// Only these intents lead to a task proposal; everything else is
    /// answered conversationally without ever reaching the queue.
    pub fn is_actionable(self) -> bool {
        matches!(self, Intent::Task)
    }
}
