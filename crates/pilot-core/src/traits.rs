//! The three seams the orchestrator is built against: sending chat messages,
//! running tasks, and classifying intent. Each adapter crate (a real chat
//! channel, a real coding agent, a real LLM-backed classifier) implements
//! one of these; tests use in-memory doubles instead of a mocking framework.

use async_trait::async_trait;
use pilot_types::{ExecutionResult, IncomingMessage, Intent, Task};

use crate::error::Result;
use crate::formatting;

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a plain text reply into the context the incoming message came
    /// from. Returns an opaque reference usable for later edits, if the
    /// channel supports it.
    async fn send_text(&self, context_id: &str, thread_id: Option<&str>, text: &str)
        -> Result<Option<String>>;

    /// Sends a confirmation prompt ("run this task? yes/no") and returns an
    /// opaque message reference the dispatcher can use to edit it in place
    /// once the user responds or the confirmation expires.
    async fn send_confirmation(
        &self,
        context_id: &str,
        thread_id: Option<&str>,
        description: &str,
    ) -> Result<Option<String>>;

    /// Edits a previously sent message in place, if the channel supports it.
    /// A no-op on channels without message editing.
    async fn edit_message(&self, context_id: &str, message_ref: &str, text: &str) -> Result<()>;

    /// The formatting methods below have channel-agnostic defaults; a real
    /// adapter overrides the ones its platform needs to render differently.
    fn format_greeting(&self, username: &str) -> String {
        formatting::format_greeting(username)
    }

    fn format_question_ack(&self) -> String {
        formatting::format_question_ack()
    }

    fn format_task_result(&self, result: &ExecutionResult) -> String {
        formatting::format_task_result(result)
    }

    fn format_progress_update(&self, task_id: &str, phase: &str, pct: u8, detail: &str) -> String {
        formatting::format_progress_update(task_id, phase, pct, detail)
    }

    fn clean_output(&self, raw: &str) -> String {
        formatting::clean_output(raw)
    }

    fn max_message_len(&self) -> usize {
        formatting::max_message_len()
    }

    fn chunk_content(&self, content: &str, max_len: usize) -> Vec<String> {
        formatting::chunk_content(content, max_len)
    }
}

#[async_trait]
pub trait Runner: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<ExecutionResult>;
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classifies a message's intent. Implementations should default to
    /// `Intent::Chat` when uncertain rather than erring.
    async fn classify(&self, message: &IncomingMessage) -> Result<Intent>;
}
