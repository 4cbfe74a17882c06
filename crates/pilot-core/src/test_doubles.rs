//! In-memory `Messenger`/`Runner`/`Classifier` implementations for tests.

use std::sync::Arc;

use async_trait::async_trait;
use pilot_types::{ExecutionResult, IncomingMessage, Intent, Task};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::traits::{Classifier, Messenger, Runner};

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub context_id: String,
    pub thread_id: Option<String>,
    pub text: String,
    pub is_confirmation: bool,
}

#[derive(Default)]
pub struct RecordingMessenger {
    pub sent: Arc<Mutex<Vec<SentMessage>>>,
    pub edits: Arc<Mutex<Vec<(String, String)>>>,
    next_ref: std::sync::atomic::AtomicU64,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|m| m.text.clone()).collect()
    }

    fn next_message_ref(&self) -> String {
        let id = self
            .next_ref
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        format!("msg-{id}")
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_text(
        &self,
        context_id: &str,
        thread_id: Option<&str>,
        text: &str,
    ) -> Result<Option<String>> {
        let message_ref = self.next_message_ref();
        self.sent.lock().await.push(SentMessage {
            context_id: context_id.to_string(),
            thread_id: thread_id.map(str::to_string),
            text: text.to_string(),
            is_confirmation: false,
        });
        Ok(Some(message_ref))
    }

    async fn send_confirmation(
        &self,
        context_id: &str,
        thread_id: Option<&str>,
        description: &str,
    ) -> Result<Option<String>> {
        let message_ref = self.next_message_ref();
        self.sent.lock().await.push(SentMessage {
            context_id: context_id.to_string(),
            thread_id: thread_id.map(str::to_string),
            text: description.to_string(),
            is_confirmation: true,
        });
        Ok(Some(message_ref))
    }

    async fn edit_message(&self, _context_id: &str, message_ref: &str, text: &str) -> Result<()> {
        self.edits
            .lock()
            .await
            .push((message_ref.to_string(), text.to_string()));
        Ok(())
    }
}

/// A `Runner` double that always succeeds with a fixed output, recording
/// every task it was asked to execute.
pub struct StubRunner {
    pub calls: Arc<Mutex<Vec<Task>>>,
    pub result: ExecutionResult,
}

impl StubRunner {
    pub fn succeeding(output: impl Into<String>) -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            result: ExecutionResult {
                success: true,
                output: output.into(),
                error: None,
                tokens_input: Some(100),
                tokens_output: Some(200),
                duration_ms: 1_000,
                pr_url: None,
                commit_sha: None,
                model: Some("test-model".to_string()),
                applied_pattern_ids: Vec::new(),
            },
        }
    }
}

#[async_trait]
impl Runner for StubRunner {
    async fn execute(&self, task: &Task) -> Result<ExecutionResult> {
        self.calls.lock().await.push(task.clone());
        Ok(self.result.clone())
    }
}

/// A `Classifier` double that returns a fixed intent regardless of input.
pub struct FixedClassifier(pub Intent);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _message: &IncomingMessage) -> Result<Intent> {
        Ok(self.0)
    }
}
