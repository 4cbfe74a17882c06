//! Minimal stdio-facing `Messenger` and `Runner` for the CLI binary. The
//! real chat transport and code-executing agent are out of scope (they
//! arrive as separate adapter crates); this is just enough to drive the
//! dispatcher, queue and learning loop end to end from a terminal.

use async_trait::async_trait;
use pilot_core::{PilotError, Result};
use pilot_types::{ExecutionResult, Task};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

pub struct StdioMessenger {
    out: Mutex<Stdout>,
}

impl StdioMessenger {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }

    async fn print_line(&self, text: &str) -> Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(text.as_bytes())
            .await
            .map_err(|e| PilotError::Messenger(e.to_string()))?;
        out.write_all(b"\n")
            .await
            .map_err(|e| PilotError::Messenger(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| PilotError::Messenger(e.to_string()))?;
        Ok(())
    }
}

impl Default for StdioMessenger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl pilot_core::Messenger for StdioMessenger {
    async fn send_text(&self, _context_id: &str, _thread_id: Option<&str>, text: &str) -> Result<Option<String>> {
        self.print_line(text).await?;
        Ok(None)
    }

    async fn send_confirmation(
        &self,
        _context_id: &str,
        _thread_id: Option<&str>,
        description: &str,
    ) -> Result<Option<String>> {
        self.print_line(&format!("{description}\n(reply yes/no to confirm)")).await?;
        Ok(None)
    }

    async fn edit_message(&self, _context_id: &str, _message_ref: &str, text: &str) -> Result<()> {
        self.print_line(text).await
    }
}

/// Stands in for the real code-executing agent: acknowledges the task and
/// reports success without touching the filesystem. Wiring a real Runner
/// is the adapter work this crate's traits exist to make swappable.
pub struct EchoRunner;

#[async_trait]
impl pilot_core::Runner for EchoRunner {
    async fn execute(&self, task: &Task) -> Result<ExecutionResult> {
        Ok(ExecutionResult {
            success: true,
            output: format!("(no Runner configured) would execute: {}", task.title),
            error: None,
            tokens_input: None,
            tokens_output: None,
            duration_ms: 0,
            pr_url: None,
            commit_sha: None,
            model: None,
            applied_pattern_ids: Vec::new(),
        })
    }
}
