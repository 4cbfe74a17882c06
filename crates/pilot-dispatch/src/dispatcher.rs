//! The `Dispatcher`: the single entry point chat-channel adapters call into.
//! Owns per-context state (active project, last sender, bounded history),
//! the rate limiter, and the confirmation registry, and routes classified
//! intent to the right Runner call or task-admission path.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use pilot_core::{CancellationRegistry, Classifier, Messenger, Runner};
use pilot_types::{
    truncate_title, DeferredTask, Execution, ExecutionStatus, IncomingMessage, Intent,
    PendingTask, Task,
};
use pilot_store::Store;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::classify;
use crate::commands::{help_text, parse_command, SlashCommand};
use crate::config::DispatchConfig;
use crate::confirmation::ConfirmationRegistry;
use crate::rate_limiter::RateLimiter;

const QUESTION_BUDGET: Duration = Duration::from_secs(90);
const RESEARCH_BUDGET: Duration = Duration::from_secs(180);
const PLANNING_BUDGET: Duration = Duration::from_secs(120);
const CHAT_BUDGET: Duration = Duration::from_secs(60);
const CHAT_WORD_CAP: usize = 500;
const HISTORY_CAP: usize = 20;
const HISTORY_WINDOW: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
struct Turn {
    role: TurnRole,
    text: String,
}

#[derive(Default)]
struct ContextState {
    last_sender: Option<String>,
    active_project: Option<String>,
    history: VecDeque<Turn>,
}

enum RunnerOutcome {
    TimedOut,
    Failed(pilot_core::PilotError),
}

pub struct Dispatcher {
    messenger: Arc<dyn Messenger>,
    runner: Arc<dyn Runner>,
    classifier: Option<Arc<dyn Classifier>>,
    store: Store,
    rate_limiter: RateLimiter,
    confirmations: ConfirmationRegistry,
    cancellations: CancellationRegistry,
    contexts: Mutex<HashMap<String, ContextState>>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        messenger: Arc<dyn Messenger>,
        runner: Arc<dyn Runner>,
        classifier: Option<Arc<dyn Classifier>>,
        store: Store,
        cancellations: CancellationRegistry,
        config: DispatchConfig,
    ) -> Self {
        let rate_limiter = RateLimiter::new(config.message_bucket, config.task_bucket);
        let confirmations = ConfirmationRegistry::new(config.confirmation_ttl);
        Self {
            messenger,
            runner,
            classifier,
            store,
            rate_limiter,
            confirmations,
            cancellations,
            contexts: Mutex::new(HashMap::new()),
            config,
        }
    }

    fn with_context<T>(&self, context_id: &str, f: impl FnOnce(&mut ContextState) -> T) -> T {
        let mut contexts = self.contexts.lock().expect("context mutex poisoned");
        let state = contexts.entry(context_id.to_string()).or_default();
        f(state)
    }

    fn record_sender(&self, context_id: &str, sender_id: &str) {
        if sender_id.is_empty() {
            return;
        }
        self.with_context(context_id, |state| {
            state.last_sender = Some(sender_id.to_string());
        });
    }

    fn active_project(&self, context_id: &str) -> Option<String> {
        self.with_context(context_id, |state| state.active_project.clone())
    }

    fn set_active_project(&self, context_id: &str, project_path: String) {
        self.with_context(context_id, |state| {
            state.active_project = Some(project_path);
        });
    }

    fn record_turn(&self, context_id: &str, role: TurnRole, text: &str) {
        self.with_context(context_id, |state| {
            if state.history.len() >= HISTORY_CAP {
                state.history.pop_front();
            }
            state.history.push_back(Turn {
                role,
                text: text.to_string(),
            });
        });
    }

    /// Entry point for every inbound chat message.
    pub async fn handle_message(&self, msg: IncomingMessage) -> pilot_core::Result<()> {
        let text = msg.text.trim().to_string();
        if text.is_empty() {
            return Ok(());
        }

        self.record_sender(&msg.context_id, &msg.sender_id);

        if !self.rate_limiter.allow_message(&msg.context_id) {
            self.messenger
                .send_text(
                    &msg.context_id,
                    msg.thread_id.as_deref(),
                    "You're sending messages a bit fast — try again in a moment.",
                )
                .await?;
            return Ok(());
        }

        if let Some(accepted) = classify::confirmation_token(&text) {
            return self
                .resolve_confirmation(&msg.context_id, msg.thread_id.as_deref(), accepted)
                .await;
        }

        let intent = self.classify_intent(&msg, &text).await;
        self.record_turn(&msg.context_id, TurnRole::User, &text);

        match intent {
            Intent::Greeting => {
                let reply = self.messenger.format_greeting(&msg.sender_display_name);
                self.messenger
                    .send_text(&msg.context_id, msg.thread_id.as_deref(), &reply)
                    .await?;
            }
            Intent::Command => self.handle_command(&msg, &text).await?,
            Intent::Question => self.run_question(&msg, &text).await?,
            Intent::Research => self.run_research(&msg, &text).await?,
            Intent::Planning => self.run_planning(&msg, &text).await?,
            Intent::Chat => self.run_chat(&msg, &text).await?,
            Intent::Task => {
                self.propose_task(
                    &msg.context_id,
                    msg.thread_id.clone(),
                    text.clone(),
                    msg.sender_id.clone(),
                    None,
                )
                .await?
            }
        }

        Ok(())
    }

    async fn classify_intent(&self, msg: &IncomingMessage, text: &str) -> Intent {
        if text.starts_with('/') {
            return Intent::Command;
        }
        if classify::is_clear_question(text) {
            return Intent::Question;
        }
        if classify::is_greeting(text) {
            return Intent::Greeting;
        }
        if let Some(classifier) = &self.classifier {
            match tokio::time::timeout(self.config.classifier_timeout, classifier.classify(msg))
                .await
            {
                Ok(Ok(intent)) => return intent,
                Ok(Err(err)) => warn!(error = %err, "classifier returned an error, falling back"),
                Err(_) => debug!("classifier timed out, falling back to regex classification"),
            }
        }
        classify::regex_classify(text)
    }

    // ---- one-shot Runner calls (Question/Research/Chat/Planning) ----

    async fn call_runner(
        &self,
        msg: &IncomingMessage,
        description: String,
        budget: Duration,
    ) -> Result<pilot_types::ExecutionResult, RunnerOutcome> {
        let project_path = self.active_project(&msg.context_id).unwrap_or_default();
        let task = Task {
            id: format!("adhoc-{}", Uuid::new_v4()),
            title: truncate_title(&description, self.config.max_title_len),
            description,
            project_path,
            branch: None,
            base_branch: None,
            create_pr: false,
            verbose: false,
            member_id: Some(msg.sender_id.clone()),
        };

        match tokio::time::timeout(budget, self.runner.execute(&task)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(RunnerOutcome::Failed(err)),
            Err(_) => Err(RunnerOutcome::TimedOut),
        }
    }

    async fn report_runner_error(
        &self,
        msg: &IncomingMessage,
        outcome: RunnerOutcome,
        kind: &str,
    ) -> pilot_core::Result<()> {
        let text = match outcome {
            RunnerOutcome::TimedOut => format!("Timed out, try a simpler {kind}."),
            RunnerOutcome::Failed(err) => format!("That didn't work: {err}"),
        };
        self.messenger
            .send_text(&msg.context_id, msg.thread_id.as_deref(), &text)
            .await?;
        Ok(())
    }

    async fn send_chunked(
        &self,
        context_id: &str,
        thread_id: Option<&str>,
        text: &str,
    ) -> pilot_core::Result<()> {
        let max_len = self.messenger.max_message_len();
        for chunk in self.messenger.chunk_content(text, max_len) {
            self.messenger.send_text(context_id, thread_id, &chunk).await?;
        }
        Ok(())
    }

    async fn run_question(&self, msg: &IncomingMessage, text: &str) -> pilot_core::Result<()> {
        let ack = self.messenger.format_question_ack();
        self.messenger
            .send_text(&msg.context_id, msg.thread_id.as_deref(), &ack)
            .await?;

        match self.call_runner(msg, text.to_string(), QUESTION_BUDGET).await {
            Ok(result) => {
                let reply = self.messenger.format_task_result(&result);
                self.send_chunked(&msg.context_id, msg.thread_id.as_deref(), &reply)
                    .await?;
                self.record_turn(&msg.context_id, TurnRole::Assistant, &reply);
            }
            Err(outcome) => self.report_runner_error(msg, outcome, "question").await?,
        }
        Ok(())
    }

    async fn run_research(&self, msg: &IncomingMessage, text: &str) -> pilot_core::Result<()> {
        let prompt = format!("Research request: {text}\n\nProvide a structured, sourced summary.");
        match self.call_runner(msg, prompt, RESEARCH_BUDGET).await {
            Ok(result) => {
                let reply = self.messenger.format_task_result(&result);
                self.send_chunked(&msg.context_id, msg.thread_id.as_deref(), &reply)
                    .await?;
                self.record_turn(&msg.context_id, TurnRole::Assistant, &reply);
            }
            Err(outcome) => self.report_runner_error(msg, outcome, "research request").await?,
        }
        Ok(())
    }

    async fn run_chat(&self, msg: &IncomingMessage, text: &str) -> pilot_core::Result<()> {
        match self.call_runner(msg, text.to_string(), CHAT_BUDGET).await {
            Ok(result) => {
                let cleaned = self.messenger.clean_output(&result.output);
                let capped = cap_words(&cleaned, CHAT_WORD_CAP);
                self.send_chunked(&msg.context_id, msg.thread_id.as_deref(), &capped)
                    .await?;
                self.record_turn(&msg.context_id, TurnRole::Assistant, &capped);
            }
            Err(outcome) => self.report_runner_error(msg, outcome, "message").await?,
        }
        Ok(())
    }

    async fn run_planning(&self, msg: &IncomingMessage, text: &str) -> pilot_core::Result<()> {
        let prompt = format!("Planning request: {text}\n\nProduce a concrete, step-by-step plan.");
        match self.call_runner(msg, prompt, PLANNING_BUDGET).await {
            Ok(result) => {
                let plan = self.messenger.clean_output(&result.output);
                self.propose_task(
                    &msg.context_id,
                    msg.thread_id.clone(),
                    plan,
                    msg.sender_id.clone(),
                    None,
                )
                .await?;
            }
            Err(outcome) => self.report_runner_error(msg, outcome, "plan").await?,
        }
        Ok(())
    }

    // ---- task confirmation and admission ----

    /// Admits a description as a candidate task: checks the task rate
    /// bucket, registers a PendingTask (never overwriting one already
    /// pending for the context), and asks the Messenger to confirm.
    async fn propose_task(
        &self,
        context_id: &str,
        thread_id: Option<String>,
        description: String,
        requester_id: String,
        forced_create_pr: Option<bool>,
    ) -> pilot_core::Result<()> {
        if !self.rate_limiter.allow_task(context_id) {
            self.messenger
                .send_text(
                    context_id,
                    thread_id.as_deref(),
                    "You've hit the task rate limit for this context — try again later.",
                )
                .await?;
            return Ok(());
        }

        let task_id = format!("MSG-{}", Utc::now().timestamp());
        let mut pending = PendingTask::new(
            task_id.clone(),
            description.clone(),
            context_id.to_string(),
            thread_id.clone(),
            requester_id,
        );
        pending.forced_create_pr = forced_create_pr;

        if !self.confirmations.register(pending) {
            let existing_id = self
                .confirmations
                .get(context_id)
                .map(|t| t.task_id)
                .unwrap_or_default();
            self.messenger
                .send_text(
                    context_id,
                    thread_id.as_deref(),
                    &format!("You already have a pending task: {existing_id}. Reply yes/no."),
                )
                .await?;
            return Ok(());
        }

        match self
            .messenger
            .send_confirmation(context_id, thread_id.as_deref(), &description)
            .await
        {
            Ok(Some(message_ref)) => self.confirmations.set_message_ref(context_id, message_ref),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "send_confirmation failed, falling back to plain text");
                self.messenger
                    .send_text(
                        context_id,
                        thread_id.as_deref(),
                        &format!(
                            "New task {task_id} — reply yes/no to confirm: {description}"
                        ),
                    )
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn resolve_confirmation(
        &self,
        context_id: &str,
        thread_id: Option<&str>,
        accepted: bool,
    ) -> pilot_core::Result<()> {
        match self.confirmations.take(context_id) {
            None => {
                self.messenger
                    .send_text(context_id, thread_id, "No pending task to confirm.")
                    .await?;
            }
            Some(pending) => {
                if accepted {
                    self.execute_task(pending).await?;
                } else {
                    self.messenger
                        .send_text(
                            context_id,
                            thread_id,
                            &format!("Task {} cancelled.", pending.task_id),
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Sweeps confirmations older than the configured TTL, notifying each
    /// originating context that its task expired. Intended to be driven by
    /// a periodic caller-owned tick.
    pub async fn sweep_expired_confirmations(&self) -> pilot_core::Result<()> {
        for expired in self.confirmations.sweep_expired() {
            self.messenger
                .send_text(
                    &expired.context_id,
                    expired.thread_id.as_deref(),
                    &format!("Task {} expired waiting for confirmation.", expired.task_id),
                )
                .await?;
        }
        Ok(())
    }

    /// Builds the Task from an accepted PendingTask and persists it as a
    /// queued Execution row. A per-project worker drains the queue and
    /// invokes the Runner — admission here is durable, not synchronous.
    async fn execute_task(&self, pending: PendingTask) -> pilot_core::Result<()> {
        let ephemeral =
            self.config.ephemeral_detection_enabled && classify::is_ephemeral_task(&pending.description);
        let create_pr = pending.forced_create_pr.unwrap_or(!ephemeral);
        let (branch, base_branch) = if create_pr {
            (Some(format!("pilot/{}", pending.task_id)), Some("main".to_string()))
        } else {
            (None, None)
        };

        let progress = self
            .messenger
            .format_progress_update(&pending.task_id, "starting", 0, "queued for this project");
        self.messenger
            .send_text(&pending.context_id, pending.thread_id.as_deref(), &progress)
            .await?;

        let project_path = self.active_project(&pending.context_id).unwrap_or_default();
        let title = truncate_title(&pending.description, self.config.max_title_len);

        let execution = Execution::new(
            Uuid::new_v4().to_string(),
            pending.task_id.clone(),
            project_path,
            pending.context_id.clone(),
            pending.thread_id.clone(),
            DeferredTask {
                title,
                description: pending.description.clone(),
                branch,
                base_branch,
                create_pr,
                verbose: false,
            },
        );

        self.store
            .insert_execution(&execution)
            .await
            .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;

        Ok(())
    }

    // ---- slash commands ----

    async fn handle_command(&self, msg: &IncomingMessage, text: &str) -> pilot_core::Result<()> {
        let context_id = &msg.context_id;
        let thread_id = msg.thread_id.as_deref();

        match parse_command(text) {
            SlashCommand::Start => {
                self.messenger
                    .send_text(
                        context_id,
                        thread_id,
                        "Hi! Tell me what you'd like done, or send /help for commands.",
                    )
                    .await?;
            }
            SlashCommand::Help => {
                self.messenger.send_text(context_id, thread_id, &help_text()).await?;
            }
            SlashCommand::Status => {
                let project = self.active_project(context_id).unwrap_or_else(|| "none".to_string());
                let remaining = self.rate_limiter.remaining_tasks(context_id);
                let has_pending = self.confirmations.get(context_id).is_some();
                let text = format!(
                    "Active project: {project}\nPending confirmation: {}\nTask budget remaining: {remaining}",
                    if has_pending { "yes" } else { "no" }
                );
                self.messenger.send_text(context_id, thread_id, &text).await?;
            }
            SlashCommand::Cancel => match self.confirmations.take(context_id) {
                Some(pending) => {
                    self.messenger
                        .send_text(
                            context_id,
                            thread_id,
                            &format!("Task {} cancelled.", pending.task_id),
                        )
                        .await?;
                }
                None => {
                    self.messenger
                        .send_text(context_id, thread_id, "No pending task to confirm.")
                        .await?;
                }
            },
            SlashCommand::Queue | SlashCommand::Tasks | SlashCommand::List => {
                self.reply_with_executions(context_id, thread_id, 20).await?;
            }
            SlashCommand::Projects => {
                let projects = self
                    .store
                    .list_projects()
                    .await
                    .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;
                let text = if projects.is_empty() {
                    "No projects registered yet.".to_string()
                } else {
                    projects
                        .iter()
                        .map(|p| format!("- {} ({})", p.name, p.path))
                        .collect::<Vec<_>>()
                        .join("\n")
                };
                self.messenger.send_text(context_id, thread_id, &text).await?;
            }
            SlashCommand::Project => {
                let text = match self.active_project(context_id) {
                    Some(path) => format!("Active project: {path}"),
                    None => "No active project — use /switch <name>.".to_string(),
                };
                self.messenger.send_text(context_id, thread_id, &text).await?;
            }
            SlashCommand::Switch { name } => {
                let projects = self
                    .store
                    .list_projects()
                    .await
                    .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;
                match projects.into_iter().find(|p| p.name == name || p.path.ends_with(&name)) {
                    Some(project) => {
                        self.set_active_project(context_id, project.path.clone());
                        let session = self
                            .store
                            .get_or_create_session(context_id)
                            .await
                            .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;
                        self.store
                            .set_session_project(&session.id, &project.path)
                            .await
                            .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;
                        self.messenger
                            .send_text(context_id, thread_id, &format!("Switched to {}.", project.name))
                            .await?;
                    }
                    None => {
                        self.messenger
                            .send_text(context_id, thread_id, &format!("No known project matches '{name}'."))
                            .await?;
                    }
                }
            }
            SlashCommand::History => {
                self.reply_with_executions(context_id, thread_id, 10).await?;
            }
            SlashCommand::Budget => {
                let Some(project) = self.active_project(context_id) else {
                    self.messenger
                        .send_text(context_id, thread_id, "No active project — use /switch <name>.")
                        .await?;
                    return Ok(());
                };
                let since = Utc::now() - chrono::Duration::days(30);
                let summary = self
                    .store
                    .usage_summary_for_project(&project, since)
                    .await
                    .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;
                let text = format!(
                    "Last 30 days for {project}:\nTasks: {}\nCompute seconds: {}\nTokens in/out: {}/{}",
                    summary.task_count, summary.compute_seconds, summary.tokens_input, summary.tokens_output
                );
                self.messenger.send_text(context_id, thread_id, &text).await?;
            }
            SlashCommand::Run { id } => {
                let execution = self
                    .store
                    .get_execution(&id)
                    .await
                    .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;
                self.propose_task(
                    context_id,
                    msg.thread_id.clone(),
                    execution.task.description,
                    msg.sender_id.clone(),
                    None,
                )
                .await?;
            }
            SlashCommand::Stop => {
                let Some(project) = self.active_project(context_id) else {
                    self.messenger
                        .send_text(context_id, thread_id, "No active project — nothing to stop.")
                        .await?;
                    return Ok(());
                };
                let running = self
                    .store
                    .list_executions_for_project(&project, 50)
                    .await
                    .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?
                    .into_iter()
                    .find(|e| e.status == ExecutionStatus::Running);
                match running {
                    Some(execution) => {
                        self.cancellations.cancel(&execution.id).await;
                        self.messenger
                            .send_text(context_id, thread_id, &format!("Stopping execution {}.", execution.id))
                            .await?;
                    }
                    None => {
                        self.messenger
                            .send_text(context_id, thread_id, "Nothing running for this project.")
                            .await?;
                    }
                }
            }
            SlashCommand::Brief => {
                let project = self.active_project(context_id).unwrap_or_else(|| "none".to_string());
                self.messenger
                    .send_text(context_id, thread_id, &format!("Project: {project}"))
                    .await?;
            }
            SlashCommand::NoPr { description } => {
                self.propose_task(
                    context_id,
                    msg.thread_id.clone(),
                    description,
                    msg.sender_id.clone(),
                    Some(false),
                )
                .await?;
            }
            SlashCommand::Pr { description } => {
                self.propose_task(
                    context_id,
                    msg.thread_id.clone(),
                    description,
                    msg.sender_id.clone(),
                    Some(true),
                )
                .await?;
            }
            SlashCommand::Unknown { raw } => {
                self.messenger
                    .send_text(context_id, thread_id, &format!("Unknown command: {raw}. Try /help."))
                    .await?;
            }
        }
        Ok(())
    }

    async fn reply_with_executions(
        &self,
        context_id: &str,
        thread_id: Option<&str>,
        limit: i64,
    ) -> pilot_core::Result<()> {
        let Some(project) = self.active_project(context_id) else {
            self.messenger
                .send_text(context_id, thread_id, "No active project — use /switch <name>.")
                .await?;
            return Ok(());
        };
        let executions = self
            .store
            .list_executions_for_project(&project, limit)
            .await
            .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;
        let text = if executions.is_empty() {
            "No executions yet for this project.".to_string()
        } else {
            executions
                .iter()
                .map(|e| format!("{} [{}] {}", e.id, e.status, e.task.title))
                .collect::<Vec<_>>()
                .join("\n")
        };
        self.messenger.send_text(context_id, thread_id, &text).await?;
        Ok(())
    }

    #[allow(dead_code)]
    fn recent_history(&self, context_id: &str) -> Vec<String> {
        self.with_context(context_id, |state| {
            state
                .history
                .iter()
                .rev()
                .take(HISTORY_WINDOW)
                .map(|turn| match turn.role {
                    TurnRole::User => format!("user: {}", turn.text),
                    TurnRole::Assistant => format!("assistant: {}", turn.text),
                })
                .collect()
        })
    }
}

fn cap_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        text.to_string()
    } else {
        words[..max_words].join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::test_doubles::{FixedClassifier, RecordingMessenger, StubRunner};
    use pilot_store::Store;
    use std::sync::Arc;

    fn test_config() -> DispatchConfig {
        DispatchConfig {
            message_bucket: crate::rate_limiter::BucketConfig {
                capacity: 10.0,
                refill_per_sec: 1.0,
            },
            task_bucket: crate::rate_limiter::BucketConfig {
                capacity: 5.0,
                refill_per_sec: 1.0 / 3600.0,
            },
            confirmation_ttl: chrono::Duration::minutes(5),
            classifier_timeout: Duration::from_secs(2),
            max_title_len: 60,
            ephemeral_detection_enabled: true,
        }
    }

    async fn dispatcher_with(
        messenger: Arc<RecordingMessenger>,
    ) -> (Dispatcher, Arc<RecordingMessenger>) {
        let store = Store::open_in_memory().await.unwrap();
        let runner = Arc::new(StubRunner::succeeding("done"));
        let dispatcher = Dispatcher::new(
            messenger.clone(),
            runner,
            Some(Arc::new(FixedClassifier(Intent::Chat))),
            store,
            CancellationRegistry::new(),
            test_config(),
        );
        (dispatcher, messenger)
    }

    fn msg(context_id: &str, sender: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            context_id: context_id.to_string(),
            sender_id: sender.to_string(),
            sender_display_name: String::new(),
            thread_id: None,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn greeting_sends_exactly_one_message_and_no_pending_task() {
        let messenger = Arc::new(RecordingMessenger::new());
        let (dispatcher, messenger) = dispatcher_with(messenger).await;

        dispatcher.handle_message(msg("c1", "u1", "hello")).await.unwrap();

        let sent = messenger.sent_texts().await;
        assert_eq!(sent, vec!["Hi!".to_string()]);
        assert!(dispatcher.confirmations.get("c1").is_none());
    }

    #[tokio::test]
    async fn confirmation_without_pending_task_reports_none() {
        let messenger = Arc::new(RecordingMessenger::new());
        let (dispatcher, messenger) = dispatcher_with(messenger).await;

        dispatcher.handle_message(msg("c1", "u1", "yes")).await.unwrap();

        let sent = messenger.sent_texts().await;
        assert_eq!(sent, vec!["No pending task to confirm.".to_string()]);
    }

    #[tokio::test]
    async fn task_confirmation_cycle_registers_then_cancels() {
        let messenger = Arc::new(RecordingMessenger::new());
        let store = Store::open_in_memory().await.unwrap();
        let runner = Arc::new(StubRunner::succeeding("done"));
        let dispatcher = Dispatcher::new(
            messenger.clone(),
            runner,
            Some(Arc::new(FixedClassifier(Intent::Task))),
            store,
            CancellationRegistry::new(),
            test_config(),
        );

        dispatcher
            .handle_message(msg("c1", "u1", "rename Foo to Bar everywhere"))
            .await
            .unwrap();
        assert!(dispatcher.confirmations.get("c1").is_some());

        dispatcher.handle_message(msg("c1", "u1", "no")).await.unwrap();
        assert!(dispatcher.confirmations.get("c1").is_none());

        let sent = messenger.sent_texts().await;
        assert!(sent.last().unwrap().contains("cancelled"));
    }

    #[tokio::test]
    async fn rate_limited_second_message_skips_classification() {
        let messenger = Arc::new(RecordingMessenger::new());
        let store = Store::open_in_memory().await.unwrap();
        let runner = Arc::new(StubRunner::succeeding("done"));
        let mut config = test_config();
        config.message_bucket = crate::rate_limiter::BucketConfig {
            capacity: 1.0,
            refill_per_sec: 1.0 / 60.0,
        };
        let dispatcher = Dispatcher::new(
            messenger.clone(),
            runner,
            Some(Arc::new(FixedClassifier(Intent::Chat))),
            store,
            CancellationRegistry::new(),
            config,
        );

        dispatcher.handle_message(msg("c1", "u1", "hello")).await.unwrap();
        dispatcher.handle_message(msg("c1", "u1", "hello again")).await.unwrap();

        let sent = messenger.sent_texts().await;
        assert_eq!(sent.len(), 2);
        assert!(sent[1].contains("fast"));
    }

    #[tokio::test]
    async fn slash_prefixed_text_never_reaches_the_classifier() {
        let messenger = Arc::new(RecordingMessenger::new());
        let store = Store::open_in_memory().await.unwrap();
        let runner = Arc::new(StubRunner::succeeding("done"));
        struct PanicClassifier;
        #[async_trait::async_trait]
        impl Classifier for PanicClassifier {
            async fn classify(&self, _msg: &IncomingMessage) -> pilot_core::Result<Intent> {
                panic!("classifier should never be invoked for slash commands");
            }
        }
        let dispatcher = Dispatcher::new(
            messenger.clone(),
            runner,
            Some(Arc::new(PanicClassifier)),
            store,
            CancellationRegistry::new(),
            test_config(),
        );

        dispatcher.handle_message(msg("c1", "u1", "/help")).await.unwrap();
        let sent = messenger.sent_texts().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Commands"));
    }

    #[test]
    fn cap_words_truncates_long_text() {
        let text = (0..10).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        assert_eq!(cap_words(&text, 3), "0 1 2");
        assert_eq!(cap_words("short text", 10), "short text");
    }
}
