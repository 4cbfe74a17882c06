//! Per-project FIFO worker loop. Each project gets exactly one worker task
//! that drains its queue one execution at a time; workers share no mutable
//! state with each other, only the Store.

use std::collections::HashMap;
use std::sync::Arc;

use pilot_core::{CancellationRegistry, Messenger, Runner};
use pilot_store::Store;
use pilot_types::{Execution, ExecutionResult, Task};
use tokio::sync::Mutex;

use crate::config::QueueConfig;
use crate::traits::{ExecutionObserver, UsageRecorder};

pub struct QueueManager {
    store: Store,
    runner: Arc<dyn Runner>,
    messenger: Arc<dyn Messenger>,
    cancellations: CancellationRegistry,
    usage: Option<Arc<dyn UsageRecorder>>,
    learning: Option<Arc<dyn ExecutionObserver>>,
    config: QueueConfig,
    known_projects: Mutex<HashMap<String, ()>>,
}

impl QueueManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        runner: Arc<dyn Runner>,
        messenger: Arc<dyn Messenger>,
        cancellations: CancellationRegistry,
        usage: Option<Arc<dyn UsageRecorder>>,
        learning: Option<Arc<dyn ExecutionObserver>>,
        config: QueueConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            runner,
            messenger,
            cancellations,
            usage,
            learning,
            config,
            known_projects: Mutex::new(HashMap::new()),
        })
    }

    /// Transitions executions left `running` by a crashed process to
    /// `cancelled`. Must run once, before any worker starts claiming rows.
    pub async fn recover_orphans(&self) -> pilot_core::Result<usize> {
        let stale = self
            .store
            .list_stale_running_executions(
                chrono::Duration::from_std(self.config.stale_after)
                    .unwrap_or_else(|_| chrono::Duration::hours(1)),
            )
            .await
            .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;

        for execution in &stale {
            self.store
                .cancel_execution(&execution.id, "orphaned by restart")
                .await
                .map_err(|e| pilot_core::PilotError::Store(e.to_string()))?;
            tracing::warn!(execution_id = %execution.id, "cancelled orphaned running execution");
        }
        Ok(stale.len())
    }

    /// Runs forever: periodically rediscovers projects and makes sure each
    /// one has a live worker. Returns only if a project listing call fails
    /// repeatedly — callers normally `tokio::spawn` this and never await it.
    pub async fn run_forever(self: Arc<Self>) {
        loop {
            match self.store.list_projects().await {
                Ok(projects) => {
                    for project in projects {
                        Arc::clone(&self).ensure_worker(project.path).await;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to list projects for queue discovery"),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Spawns a worker for `project_path` if one isn't already running.
    pub async fn ensure_worker(self: Arc<Self>, project_path: String) {
        let mut known = self.known_projects.lock().await;
        if known.contains_key(&project_path) {
            return;
        }
        known.insert(project_path.clone(), ());
        drop(known);

        tokio::spawn(async move {
            self.worker_loop(project_path).await;
        });
    }

    async fn worker_loop(self: Arc<Self>, project_path: String) {
        loop {
            match self.store.claim_next_execution(&project_path).await {
                Ok(Some(execution)) => self.run_execution(execution).await,
                Ok(None) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    tracing::warn!(project = %project_path, error = %e, "queue claim failed");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    async fn run_execution(&self, execution: Execution) {
        let token = self.cancellations.register(&execution.id).await;
        let task = Task {
            id: execution.id.clone(),
            title: execution.task.title.clone(),
            description: execution.task.description.clone(),
            project_path: execution.project_path.clone(),
            branch: execution.task.branch.clone(),
            base_branch: execution.task.base_branch.clone(),
            create_pr: execution.task.create_pr,
            verbose: execution.task.verbose,
            member_id: None,
        };

        let result = tokio::select! {
            result = self.runner.execute(&task) => Some(result),
            _ = token.cancelled() => None,
        };
        self.cancellations.clear(&execution.id).await;

        match result {
            Some(Ok(result)) => self.finish_success(&execution, result).await,
            Some(Err(e)) => self.finish_failure(&execution, &e.to_string()).await,
            None => self.finish_cancelled(&execution).await,
        }
    }

    async fn finish_success(&self, execution: &Execution, result: ExecutionResult) {
        if let Err(e) = self.store.complete_execution(&execution.id, &result).await {
            tracing::error!(execution_id = %execution.id, error = %e, "failed to persist completed execution");
        }

        if let Some(usage) = &self.usage {
            usage.record_task_usage(execution, &result).await;
        }
        if let Some(learning) = &self.learning {
            learning.record_execution(execution, &result).await;
        }

        let text = self.messenger.format_task_result(&result);
        self.reply(execution, &text).await;
    }

    async fn finish_failure(&self, execution: &Execution, error: &str) {
        let result = ExecutionResult {
            success: false,
            output: String::new(),
            error: Some(error.to_string()),
            tokens_input: None,
            tokens_output: None,
            duration_ms: 0,
            pr_url: None,
            commit_sha: None,
            model: None,
            applied_pattern_ids: Vec::new(),
        };
        if let Err(e) = self.store.complete_execution(&execution.id, &result).await {
            tracing::error!(execution_id = %execution.id, error = %e, "failed to persist failed execution");
        }
        let text = self.messenger.format_task_result(&result);
        self.reply(execution, &text).await;
    }

    async fn finish_cancelled(&self, execution: &Execution) {
        if let Err(e) = self
            .store
            .cancel_execution(&execution.id, "cancelled by user")
            .await
        {
            tracing::error!(execution_id = %execution.id, error = %e, "failed to persist cancelled execution");
        }
        self.reply(
            execution,
            &format!("Task {} cancelled.", execution.task_id),
        )
        .await;
    }

    async fn reply(&self, execution: &Execution, text: &str) {
        if let Err(e) = self
            .messenger
            .send_text(&execution.context_id, execution.thread_id.as_deref(), text)
            .await
        {
            tracing::warn!(execution_id = %execution.id, error = %e, "failed to deliver execution reply");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::test_doubles::{RecordingMessenger, StubRunner};
    use pilot_types::DeferredTask;

    fn sample_execution(id: &str) -> Execution {
        Execution::new(
            id.to_string(),
            "task-1".to_string(),
            "/repo".to_string(),
            "ctx-1".to_string(),
            None,
            DeferredTask {
                title: "fix bug".to_string(),
                description: "fix the thing".to_string(),
                branch: None,
                base_branch: None,
                create_pr: true,
                verbose: false,
            },
        )
    }

    fn manager_with(
        store: Store,
        runner: Arc<dyn Runner>,
        messenger: Arc<dyn Messenger>,
    ) -> Arc<QueueManager> {
        QueueManager::new(
            store,
            runner,
            messenger,
            CancellationRegistry::new(),
            None,
            None,
            QueueConfig::default(),
        )
    }

    #[tokio::test]
    async fn run_execution_completes_and_replies_on_success() {
        let store = Store::open_in_memory().await.unwrap();
        let execution = sample_execution("exec-1");
        store.insert_execution(&execution).await.unwrap();

        let messenger = Arc::new(RecordingMessenger::new());
        let runner = Arc::new(StubRunner::succeeding("patched the thing"));
        let manager = manager_with(store.clone(), runner, messenger.clone());

        manager.run_execution(execution).await;

        let fetched = store.get_execution("exec-1").await.unwrap();
        assert_eq!(fetched.status, pilot_types::ExecutionStatus::Completed);

        let sent = messenger.sent_texts().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("patched the thing"));
    }

    #[tokio::test]
    async fn recover_orphans_cancels_stale_running_rows() {
        let store = Store::open_in_memory().await.unwrap();
        let mut execution = sample_execution("exec-2");
        execution.status = pilot_types::ExecutionStatus::Running;
        execution.created_at = chrono::Utc::now() - chrono::Duration::hours(2);
        store.insert_execution(&execution).await.unwrap();

        let messenger = Arc::new(RecordingMessenger::new());
        let runner = Arc::new(StubRunner::succeeding("unused"));
        let manager = manager_with(store.clone(), runner, messenger);

        let count = manager.recover_orphans().await.unwrap();
        assert_eq!(count, 1);

        let fetched = store.get_execution("exec-2").await.unwrap();
        assert_eq!(fetched.status, pilot_types::ExecutionStatus::Cancelled);
        assert_eq!(fetched.error.as_deref(), Some("orphaned by restart"));
    }

    #[tokio::test]
    async fn recover_orphans_leaves_fresh_running_rows_alone() {
        let store = Store::open_in_memory().await.unwrap();
        let mut execution = sample_execution("exec-3");
        execution.status = pilot_types::ExecutionStatus::Running;
        store.insert_execution(&execution).await.unwrap();

        let messenger = Arc::new(RecordingMessenger::new());
        let runner = Arc::new(StubRunner::succeeding("unused"));
        let manager = manager_with(store.clone(), runner, messenger);

        let count = manager.recover_orphans().await.unwrap();
        assert_eq!(count, 0);
    }
}
