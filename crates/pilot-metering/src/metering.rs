//! Writes UsageEvents for a completed execution and answers aggregate
//! usage/cost queries over them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pilot_queue::UsageRecorder;
use pilot_store::Store;
use pilot_types::{Execution, ExecutionResult, UsageEvent, UsageEventType};

use crate::pricing::Pricing;
use crate::thresholds::UsageThresholds;

/// An aggregate usage window with cost computed from `Pricing` at query
/// time — the schema doesn't persist a cost column, so prices can change
/// without a backfill.
#[derive(Debug, Clone)]
pub struct MeteredSummary {
    pub task_count: f64,
    pub compute_seconds: f64,
    pub tokens_input: f64,
    pub tokens_output: f64,
    pub estimated_cost_usd: f64,
}

pub struct Metering {
    store: Store,
    pricing: Pricing,
    thresholds: UsageThresholds,
}

impl Metering {
    pub fn new(store: Store, pricing: Pricing, thresholds: UsageThresholds) -> Self {
        Self {
            store,
            pricing,
            thresholds,
        }
    }

    /// Writes up to three UsageEvents for one execution: a task event, a
    /// compute event if duration was observed, and token events if either
    /// count is nonzero. Differentiates input vs output token pricing.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_task_usage(
        &self,
        execution_id: &str,
        org_id: Option<&str>,
        user_id: Option<&str>,
        project_path: &str,
        duration_ms: i64,
        tokens_input: Option<i64>,
        tokens_output: Option<i64>,
    ) -> pilot_store::Result<()> {
        let now = Utc::now();

        self.insert(
            execution_id,
            org_id,
            user_id,
            project_path,
            UsageEventType::Task,
            1.0,
            "task",
            now,
        )
        .await?;

        if duration_ms > 0 {
            self.insert(
                execution_id,
                org_id,
                user_id,
                project_path,
                UsageEventType::Compute,
                duration_ms as f64 / 1000.0,
                "second",
                now,
            )
            .await?;
        }

        if let Some(tokens_input) = tokens_input.filter(|&t| t > 0) {
            self.insert(
                execution_id,
                org_id,
                user_id,
                project_path,
                UsageEventType::TokenInput,
                tokens_input as f64,
                "token",
                now,
            )
            .await?;
        }

        if let Some(tokens_output) = tokens_output.filter(|&t| t > 0) {
            self.insert(
                execution_id,
                org_id,
                user_id,
                project_path,
                UsageEventType::TokenOutput,
                tokens_output as f64,
                "token",
                now,
            )
            .await?;
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert(
        &self,
        execution_id: &str,
        org_id: Option<&str>,
        user_id: Option<&str>,
        project_path: &str,
        event_type: UsageEventType,
        quantity: f64,
        unit: &str,
        created_at: DateTime<Utc>,
    ) -> pilot_store::Result<()> {
        let event = UsageEvent {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: org_id.map(str::to_string),
            user_id: user_id.map(str::to_string),
            project_path: project_path.to_string(),
            execution_id: Some(execution_id.to_string()),
            event_type,
            quantity,
            unit: unit.to_string(),
            created_at,
        };
        self.store.insert_usage_event(&event).await
    }

    pub async fn project_usage_summary(
        &self,
        project_path: &str,
        since: DateTime<Utc>,
    ) -> pilot_store::Result<MeteredSummary> {
        let summary = self
            .store
            .usage_summary_for_project(project_path, since)
            .await?;
        Ok(self.with_cost(summary))
    }

    pub async fn org_usage_summary(
        &self,
        org_id: &str,
        since: DateTime<Utc>,
    ) -> pilot_store::Result<MeteredSummary> {
        let summary = self.store.usage_summary_for_org(org_id, since).await?;
        Ok(self.with_cost(summary))
    }

    pub async fn user_usage_summary(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> pilot_store::Result<MeteredSummary> {
        let summary = self.store.usage_summary_for_user(user_id, since).await?;
        Ok(self.with_cost(summary))
    }

    fn with_cost(&self, summary: pilot_store::UsageSummary) -> MeteredSummary {
        let estimated_cost_usd = self.pricing.cost_usd(&summary);
        MeteredSummary {
            task_count: summary.task_count,
            compute_seconds: summary.compute_seconds,
            tokens_input: summary.tokens_input,
            tokens_output: summary.tokens_output,
            estimated_cost_usd,
        }
    }

    /// Compares a project's current-month totals against the configured
    /// thresholds and returns one alert string per threshold exceeded.
    pub async fn check_project_usage_thresholds(
        &self,
        project_path: &str,
    ) -> pilot_store::Result<Vec<String>> {
        let since = month_start(Utc::now());
        let summary = self.project_usage_summary(project_path, since).await?;
        Ok(self
            .thresholds
            .check(summary.task_count, summary.estimated_cost_usd))
    }

    /// Compares a user's current-month totals across every project against
    /// the configured thresholds and returns one alert string per threshold
    /// exceeded.
    pub async fn check_user_usage_thresholds(&self, user_id: &str) -> pilot_store::Result<Vec<String>> {
        let since = month_start(Utc::now());
        let summary = self.user_usage_summary(user_id, since).await?;
        Ok(self
            .thresholds
            .check(summary.task_count, summary.estimated_cost_usd))
    }
}

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::{Datelike, TimeZone};
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

#[async_trait]
impl UsageRecorder for Metering {
    async fn record_task_usage(&self, execution: &Execution, result: &ExecutionResult) {
        // `Execution` doesn't carry a sender/user id (only the chat context
        // it replies to), so org and user dimensions are unavailable here;
        // only the project dimension is ever populated through this path.
        if let Err(e) = Metering::record_task_usage(
            self,
            &execution.id,
            None,
            None,
            &execution.project_path,
            result.duration_ms,
            result.tokens_input,
            result.tokens_output,
        )
        .await
        {
            tracing::warn!(execution_id = %execution.id, error = %e, "failed to record usage events");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_store::Store;

    #[tokio::test]
    async fn record_task_usage_writes_four_events() {
        let store = Store::open_in_memory().await.unwrap();
        let metering = Metering::new(store.clone(), Pricing::default(), UsageThresholds::default());

        metering
            .record_task_usage(
                "exec-1",
                Some("org-1"),
                Some("user-1"),
                "/repo",
                60_000,
                Some(100),
                Some(200),
            )
            .await
            .unwrap();

        let summary = metering
            .project_usage_summary("/repo", Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(summary.task_count, 1.0);
        assert_eq!(summary.compute_seconds, 60.0);
        assert_eq!(summary.tokens_input, 100.0);
        assert_eq!(summary.tokens_output, 200.0);
        assert!(summary.estimated_cost_usd > 0.0);
    }

    #[tokio::test]
    async fn record_task_usage_skips_zero_duration_and_tokens() {
        let store = Store::open_in_memory().await.unwrap();
        let metering = Metering::new(store.clone(), Pricing::default(), UsageThresholds::default());

        metering
            .record_task_usage("exec-2", None, None, "/repo", 0, None, None)
            .await
            .unwrap();

        let summary = metering
            .project_usage_summary("/repo", Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(summary.task_count, 1.0);
        assert_eq!(summary.compute_seconds, 0.0);
        assert_eq!(summary.tokens_input, 0.0);
    }

    #[tokio::test]
    async fn check_project_usage_thresholds_alerts_when_exceeded() {
        let store = Store::open_in_memory().await.unwrap();
        let thresholds = UsageThresholds {
            monthly_task_count: Some(0.0),
            monthly_cost_usd: None,
        };
        let metering = Metering::new(store.clone(), Pricing::default(), thresholds);

        metering
            .record_task_usage("exec-3", None, None, "/repo", 0, None, None)
            .await
            .unwrap();

        let alerts = metering.check_project_usage_thresholds("/repo").await.unwrap();
        assert_eq!(alerts.len(), 1);
    }

    #[tokio::test]
    async fn check_user_usage_thresholds_alerts_when_exceeded() {
        let store = Store::open_in_memory().await.unwrap();
        let thresholds = UsageThresholds {
            monthly_task_count: Some(0.0),
            monthly_cost_usd: None,
        };
        let metering = Metering::new(store.clone(), Pricing::default(), thresholds);

        metering
            .record_task_usage("exec-4", None, Some("user-1"), "/repo", 0, None, None)
            .await
            .unwrap();

        let alerts = metering.check_user_usage_thresholds("user-1").await.unwrap();
        assert_eq!(alerts.len(), 1);
    }
}
