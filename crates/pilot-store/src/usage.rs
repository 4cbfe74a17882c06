use chrono::{DateTime, Utc};
use pilot_types::{UsageEvent, UsageEventType};
use rusqlite::params;

use crate::db::Store;
use crate::error::Result;

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Aggregate usage totals for a project or org over the queried window.
#[derive(Debug, Clone, Default)]
pub struct UsageSummary {
    pub task_count: f64,
    pub compute_seconds: f64,
    pub tokens_input: f64,
    pub tokens_output: f64,
}

impl Store {
    pub async fn insert_usage_event(&self, event: &UsageEvent) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO usage_events
                (id, org_id, user_id, project_path, execution_id, event_type, quantity, unit, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                event.id,
                event.org_id,
                event.user_id,
                event.project_path,
                event.execution_id,
                event.event_type.to_string(),
                event.quantity,
                event.unit,
                event.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub async fn usage_summary_for_project(
        &self,
        project_path: &str,
        since: DateTime<Utc>,
    ) -> Result<UsageSummary> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT event_type, SUM(quantity) FROM usage_events \
             WHERE project_path = ?1 AND created_at >= ?2 GROUP BY event_type",
        )?;
        let rows = stmt
            .query_map(params![project_path, since.to_rfc3339()], |row| {
                let event_type: String = row.get(0)?;
                let total: f64 = row.get(1)?;
                Ok((event_type, total))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut summary = UsageSummary::default();
        for (event_type, total) in rows {
            match event_type.parse::<UsageEventType>() {
                Ok(UsageEventType::Task) => summary.task_count = total,
                Ok(UsageEventType::Compute) => summary.compute_seconds = total,
                Ok(UsageEventType::TokenInput) => summary.tokens_input = total,
                Ok(UsageEventType::TokenOutput) => summary.tokens_output = total,
                Err(_) => {}
            }
        }
        Ok(summary)
    }

    pub async fn usage_summary_for_org(
        &self,
        org_id: &str,
        since: DateTime<Utc>,
    ) -> Result<UsageSummary> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT event_type, SUM(quantity) FROM usage_events \
             WHERE org_id = ?1 AND created_at >= ?2 GROUP BY event_type",
        )?;
        let rows = stmt
            .query_map(params![org_id, since.to_rfc3339()], |row| {
                let event_type: String = row.get(0)?;
                let total: f64 = row.get(1)?;
                Ok((event_type, total))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut summary = UsageSummary::default();
        for (event_type, total) in rows {
            match event_type.parse::<UsageEventType>() {
                Ok(UsageEventType::Task) => summary.task_count = total,
                Ok(UsageEventType::Compute) => summary.compute_seconds = total,
                Ok(UsageEventType::TokenInput) => summary.tokens_input = total,
                Ok(UsageEventType::TokenOutput) => summary.tokens_output = total,
                Err(_) => {}
            }
        }
        Ok(summary)
    }

    pub async fn usage_summary_for_user(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<UsageSummary> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT event_type, SUM(quantity) FROM usage_events \
             WHERE user_id = ?1 AND created_at >= ?2 GROUP BY event_type",
        )?;
        let rows = stmt
            .query_map(params![user_id, since.to_rfc3339()], |row| {
                let event_type: String = row.get(0)?;
                let total: f64 = row.get(1)?;
                Ok((event_type, total))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut summary = UsageSummary::default();
        for (event_type, total) in rows {
            match event_type.parse::<UsageEventType>() {
                Ok(UsageEventType::Task) => summary.task_count = total,
                Ok(UsageEventType::Compute) => summary.compute_seconds = total,
                Ok(UsageEventType::TokenInput) => summary.tokens_input = total,
                Ok(UsageEventType::TokenOutput) => summary.tokens_output = total,
                Err(_) => {}
            }
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_event(project_path: &str, event_type: UsageEventType, quantity: f64) -> UsageEvent {
        UsageEvent {
            id: uuid::Uuid::new_v4().to_string(),
            org_id: Some("org-1".to_string()),
            user_id: Some("user-1".to_string()),
            project_path: project_path.to_string(),
            execution_id: None,
            event_type,
            quantity,
            unit: "unit".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn usage_summary_aggregates_by_type() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_usage_event(&sample_event("/repo", UsageEventType::Task, 1.0))
            .await
            .unwrap();
        store
            .insert_usage_event(&sample_event("/repo", UsageEventType::Task, 1.0))
            .await
            .unwrap();
        store
            .insert_usage_event(&sample_event("/repo", UsageEventType::TokenInput, 500.0))
            .await
            .unwrap();

        let summary = store
            .usage_summary_for_project("/repo", Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(summary.task_count, 2.0);
        assert_eq!(summary.tokens_input, 500.0);
        assert_eq!(summary.tokens_output, 0.0);
        assert_eq!(summary.compute_seconds, 0.0);
    }

    #[tokio::test]
    async fn usage_summary_for_user_aggregates_by_type() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .insert_usage_event(&sample_event("/repo", UsageEventType::Task, 1.0))
            .await
            .unwrap();
        store
            .insert_usage_event(&sample_event("/other-repo", UsageEventType::Task, 1.0))
            .await
            .unwrap();

        let summary = store
            .usage_summary_for_user("user-1", Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(summary.task_count, 2.0);
    }

    #[tokio::test]
    async fn usage_summary_excludes_events_before_window() {
        let store = Store::open_in_memory().await.unwrap();
        let mut old_event = sample_event("/repo", UsageEventType::Task, 1.0);
        old_event.created_at = Utc::now() - Duration::days(30);
        store.insert_usage_event(&old_event).await.unwrap();

        let summary = store
            .usage_summary_for_project("/repo", Utc::now() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(summary.task_count, 0.0);
    }
}
