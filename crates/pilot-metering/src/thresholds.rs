//! Alerting thresholds checked against a project's current-month usage.
//!
//! The durable schema tracks usage per org/project, not per user, so
//! threshold checks operate at the project level — the most granular scope
//! the store actually records.

use anyhow::Context;

#[derive(Debug, Clone, Copy)]
pub struct UsageThresholds {
    pub monthly_task_count: Option<f64>,
    pub monthly_cost_usd: Option<f64>,
}

impl UsageThresholds {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            monthly_task_count: env_opt_f64("PILOT_THRESHOLD_MONTHLY_TASK_COUNT")?,
            monthly_cost_usd: env_opt_f64("PILOT_THRESHOLD_MONTHLY_COST_USD")?,
        })
    }

    /// Returns one alert string per threshold the given totals exceed.
    pub fn check(&self, task_count: f64, cost_usd: f64) -> Vec<String> {
        let mut alerts = Vec::new();
        if let Some(limit) = self.monthly_task_count {
            if task_count > limit {
                alerts.push(format!(
                    "monthly task count {task_count:.0} exceeds threshold {limit:.0}"
                ));
            }
        }
        if let Some(limit) = self.monthly_cost_usd {
            if cost_usd > limit {
                alerts.push(format!(
                    "monthly cost ${cost_usd:.2} exceeds threshold ${limit:.2}"
                ));
            }
        }
        alerts
    }
}

impl Default for UsageThresholds {
    fn default() -> Self {
        Self {
            monthly_task_count: None,
            monthly_cost_usd: None,
        }
    }
}

fn env_opt_f64(key: &str) -> anyhow::Result<Option<f64>> {
    match std::env::var(key) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(raw.parse().with_context(|| format!("invalid {key}"))?)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_reports_each_exceeded_threshold() {
        let thresholds = UsageThresholds {
            monthly_task_count: Some(10.0),
            monthly_cost_usd: Some(5.0),
        };
        let alerts = thresholds.check(12.0, 3.0);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].contains("task count"));
    }

    #[test]
    fn check_returns_empty_when_unset() {
        let thresholds = UsageThresholds::default();
        assert!(thresholds.check(1_000_000.0, 1_000_000.0).is_empty());
    }
}
