//! Queue-specific configuration layered on top of `pilot_core::PilotConfig`.

use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// How long a worker sleeps between empty polls of its project's queue
    /// when no enqueue notification arrives in the meantime.
    pub poll_interval: Duration,
    /// Executions left `running` longer than this at startup are presumed
    /// orphaned by a crash and transitioned to `cancelled`.
    pub stale_after: Duration,
}

impl QueueConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let poll_interval_secs = env_u64("PILOT_QUEUE_POLL_INTERVAL_SECS", 5)?;
        let stale_after_secs = env_u64("PILOT_QUEUE_STALE_AFTER_SECS", 3600)?;

        Ok(Self {
            poll_interval: Duration::from_secs(poll_interval_secs),
            stale_after: Duration::from_secs(stale_after_secs),
        })
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stale_after: Duration::from_secs(3600),
        }
    }
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_env_applies_defaults_when_unset() {
        std::env::remove_var("PILOT_QUEUE_POLL_INTERVAL_SECS");
        std::env::remove_var("PILOT_QUEUE_STALE_AFTER_SECS");
        let config = QueueConfig::from_env().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.stale_after, Duration::from_secs(3600));
    }
}
