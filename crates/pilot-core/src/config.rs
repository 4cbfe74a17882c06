//! Process configuration, loaded from environment variables.
//!
//! Mirrors the channel-adapter config style: every field has a `PILOT_*` env
//! var, sensible defaults are applied where one exists, and `from_env()`
//! fails only when a genuinely required value is missing.

use std::time::Duration;

use anyhow::{bail, Context};

#[derive(Debug, Clone)]
pub struct PilotConfig {
    /// Path to the sqlite database file backing pilot-store.
    pub database_path: String,
    /// Confirmation TTL before a pending task silently expires.
    pub confirmation_ttl: Duration,
    /// Token-bucket capacity per sender.
    pub rate_limit_capacity: u32,
    /// Token-bucket refill rate, tokens/second.
    pub rate_limit_refill_per_sec: f64,
    /// How often the dispatcher sweeps expired confirmations.
    pub sweep_interval: Duration,
    /// Max description length before a task title is truncated.
    pub max_title_len: usize,
    /// Confidence threshold below which a pattern is no longer surfaced.
    pub min_pattern_confidence: f64,
}

impl PilotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_path = std::env::var("PILOT_DATABASE_PATH")
            .unwrap_or_else(|_| "pilot.db".to_string());

        let confirmation_ttl = Duration::from_secs(env_u64("PILOT_CONFIRMATION_TTL_SECS", 300)?);
        let rate_limit_capacity = env_u32("PILOT_RATE_LIMIT_CAPACITY", 5)?;
        let rate_limit_refill_per_sec = env_f64("PILOT_RATE_LIMIT_REFILL_PER_SEC", 1.0)?;
        let sweep_interval = Duration::from_secs(env_u64("PILOT_SWEEP_INTERVAL_SECS", 60)?);
        let max_title_len = env_u32("PILOT_MAX_TITLE_LEN", 72)? as usize;
        let min_pattern_confidence = env_f64("PILOT_MIN_PATTERN_CONFIDENCE", 0.1)?;

        if database_path.trim().is_empty() {
            bail!("PILOT_DATABASE_PATH must not be empty");
        }

        Ok(Self {
            database_path,
            confirmation_ttl,
            rate_limit_capacity,
            rate_limit_refill_per_sec,
            sweep_interval,
            max_title_len,
            min_pattern_confidence,
        })
    }
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &str, default: u32) -> anyhow::Result<u32> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn env_f64(key: &str, default: f64) -> anyhow::Result<f64> {
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
        for key in [
            "PILOT_DATABASE_PATH",
            "PILOT_CONFIRMATION_TTL_SECS",
            "PILOT_RATE_LIMIT_CAPACITY",
            "PILOT_RATE_LIMIT_REFILL_PER_SEC",
            "PILOT_SWEEP_INTERVAL_SECS",
            "PILOT_MAX_TITLE_LEN",
            "PILOT_MIN_PATTERN_CONFIDENCE",
        ] {
            std::env::remove_var(key);
        }
        let config = PilotConfig::from_env().expect("defaults should be valid");
        assert_eq!(config.database_path, "pilot.db");
        assert_eq!(config.confirmation_ttl, Duration::from_secs(300));
        assert_eq!(config.rate_limit_capacity, 5);
    }
}
