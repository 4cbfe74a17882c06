//! Dispatch-specific configuration layered on top of `pilot_core::PilotConfig`.
//!
//! Mirrors the channel-adapter `*_from_env()` style: every knob has a
//! `PILOT_*` env var and a sensible default, and `from_env()` only fails if
//! a value is present but unparsable.

use anyhow::Context;
use pilot_core::PilotConfig;

use crate::rate_limiter::BucketConfig;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub message_bucket: BucketConfig,
    pub task_bucket: BucketConfig,
    pub confirmation_ttl: chrono::Duration,
    pub classifier_timeout: std::time::Duration,
    pub max_title_len: usize,
    pub ephemeral_detection_enabled: bool,
}

impl DispatchConfig {
    pub fn from_pilot_config(pilot: &PilotConfig) -> anyhow::Result<Self> {
        let task_capacity = env_f64("PILOT_TASK_RATE_LIMIT_CAPACITY", 5.0)?;
        let task_refill_per_sec = env_f64("PILOT_TASK_RATE_LIMIT_REFILL_PER_SEC", 1.0 / 3600.0)?;
        let classifier_timeout_secs = env_u64("PILOT_CLASSIFIER_TIMEOUT_SECS", 2)?;
        let ephemeral_detection_enabled = match std::env::var("PILOT_EPHEMERAL_DETECTION_ENABLED") {
            Ok(raw) => raw.parse().with_context(|| "invalid PILOT_EPHEMERAL_DETECTION_ENABLED")?,
            Err(_) => true,
        };

        Ok(Self {
            message_bucket: BucketConfig {
                capacity: pilot.rate_limit_capacity as f64,
                refill_per_sec: pilot.rate_limit_refill_per_sec,
            },
            task_bucket: BucketConfig {
                capacity: task_capacity,
                refill_per_sec: task_refill_per_sec,
            },
            confirmation_ttl: chrono::Duration::from_std(pilot.confirmation_ttl)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            classifier_timeout: std::time::Duration::from_secs(classifier_timeout_secs),
            max_title_len: pilot.max_title_len,
            ephemeral_detection_enabled,
        })
    }
}

fn env_f64(key: &str, default: f64) -> anyhow::Result<f64> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}

fn env_u64(key: &str, default: u64) -> anyhow::Result<u64> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().with_context(|| format!("invalid {key}")),
        Err(_) => Ok(default),
    }
}
