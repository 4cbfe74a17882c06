//! Per-context token-bucket admission control for messages and tasks.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    fn try_consume(&mut self, config: BucketConfig) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * config.refill_per_sec).min(config.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn remaining(&self, config: BucketConfig) -> u32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        let tokens = (self.tokens + elapsed * config.refill_per_sec).min(config.capacity);
        tokens.floor() as u32
    }
}

/// Two token buckets per context: a short-horizon one for messages and a
/// long-horizon one for tasks.
pub struct RateLimiter {
    message_config: BucketConfig,
    task_config: BucketConfig,
    messages: Mutex<HashMap<String, Bucket>>,
    tasks: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(message_config: BucketConfig, task_config: BucketConfig) -> Self {
        Self {
            message_config,
            task_config,
            messages: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn allow_message(&self, context_id: &str) -> bool {
        let mut buckets = self.messages.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry(context_id.to_string())
            .or_insert_with(|| Bucket::new(self.message_config.capacity));
        bucket.try_consume(self.message_config)
    }

    pub fn allow_task(&self, context_id: &str) -> bool {
        let mut buckets = self.tasks.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry(context_id.to_string())
            .or_insert_with(|| Bucket::new(self.task_config.capacity));
        bucket.try_consume(self.task_config)
    }

    pub fn remaining_tasks(&self, context_id: &str) -> u32 {
        let mut buckets = self.tasks.lock().expect("rate limiter mutex poisoned");
        let bucket = buckets
            .entry(context_id.to_string())
            .or_insert_with(|| Bucket::new(self.task_config.capacity));
        bucket.remaining(self.task_config)
    }
}
