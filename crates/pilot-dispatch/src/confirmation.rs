//! Holds pending tasks awaiting a yes/no reply, one per context.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{Duration, Utc};
use pilot_types::PendingTask;

#[derive(Default)]
pub struct ConfirmationRegistry {
    ttl: std::sync::OnceLock<Duration>,
    pending: Mutex<HashMap<String, PendingTask>>,
}

impl ConfirmationRegistry {
    pub fn new(ttl: Duration) -> Self {
        let registry = Self::default();
        let _ = registry.ttl.set(ttl);
        registry
    }

    fn ttl(&self) -> Duration {
        *self.ttl.get().unwrap_or(&Duration::minutes(5))
    }

    /// Registers a new pending task. Returns `false` without registering if
    /// one already exists for this context — callers must check
    /// `get` first for the "you already have a pending task" reply.
    pub fn register(&self, task: PendingTask) -> bool {
        let mut pending = self.pending.lock().expect("confirmation mutex poisoned");
        if pending.contains_key(&task.context_id) {
            return false;
        }
        pending.insert(task.context_id.clone(), task);
        true
    }

    pub fn get(&self, context_id: &str) -> Option<PendingTask> {
        self.pending
            .lock()
            .expect("confirmation mutex poisoned")
            .get(context_id)
            .cloned()
    }

    pub fn set_message_ref(&self, context_id: &str, message_ref: String) {
        if let Some(task) = self
            .pending
            .lock()
            .expect("confirmation mutex poisoned")
            .get_mut(context_id)
        {
            task.message_ref = Some(message_ref);
        }
    }

    /// Atomically removes the pending task for a context, returning it if
    /// one existed. This is the only way a pending task is ever consumed.
    pub fn take(&self, context_id: &str) -> Option<PendingTask> {
        self.pending
            .lock()
            .expect("confirmation mutex poisoned")
            .remove(context_id)
    }

    /// Removes and returns every pending task whose age is at least the
    /// registry's TTL, for the periodic expiry sweep.
    pub fn sweep_expired(&self) -> Vec<PendingTask> {
        let now = Utc::now();
        let ttl = self.ttl();
        let mut pending = self.pending.lock().expect("confirmation mutex poisoned");
        let expired_keys: Vec<String> = pending
            .iter()
            .filter(|(_, task)| task.is_expired(now, ttl))
            .map(|(k, _)| k.clone())
            .collect();
        expired_keys
            .into_iter()
            .filter_map(|k| pending.remove(&k))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(context_id: &str) -> PendingTask {
        PendingTask::new(
            "MSG-1".to_string(),
            "do the thing".to_string(),
            context_id.to_string(),
            None,
            "u1".to_string(),
        )
    }

    #[test]
    fn register_rejects_second_pending_task_for_same_context() {
        let registry = ConfirmationRegistry::new(Duration::minutes(5));
        assert!(registry.register(sample("c1")));
        assert!(!registry.register(sample("c1")));
    }

    #[test]
    fn take_removes_and_returns_once() {
        let registry = ConfirmationRegistry::new(Duration::minutes(5));
        registry.register(sample("c1"));
        assert!(registry.take("c1").is_some());
        assert!(registry.take("c1").is_none());
    }

    #[test]
    fn sweep_expired_only_removes_old_entries() {
        let registry = ConfirmationRegistry::new(Duration::minutes(5));
        let mut old = sample("c1");
        old.created_at = Utc::now() - Duration::minutes(10);
        registry.register(old);
        registry.register(sample("c2"));

        let expired = registry.sweep_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].context_id, "c1");
        assert!(registry.get("c2").is_some());
    }
}
