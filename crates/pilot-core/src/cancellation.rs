use tokio_util::sync::CancellationToken;

/// One token per running execution, held by the queue worker and checked by
/// long-running Runner implementations so a user's `/cancel` can interrupt
/// an in-flight task promptly.
#[derive(Clone, Default)]
pub struct CancellationRegistry {
    inner: std::sync::Arc<tokio::sync::Mutex<std::collections::HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, execution_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner
            .lock()
            .await
            .insert(execution_id.to_string(), token.clone());
        token
    }

    pub async fn cancel(&self, execution_id: &str) -> bool {
        if let Some(token) = self.inner.lock().await.remove(execution_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub async fn clear(&self, execution_id: &str) {
        self.inner.lock().await.remove(execution_id);
    }
}
