use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

/// One-shot delayed re-invocation of the engine. The engine reads its own
/// checkpoint when called again, so the trigger carries no arguments.
#[async_trait]
pub trait ResumeScheduler: Send + Sync {
    /// Ask to be invoked again after `delay`, replacing any pending request
    async fn schedule(&self, delay: Duration);

    /// Drop any pending request
    async fn cancel(&self);
}

/// Keeps the last requested delay. A host loop (or a test) polls
/// `pending()` and performs the re-invocation itself.
#[derive(Debug, Clone, Default)]
pub struct RecordingScheduler {
    pending: Arc<Mutex<Option<Duration>>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Duration>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn pending(&self) -> Option<Duration> {
        *self.lock()
    }

    /// Take the pending request, leaving none behind
    pub fn take(&self) -> Option<Duration> {
        self.lock().take()
    }
}

#[async_trait]
impl ResumeScheduler for RecordingScheduler {
    async fn schedule(&self, delay: Duration) {
        info!("[RecordingScheduler] resume requested in {:?}", delay);
        *self.lock() = Some(delay);
    }

    async fn cancel(&self) {
        *self.lock() = None;
    }
}
