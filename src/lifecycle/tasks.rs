//! Deferred work that outlives the response.
//!
//! # Responsibilities
//! - Run post-response work (cache writes) without delaying the client
//! - Guarantee that work finishes before the process tears down
//!
//! # Design Decisions
//! - Backed by `tokio_util::task::TaskTracker`; tasks are tracked, not joined
//! - Each task runs inside its own span so its logs keep a label

use std::future::Future;

use tokio_util::task::TaskTracker;
use tracing::Instrument;

/// Scheduler for fire-and-forget tasks that must still be allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct DeferredTasks {
    tracker: TaskTracker,
}

impl DeferredTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, label: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = tracing::debug_span!("deferred", task = label);
        self.tracker.spawn(task.instrument(span));
    }

    /// Tasks still running.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for everything spawned so far, then accept new work again.
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Final wait at shutdown.
    pub async fn drain(&self) {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for deferred tasks");
        }
        self.tracker.wait().await;
    }
}
