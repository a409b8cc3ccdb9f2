//! Cancellable scheduled tasks.
//!
//! The pipeline never touches raw timers: inactivity teardown and demo
//! scripts go through [`Scheduler`], which returns a [`TaskHandle`] that can
//! be cancelled at any point. Cancellation is immediate — a cancelled handle
//! never runs (or continues) its task body.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Handle to a scheduled task. Dropping the handle does NOT cancel the
/// task; call [`cancel`](TaskHandle::cancel) explicitly.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    /// Cancel the task. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The cancellation token, for task bodies that check mid-run.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Issues cancellable scheduled tasks on the tokio runtime.
///
/// Cheap to clone; holds no state of its own. Portable in the sense the
/// redesign asks for: callers depend on the `schedule_*` contract, not on
/// tokio timers directly.
#[derive(Debug, Clone, Default)]
pub struct Scheduler;

impl Scheduler {
    pub fn new() -> Self {
        Self
    }

    /// Run `fut` after `delay` unless cancelled first.
    pub fn schedule_once<F>(&self, delay: Duration, fut: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // Re-check: cancel may have raced the sleep expiry.
                    if !task_token.is_cancelled() {
                        fut.await;
                    }
                }
            }
        });
        TaskHandle { token }
    }

    /// Spawn `f` immediately with a cancellation token it must observe.
    ///
    /// Used for multi-step schedules (demo scripts) that need to check for
    /// cancellation between steps.
    pub fn spawn_cancellable<F, Fut>(&self, f: F) -> TaskHandle
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        tokio::spawn(f(token.clone()));
        TaskHandle { token }
    }
}
