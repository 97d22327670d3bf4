//! Task registry for engine background work.
//!
//! Tracks spawned tasks, provides the shared scheduler for per-query
//! deadline timers and supports cooperative shutdown.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for JoinHandle storage because:
//! 1. Operations are O(n) prune-and-push or O(n) drain (shutdown only)
//! 2. Lock is never held across `.await` points
//! 3. No I/O or async work inside lock scope

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

/// Cancellable handle to a one-shot timer
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    /// Cancel the timer; no-op if it already fired or was cancelled
    pub fn cancel(&self) {
        self.abort.abort();
    }

    /// Whether the timer task has run to completion or been cancelled
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Registry of background tasks sharing one shutdown signal
#[derive(Debug)]
pub struct TaskRegistry {
    shutdown_tx: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (shutdown_tx, _shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a task that is aborted on shutdown
    ///
    /// Returns `None` once the registry has been shut down.
    pub fn spawn<F>(&self, fut: F) -> Option<AbortHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // Checked under the handles lock so shutdown cannot miss the task
        let mut handles = self.handles.lock();
        if self.is_shut_down() {
            return None;
        }
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => {}
                _ = fut => {}
            }
        });
        let abort = handle.abort_handle();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Some(abort)
    }

    /// Run `fut` once after `delay` unless cancelled first
    pub fn spawn_after<F>(&self, delay: Duration, fut: F) -> Option<TimerHandle>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(async move {
            tokio::time::sleep(delay).await;
            fut.await;
        })
        .map(|abort| TimerHandle { abort })
    }

    /// Abort every tracked task and refuse new ones
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
    }

    /// Whether `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Number of tracked tasks that have not finished yet
    pub fn active_tasks(&self) -> usize {
        self.handles.lock().iter().filter(|h| !h.is_finished()).count()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
