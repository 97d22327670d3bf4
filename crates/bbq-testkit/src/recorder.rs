//! Completion callback recorder

use bbq_core::ResponseMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<(Instant, ResponseMap)>>,
    notify: Notify,
}

/// Captures every invocation of the callbacks it hands out
#[derive(Clone, Default)]
pub struct CallbackRecorder {
    shared: Arc<Shared>,
}

impl CallbackRecorder {
    /// Recorder with no invocations
    pub fn new() -> Self {
        Self::default()
    }

    /// A completion callback that records into this recorder
    pub fn callback(&self) -> impl FnOnce(ResponseMap) + Send + 'static {
        let shared = self.shared.clone();
        move |responses| {
            shared.calls.lock().push((Instant::now(), responses));
            shared.notify.notify_waiters();
        }
    }

    /// Number of recorded invocations
    pub fn count(&self) -> usize {
        self.shared.calls.lock().len()
    }

    /// Recorded response maps, in invocation order
    pub fn responses(&self) -> Vec<ResponseMap> {
        self.shared.calls.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Time of the `index`-th invocation
    pub fn invoked_at(&self, index: usize) -> Option<Instant> {
        self.shared.calls.lock().get(index).map(|(at, _)| *at)
    }

    /// The only recorded response map; panics unless exactly one call happened
    pub fn single(&self) -> ResponseMap {
        let calls = self.shared.calls.lock();
        assert_eq!(calls.len(), 1, "expected exactly one callback invocation");
        calls[0].1.clone()
    }

    /// Wait until at least `n` invocations were recorded
    pub async fn wait_for(&self, n: usize) {
        loop {
            let mut notified = std::pin::pin!(self.shared.notify.notified());
            notified.as_mut().enable();
            if self.count() >= n {
                return;
            }
            notified.await;
        }
    }
}
