//! Completion arbiter
//!
//! Both ways a query can finish, every token answered or the deadline
//! firing, race to remove the query from the pending table. The table
//! removal is the only synchronisation: the caller that gets the entry back
//! is the winner and performs the cleanup and the single callback
//! invocation; the loser sees absence and does nothing.
//!
//! ```text
//! ResponseCollector ──(last token)──┐
//!                                   ├─▶ table.remove(id) ─▶ Some: winner
//! deadline timer ───────────────────┘                      None: no-op
//! winner: cancel timer → unsubscribe → close → callback(responses)
//! ```

use crate::pending::{PendingQuery, PendingQueryTable};
use crate::stats::{bump, EngineCounters};
use bbq_core::effects::TransportEffects;
use bbq_core::{DisposePolicy, QueryId};
use std::fmt;
use std::sync::Arc;

/// Why a query is being completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPath {
    /// Every expected responder answered
    AllGathered,
    /// The deadline timer fired
    Deadline,
    /// The reply subscription could not be registered
    SubscribeFailed,
    /// The engine was disposed with `DisposePolicy::ResolvePartial`
    Disposed,
}

impl fmt::Display for CompletionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AllGathered => "all-gathered",
            Self::Deadline => "deadline",
            Self::SubscribeFailed => "subscribe-failed",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Resolves each query exactly once
pub struct CompletionArbiter {
    table: Arc<PendingQueryTable>,
    transport: Arc<dyn TransportEffects>,
    counters: Arc<EngineCounters>,
}

impl CompletionArbiter {
    pub(crate) fn new(
        table: Arc<PendingQueryTable>,
        transport: Arc<dyn TransportEffects>,
        counters: Arc<EngineCounters>,
    ) -> Self {
        Self {
            table,
            transport,
            counters,
        }
    }

    /// Try to complete `query_id` via `path`; returns whether this call won
    pub fn complete(&self, query_id: QueryId, path: CompletionPath) -> bool {
        match self.table.remove(query_id) {
            Some(query) => {
                self.resolve(&query, path);
                true
            }
            None => {
                tracing::trace!(query_id = %query_id, path = %path, "Query already completed");
                false
            }
        }
    }

    /// Finish a query already removed from the table by the caller
    pub(crate) fn resolve(&self, query: &PendingQuery, path: CompletionPath) {
        self.release(query, path);
        let responses = query.close();

        let counter = match path {
            CompletionPath::AllGathered => &self.counters.completed_gathered,
            CompletionPath::Deadline => &self.counters.completed_deadline,
            CompletionPath::SubscribeFailed => &self.counters.subscribe_failures,
            CompletionPath::Disposed => &self.counters.resolved_on_dispose,
        };
        bump(counter);

        tracing::debug!(
            query_id = %query.query_id(),
            topic = %query.topic(),
            path = %path,
            responses = responses.len(),
            outstanding = query.pending_tokens(),
            "Query completed"
        );

        if let Some(callback) = query.take_callback() {
            callback(responses);
        }
    }

    /// Apply the dispose policy to a query drained from the table
    pub(crate) fn dispose(&self, query: &PendingQuery, policy: DisposePolicy) {
        match policy {
            DisposePolicy::ResolvePartial => self.resolve(query, CompletionPath::Disposed),
            DisposePolicy::Abandon => {
                self.release(query, CompletionPath::Disposed);
                query.close();
                drop(query.take_callback());
                bump(&self.counters.abandoned);
                tracing::warn!(
                    query_id = %query.query_id(),
                    topic = %query.topic(),
                    "Abandoning pending query on dispose; callback will not run"
                );
            }
        }
    }

    fn release(&self, query: &PendingQuery, path: CompletionPath) {
        if let Some(timer) = query.take_timer() {
            // The firing timer must not abort itself
            if path != CompletionPath::Deadline {
                timer.cancel();
            }
        }
        if let Some(subscription) = query.take_subscription() {
            self.transport.unsubscribe(subscription);
        }
    }
}
