//! Engine counters
//!
//! Every drop path on the delivery side is counted here as well as logged,
//! so "the only observable effect is a warning" stays testable.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time copy of the engine counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Queries registered in the pending table
    pub dispatched: u64,
    /// Queries resolved at once because no responder was eligible
    pub resolved_empty: u64,
    /// Queries completed because every token was answered
    pub completed_gathered: u64,
    /// Queries completed by their deadline
    pub completed_deadline: u64,
    /// Queries resolved early because the reply subscription failed
    pub subscribe_failures: u64,
    /// Pending queries resolved with partial results on dispose
    pub resolved_on_dispose: u64,
    /// Pending queries dropped without callback on dispose
    pub abandoned: u64,
    /// Query messages that could not be handed to the transport
    pub send_failures: u64,
    /// Responses accepted into a query
    pub responses_accepted: u64,
    /// Responses that failed to decode
    pub dropped_malformed: u64,
    /// Responses for queries that are no longer pending
    pub dropped_late: u64,
    /// Responses carrying a token the query never issued
    pub dropped_forged: u64,
    /// Responses for a token that was already answered
    pub dropped_duplicate: u64,
    /// Queries answered by local handlers
    pub queries_served: u64,
    /// Inbound queries that failed to decode or were misrouted
    pub requests_malformed: u64,
    /// Inbound queries whose requester did not resolve
    pub requests_unverified: u64,
}

#[derive(Debug, Default)]
pub(crate) struct EngineCounters {
    pub(crate) dispatched: AtomicU64,
    pub(crate) resolved_empty: AtomicU64,
    pub(crate) completed_gathered: AtomicU64,
    pub(crate) completed_deadline: AtomicU64,
    pub(crate) subscribe_failures: AtomicU64,
    pub(crate) resolved_on_dispose: AtomicU64,
    pub(crate) abandoned: AtomicU64,
    pub(crate) send_failures: AtomicU64,
    pub(crate) responses_accepted: AtomicU64,
    pub(crate) dropped_malformed: AtomicU64,
    pub(crate) dropped_late: AtomicU64,
    pub(crate) dropped_forged: AtomicU64,
    pub(crate) dropped_duplicate: AtomicU64,
    pub(crate) queries_served: AtomicU64,
    pub(crate) requests_malformed: AtomicU64,
    pub(crate) requests_unverified: AtomicU64,
}

pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl EngineCounters {
    pub(crate) fn snapshot(&self) -> EngineStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        EngineStats {
            dispatched: load(&self.dispatched),
            resolved_empty: load(&self.resolved_empty),
            completed_gathered: load(&self.completed_gathered),
            completed_deadline: load(&self.completed_deadline),
            subscribe_failures: load(&self.subscribe_failures),
            resolved_on_dispose: load(&self.resolved_on_dispose),
            abandoned: load(&self.abandoned),
            send_failures: load(&self.send_failures),
            responses_accepted: load(&self.responses_accepted),
            dropped_malformed: load(&self.dropped_malformed),
            dropped_late: load(&self.dropped_late),
            dropped_forged: load(&self.dropped_forged),
            dropped_duplicate: load(&self.dropped_duplicate),
            queries_served: load(&self.queries_served),
            requests_malformed: load(&self.requests_malformed),
            requests_unverified: load(&self.requests_unverified),
        }
    }
}

impl EngineStats {
    /// Queries that reached a callback or were abandoned, by any path
    pub fn finished(&self) -> u64 {
        self.resolved_empty
            + self.completed_gathered
            + self.completed_deadline
            + self.subscribe_failures
            + self.resolved_on_dispose
            + self.abandoned
    }
}
