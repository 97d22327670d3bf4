//! Pending query table
//!
//! The table is the single point of truth for "is this query still open".
//! Removing an entry is the linearization point for completion: whoever
//! removes it owns the query's final state, everyone else sees absence.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for the table and per-query state because:
//! 1. Every critical section is a map lookup, insert or remove
//! 2. Locks are never held across `.await` points
//! 3. Callbacks run only after all locks are released
//!
//! Lock order is table first, then per-query state, never the reverse.

use crate::identity::IdentityGenerator;
use bbq_core::{BbqResult, ParticipantId, QueryId, ResponseMap, SubscriptionId, Token, Topic};
use bbq_effects::TimerHandle;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Completion handler supplied by the caller of `dispatch`
pub type QueryCallback = Box<dyn FnOnce(ResponseMap) + Send + 'static>;

/// Outcome of offering one response to a pending query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acceptance {
    /// Recorded; `remaining` tokens are still unanswered
    Accepted {
        /// Responder the token was issued to
        responder: ParticipantId,
        /// Tokens still outstanding after this one
        remaining: usize,
    },
    /// Token was never issued by this query
    UnknownToken,
    /// Token was already answered
    Duplicate {
        /// Responder the token was issued to
        responder: ParticipantId,
    },
    /// Query already handed its results to the completion winner
    Closed,
}

#[derive(Debug)]
struct Progress {
    pending: HashSet<Token>,
    collected: ResponseMap,
    closed: bool,
}

/// State of one in-flight query
pub struct PendingQuery {
    query_id: QueryId,
    topic: Topic,
    expected: HashMap<Token, ParticipantId>,
    progress: Mutex<Progress>,
    callback: Mutex<Option<QueryCallback>>,
    timer: Mutex<Option<TimerHandle>>,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl PendingQuery {
    /// Query awaiting one response per entry of `expected`
    pub fn new(
        query_id: QueryId,
        topic: Topic,
        expected: HashMap<Token, ParticipantId>,
        callback: QueryCallback,
    ) -> Self {
        let pending = expected.keys().copied().collect();
        Self {
            query_id,
            topic,
            expected,
            progress: Mutex::new(Progress {
                pending,
                collected: ResponseMap::new(),
                closed: false,
            }),
            callback: Mutex::new(Some(callback)),
            timer: Mutex::new(None),
            subscription: Mutex::new(None),
        }
    }

    /// Key of this query in the pending table
    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Topic the query was dispatched on
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Token → responder mapping fixed at dispatch
    pub fn expected(&self) -> &HashMap<Token, ParticipantId> {
        &self.expected
    }

    /// Tokens not answered yet
    pub fn pending_tokens(&self) -> usize {
        self.progress.lock().pending.len()
    }

    /// Offer a response; absent payload means "no data" and is not recorded
    pub fn record(&self, token: Token, payload: Option<Vec<u8>>) -> Acceptance {
        let Some(responder) = self.expected.get(&token) else {
            return Acceptance::UnknownToken;
        };
        let mut progress = self.progress.lock();
        if progress.closed {
            return Acceptance::Closed;
        }
        if !progress.pending.remove(&token) {
            return Acceptance::Duplicate {
                responder: responder.clone(),
            };
        }
        if let Some(payload) = payload {
            progress.collected.insert(responder.clone(), payload);
        }
        Acceptance::Accepted {
            responder: responder.clone(),
            remaining: progress.pending.len(),
        }
    }

    fn seal(&self) {
        self.progress.lock().closed = true;
    }

    /// Freeze the query and take what was collected
    pub(crate) fn close(&self) -> ResponseMap {
        let mut progress = self.progress.lock();
        progress.closed = true;
        std::mem::take(&mut progress.collected)
    }

    pub(crate) fn take_callback(&self) -> Option<QueryCallback> {
        self.callback.lock().take()
    }

    pub(crate) fn take_timer(&self) -> Option<TimerHandle> {
        self.timer.lock().take()
    }

    pub(crate) fn take_subscription(&self) -> Option<SubscriptionId> {
        self.subscription.lock().take()
    }
}

impl std::fmt::Debug for PendingQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQuery")
            .field("query_id", &self.query_id)
            .field("topic", &self.topic)
            .field("expected", &self.expected.len())
            .field("pending", &self.pending_tokens())
            .finish_non_exhaustive()
    }
}

/// Concurrent map from query id to in-flight query
#[derive(Debug, Default)]
pub struct PendingQueryTable {
    entries: Mutex<HashMap<QueryId, Arc<PendingQuery>>>,
}

impl PendingQueryTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick an id not currently live and insert the query built for it
    ///
    /// Id selection and insertion happen under one lock, so two concurrent
    /// dispatches can never be handed the same id.
    pub fn insert_with(
        &self,
        generator: &IdentityGenerator,
        build: impl FnOnce(QueryId) -> PendingQuery,
    ) -> BbqResult<Arc<PendingQuery>> {
        let mut entries = self.entries.lock();
        let query_id = generator.fresh_query_id(|id| entries.contains_key(&id))?;
        let query = Arc::new(build(query_id));
        entries.insert(query_id, query.clone());
        Ok(query)
    }

    /// Live query for `query_id`, if still pending
    pub fn get(&self, query_id: QueryId) -> Option<Arc<PendingQuery>> {
        self.entries.lock().get(&query_id).cloned()
    }

    /// Remove the entry if still present; at most one caller gets `Some`
    ///
    /// The query stops accepting responses before the table lock is
    /// released, so removal and closing are one step for any holder of the
    /// query.
    pub fn remove(&self, query_id: QueryId) -> Option<Arc<PendingQuery>> {
        let mut entries = self.entries.lock();
        let query = entries.remove(&query_id)?;
        query.seal();
        Some(query)
    }

    /// Store the deadline timer on a live query
    ///
    /// Hands the timer back if the query already completed, so the caller
    /// can cancel it.
    pub fn attach_timer(&self, query_id: QueryId, timer: TimerHandle) -> Result<(), TimerHandle> {
        let entries = self.entries.lock();
        match entries.get(&query_id) {
            Some(query) => {
                *query.timer.lock() = Some(timer);
                Ok(())
            }
            None => Err(timer),
        }
    }

    /// Store the reply subscription on a live query
    pub fn attach_subscription(
        &self,
        query_id: QueryId,
        subscription: SubscriptionId,
    ) -> Result<(), SubscriptionId> {
        let entries = self.entries.lock();
        match entries.get(&query_id) {
            Some(query) => {
                *query.subscription.lock() = Some(subscription);
                Ok(())
            }
            None => Err(subscription),
        }
    }

    /// Remove and return every pending query, each already closed
    pub fn drain(&self) -> Vec<Arc<PendingQuery>> {
        self.entries
            .lock()
            .drain()
            .map(|(_, query)| {
                query.seal();
                query
            })
            .collect()
    }

    /// Number of pending queries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no query is pending
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
