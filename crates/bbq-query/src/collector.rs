//! Response collector
//!
//! Consumes inbound responses for pending queries. Each response is decoded,
//! matched to its query and token, and recorded; the response that clears
//! the last outstanding token triggers the arbiter's all-gathered path.
//!
//! Safe to run concurrently with other responses for the same query and
//! with that query's deadline timer: per-query state is behind its own
//! mutex and completion is decided by the arbiter's table removal.

use crate::arbiter::{CompletionArbiter, CompletionPath};
use crate::pending::{Acceptance, PendingQueryTable};
use crate::stats::{bump, EngineCounters};
use bbq_core::effects::MessageHandler;
use bbq_core::messages::decode_response;
use bbq_core::{ParticipantId, QueryId};
use std::sync::Arc;

/// What happened to one inbound response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collected {
    /// Recorded, more tokens outstanding
    Recorded,
    /// Recorded and it was the last outstanding token
    Completed,
    /// Could not be decoded
    Malformed,
    /// Query is no longer pending
    Late,
    /// Token was never issued by the query
    Forged,
    /// Token was already answered
    Duplicate,
}

/// Matches inbound responses to pending queries
pub struct ResponseCollector {
    table: Arc<PendingQueryTable>,
    arbiter: Arc<CompletionArbiter>,
    counters: Arc<EngineCounters>,
    max_message_bytes: usize,
}

impl ResponseCollector {
    pub(crate) fn new(
        table: Arc<PendingQueryTable>,
        arbiter: Arc<CompletionArbiter>,
        counters: Arc<EngineCounters>,
        max_message_bytes: usize,
    ) -> Self {
        Self {
            table,
            arbiter,
            counters,
            max_message_bytes,
        }
    }

    /// Process one raw response delivered on `query_id`'s reply filter
    pub fn on_response(&self, query_id: QueryId, from: &ParticipantId, bytes: &[u8]) -> Collected {
        let message = match decode_response(bytes, self.max_message_bytes) {
            Ok(message) => message,
            Err(err) => {
                bump(&self.counters.dropped_malformed);
                tracing::warn!(query_id = %query_id, from = %from, error = %err, "Dropping malformed response");
                return Collected::Malformed;
            }
        };

        let Some(query) = self.table.get(query_id) else {
            bump(&self.counters.dropped_late);
            tracing::debug!(query_id = %query_id, token = %message.token, "Response for completed query");
            return Collected::Late;
        };

        match query.record(message.token, message.payload) {
            Acceptance::Accepted {
                responder,
                remaining,
            } => {
                bump(&self.counters.responses_accepted);
                tracing::debug!(
                    query_id = %query_id,
                    responder = %responder,
                    remaining,
                    "Response recorded"
                );
                if remaining > 0 {
                    Collected::Recorded
                } else if self.arbiter.complete(query_id, CompletionPath::AllGathered) {
                    Collected::Completed
                } else {
                    // The deadline removed the query first
                    Collected::Late
                }
            }
            Acceptance::UnknownToken => {
                bump(&self.counters.dropped_forged);
                tracing::warn!(
                    query_id = %query_id,
                    token = %message.token,
                    from = %from,
                    "Dropping response with unknown token"
                );
                Collected::Forged
            }
            Acceptance::Duplicate { responder } => {
                bump(&self.counters.dropped_duplicate);
                tracing::warn!(
                    query_id = %query_id,
                    token = %message.token,
                    responder = %responder,
                    "Dropping duplicate response"
                );
                Collected::Duplicate
            }
            Acceptance::Closed => {
                bump(&self.counters.dropped_late);
                tracing::debug!(query_id = %query_id, token = %message.token, "Response raced completion");
                Collected::Late
            }
        }
    }
}

/// Transport subscription routing one query's replies into the collector
pub(crate) struct ReplySubscription {
    pub(crate) query_id: QueryId,
    pub(crate) collector: Arc<ResponseCollector>,
}

impl MessageHandler for ReplySubscription {
    fn on_message(&self, from: &ParticipantId, bytes: Vec<u8>) {
        self.collector.on_response(self.query_id, from, &bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityGenerator;
    use crate::pending::PendingQuery;
    use bbq_core::effects::TransportEffects;
    use bbq_core::messages::encode;
    use bbq_core::{ResponseMessage, Token};
    use bbq_effects::MemoryNetwork;
    use bbq_testkit::{participant, topic, CallbackRecorder, ScriptedRandom};
    use proptest::prelude::*;

    struct Fixture {
        collector: ResponseCollector,
        table: Arc<PendingQueryTable>,
        counters: Arc<EngineCounters>,
        recorder: CallbackRecorder,
    }

    fn fixture(tokens: &[(u64, &str)]) -> Fixture {
        let network = MemoryNetwork::reliable();
        let transport: Arc<dyn TransportEffects> = Arc::new(network.endpoint(participant("requester")));
        let table = Arc::new(PendingQueryTable::new());
        let counters = Arc::new(EngineCounters::default());
        let arbiter = Arc::new(CompletionArbiter::new(table.clone(), transport, counters.clone()));
        let recorder = CallbackRecorder::new();
        let generator = IdentityGenerator::new(Arc::new(ScriptedRandom::new([42])));
        let expected = tokens
            .iter()
            .map(|(token, name)| (Token(*token), participant(name)))
            .collect();
        let callback = Box::new(recorder.callback());
        table
            .insert_with(&generator, |id| PendingQuery::new(id, topic("passkeys"), expected, callback))
            .unwrap();
        Fixture {
            collector: ResponseCollector::new(table.clone(), arbiter, counters.clone(), 4096),
            table,
            counters,
            recorder,
        }
    }

    fn response(token: u64, payload: Option<&[u8]>) -> Vec<u8> {
        encode(&ResponseMessage::new(Token(token), payload.map(<[u8]>::to_vec))).unwrap()
    }

    #[test]
    fn test_last_token_completes() {
        let f = fixture(&[(1, "a"), (2, "b")]);
        let from = participant("a");

        assert_eq!(f.collector.on_response(QueryId(42), &from, &response(1, Some(b"x"))), Collected::Recorded);
        assert_eq!(f.recorder.count(), 0);
        assert_eq!(f.collector.on_response(QueryId(42), &from, &response(2, None)), Collected::Completed);

        let responses = f.recorder.single();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[&participant("a")], b"x".to_vec());
        assert!(f.table.is_empty());
    }

    #[test]
    fn test_forged_and_duplicate_do_not_complete() {
        let f = fixture(&[(1, "a"), (2, "b")]);
        let from = participant("mallory");

        assert_eq!(f.collector.on_response(QueryId(42), &from, &response(99, Some(b"evil"))), Collected::Forged);
        assert_eq!(f.collector.on_response(QueryId(42), &from, &response(1, Some(b"first"))), Collected::Recorded);
        assert_eq!(f.collector.on_response(QueryId(42), &from, &response(1, Some(b"second"))), Collected::Duplicate);
        assert_eq!(f.recorder.count(), 0);

        let stats = f.counters.snapshot();
        assert_eq!(stats.dropped_forged, 1);
        assert_eq!(stats.dropped_duplicate, 1);
        assert_eq!(stats.responses_accepted, 1);
    }

    #[test]
    fn test_malformed_and_late() {
        let f = fixture(&[(1, "a")]);
        let from = participant("a");

        assert_eq!(f.collector.on_response(QueryId(42), &from, b"not cbor"), Collected::Malformed);
        assert_eq!(f.collector.on_response(QueryId(7), &from, &response(1, None)), Collected::Late);
        assert_eq!(f.collector.on_response(QueryId(42), &from, &response(1, None)), Collected::Completed);
        assert_eq!(f.collector.on_response(QueryId(42), &from, &response(1, None)), Collected::Late);

        assert!(f.recorder.single().is_empty());
        assert_eq!(f.counters.snapshot().dropped_late, 2);
    }

    #[test]
    fn test_last_token_after_deadline_win_is_late() {
        let f = fixture(&[(1, "a")]);
        let network = MemoryNetwork::reliable();
        let transport: Arc<dyn TransportEffects> = Arc::new(network.endpoint(participant("requester")));
        // Arbiter whose table no longer holds the query: the deadline got there first
        let emptied = Arc::new(PendingQueryTable::new());
        let arbiter = Arc::new(CompletionArbiter::new(emptied, transport, f.counters.clone()));
        let collector = ResponseCollector::new(f.table.clone(), arbiter, f.counters.clone(), 4096);

        let outcome = collector.on_response(QueryId(42), &participant("a"), &response(1, Some(b"x")));

        assert_eq!(outcome, Collected::Late);
        assert_eq!(f.recorder.count(), 0);
        assert_eq!(f.counters.snapshot().completed_gathered, 0);
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_never_disturb_pending_query(
            bytes in proptest::collection::vec(any::<u8>(), 0..512)
        ) {
            let f = fixture(&[(1, "a"), (2, "b")]);
            let query = f.table.get(QueryId(42)).unwrap();

            let outcome = f.collector.on_response(QueryId(42), &participant("mallory"), &bytes);

            prop_assert!(matches!(
                outcome,
                Collected::Malformed | Collected::Forged | Collected::Late
            ));
            prop_assert_eq!(query.pending_tokens(), 2);
            prop_assert_eq!(f.recorder.count(), 0);
        }
    }
}
