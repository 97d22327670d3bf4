//! Responder side
//!
//! A registered [`QueryHandler`] answers queries for one topic. The
//! skeleton around it owns the envelope: decode, check the requester is a
//! real participant, run the handler, and send the result back on the
//! requester's reply filter with the query's token.

use crate::stats::{bump, EngineCounters};
use async_trait::async_trait;
use bbq_core::effects::{IdentityEffects, MessageHandler, TransportEffects};
use bbq_core::messages::{decode_query, encode};
use bbq_core::{FilterKey, ParticipantId, QueryMessage, ResponseMessage, SubscriptionId, Topic};
use bbq_effects::TaskRegistry;
use std::sync::Arc;

/// Business logic answering queries for a topic
///
/// Returning `None` tells the requester there is nothing to offer.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Answer one query; `None` means no data
    async fn handle(&self, topic: &Topic, payload: &[u8]) -> Option<Vec<u8>>;
}

/// Proof of a handler registration, needed to unregister it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRegistration {
    pub(crate) topic: Topic,
    pub(crate) subscription: SubscriptionId,
}

impl HandlerRegistration {
    /// Topic the handler serves
    pub fn topic(&self) -> &Topic {
        &self.topic
    }
}

/// Limits applied to each served request
#[derive(Debug, Clone, Copy)]
pub(crate) struct ServeLimits {
    pub(crate) max_message_bytes: usize,
    pub(crate) max_payload_bytes: usize,
}

/// Transport subscription serving one topic
#[derive(Clone)]
pub(crate) struct ResponderSkeleton {
    inner: Arc<ResponderInner>,
}

struct ResponderInner {
    topic: Topic,
    handler: Arc<dyn QueryHandler>,
    transport: Arc<dyn TransportEffects>,
    identities: Arc<dyn IdentityEffects>,
    tasks: Arc<TaskRegistry>,
    counters: Arc<EngineCounters>,
    limits: ServeLimits,
}

impl ResponderSkeleton {
    pub(crate) fn new(
        topic: Topic,
        handler: Arc<dyn QueryHandler>,
        transport: Arc<dyn TransportEffects>,
        identities: Arc<dyn IdentityEffects>,
        tasks: Arc<TaskRegistry>,
        counters: Arc<EngineCounters>,
        limits: ServeLimits,
    ) -> Self {
        Self {
            inner: Arc::new(ResponderInner {
                topic,
                handler,
                transport,
                identities,
                tasks,
                counters,
                limits,
            }),
        }
    }
}

impl MessageHandler for ResponderSkeleton {
    fn on_message(&self, from: &ParticipantId, bytes: Vec<u8>) {
        let inner = self.inner.clone();
        let from = from.clone();
        if self
            .inner
            .tasks
            .spawn(async move { inner.serve(&from, bytes).await })
            .is_none()
        {
            tracing::debug!(topic = %self.inner.topic, "Engine disposed, ignoring query");
        }
    }
}

impl ResponderInner {
    async fn serve(&self, from: &ParticipantId, bytes: Vec<u8>) {
        let Some(message) = self.accept(from, &bytes) else {
            bump(&self.counters.requests_malformed);
            return;
        };

        if !self.identities.is_resolvable(&message.requester).await {
            bump(&self.counters.requests_unverified);
            tracing::warn!(
                query_id = %message.query_id,
                requester = %message.requester,
                from = %from,
                "Dropping query from unresolvable requester"
            );
            return;
        }

        let result = match self.handler.handle(&message.topic, &message.payload).await {
            Some(payload) if payload.len() > self.limits.max_payload_bytes => {
                tracing::warn!(
                    query_id = %message.query_id,
                    topic = %message.topic,
                    size = payload.len(),
                    "Handler result too large, answering with no data"
                );
                None
            }
            result => result,
        };

        let reply = ResponseMessage::new(message.token, result);
        let bytes = match encode(&reply) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(query_id = %message.query_id, error = %err, "Failed to encode response");
                return;
            }
        };
        let filter = FilterKey::reply(message.topic, message.query_id);
        match self.transport.send(&message.requester, &filter, bytes).await {
            Ok(()) => {
                bump(&self.counters.queries_served);
                tracing::debug!(
                    query_id = %message.query_id,
                    requester = %message.requester,
                    "Query answered"
                );
            }
            Err(err) => {
                tracing::warn!(
                    query_id = %message.query_id,
                    requester = %message.requester,
                    error = %err,
                    "Failed to send response"
                );
            }
        }
    }

    fn accept(&self, from: &ParticipantId, bytes: &[u8]) -> Option<QueryMessage> {
        let message = match decode_query(bytes, self.limits.max_message_bytes) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!(topic = %self.topic, from = %from, error = %err, "Dropping malformed query");
                return None;
            }
        };
        if message.topic != self.topic {
            tracing::warn!(
                topic = %self.topic,
                claimed = %message.topic,
                from = %from,
                "Dropping query for another topic"
            );
            return None;
        }
        Some(message)
    }
}
