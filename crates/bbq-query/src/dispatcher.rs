//! Query dispatcher
//!
//! Fans a query out to every responder the directory knows for a topic.
//! Order of operations matters: the table entry and the reply subscription
//! exist before the first query message leaves, so no response can arrive
//! with nowhere to go. The deadline timer is armed last.

use crate::arbiter::{CompletionArbiter, CompletionPath};
use crate::collector::{ReplySubscription, ResponseCollector};
use crate::identity::IdentityGenerator;
use crate::pending::{PendingQuery, PendingQueryTable, QueryCallback};
use crate::stats::{bump, EngineCounters};
use bbq_core::effects::{DirectoryEffects, TransportEffects};
use bbq_core::messages::encode;
use bbq_core::{
    BbqError, BbqResult, EngineConfig, FilterKey, QueryId, QueryMessage, ResponseMap, Topic,
};
use bbq_effects::TaskRegistry;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Result of a successful dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Callback already ran before `dispatch` returned
    Resolved,
    /// Query is registered; the callback runs on completion
    Pending(QueryId),
}

impl Dispatched {
    /// Id of the registered query, if one was created
    pub fn query_id(&self) -> Option<QueryId> {
        match self {
            Self::Resolved => None,
            Self::Pending(query_id) => Some(*query_id),
        }
    }
}

pub(crate) struct QueryDispatcher {
    pub(crate) config: EngineConfig,
    pub(crate) directory: Arc<dyn DirectoryEffects>,
    pub(crate) transport: Arc<dyn TransportEffects>,
    pub(crate) generator: IdentityGenerator,
    pub(crate) table: Arc<PendingQueryTable>,
    pub(crate) arbiter: Arc<CompletionArbiter>,
    pub(crate) collector: Arc<ResponseCollector>,
    pub(crate) tasks: Arc<TaskRegistry>,
    pub(crate) counters: Arc<EngineCounters>,
}

impl QueryDispatcher {
    fn validate(&self, payload: &[u8], deadline: Duration) -> BbqResult<()> {
        if self.tasks.is_shut_down() {
            return Err(BbqError::Disposed);
        }
        if deadline.is_zero() {
            return Err(BbqError::invalid("deadline must be positive"));
        }
        if deadline > self.config.max_deadline {
            return Err(BbqError::invalid(format!(
                "deadline {:?} exceeds maximum {:?}",
                deadline, self.config.max_deadline
            )));
        }
        if payload.len() > self.config.max_payload_bytes {
            return Err(BbqError::invalid(format!(
                "payload of {} bytes exceeds maximum {}",
                payload.len(),
                self.config.max_payload_bytes
            )));
        }
        Ok(())
    }

    /// Scatter `payload` to every responder of `topic`
    ///
    /// Returns `Err(Disposed)` if the engine is disposed while the query is
    /// being set up; its callback is then handled by the dispose policy.
    pub(crate) async fn dispatch(
        &self,
        topic: Topic,
        payload: Vec<u8>,
        deadline: Duration,
        callback: QueryCallback,
    ) -> BbqResult<Dispatched> {
        self.validate(&payload, deadline)?;

        let responders = self.directory.lookup(&topic).await;
        if responders.is_empty() {
            bump(&self.counters.resolved_empty);
            tracing::debug!(topic = %topic, "No responders for topic, resolving empty");
            callback(ResponseMap::new());
            return Ok(Dispatched::Resolved);
        }

        let expected = self.generator.fresh_tokens(responders)?;
        let query = self.table.insert_with(&self.generator, |query_id| {
            PendingQuery::new(query_id, topic.clone(), expected, callback)
        })?;
        let query_id = query.query_id();
        bump(&self.counters.dispatched);
        tracing::debug!(
            query_id = %query_id,
            topic = %topic,
            responders = query.expected().len(),
            deadline_ms = deadline.as_millis() as u64,
            "Dispatching query"
        );

        let reply_handler = Arc::new(ReplySubscription {
            query_id,
            collector: self.collector.clone(),
        });
        match self
            .transport
            .subscribe(FilterKey::reply(topic.clone(), query_id), reply_handler)
        {
            Ok(subscription) => {
                if let Err(subscription) = self.table.attach_subscription(query_id, subscription) {
                    self.transport.unsubscribe(subscription);
                    return Err(BbqError::Disposed);
                }
            }
            Err(err) => {
                tracing::warn!(query_id = %query_id, error = %err, "Reply subscription failed");
                self.arbiter.complete(query_id, CompletionPath::SubscribeFailed);
                return Ok(Dispatched::Resolved);
            }
        }

        self.send_all(&query, &payload).await;

        let arbiter = self.arbiter.clone();
        let timer = self.tasks.spawn_after(deadline, async move {
            arbiter.complete(query_id, CompletionPath::Deadline);
        });
        match timer {
            Some(timer) => {
                // Already completed by responses
                if let Err(timer) = self.table.attach_timer(query_id, timer) {
                    timer.cancel();
                }
                Ok(Dispatched::Pending(query_id))
            }
            None => {
                if let Some(query) = self.table.remove(query_id) {
                    self.arbiter.dispose(&query, self.config.dispose_policy);
                }
                Err(BbqError::Disposed)
            }
        }
    }

    async fn send_all(&self, query: &PendingQuery, payload: &[u8]) {
        let requester = self.transport.local_identity();
        let filter = FilterKey::Topic(query.topic().clone());
        let filter = &filter;

        let sends = query.expected().iter().map(|(token, responder)| {
            let message = QueryMessage::new(
                query.query_id(),
                *token,
                query.topic().clone(),
                requester.clone(),
                payload.to_vec(),
            );
            async move {
                let result = match encode(&message) {
                    Ok(bytes) => self
                        .transport
                        .send(responder, filter, bytes)
                        .await
                        .map_err(BbqError::from),
                    Err(err) => Err(err),
                };
                (responder, result)
            }
        });

        for (responder, result) in join_all(sends).await {
            if let Err(err) = result {
                // Its token never resolves; the deadline covers it
                bump(&self.counters.send_failures);
                tracing::warn!(
                    query_id = %query.query_id(),
                    responder = %responder,
                    error = %err,
                    "Failed to send query"
                );
            }
        }
    }
}
