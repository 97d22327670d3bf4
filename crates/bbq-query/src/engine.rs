//! Query engine facade
//!
//! Wires the dispatcher, collector, arbiter and responder side around one
//! set of effect handlers. Engines are built explicitly and cloned cheaply;
//! there is no process-wide instance.

use crate::arbiter::CompletionArbiter;
use crate::collector::ResponseCollector;
use crate::dispatcher::{Dispatched, QueryDispatcher};
use crate::identity::IdentityGenerator;
use crate::pending::PendingQueryTable;
use crate::responder::{HandlerRegistration, QueryHandler, ResponderSkeleton, ServeLimits};
use crate::stats::{EngineCounters, EngineStats};
use bbq_core::effects::{DirectoryEffects, IdentityEffects, RandomEffects, TransportEffects};
use bbq_core::{
    BbqError, BbqResult, EngineConfig, FilterKey, ParticipantId, ResponseMap, SubscriptionId, Topic,
};
use bbq_effects::{OsRandomHandler, TaskRegistry};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Builder for [`QueryEngine`]
pub struct QueryEngineBuilder {
    config: EngineConfig,
    random: Option<Arc<dyn RandomEffects>>,
    directory: Option<Arc<dyn DirectoryEffects>>,
    transport: Option<Arc<dyn TransportEffects>>,
    identities: Option<Arc<dyn IdentityEffects>>,
}

impl QueryEngineBuilder {
    /// Builder with default configuration and no handlers
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            random: None,
            directory: None,
            transport: None,
            identities: None,
        }
    }

    /// Set the configuration
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the id/token source; defaults to the OS CSPRNG
    pub fn with_random(mut self, random: Arc<dyn RandomEffects>) -> Self {
        self.random = Some(random);
        self
    }

    /// Set the responder directory
    pub fn with_directory(mut self, directory: Arc<dyn DirectoryEffects>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set the transport; its local identity becomes the engine's identity
    pub fn with_transport(mut self, transport: Arc<dyn TransportEffects>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the requester check used by the responder side
    pub fn with_identities(mut self, identities: Arc<dyn IdentityEffects>) -> Self {
        self.identities = Some(identities);
        self
    }

    /// Validate the configuration and assemble the engine
    pub fn build(self) -> BbqResult<QueryEngine> {
        self.config.validate()?;
        let directory = self
            .directory
            .ok_or_else(|| BbqError::config("directory handler required"))?;
        let transport = self
            .transport
            .ok_or_else(|| BbqError::config("transport handler required"))?;
        let identities = self
            .identities
            .ok_or_else(|| BbqError::config("identity handler required"))?;
        let random = self
            .random
            .unwrap_or_else(|| Arc::new(OsRandomHandler::new()));

        let table = Arc::new(PendingQueryTable::new());
        let counters = Arc::new(EngineCounters::default());
        let tasks = Arc::new(TaskRegistry::new());
        let arbiter = Arc::new(CompletionArbiter::new(
            table.clone(),
            transport.clone(),
            counters.clone(),
        ));
        let collector = Arc::new(ResponseCollector::new(
            table.clone(),
            arbiter.clone(),
            counters.clone(),
            self.config.max_message_bytes,
        ));
        let dispatcher = QueryDispatcher {
            config: self.config.clone(),
            directory,
            transport: transport.clone(),
            generator: IdentityGenerator::new(random),
            table: table.clone(),
            arbiter: arbiter.clone(),
            collector,
            tasks: tasks.clone(),
            counters: counters.clone(),
        };

        tracing::debug!(identity = %transport.local_identity(), "Query engine built");
        Ok(QueryEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                transport,
                identities,
                dispatcher,
                table,
                arbiter,
                tasks,
                counters,
                handlers: Mutex::new(HashMap::new()),
                disposed: AtomicBool::new(false),
            }),
        })
    }
}

impl Default for QueryEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scatter-gather query engine
///
/// # Blocking Lock Usage
///
/// The handler registry uses `parking_lot::Mutex`: registration is a map
/// insert plus a synchronous subscribe, never held across `.await`.
#[derive(Clone)]
pub struct QueryEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    transport: Arc<dyn TransportEffects>,
    identities: Arc<dyn IdentityEffects>,
    dispatcher: QueryDispatcher,
    table: Arc<PendingQueryTable>,
    arbiter: Arc<CompletionArbiter>,
    tasks: Arc<TaskRegistry>,
    counters: Arc<EngineCounters>,
    handlers: Mutex<HashMap<Topic, SubscriptionId>>,
    disposed: AtomicBool,
}

impl QueryEngine {
    /// Start building an engine
    pub fn builder() -> QueryEngineBuilder {
        QueryEngineBuilder::new()
    }

    /// Ask every responder of `topic` and call `callback` once with what
    /// arrives before `deadline`
    ///
    /// The callback receives responder → payload for every responder that
    /// answered with data. It runs exactly once, either before this returns
    /// (`Dispatched::Resolved`) or later from a delivery or timer task.
    pub async fn dispatch<F>(
        &self,
        topic: Topic,
        payload: Vec<u8>,
        deadline: Duration,
        callback: F,
    ) -> BbqResult<Dispatched>
    where
        F: FnOnce(ResponseMap) + Send + 'static,
    {
        if self.is_disposed() {
            return Err(BbqError::Disposed);
        }
        self.inner
            .dispatcher
            .dispatch(topic, payload, deadline, Box::new(callback))
            .await
    }

    /// Dispatch and wait for the result
    ///
    /// Fails with `Disposed` if the engine is disposed before the query
    /// completes and the dispose policy abandons it.
    pub async fn query(
        &self,
        topic: Topic,
        payload: Vec<u8>,
        deadline: Duration,
    ) -> BbqResult<ResponseMap> {
        let (tx, rx) = oneshot::channel();
        let dispatched = self
            .dispatch(topic, payload, deadline, move |responses| {
                let _ = tx.send(responses);
            })
            .await;
        match dispatched {
            Ok(_) => rx.await.map_err(|_| BbqError::Disposed),
            // Disposed mid-dispatch with ResolvePartial still delivers
            Err(BbqError::Disposed) => rx.await.map_err(|_| BbqError::Disposed),
            Err(err) => Err(err),
        }
    }

    /// Start answering queries for `topic`
    pub fn register_handler(
        &self,
        topic: Topic,
        handler: Arc<dyn QueryHandler>,
    ) -> BbqResult<HandlerRegistration> {
        let mut handlers = self.inner.handlers.lock();
        if self.is_disposed() {
            return Err(BbqError::Disposed);
        }
        if handlers.contains_key(&topic) {
            return Err(BbqError::invalid(format!(
                "a handler is already registered for {topic}"
            )));
        }

        let skeleton = ResponderSkeleton::new(
            topic.clone(),
            handler,
            self.inner.transport.clone(),
            self.inner.identities.clone(),
            self.inner.tasks.clone(),
            self.inner.counters.clone(),
            ServeLimits {
                max_message_bytes: self.inner.config.max_message_bytes,
                max_payload_bytes: self.inner.config.max_payload_bytes,
            },
        );
        let subscription = self
            .inner
            .transport
            .subscribe(FilterKey::Topic(topic.clone()), Arc::new(skeleton))?;
        handlers.insert(topic.clone(), subscription);
        tracing::debug!(topic = %topic, subscription = %subscription, "Handler registered");

        Ok(HandlerRegistration {
            topic,
            subscription,
        })
    }

    /// Stop answering queries for the registration's topic
    ///
    /// Returns false if the registration is no longer active.
    pub fn unregister_handler(&self, registration: &HandlerRegistration) -> bool {
        let mut handlers = self.inner.handlers.lock();
        if handlers.get(&registration.topic) != Some(&registration.subscription) {
            return false;
        }
        handlers.remove(&registration.topic);
        self.inner.transport.unsubscribe(registration.subscription);
        tracing::debug!(topic = %registration.topic, "Handler unregistered");
        true
    }

    /// Stop the engine
    ///
    /// Refuses further dispatches and registrations, cancels every deadline
    /// timer, drops every subscription and applies the configured dispose
    /// policy to queries still pending. Calling it again does nothing.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let policy = self.inner.config.dispose_policy;
        tracing::info!(
            identity = %self.inner.transport.local_identity(),
            pending = self.inner.table.len(),
            policy = ?policy,
            "Disposing query engine"
        );

        self.inner.tasks.shutdown();
        for (_, subscription) in self.inner.handlers.lock().drain() {
            self.inner.transport.unsubscribe(subscription);
        }
        for query in self.inner.table.drain() {
            self.inner.arbiter.dispose(&query, policy);
        }
    }

    /// Whether `dispose` has been called
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Queries dispatched but not yet completed
    pub fn pending_count(&self) -> usize {
        self.inner.table.len()
    }

    /// Snapshot of the engine counters
    pub fn stats(&self) -> EngineStats {
        self.inner.counters.snapshot()
    }

    /// Identity replies are addressed to
    pub fn identity(&self) -> &ParticipantId {
        self.inner.transport.local_identity()
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("identity", self.identity())
            .field("pending", &self.pending_count())
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bbq_effects::{MemoryNetwork, StaticDirectory};
    use bbq_testkit::{participant, topic};

    struct Silent;

    #[async_trait]
    impl QueryHandler for Silent {
        async fn handle(&self, _topic: &Topic, _payload: &[u8]) -> Option<Vec<u8>> {
            None
        }
    }

    fn engine(network: &MemoryNetwork, name: &str) -> QueryEngine {
        QueryEngine::builder()
            .with_config(EngineConfig::testing())
            .with_transport(Arc::new(network.endpoint(participant(name))))
            .with_identities(Arc::new(network.clone()))
            .with_directory(Arc::new(StaticDirectory::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_handlers() {
        let result = QueryEngine::builder().build();
        assert_matches!(result, Err(BbqError::Config { .. }));
    }

    #[test]
    fn test_builder_validates_config() {
        let network = MemoryNetwork::reliable();
        let config = EngineConfig {
            max_payload_bytes: 0,
            ..EngineConfig::testing()
        };
        let result = QueryEngine::builder()
            .with_config(config)
            .with_transport(Arc::new(network.endpoint(participant("a"))))
            .with_identities(Arc::new(network.clone()))
            .with_directory(Arc::new(StaticDirectory::new()))
            .build();
        assert_matches!(result, Err(BbqError::Config { .. }));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let network = MemoryNetwork::reliable();
        let engine = engine(&network, "provider");

        let registration = engine
            .register_handler(topic("passkeys"), Arc::new(Silent))
            .unwrap();
        assert_matches!(
            engine.register_handler(topic("passkeys"), Arc::new(Silent)),
            Err(BbqError::Invalid { .. })
        );
        assert_eq!(network.subscription_count(&participant("provider")), 1);

        assert!(engine.unregister_handler(&registration));
        assert!(!engine.unregister_handler(&registration));
        assert_eq!(network.subscription_count(&participant("provider")), 0);
        assert!(engine
            .register_handler(topic("passkeys"), Arc::new(Silent))
            .is_ok());
    }

    #[test]
    fn test_dispose_is_idempotent_and_unsubscribes() {
        let network = MemoryNetwork::reliable();
        let engine = engine(&network, "provider");
        engine
            .register_handler(topic("passkeys"), Arc::new(Silent))
            .unwrap();

        engine.dispose();
        engine.dispose();
        assert!(engine.is_disposed());
        assert_eq!(network.subscription_count(&participant("provider")), 0);
        assert_matches!(
            engine.register_handler(topic("passkeys"), Arc::new(Silent)),
            Err(BbqError::Disposed)
        );
    }
}
