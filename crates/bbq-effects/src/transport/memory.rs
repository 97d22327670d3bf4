//! In-Memory Transport Handler
//!
//! In-process transport for tests and single-host deployments. A
//! `MemoryNetwork` is the shared hub; every participant gets its own
//! `MemoryTransport` endpoint from it.
//!
//! Each delivery runs on a freshly spawned tokio task, so two messages sent
//! back to back may be handled concurrently and in either order. Drop and
//! duplicate faults are injected according to `MemoryTransportConfig`.
//!
//! ## Lock Usage
//!
//! `parking_lot::RwLock` guards the endpoint and subscription maps. Handlers
//! are cloned out before delivery; no lock is held while a handler runs.

use super::MemoryTransportConfig;
use async_trait::async_trait;
use bbq_core::effects::{IdentityEffects, MessageHandler, TransportEffects, TransportError};
use bbq_core::{BbqResult, FilterKey, ParticipantId, SubscriptionId};
use parking_lot::RwLock;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Delivery counters for a memory network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryNetworkStats {
    /// Messages accepted by `send`
    pub sent: u64,
    /// Handler invocations scheduled, duplicates included
    pub delivered: u64,
    /// Messages lost to fault injection
    pub dropped: u64,
    /// Messages whose destination had no matching subscription
    pub unrouted: u64,
}

#[derive(Debug, Default)]
struct NetworkCounters {
    sent: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    unrouted: AtomicU64,
}

struct NetworkInner {
    config: MemoryTransportConfig,
    endpoints: RwLock<HashMap<ParticipantId, Arc<Endpoint>>>,
    next_subscription: AtomicU64,
    counters: NetworkCounters,
}

#[derive(Default)]
struct Subscriptions {
    by_filter: HashMap<FilterKey, (SubscriptionId, Arc<dyn MessageHandler>)>,
    by_id: HashMap<SubscriptionId, FilterKey>,
}

struct Endpoint {
    identity: ParticipantId,
    subscriptions: RwLock<Subscriptions>,
    closed: AtomicBool,
}

impl Endpoint {
    fn handler_for(&self, filter: &FilterKey) -> Option<Arc<dyn MessageHandler>> {
        self.subscriptions
            .read()
            .by_filter
            .get(filter)
            .map(|(_, handler)| handler.clone())
    }
}

/// Shared in-process hub connecting memory transports
#[derive(Clone)]
pub struct MemoryNetwork {
    inner: Arc<NetworkInner>,
}

impl MemoryNetwork {
    /// Create a network with the given fault injection settings
    pub fn new(config: MemoryTransportConfig) -> BbqResult<Self> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    /// Create a network that neither drops nor duplicates
    pub fn reliable() -> Self {
        Self::with_validated(MemoryTransportConfig::reliable())
    }

    fn with_validated(config: MemoryTransportConfig) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                config,
                endpoints: RwLock::new(HashMap::new()),
                next_subscription: AtomicU64::new(1),
                counters: NetworkCounters::default(),
            }),
        }
    }

    /// Transport endpoint for `identity`, created on first use
    pub fn endpoint(&self, identity: ParticipantId) -> MemoryTransport {
        let endpoint = self
            .inner
            .endpoints
            .write()
            .entry(identity.clone())
            .or_insert_with(|| {
                Arc::new(Endpoint {
                    identity,
                    subscriptions: RwLock::new(Subscriptions::default()),
                    closed: AtomicBool::new(false),
                })
            })
            .clone();
        MemoryTransport {
            network: self.inner.clone(),
            endpoint,
        }
    }

    /// Tear down an endpoint, as if its process exited
    pub fn remove_endpoint(&self, identity: &ParticipantId) -> bool {
        match self.inner.endpoints.write().remove(identity) {
            Some(endpoint) => {
                endpoint.closed.store(true, Ordering::SeqCst);
                let mut subscriptions = endpoint.subscriptions.write();
                subscriptions.by_filter.clear();
                subscriptions.by_id.clear();
                true
            }
            None => false,
        }
    }

    /// Number of live subscriptions on `identity`'s endpoint
    pub fn subscription_count(&self, identity: &ParticipantId) -> usize {
        self.inner
            .endpoints
            .read()
            .get(identity)
            .map(|endpoint| endpoint.subscriptions.read().by_id.len())
            .unwrap_or(0)
    }

    /// Snapshot of delivery counters
    pub fn stats(&self) -> MemoryNetworkStats {
        let counters = &self.inner.counters;
        MemoryNetworkStats {
            sent: counters.sent.load(Ordering::Relaxed),
            delivered: counters.delivered.load(Ordering::Relaxed),
            dropped: counters.dropped.load(Ordering::Relaxed),
            unrouted: counters.unrouted.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl IdentityEffects for MemoryNetwork {
    async fn is_resolvable(&self, identity: &ParticipantId) -> bool {
        self.inner
            .endpoints
            .read()
            .get(identity)
            .is_some_and(|endpoint| !endpoint.closed.load(Ordering::SeqCst))
    }
}

/// One participant's view of a `MemoryNetwork`
#[derive(Clone)]
pub struct MemoryTransport {
    network: Arc<NetworkInner>,
    endpoint: Arc<Endpoint>,
}

fn roll(probability: f64) -> bool {
    probability > 0.0 && rand::thread_rng().gen::<f64>() < probability
}

#[async_trait]
impl TransportEffects for MemoryTransport {
    fn local_identity(&self) -> &ParticipantId {
        &self.endpoint.identity
    }

    async fn send(
        &self,
        to: &ParticipantId,
        filter: &FilterKey,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError> {
        if self.endpoint.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let destination = self
            .network
            .endpoints
            .read()
            .get(to)
            .cloned()
            .ok_or_else(|| TransportError::PeerUnreachable { peer: to.clone() })?;

        let counters = &self.network.counters;
        counters.sent.fetch_add(1, Ordering::Relaxed);

        let Some(handler) = destination.handler_for(filter) else {
            counters.unrouted.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(to = %to, filter = %filter, "No subscription for message, discarding");
            return Ok(());
        };

        if roll(self.network.config.drop_probability) {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(to = %to, filter = %filter, "Dropping message (fault injection)");
            return Ok(());
        }

        let copies = if roll(self.network.config.duplicate_probability) { 2 } else { 1 };
        for _ in 0..copies {
            let handler = handler.clone();
            let from = self.endpoint.identity.clone();
            let bytes = bytes.clone();
            counters.delivered.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(async move {
                handler.on_message(&from, bytes);
            });
        }
        Ok(())
    }

    fn subscribe(
        &self,
        filter: FilterKey,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId, TransportError> {
        if self.endpoint.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let mut subscriptions = self.endpoint.subscriptions.write();
        if subscriptions.by_filter.contains_key(&filter) {
            return Err(TransportError::AlreadySubscribed { filter });
        }
        let id = SubscriptionId(self.network.next_subscription.fetch_add(1, Ordering::Relaxed));
        subscriptions.by_id.insert(id, filter.clone());
        subscriptions.by_filter.insert(filter, (id, handler));
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) {
        let mut subscriptions = self.endpoint.subscriptions.write();
        if let Some(filter) = subscriptions.by_id.remove(&subscription) {
            subscriptions.by_filter.remove(&filter);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bbq_core::{QueryId, Topic};
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Inbox {
        messages: Mutex<Vec<(ParticipantId, Vec<u8>)>>,
    }

    impl MessageHandler for Inbox {
        fn on_message(&self, from: &ParticipantId, bytes: Vec<u8>) {
            self.messages.lock().push((from.clone(), bytes));
        }
    }

    fn topic_filter() -> FilterKey {
        FilterKey::Topic(Topic::new("passkeys").unwrap())
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_send_routes_by_filter() {
        let network = MemoryNetwork::reliable();
        let alice = network.endpoint(ParticipantId::new("alice"));
        let bob = network.endpoint(ParticipantId::new("bob"));
        let inbox = Arc::new(Inbox::default());
        bob.subscribe(topic_filter(), inbox.clone()).unwrap();

        alice.send(&ParticipantId::new("bob"), &topic_filter(), vec![1, 2]).await.unwrap();
        let other = FilterKey::reply(Topic::new("passkeys").unwrap(), QueryId(1));
        alice.send(&ParticipantId::new("bob"), &other, vec![3]).await.unwrap();
        settle().await;

        let messages = inbox.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], (ParticipantId::new("alice"), vec![1, 2]));
        assert_eq!(network.stats().unrouted, 1);
    }

    #[tokio::test]
    async fn test_unknown_peer_is_unreachable() {
        let network = MemoryNetwork::reliable();
        let alice = network.endpoint(ParticipantId::new("alice"));
        let err = alice
            .send(&ParticipantId::new("nobody"), &topic_filter(), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::PeerUnreachable { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_subscription_rejected_until_unsubscribed() {
        let network = MemoryNetwork::reliable();
        let bob = network.endpoint(ParticipantId::new("bob"));
        let id = bob.subscribe(topic_filter(), Arc::new(Inbox::default())).unwrap();
        assert!(matches!(
            bob.subscribe(topic_filter(), Arc::new(Inbox::default())),
            Err(TransportError::AlreadySubscribed { .. })
        ));

        bob.unsubscribe(id);
        bob.unsubscribe(id);
        assert_eq!(network.subscription_count(&ParticipantId::new("bob")), 0);
        assert!(bob.subscribe(topic_filter(), Arc::new(Inbox::default())).is_ok());
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let network = MemoryNetwork::new(MemoryTransportConfig::always_duplicate()).unwrap();
        let alice = network.endpoint(ParticipantId::new("alice"));
        let bob = network.endpoint(ParticipantId::new("bob"));
        let inbox = Arc::new(Inbox::default());
        bob.subscribe(topic_filter(), inbox.clone()).unwrap();

        alice.send(&ParticipantId::new("bob"), &topic_filter(), vec![7]).await.unwrap();
        settle().await;
        assert_eq!(inbox.messages.lock().len(), 2);

        let lossy = MemoryNetwork::new(MemoryTransportConfig {
            drop_probability: 1.0,
            ..Default::default()
        })
        .unwrap();
        let alice = lossy.endpoint(ParticipantId::new("alice"));
        let bob = lossy.endpoint(ParticipantId::new("bob"));
        let inbox = Arc::new(Inbox::default());
        bob.subscribe(topic_filter(), inbox.clone()).unwrap();
        alice.send(&ParticipantId::new("bob"), &topic_filter(), vec![7]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(inbox.messages.lock().is_empty());
        assert_eq!(lossy.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_removed_endpoint_no_longer_resolves() {
        let network = MemoryNetwork::reliable();
        let alice = network.endpoint(ParticipantId::new("alice"));
        assert!(network.is_resolvable(&ParticipantId::new("alice")).await);
        assert!(!network.is_resolvable(&ParticipantId::new("mallory")).await);

        assert!(network.remove_endpoint(&ParticipantId::new("alice")));
        assert!(!network.is_resolvable(&ParticipantId::new("alice")).await);
        assert!(matches!(
            alice.send(&ParticipantId::new("alice"), &topic_filter(), vec![]).await,
            Err(TransportError::Closed)
        ));
    }
}
