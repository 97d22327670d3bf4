//! Shared harness for engine integration tests
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use bbq_core::{EngineConfig, ParticipantId, Topic};
use bbq_effects::{MemoryNetwork, MemoryTransport, MemoryTransportConfig, StaticDirectory};
use bbq_query::{QueryEngine, QueryHandler};
use bbq_testkit::participant;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One in-memory network plus the directory every engine on it shares
pub struct Harness {
    pub network: MemoryNetwork,
    pub directory: Arc<StaticDirectory>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_network(MemoryTransportConfig::reliable())
    }

    pub fn with_network(config: MemoryTransportConfig) -> Self {
        bbq_testkit::init_tracing();
        Self {
            network: MemoryNetwork::new(config).unwrap(),
            directory: Arc::new(StaticDirectory::new()),
        }
    }

    pub fn engine(&self, name: &str) -> QueryEngine {
        self.engine_with(name, EngineConfig::testing())
    }

    pub fn engine_with(&self, name: &str, config: EngineConfig) -> QueryEngine {
        QueryEngine::builder()
            .with_config(config)
            .with_transport(Arc::new(self.network.endpoint(participant(name))))
            .with_identities(Arc::new(self.network.clone()))
            .with_directory(self.directory.clone())
            .build()
            .unwrap()
    }

    /// A participant serving `topic` with `handler`, listed in the directory
    pub fn responder(&self, name: &str, topic: &Topic, handler: Arc<dyn QueryHandler>) -> QueryEngine {
        let engine = self.engine(name);
        engine.register_handler(topic.clone(), handler).unwrap();
        self.directory.register(topic.clone(), participant(name));
        engine
    }

    /// A participant listed for `topic` that is reachable but never answers
    pub fn mute(&self, name: &str, topic: &Topic) -> MemoryTransport {
        self.directory.register(topic.clone(), participant(name));
        self.network.endpoint(participant(name))
    }

    /// A raw endpoint not known to the directory
    pub fn rogue(&self, name: &str) -> MemoryTransport {
        self.network.endpoint(participant(name))
    }
}

type Script = dyn Fn(&[u8]) -> (Duration, Option<Vec<u8>>) + Send + Sync;

/// Handler whose answer and delay are computed from the query payload
pub struct Scripted {
    script: Box<Script>,
    calls: AtomicUsize,
}

impl Scripted {
    pub fn new(script: impl Fn(&[u8]) -> (Duration, Option<Vec<u8>>) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    /// Answer `payload` after `delay`
    pub fn answer_after(delay: Duration, payload: &[u8]) -> Arc<Self> {
        let payload = payload.to_vec();
        Self::new(move |_| (delay, Some(payload.clone())))
    }

    pub fn answer(payload: &[u8]) -> Arc<Self> {
        Self::answer_after(Duration::ZERO, payload)
    }

    /// Answer "no data" at once
    pub fn nothing() -> Arc<Self> {
        Self::new(|_| (Duration::ZERO, None))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryHandler for Scripted {
    async fn handle(&self, _topic: &Topic, payload: &[u8]) -> Option<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (delay, result) = (self.script)(payload);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

/// Poll `condition` until it holds, sleeping between attempts
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached");
}

/// Let spawned delivery tasks run without advancing much time
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn names(map: &bbq_core::ResponseMap) -> Vec<&str> {
    map.keys().map(ParticipantId::as_str).collect()
}
