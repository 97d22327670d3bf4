//! Static responder directory
//!
//! Topic → responder registry held in memory. Stands in for the platform
//! service that enumerates installed providers.
//!
//! Uses `parking_lot::RwLock`: lookups clone the set and release the lock
//! immediately, nothing is held across `.await`.

use async_trait::async_trait;
use bbq_core::effects::DirectoryEffects;
use bbq_core::{ParticipantId, Topic};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// In-memory directory of responders per topic
#[derive(Debug, Default)]
pub struct StaticDirectory {
    entries: RwLock<HashMap<Topic, BTreeSet<ParticipantId>>>,
}

impl StaticDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `responder` as eligible for `topic`
    pub fn register(&self, topic: Topic, responder: ParticipantId) {
        self.entries.write().entry(topic).or_default().insert(responder);
    }

    /// Remove `responder` from `topic`; returns whether it was registered
    pub fn unregister(&self, topic: &Topic, responder: &ParticipantId) -> bool {
        let mut entries = self.entries.write();
        let Some(responders) = entries.get_mut(topic) else {
            return false;
        };
        let removed = responders.remove(responder);
        if responders.is_empty() {
            entries.remove(topic);
        }
        removed
    }

    /// Remove `responder` from every topic
    pub fn remove_participant(&self, responder: &ParticipantId) {
        let mut entries = self.entries.write();
        entries.retain(|_, responders| {
            responders.remove(responder);
            !responders.is_empty()
        });
    }
}

#[async_trait]
impl DirectoryEffects for StaticDirectory {
    async fn lookup(&self, topic: &Topic) -> BTreeSet<ParticipantId> {
        self.entries.read().get(topic).cloned().unwrap_or_default()
    }
}
