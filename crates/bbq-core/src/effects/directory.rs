//! Responder directory effect trait

use crate::identifiers::{ParticipantId, Topic};
use async_trait::async_trait;
use std::collections::BTreeSet;

/// Lookup of the responders currently eligible for a topic
#[async_trait]
pub trait DirectoryEffects: Send + Sync {
    /// Eligible responders for `topic`; may block briefly
    async fn lookup(&self, topic: &Topic) -> BTreeSet<ParticipantId>;
}
