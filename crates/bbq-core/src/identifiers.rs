//! Core identifier types used across BBQ
//!
//! `QueryId` and `Token` are 64-bit values drawn from a CSPRNG. A `Token`
//! doubles as a capability: a response is only attributed to a responder if
//! it carries the token that responder was handed at dispatch time.

use crate::errors::{BbqError, BbqResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of one outstanding scatter-gather query
///
/// Unique among concurrently pending queries of one engine; used as the
/// pending-table key and as part of the reply filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(pub u64);

impl QueryId {
    /// Raw 64-bit value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q:{:016x}", self.0)
    }
}

impl From<u64> for QueryId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Per-responder correlation token
///
/// Unique within its owning query, not necessarily across queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(pub u64);

impl Token {
    /// Raw 64-bit value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t:{:016x}", self.0)
    }
}

impl From<u64> for Token {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identity of a process taking part in a query, as a requester or a responder
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create a participant identity
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Logical name of the kind of data being queried
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    /// Create a topic, rejecting empty or whitespace-only names
    pub fn new(name: impl Into<String>) -> BbqResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BbqError::invalid("topic must not be empty"));
        }
        Ok(Self(name))
    }

    /// Get the topic string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for Topic {
    type Error = BbqError;

    fn try_from(name: &str) -> BbqResult<Self> {
        Self::new(name)
    }
}

/// Routing key a transport subscription is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterKey {
    /// Responders listen here for queries on a topic
    Topic(Topic),
    /// Responses for a single in-flight query are delivered here
    Reply {
        /// Topic of the query
        topic: Topic,
        /// Query the responses belong to
        query_id: QueryId,
    },
}

impl FilterKey {
    /// Reply filter for one query
    pub fn reply(topic: Topic, query_id: QueryId) -> Self {
        Self::Reply { topic, query_id }
    }

    /// Topic this filter is scoped to
    pub fn topic(&self) -> &Topic {
        match self {
            Self::Topic(topic) | Self::Reply { topic, .. } => topic,
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topic(topic) => write!(f, "topic/{topic}"),
            Self::Reply { topic, query_id } => write!(f, "reply/{topic}/{query_id}"),
        }
    }
}

/// Handle for a registered transport subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Result of a query: responder identity to response payload
///
/// Responders that answered "no data" are absent rather than mapped to an
/// empty payload.
pub type ResponseMap = BTreeMap<ParticipantId, Vec<u8>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_rejects_empty() {
        assert!(Topic::new("").is_err());
        assert!(Topic::new("   ").is_err());
        assert_eq!(Topic::new("passkeys").unwrap().as_str(), "passkeys");
    }

    #[test]
    fn test_display_is_fixed_width_hex() {
        assert_eq!(QueryId(0xab).to_string(), "q:00000000000000ab");
        assert_eq!(Token(u64::MAX).to_string(), "t:ffffffffffffffff");
    }

    #[test]
    fn test_filter_key_topic() {
        let topic = Topic::new("credentials").unwrap();
        let reply = FilterKey::reply(topic.clone(), QueryId(7));
        assert_eq!(reply.topic(), &topic);
        assert_eq!(reply.to_string(), "reply/credentials/q:0000000000000007");
        assert_ne!(reply, FilterKey::Topic(topic));
    }
}
