//! Query and response envelopes
//!
//! Both directions are CBOR-encoded. The response does not repeat the query
//! id: it is delivered on the `FilterKey::Reply` subscription of its query,
//! which already names it.

use crate::errors::{BbqError, BbqResult};
use crate::identifiers::{ParticipantId, QueryId, Token, Topic};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Wire protocol version carried by every message
pub const PROTOCOL_VERSION: u8 = 1;

/// Query sent to one responder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMessage {
    /// Protocol version
    pub version: u8,
    /// Query this message belongs to
    pub query_id: QueryId,
    /// Token the responder must echo back
    pub token: Token,
    /// What is being asked for
    pub topic: Topic,
    /// Identity the responder addresses its reply to
    pub requester: ParticipantId,
    /// Opaque request body, may be empty
    pub payload: Vec<u8>,
}

impl QueryMessage {
    /// Build a query message at the current protocol version
    pub fn new(
        query_id: QueryId,
        token: Token,
        topic: Topic,
        requester: ParticipantId,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            query_id,
            token,
            topic,
            requester,
            payload,
        }
    }
}

/// Response sent back by a responder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Protocol version
    pub version: u8,
    /// Token copied from the query
    pub token: Token,
    /// `None` means the responder has nothing to offer
    pub payload: Option<Vec<u8>>,
}

impl ResponseMessage {
    /// Build a response message at the current protocol version
    pub fn new(token: Token, payload: Option<Vec<u8>>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            token,
            payload,
        }
    }
}

trait Versioned {
    fn version(&self) -> u8;
}

impl Versioned for QueryMessage {
    fn version(&self) -> u8 {
        self.version
    }
}

impl Versioned for ResponseMessage {
    fn version(&self) -> u8 {
        self.version
    }
}

/// Encode a message to CBOR
pub fn encode<T: Serialize>(message: &T) -> BbqResult<Vec<u8>> {
    Ok(serde_cbor::to_vec(message)?)
}

/// Decode a query message, rejecting oversized input and unknown versions
pub fn decode_query(bytes: &[u8], max_len: usize) -> BbqResult<QueryMessage> {
    decode(bytes, max_len)
}

/// Decode a response message, rejecting oversized input and unknown versions
pub fn decode_response(bytes: &[u8], max_len: usize) -> BbqResult<ResponseMessage> {
    decode(bytes, max_len)
}

fn decode<T: DeserializeOwned + Versioned>(bytes: &[u8], max_len: usize) -> BbqResult<T> {
    if bytes.len() > max_len {
        return Err(BbqError::serialization(format!(
            "message of {} bytes exceeds limit of {max_len}",
            bytes.len()
        )));
    }
    let message: T = serde_cbor::from_slice(bytes)?;
    if message.version() != PROTOCOL_VERSION {
        return Err(BbqError::serialization(format!(
            "unsupported protocol version {}",
            message.version()
        )));
    }
    Ok(message)
}
