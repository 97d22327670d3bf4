//! Transport effect trait definitions
//!
//! The transport is assumed unreliable: messages may be dropped, duplicated
//! or reordered. Inbound messages are routed to whichever handler is
//! subscribed under the message's `FilterKey` on the destination.

use crate::identifiers::{FilterKey, ParticipantId, SubscriptionId};
use async_trait::async_trait;
use std::sync::Arc;

/// Transport operation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Destination is not reachable at all
    #[error("Peer unreachable: {peer}")]
    PeerUnreachable {
        /// Destination of the failed send
        peer: ParticipantId,
    },
    /// A handler is already registered under this filter
    #[error("Filter already subscribed: {filter}")]
    AlreadySubscribed {
        /// The contested filter
        filter: FilterKey,
    },
    /// Local endpoint has been shut down
    #[error("Transport closed")]
    Closed,
}

/// Receiver of inbound messages for one subscription
///
/// Called on transport delivery tasks, possibly concurrently for the same
/// subscription. Implementations must not block.
pub trait MessageHandler: Send + Sync {
    /// Handle one raw inbound message from `from`
    fn on_message(&self, from: &ParticipantId, bytes: Vec<u8>);
}

/// Message transport bound to one local participant
#[async_trait]
pub trait TransportEffects: Send + Sync {
    /// Identity this transport sends as
    fn local_identity(&self) -> &ParticipantId;

    /// Send raw bytes to `to`, routed by `filter` on the receiving side
    ///
    /// `Ok` only means the message was handed off, not that it arrived.
    async fn send(
        &self,
        to: &ParticipantId,
        filter: &FilterKey,
        bytes: Vec<u8>,
    ) -> Result<(), TransportError>;

    /// Route inbound messages matching `filter` to `handler`
    fn subscribe(
        &self,
        filter: FilterKey,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionId, TransportError>;

    /// Remove a subscription; unknown ids are ignored
    fn unsubscribe(&self, subscription: SubscriptionId);
}
