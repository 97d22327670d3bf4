//! Identity resolution effect trait

use crate::identifiers::ParticipantId;
use async_trait::async_trait;

/// Resolves claimed identities against what the platform knows about
///
/// Responders use this to refuse queries whose `requester` field names a
/// process that is not installed or not running.
#[async_trait]
pub trait IdentityEffects: Send + Sync {
    /// Whether `identity` resolves to a known, live participant
    async fn is_resolvable(&self, identity: &ParticipantId) -> bool;
}
