//! Randomness effect trait

/// Source of unpredictable 64-bit values
///
/// Production handlers must be cryptographically secure: tokens generated
/// from this source are the only thing preventing a responder from forging
/// another responder's answer.
pub trait RandomEffects: Send + Sync {
    /// Next random value
    fn random_u64(&self) -> u64;
}
