//! Random effect handler
//!
//! Production implementation of `RandomEffects`, backed by the operating
//! system's entropy source.

use bbq_core::effects::RandomEffects;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random handler using operating-system randomness
#[derive(Debug, Clone, Default)]
pub struct OsRandomHandler;

impl OsRandomHandler {
    /// Create a new OS random handler
    pub fn new() -> Self {
        Self
    }
}

impl RandomEffects for OsRandomHandler {
    fn random_u64(&self) -> u64 {
        OsRng.next_u64()
    }
}
