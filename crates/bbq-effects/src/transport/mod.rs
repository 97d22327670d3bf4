//! Transport handlers
//!
//! Only the in-memory transport lives here; platform transports plug in by
//! implementing `bbq_core::effects::TransportEffects`.

pub mod memory;

use bbq_core::{BbqError, BbqResult};
use serde::{Deserialize, Serialize};

pub use memory::{MemoryNetwork, MemoryNetworkStats, MemoryTransport};

/// Fault injection settings for the in-memory transport
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryTransportConfig {
    /// Probability that a sent message is silently lost
    pub drop_probability: f64,
    /// Probability that a delivered message is delivered a second time
    pub duplicate_probability: f64,
}

impl MemoryTransportConfig {
    /// Reliable delivery, no duplicates
    pub fn reliable() -> Self {
        Self::default()
    }

    /// Every message is delivered twice
    pub fn always_duplicate() -> Self {
        Self {
            duplicate_probability: 1.0,
            ..Self::default()
        }
    }

    /// Validate configuration settings
    pub fn validate(&self) -> BbqResult<()> {
        for (name, value) in [
            ("drop_probability", self.drop_probability),
            ("duplicate_probability", self.duplicate_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(BbqError::config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}
