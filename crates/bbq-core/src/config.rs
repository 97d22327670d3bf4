//! Engine configuration
//!
//! Loaded from TOML or built from presets. Durations are written in
//! milliseconds on disk:
//!
//! ```toml
//! max_deadline_ms = 30000
//! max_payload_bytes = 65536
//! max_message_bytes = 262144
//! dispose_policy = "resolve_partial"
//! ```

use crate::errors::{BbqError, BbqResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What `dispose` does with queries that are still pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisposePolicy {
    /// Drop pending queries without invoking their callbacks
    #[default]
    Abandon,
    /// Invoke each pending callback with the responses gathered so far
    ResolvePartial,
}

/// Configuration for a query engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Longest deadline a caller may request
    #[serde(rename = "max_deadline_ms", with = "duration_ms")]
    pub max_deadline: Duration,

    /// Largest query payload or handler result accepted
    pub max_payload_bytes: usize,

    /// Inbound messages above this size are dropped undecoded
    pub max_message_bytes: usize,

    /// Behaviour of `dispose` towards pending queries
    pub dispose_policy: DisposePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_deadline: Duration::from_secs(60),
            max_payload_bytes: 64 * 1024,
            max_message_bytes: 256 * 1024,
            dispose_policy: DisposePolicy::Abandon,
        }
    }
}

impl EngineConfig {
    /// Configuration for tests: short deadlines, small messages
    pub fn testing() -> Self {
        Self {
            max_deadline: Duration::from_secs(10),
            max_payload_bytes: 4 * 1024,
            max_message_bytes: 16 * 1024,
            ..Default::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> BbqResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BbqError::config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load, parse and validate a TOML file
    pub fn load_from_file(path: &Path) -> BbqResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BbqError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration settings
    pub fn validate(&self) -> BbqResult<()> {
        if self.max_deadline.is_zero() {
            return Err(BbqError::config("max_deadline must be greater than 0"));
        }
        if self.max_payload_bytes == 0 {
            return Err(BbqError::config("max_payload_bytes must be greater than 0"));
        }
        if self.max_message_bytes < self.max_payload_bytes {
            return Err(BbqError::config(
                "max_message_bytes must be at least max_payload_bytes",
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
