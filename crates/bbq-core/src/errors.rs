//! Unified error system for BBQ
//!
//! One error type for every fallible public operation. Runtime anomalies on
//! the delivery path (forged tokens, duplicates, malformed messages) are never
//! surfaced through this type; they are logged and counted where they occur.

use crate::effects::transport::TransportError;

/// Unified error type for all BBQ operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BbqError {
    /// Invalid input supplied by the caller
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Encoding or decoding a wire message failed
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Transport-level failure
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// The engine has been disposed and accepts no new work
    #[error("Engine disposed")]
    Disposed,

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration problem
        message: String,
    },

    /// Internal invariant violated
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl BbqError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Standard Result type for BBQ operations
pub type BbqResult<T> = std::result::Result<T, BbqError>;

impl From<TransportError> for BbqError {
    fn from(err: TransportError) -> Self {
        Self::network(err.to_string())
    }
}

impl From<serde_cbor::Error> for BbqError {
    fn from(err: serde_cbor::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for BbqError {
    fn from(err: std::io::Error) -> Self {
        Self::config(err.to_string())
    }
}
