//! BBQ Core - shared vocabulary for the scatter-gather query layer
//!
//! This crate holds the types every other BBQ crate agrees on and nothing
//! that performs side effects itself:
//!
//! - **Identifiers**: `QueryId`, `Token`, `ParticipantId`, `Topic`, `FilterKey`
//! - **Messages**: the query/response envelopes and their CBOR codec
//! - **Configuration**: `EngineConfig` with TOML loading and validation
//! - **Effects**: pure trait signatures for randomness, directory lookup,
//!   transport and identity resolution. Handlers live in `bbq-effects`.
//!
//! ```text
//! requester                         responders (N, unknown up front)
//!   dispatch ── QueryMessage(token_i) ──▶ ResponderSkeleton ─▶ handler
//!      ▲                                        │
//!      └──── ResponseMessage(token_i) ◀─────────┘
//!   callback(ResponseMap) once: all tokens answered OR deadline
//! ```

#![forbid(unsafe_code)]

/// Engine configuration
pub mod config;

/// Pure effect interfaces (no implementations)
pub mod effects;

/// Unified error handling
pub mod errors;

/// Query, token, participant and topic identifiers
pub mod identifiers;

/// Wire envelopes and codec
pub mod messages;

pub use config::{DisposePolicy, EngineConfig};
pub use errors::{BbqError, BbqResult};
pub use identifiers::{FilterKey, ParticipantId, QueryId, ResponseMap, SubscriptionId, Token, Topic};
pub use messages::{QueryMessage, ResponseMessage, PROTOCOL_VERSION};
