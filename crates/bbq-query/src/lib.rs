//! # BBQ Query - scatter-gather coordination
//!
//! Sends one query to every responder registered for a topic and hands the
//! caller a single aggregated result, exactly once, when either every
//! responder has answered or the deadline expires.
//!
//! ## Components
//!
//! - **Dispatcher**: responder lookup, token issue, registration, fan-out
//! - **Collector**: token matching of inbound responses
//! - **Arbiter**: the exactly-once completion point shared by the collector
//!   and the deadline timer
//! - **Responder**: envelope handling around a local [`QueryHandler`]
//! - **Engine**: the [`QueryEngine`] facade tying them to effect handlers
//!
//! ## Design Principles
//!
//! - **Register before send**: a query is in the pending table before any
//!   message that could be answered leaves
//! - **Tokens as capabilities**: only the holder of an issued token can
//!   contribute to a query
//! - **Single linearization point**: removal from the pending table decides
//!   which completion path wins

#![forbid(unsafe_code)]

pub mod arbiter;
pub mod collector;
pub mod dispatcher;
pub mod engine;
pub mod identity;
pub mod pending;
pub mod responder;
pub mod stats;

pub use arbiter::CompletionPath;
pub use collector::Collected;
pub use dispatcher::Dispatched;
pub use engine::{QueryEngine, QueryEngineBuilder};
pub use identity::IdentityGenerator;
pub use pending::{Acceptance, PendingQuery, PendingQueryTable, QueryCallback};
pub use responder::{HandlerRegistration, QueryHandler};
pub use stats::EngineStats;
