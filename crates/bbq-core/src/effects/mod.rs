//! Core effect trait definitions
//!
//! Pure trait definitions for every side effect the query engine performs.
//! This module defines **what** effects can be performed; handlers in
//! `bbq-effects` define **how**.
//!
//! # Effect Classification
//!
//! - **Random**: CSPRNG source for query ids and capability tokens
//! - **Directory**: which responders are eligible for a topic
//! - **Transport**: unreliable, unordered delivery keyed by `FilterKey`
//! - **Identity**: whether a claimed requester identity resolves to a live process
//!
//! The engine is parameterised by these traits so tests can swap in
//! deterministic or scripted handlers.

pub mod directory;
pub mod identity;
pub mod random;
pub mod transport;

pub use directory::DirectoryEffects;
pub use identity::IdentityEffects;
pub use random::RandomEffects;
pub use transport::{MessageHandler, TransportEffects, TransportError};
