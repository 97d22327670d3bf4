//! BBQ Testkit - shared helpers for engine tests
//!
//! - deterministic and scripted `RandomEffects` handlers
//! - a recorder that captures completion callbacks with their timestamps
//! - small fixtures for topics and participants
//! - one-call tracing initialisation honouring `RUST_LOG`

#![allow(clippy::unwrap_used, clippy::expect_used)]

pub mod fixtures;
pub mod random;
pub mod recorder;

pub use fixtures::{participant, topic};
pub use random::{ScriptedRandom, SeededRandom};
pub use recorder::CallbackRecorder;

/// Install a test subscriber once per process; later calls are no-ops
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
