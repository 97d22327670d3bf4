//! BBQ Effects - concrete handlers for the `bbq-core` effect traits
//!
//! - `OsRandomHandler`: operating-system CSPRNG
//! - `StaticDirectory`: in-process topic → responder registry
//! - `MemoryNetwork` / `MemoryTransport`: in-process transport with fault
//!   injection, also acting as the identity resolver for its participants
//! - `TaskRegistry`: tracked background tasks and abortable one-shot timers

#![forbid(unsafe_code)]

pub mod directory;
pub mod random;
pub mod tasks;
pub mod transport;

pub use directory::StaticDirectory;
pub use random::OsRandomHandler;
pub use tasks::{TaskRegistry, TimerHandle};
pub use transport::{MemoryNetwork, MemoryNetworkStats, MemoryTransport, MemoryTransportConfig};
