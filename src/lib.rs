//! Peer Matchmaker - decentralized join-or-host matchmaking
//!
//! This crate lets peers either join an advertised game session or host one,
//! with timed auto-retry and a symmetry-breaking rule so racing hosts
//! converge on a single session.

pub mod backend;
pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod selection;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ConnectionError, MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use backend::{SessionBackend, SessionEvents};
pub use coordinator::{CoordinatorPhase, CoordinatorState, MatchCoordinator};
pub use directory::{ListingObserver, Registry};
pub use retry::Timer;
pub use selection::{HostSelector, PolicyHostSelector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
