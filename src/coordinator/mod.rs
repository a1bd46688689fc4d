//! Matchmaking coordination
//!
//! This module owns the join / create flows, the batched listing queue and
//! the observable coordinator state.

pub mod matcher;
pub mod pending;
pub mod state;

// Re-export commonly used types
pub use matcher::MatchCoordinator;
pub use pending::{ListingContinuation, PendingListingQueue};
pub use state::{CoordinatorPhase, CoordinatorState};
