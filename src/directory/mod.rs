//! Directory access for the matchmaking core
//!
//! This module wraps the external session registry: the collaborator trait,
//! the listing event stream, and the client the coordinator talks to.

pub mod client;
pub mod registry;

// Re-export commonly used types
pub use client::DirectoryClient;
pub use registry::{
    InMemoryDirectory, InMemoryRegistry, ListingObserver, RecordingRegistry, Registry,
};
