//! Host selection for the matchmaking core
//!
//! This module decides which advertised session, if any, a participant
//! should join, including the tie-break used between racing hosts.

pub mod selector;

// Re-export commonly used types
pub use selector::{is_eligible, outranks, select_host, HostSelector, PolicyHostSelector};
