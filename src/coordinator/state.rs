//! Observable coordinator state

use crate::types::SessionRole;
use serde::Serialize;
use std::fmt;

/// Where the coordinator is in its join/host flow
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub enum CoordinatorPhase {
    #[default]
    Idle,
    /// Waiting on a listing to pick a host from
    Searching,
    /// Connect issued, waiting for the backend to confirm
    Connecting,
    /// Hosting is being initialized
    Creating,
}

impl fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordinatorPhase::Idle => write!(f, "Idle"),
            CoordinatorPhase::Searching => write!(f, "Searching"),
            CoordinatorPhase::Connecting => write!(f, "Connecting"),
            CoordinatorPhase::Creating => write!(f, "Creating"),
        }
    }
}

/// Mutable matchmaking state of one participant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorState {
    pub phase: CoordinatorPhase,
    pub role: Option<SessionRole>,
    /// Remote peers connected to the local session
    pub current_peer_count: usize,
    /// A retrying join is in effect
    pub auto_retry_active: bool,
    /// Set by `stop_auto_retry`; only `reset` clears it
    pub stopped: bool,
    pub ensuring_min_peers: bool,
    pub min_peers_attempts: u32,
}

impl CoordinatorState {
    /// Whether the min-peers loop may run another probe
    pub fn wants_more_peers(&self, min_remote_peers: usize, max_attempts: u32) -> bool {
        !self.stopped
            && self.current_peer_count < min_remote_peers
            && self.min_peers_attempts < max_attempts
    }
}
