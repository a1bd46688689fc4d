//! Common types used throughout the matchmaking core

use crate::error::MatchmakingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier handed out by the backend for a connected remote peer
pub type PeerId = String;

/// Opaque identity of the local participant
///
/// Identities are compared as raw strings. Two participants that compute
/// the same ordering independently agree on which of them keeps hosting.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocalIdentity(String);

impl LocalIdentity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self(crate::utils::generate_identity())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LocalIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LocalIdentity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which hosts should be preferred over others when joining
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostPreference {
    /// First host in directory order that still has room
    #[default]
    FirstAvailable,
    /// Host with the most connected peers that still has room
    MostConnectedPeers,
}

impl fmt::Display for HostPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPreference::FirstAvailable => write!(f, "FirstAvailable"),
            HostPreference::MostConnectedPeers => write!(f, "MostConnectedPeers"),
        }
    }
}

/// Snapshot of one advertised session at query time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Identity of the hosting participant
    pub identity: String,
    pub display_name: String,
    pub connected_peer_count: usize,
    pub peer_limit: usize,
    pub comment: Option<String>,
}

impl HostRecord {
    pub fn new(identity: impl Into<String>, connected_peer_count: usize, peer_limit: usize) -> Self {
        let identity = identity.into();
        Self {
            display_name: identity.clone(),
            identity,
            connected_peer_count,
            peer_limit,
            comment: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Whether another peer can still join this session
    pub fn has_room(&self) -> bool {
        self.connected_peer_count < self.peer_limit
    }

    /// Reject records no selection policy can reason about
    pub fn check_well_formed(&self) -> std::result::Result<(), MatchmakingError> {
        if self.identity.is_empty() {
            return Err(MatchmakingError::MalformedHostRecord {
                identity: self.identity.clone(),
                reason: "empty identity".to_string(),
            });
        }
        if self.peer_limit == 0 {
            return Err(MatchmakingError::MalformedHostRecord {
                identity: self.identity.clone(),
                reason: "peer limit is zero".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for HostRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[name={}, identity={}, connectedPeers={}/{}, comment={}]",
            self.display_name,
            self.identity,
            self.connected_peer_count,
            self.peer_limit,
            self.comment.as_deref().unwrap_or("")
        )
    }
}

/// Ordered result of one directory query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionListing {
    pub hosts: Vec<HostRecord>,
    pub received_at: Option<DateTime<Utc>>,
}

impl SessionListing {
    pub fn new(hosts: Vec<HostRecord>) -> Self {
        Self {
            hosts,
            received_at: Some(crate::utils::current_timestamp()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostRecord> {
        self.hosts.iter()
    }

    /// Split off malformed records, keeping the order of the rest
    pub fn sanitized(self) -> (SessionListing, Vec<MatchmakingError>) {
        let mut rejected = Vec::new();
        let hosts = self
            .hosts
            .into_iter()
            .filter(|host| match host.check_well_formed() {
                Ok(()) => true,
                Err(e) => {
                    rejected.push(e);
                    false
                }
            })
            .collect();

        (
            SessionListing {
                hosts,
                received_at: self.received_at,
            },
            rejected,
        )
    }
}

impl From<Vec<HostRecord>> for SessionListing {
    fn from(hosts: Vec<HostRecord>) -> Self {
        Self::new(hosts)
    }
}

/// What the coordinator hands to the registry when advertising a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRegistration {
    pub identity: LocalIdentity,
    pub name: String,
    pub comment: Option<String>,
    pub peer_limit: usize,
    pub port: u16,
}

/// Side of a session the local participant ended up on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionRole {
    Host,
    Client,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_record_has_room() {
        assert!(HostRecord::new("h1", 3, 4).has_room());
        assert!(!HostRecord::new("h1", 4, 4).has_room());
        assert!(!HostRecord::new("h1", 5, 4).has_room());
    }

    #[test]
    fn test_sanitized_drops_malformed_records_in_order() {
        let listing = SessionListing::new(vec![
            HostRecord::new("a", 0, 4),
            HostRecord::new("", 0, 4),
            HostRecord::new("b", 0, 0),
            HostRecord::new("c", 1, 4),
        ]);

        let (clean, rejected) = listing.sanitized();
        let ids: Vec<_> = clean.iter().map(|h| h.identity.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(rejected.len(), 2);
    }

    #[test]
    fn test_local_identity_ordering_is_string_ordering() {
        let a = LocalIdentity::from("alpha");
        let b = LocalIdentity::from("beta");
        assert!(a < b);
        assert_eq!(a.as_str(), "alpha");
    }

    #[test]
    fn test_generated_identities_are_unique() {
        assert_ne!(LocalIdentity::generate(), LocalIdentity::generate());
    }
}
