//! Thin client over the external registry
//!
//! The client issues listing requests and keeps the most recently completed
//! listing around for polling. It does no batching of its own; callers that
//! share one outstanding request coordinate through the pending queue.

use crate::directory::registry::{ListingObserver, Registry};
use crate::error::{MatchmakingError, Result};
use crate::types::{SessionListing, SessionRegistration};
use std::sync::{Arc, RwLock, Weak};
use tracing::debug;

pub struct DirectoryClient {
    registry: Arc<dyn Registry>,
    latest: RwLock<SessionListing>,
}

impl DirectoryClient {
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            latest: RwLock::new(SessionListing::default()),
        }
    }

    /// Issue an asynchronous listing request for `game_type_key`
    pub fn request_listing(&self, game_type_key: &str) {
        debug!("Requesting host list for '{}'", game_type_key);
        self.registry.request_listing(game_type_key);
    }

    /// Remember a completed listing as the latest one
    pub fn record_listing(&self, listing: &SessionListing) -> Result<()> {
        let mut latest = self
            .latest
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("latest listing"))?;
        *latest = listing.clone();
        Ok(())
    }

    /// Result of the most recently completed request (empty before the first)
    pub fn poll_latest_listing(&self) -> SessionListing {
        self.latest
            .read()
            .map(|latest| latest.clone())
            .unwrap_or_default()
    }

    pub fn register_session(&self, game_type_key: &str, registration: SessionRegistration) {
        self.registry.register_session(game_type_key, registration);
    }

    /// Route the registry's listing events to `observer`
    pub fn subscribe(&self, observer: Weak<dyn ListingObserver>) {
        self.registry.subscribe(observer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::registry::RecordingRegistry;
    use crate::types::HostRecord;

    #[test]
    fn test_poll_before_any_listing_is_empty() {
        let client = DirectoryClient::new(Arc::new(RecordingRegistry::new()));
        assert!(client.poll_latest_listing().is_empty());
    }

    #[test]
    fn test_request_is_forwarded_to_registry() {
        let registry = Arc::new(RecordingRegistry::new());
        let client = DirectoryClient::new(registry.clone());

        client.request_listing("game");
        client.request_listing("game");

        assert_eq!(registry.request_count(), 2);
    }

    #[test]
    fn test_latest_listing_is_replaced() {
        let client = DirectoryClient::new(Arc::new(RecordingRegistry::new()));

        let first = SessionListing::new(vec![HostRecord::new("a", 0, 4)]);
        let second = SessionListing::new(vec![HostRecord::new("b", 1, 4)]);
        client.record_listing(&first).unwrap();
        client.record_listing(&second).unwrap();

        let latest = client.poll_latest_listing();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest.hosts[0].identity, "b");
    }
}
