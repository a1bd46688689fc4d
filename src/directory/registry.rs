//! Registry collaborator interface and an in-memory implementation
//!
//! The registry is the external lookup service mapping a game-type key to the
//! sessions advertised under it. Requests are fire-and-forget; the answer comes
//! back later on the `ListingObserver` event stream. An unreachable registry
//! simply never answers.

use crate::types::{HostRecord, SessionListing, SessionRegistration};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Receiver of completed listing responses
pub trait ListingObserver: Send + Sync {
    /// Called once per completed listing request
    fn on_listing_received(&self, listing: SessionListing);
}

/// Trait for the external session registry
pub trait Registry: Send + Sync {
    /// Ask for the sessions listed under `game_type_key`
    fn request_listing(&self, game_type_key: &str);

    /// Advertise a hosted session under `game_type_key`
    fn register_session(&self, game_type_key: &str, registration: SessionRegistration);

    /// Route completed listings to `observer`
    fn subscribe(&self, observer: Weak<dyn ListingObserver>);
}

/// One advertised session inside the in-memory directory
#[derive(Debug, Clone)]
struct DirectoryEntry {
    registration: SessionRegistration,
    connected_peer_count: usize,
}

impl DirectoryEntry {
    fn to_record(&self) -> HostRecord {
        HostRecord {
            identity: self.registration.identity.as_str().to_string(),
            display_name: self.registration.name.clone(),
            connected_peer_count: self.connected_peer_count,
            peer_limit: self.registration.peer_limit,
            comment: self.registration.comment.clone(),
        }
    }
}

/// Shared in-process directory store
///
/// Entries are kept per game-type key in registration order, so listings come
/// back in a stable order.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    entries: RwLock<HashMap<String, Vec<DirectoryEntry>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the session advertised by `registration.identity`
    pub fn register(&self, game_type_key: &str, registration: SessionRegistration) {
        let Ok(mut entries) = self.entries.write() else {
            warn!("Directory lock poisoned, dropping registration");
            return;
        };

        let sessions = entries.entry(game_type_key.to_string()).or_default();
        sessions.retain(|entry| entry.registration.identity != registration.identity);
        sessions.push(DirectoryEntry {
            registration,
            connected_peer_count: 0,
        });
    }

    /// Remove the session advertised by `identity`
    pub fn unregister(&self, game_type_key: &str, identity: &str) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };

        match entries.get_mut(game_type_key) {
            Some(sessions) => {
                let before = sessions.len();
                sessions.retain(|entry| entry.registration.identity.as_str() != identity);
                sessions.len() != before
            }
            None => false,
        }
    }

    /// Record the current peer count of an advertised session
    pub fn set_connected_peers(&self, game_type_key: &str, identity: &str, count: usize) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };

        let entry = entries.get_mut(game_type_key).and_then(|sessions| {
            sessions
                .iter_mut()
                .find(|entry| entry.registration.identity.as_str() == identity)
        });

        match entry {
            Some(entry) => {
                entry.connected_peer_count = count;
                true
            }
            None => false,
        }
    }

    /// Snapshot of everything listed under `game_type_key`
    pub fn listing(&self, game_type_key: &str) -> SessionListing {
        let hosts = self
            .entries
            .read()
            .map(|entries| {
                entries
                    .get(game_type_key)
                    .map(|sessions| sessions.iter().map(DirectoryEntry::to_record).collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default();

        SessionListing::new(hosts)
    }
}

/// Per-participant registry handle over a shared `InMemoryDirectory`
///
/// Answers arrive on a spawned tokio task after `latency`, which mimics the
/// asynchronous master-server round trip. The listing is taken when the
/// request is made, so peers asking at the same moment see the same snapshot.
pub struct InMemoryRegistry {
    directory: Arc<InMemoryDirectory>,
    observer: RwLock<Option<Weak<dyn ListingObserver>>>,
    latency: Duration,
    reachable: AtomicBool,
}

impl InMemoryRegistry {
    pub fn new(directory: Arc<InMemoryDirectory>, latency: Duration) -> Self {
        Self {
            directory,
            observer: RwLock::new(None),
            latency,
            reachable: AtomicBool::new(true),
        }
    }

    /// Toggle whether listing requests get answered at all
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn directory(&self) -> Arc<InMemoryDirectory> {
        Arc::clone(&self.directory)
    }

    fn observer(&self) -> Option<Arc<dyn ListingObserver>> {
        self.observer
            .read()
            .ok()
            .and_then(|observer| observer.as_ref().and_then(Weak::upgrade))
    }
}

impl Registry for InMemoryRegistry {
    fn request_listing(&self, game_type_key: &str) {
        if !self.reachable.load(Ordering::SeqCst) {
            debug!("Registry unreachable, listing request for '{}' dropped", game_type_key);
            return;
        }

        let Some(observer) = self.observer() else {
            warn!("Listing requested for '{}' with no subscribed observer", game_type_key);
            return;
        };

        // The answer reflects the directory as it was when asked.
        let listing = self.directory.listing(game_type_key);
        let latency = self.latency;

        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            observer.on_listing_received(listing);
        });
    }

    fn register_session(&self, game_type_key: &str, registration: SessionRegistration) {
        debug!(
            "Registering session '{}' for {} under '{}'",
            registration.name, registration.identity, game_type_key
        );
        self.directory.register(game_type_key, registration);
    }

    fn subscribe(&self, observer: Weak<dyn ListingObserver>) {
        if let Ok(mut slot) = self.observer.write() {
            *slot = Some(observer);
        }
    }
}

/// Registry that records every call and answers only when told to
///
/// Useful wherever delivery timing must be controlled by hand.
#[derive(Default)]
pub struct RecordingRegistry {
    requests: Mutex<Vec<String>>,
    registrations: Mutex<Vec<(String, SessionRegistration)>>,
    observer: RwLock<Option<Weak<dyn ListingObserver>>>,
}

impl RecordingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of every listing request seen so far
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests().len()
    }

    /// Every registration seen so far
    pub fn registrations(&self) -> Vec<(String, SessionRegistration)> {
        self.registrations
            .lock()
            .map(|registrations| registrations.clone())
            .unwrap_or_default()
    }

    /// Deliver `listing` to the subscribed observer, returning whether one was present
    pub fn deliver(&self, listing: SessionListing) -> bool {
        let observer = self
            .observer
            .read()
            .ok()
            .and_then(|observer| observer.as_ref().and_then(Weak::upgrade));

        match observer {
            Some(observer) => {
                observer.on_listing_received(listing);
                true
            }
            None => false,
        }
    }
}

impl Registry for RecordingRegistry {
    fn request_listing(&self, game_type_key: &str) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(game_type_key.to_string());
        }
    }

    fn register_session(&self, game_type_key: &str, registration: SessionRegistration) {
        if let Ok(mut registrations) = self.registrations.lock() {
            registrations.push((game_type_key.to_string(), registration));
        }
    }

    fn subscribe(&self, observer: Weak<dyn ListingObserver>) {
        if let Ok(mut slot) = self.observer.write() {
            *slot = Some(observer);
        }
    }
}
