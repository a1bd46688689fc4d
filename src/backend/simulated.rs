//! In-process session backend used by the simulator
//!
//! All simulated peers share one `SimulatedNetwork`. Hosting opens a session
//! in the network, connecting moves the caller into another peer's session and
//! keeps the shared directory's peer counts current. Completion notifications
//! are delivered on spawned tasks, never inside the backend call.

use crate::backend::session::{SessionBackend, SessionEvents};
use crate::directory::InMemoryDirectory;
use crate::error::ConnectionError;
use crate::types::{HostRecord, LocalIdentity, PeerId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
struct SimSession {
    remote_slots: usize,
    members: Vec<PeerId>,
}

/// Final shape of one hosted session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub host: String,
    pub members: Vec<PeerId>,
    pub remote_slots: usize,
}

/// Shared state of every simulated peer
pub struct SimulatedNetwork {
    handle: Handle,
    directory: Arc<InMemoryDirectory>,
    game_type_key: String,
    sessions: Mutex<BTreeMap<String, SimSession>>,
    events: RwLock<HashMap<String, Weak<dyn SessionEvents>>>,
}

impl SimulatedNetwork {
    pub fn new(handle: Handle, directory: Arc<InMemoryDirectory>, game_type_key: &str) -> Self {
        Self {
            handle,
            directory,
            game_type_key: game_type_key.to_string(),
            sessions: Mutex::new(BTreeMap::new()),
            events: RwLock::new(HashMap::new()),
        }
    }

    /// Route backend notifications for `identity` to `events`
    pub fn attach(&self, identity: &LocalIdentity, events: Weak<dyn SessionEvents>) {
        if let Ok(mut registered) = self.events.write() {
            registered.insert(identity.as_str().to_string(), events);
        }
    }

    /// Every open session, ordered by host identity
    pub fn sessions(&self) -> Vec<SessionSummary> {
        self.sessions
            .lock()
            .map(|sessions| {
                sessions
                    .iter()
                    .map(|(host, session)| SessionSummary {
                        host: host.clone(),
                        members: session.members.clone(),
                        remote_slots: session.remote_slots,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn events_for(&self, identity: &str) -> Option<Arc<dyn SessionEvents>> {
        self.events
            .read()
            .ok()
            .and_then(|events| events.get(identity).and_then(Weak::upgrade))
    }

    fn notify<F>(&self, identity: &str, notification: F)
    where
        F: FnOnce(&dyn SessionEvents) + Send + 'static,
    {
        let Some(events) = self.events_for(identity) else {
            debug!("No event handler attached for {}", identity);
            return;
        };
        self.handle.spawn(async move {
            notification(events.as_ref());
        });
    }

    fn open_session(&self, host: &str, remote_slots: usize, port: u16) -> Result<(), ConnectionError> {
        let mut sessions = self.sessions.lock().map_err(|_| ConnectionError::Refused {
            reason: "network state poisoned".to_string(),
        })?;

        if sessions.contains_key(host) {
            return Err(ConnectionError::PortInUse { port });
        }
        if sessions.values().any(|session| session.members.iter().any(|m| m == host)) {
            return Err(ConnectionError::Refused {
                reason: "already connected to another host".to_string(),
            });
        }

        sessions.insert(
            host.to_string(),
            SimSession {
                remote_slots,
                members: Vec::new(),
            },
        );
        Ok(())
    }

    /// Move `peer` into the session hosted by `host`
    fn join(&self, peer: &str, host: &str) -> Result<usize, ConnectionError> {
        let mut sessions = self.sessions.lock().map_err(|_| ConnectionError::Refused {
            reason: "network state poisoned".to_string(),
        })?;

        if peer == host {
            return Err(ConnectionError::Refused {
                reason: "cannot join own session".to_string(),
            });
        }

        let target = sessions.get(host).ok_or_else(|| ConnectionError::Refused {
            reason: format!("no session hosted by {}", host),
        })?;
        if target.members.len() >= target.remote_slots {
            return Err(ConnectionError::Refused {
                reason: format!("session hosted by {} is full", host),
            });
        }

        if let Some(abandoned) = sessions.remove(peer) {
            self.directory.unregister(&self.game_type_key, peer);
            if !abandoned.members.is_empty() {
                warn!(
                    "Host {} left its own session with {} members stranded",
                    peer,
                    abandoned.members.len()
                );
            }
        }

        let target = sessions.get_mut(host).ok_or_else(|| ConnectionError::Refused {
            reason: format!("no session hosted by {}", host),
        })?;
        target.members.push(peer.to_string());
        let count = target.members.len();
        self.directory
            .set_connected_peers(&self.game_type_key, host, count);
        Ok(count)
    }
}

/// One peer's view of the simulated network
pub struct SimulatedBackend {
    identity: LocalIdentity,
    network: Arc<SimulatedNetwork>,
    public_address: bool,
}

impl SimulatedBackend {
    pub fn new(identity: LocalIdentity, network: Arc<SimulatedNetwork>, public_address: bool) -> Self {
        Self {
            identity,
            network,
            public_address,
        }
    }
}

impl SessionBackend for SimulatedBackend {
    fn initialize_host(
        &self,
        remote_slots: usize,
        port: u16,
        use_relay: bool,
    ) -> Result<(), ConnectionError> {
        self.network
            .open_session(self.identity.as_str(), remote_slots, port)?;

        info!(
            "Simulated host up - identity: {}, slots: {}, port: {}, relay: {}",
            self.identity, remote_slots, port, use_relay
        );
        self.network
            .notify(self.identity.as_str(), |events| events.on_host_initialized());
        Ok(())
    }

    fn connect(&self, host: &HostRecord) {
        let peer = self.identity.as_str().to_string();
        match self.network.join(&peer, &host.identity) {
            Ok(count) => {
                info!(
                    "Simulated connect - peer: {}, host: {}, members: {}",
                    peer, host.identity, count
                );
                let joined = peer.clone();
                self.network
                    .notify(&host.identity, move |events| events.on_peer_connected(joined));
                self.network
                    .notify(&peer, |events| events.on_connected_to_host());
            }
            Err(e) => {
                warn!("Simulated connect from {} to {} failed: {}", peer, host.identity, e);
            }
        }
    }

    fn has_public_address(&self) -> bool {
        self.public_address
    }
}
