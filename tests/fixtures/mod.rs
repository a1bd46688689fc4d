//! Test fixtures shared by the integration tests
#![allow(dead_code)]

use peer_matchmaker::backend::{RecordingBackend, SessionEvents, SimulatedBackend, SimulatedNetwork};
use peer_matchmaker::config::MatchConfig;
use peer_matchmaker::coordinator::MatchCoordinator;
use peer_matchmaker::directory::{InMemoryDirectory, InMemoryRegistry, RecordingRegistry};
use peer_matchmaker::retry::{ManualTimer, Timer, TokioTimer};
use peer_matchmaker::types::{HostRecord, LocalIdentity, SessionListing};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;

/// Game type every fixture registers under
pub const GAME_KEY: &str = "MatchMaker_testGame";

/// Matchmaking settings with short, easy to step intervals
pub fn fast_config() -> MatchConfig {
    MatchConfig {
        game_type_key: GAME_KEY.to_string(),
        peer_limit: 4,
        min_peers: 2,
        max_min_peers_attempts: 5,
        retry_interval_seconds: 1.0,
        min_peers_retry_interval_seconds: 2.0,
        ..MatchConfig::default()
    }
}

/// Build a listing from `(identity, connected, limit)` triples
pub fn listing(hosts: &[(&str, usize, usize)]) -> SessionListing {
    SessionListing::new(
        hosts
            .iter()
            .map(|(identity, connected, limit)| HostRecord::new(*identity, *connected, *limit))
            .collect(),
    )
}

/// One coordinator wired to hand-driven collaborators
pub struct TestPeer {
    pub registry: Arc<RecordingRegistry>,
    pub backend: Arc<RecordingBackend>,
    pub timer: Arc<ManualTimer>,
    pub coordinator: Arc<MatchCoordinator>,
}

impl TestPeer {
    pub fn new(identity: &str) -> Self {
        Self::with(fast_config(), identity, RecordingBackend::new())
    }

    pub fn with(config: MatchConfig, identity: &str, backend: RecordingBackend) -> Self {
        let registry = Arc::new(RecordingRegistry::new());
        let backend = Arc::new(backend);
        let timer = Arc::new(ManualTimer::new());
        let coordinator = MatchCoordinator::new(
            config,
            LocalIdentity::from(identity),
            registry.clone(),
            backend.clone(),
            timer.clone(),
        )
        .expect("Failed to build coordinator");

        Self {
            registry,
            backend,
            timer,
            coordinator,
        }
    }

    /// Answer the outstanding listing request
    pub fn answer(&self, hosts: &[(&str, usize, usize)]) {
        assert!(self.registry.deliver(listing(hosts)));
    }
}

/// Several coordinators sharing one simulated directory and network
///
/// Must be created inside a tokio runtime; pair with `start_paused` to keep
/// the clock under the test's control.
pub struct SimWorld {
    pub directory: Arc<InMemoryDirectory>,
    pub network: Arc<SimulatedNetwork>,
    pub timer: Arc<dyn Timer>,
    pub latency: Duration,
}

impl SimWorld {
    pub fn new(latency: Duration) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        let network = Arc::new(SimulatedNetwork::new(
            Handle::current(),
            directory.clone(),
            GAME_KEY,
        ));
        let timer: Arc<dyn Timer> =
            Arc::new(TokioTimer::try_current().expect("Failed to build tokio timer"));

        Self {
            directory,
            network,
            timer,
            latency,
        }
    }

    /// Add a peer and return its coordinator
    pub fn spawn_peer(&self, identity: &str, config: MatchConfig) -> Arc<MatchCoordinator> {
        self.spawn_peer_with_registry(identity, config).0
    }

    /// Add a peer and also hand back its registry handle
    pub fn spawn_peer_with_registry(
        &self,
        identity: &str,
        config: MatchConfig,
    ) -> (Arc<MatchCoordinator>, Arc<InMemoryRegistry>) {
        let identity = LocalIdentity::from(identity);
        let registry = Arc::new(InMemoryRegistry::new(self.directory.clone(), self.latency));
        let backend = Arc::new(SimulatedBackend::new(
            identity.clone(),
            self.network.clone(),
            true,
        ));

        let coordinator = MatchCoordinator::new(
            config,
            identity.clone(),
            registry.clone(),
            backend,
            self.timer.clone(),
        )
        .expect("Failed to build coordinator");
        let events = Arc::downgrade(&coordinator);
        let events: Weak<dyn SessionEvents> = events;
        self.network.attach(&identity, events);

        (coordinator, registry)
    }
}
