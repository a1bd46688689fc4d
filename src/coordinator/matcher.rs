//! Match coordinator
//!
//! Drives the create / join / join-or-create flows of one participant. Work
//! never blocks: listing requests complete through the `ListingObserver`
//! event, retries through the `RetryScheduler`, and connection progress
//! through the `SessionEvents` notifications.
//!
//! The state mutex is never held while calling into the registry or the
//! backend, and every callback handed out captures only a `Weak` reference,
//! so dropping the coordinator lets outstanding timers lapse.

use crate::backend::{SessionBackend, SessionEvents};
use crate::config::MatchConfig;
use crate::coordinator::pending::{ListingContinuation, PendingListingQueue};
use crate::coordinator::state::{CoordinatorPhase, CoordinatorState};
use crate::directory::{DirectoryClient, ListingObserver, Registry};
use crate::error::{MatchmakingError, Result};
use crate::metrics::{JoinKind, MetricsCollector};
use crate::retry::{RetryChain, RetryScheduler, Timer};
use crate::selection::{HostSelector, PolicyHostSelector};
use crate::types::{
    HostPreference, HostRecord, LocalIdentity, PeerId, SessionListing, SessionRegistration,
    SessionRole,
};
use crate::utils::generate_session_name;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Coordinates matchmaking for one local participant
pub struct MatchCoordinator {
    this: Weak<MatchCoordinator>,
    config: MatchConfig,
    identity: LocalIdentity,
    directory: DirectoryClient,
    selector: Arc<dyn HostSelector>,
    backend: Arc<dyn SessionBackend>,
    scheduler: RetryScheduler,
    /// Auto-retrying joins
    join_chain: RetryChain,
    /// Symmetry-breaking probes while under-populated
    min_peers_chain: RetryChain,
    pending: PendingListingQueue,
    state: Mutex<CoordinatorState>,
    /// Bumped on every join; continuations of older joins become no-ops
    join_generation: AtomicU64,
    requested_at: Mutex<Option<Instant>>,
    metrics: Arc<MetricsCollector>,
}

impl MatchCoordinator {
    /// Create a coordinator with the default selector and its own metrics
    pub fn new(
        config: MatchConfig,
        identity: LocalIdentity,
        registry: Arc<dyn Registry>,
        backend: Arc<dyn SessionBackend>,
        timer: Arc<dyn Timer>,
    ) -> Result<Arc<Self>> {
        let metrics = Arc::new(MetricsCollector::new()?);
        Self::with_components(
            config,
            identity,
            registry,
            backend,
            timer,
            Arc::new(PolicyHostSelector::new()),
            metrics,
        )
    }

    /// Create a coordinator with a custom selector and metrics collector
    pub fn with_components(
        config: MatchConfig,
        identity: LocalIdentity,
        registry: Arc<dyn Registry>,
        backend: Arc<dyn SessionBackend>,
        timer: Arc<dyn Timer>,
        selector: Arc<dyn HostSelector>,
        metrics: Arc<MetricsCollector>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let coordinator = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            config,
            identity,
            directory: DirectoryClient::new(registry),
            selector,
            backend,
            scheduler: RetryScheduler::new(timer),
            join_chain: RetryChain::new("join"),
            min_peers_chain: RetryChain::new("min_peers"),
            pending: PendingListingQueue::new(),
            state: Mutex::new(CoordinatorState::default()),
            join_generation: AtomicU64::new(0),
            requested_at: Mutex::new(None),
            metrics,
        });

        let observer = Arc::downgrade(&coordinator);
        let observer: Weak<dyn ListingObserver> = observer;
        coordinator.directory.subscribe(observer);

        info!(
            "Match coordinator ready - identity: {}, game type: {}, peer limit: {}, min peers: {}",
            coordinator.identity,
            coordinator.config.game_type_key,
            coordinator.config.peer_limit,
            coordinator.config.min_peers
        );

        Ok(coordinator)
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Copy of the current coordinator state
    pub fn snapshot(&self) -> Result<CoordinatorState> {
        Ok(self.lock_state()?.clone())
    }

    /// Most recently received listing, malformed records removed
    pub fn latest_listing(&self) -> SessionListing {
        self.directory.poll_latest_listing()
    }

    /// Continuations waiting on the outstanding listing request
    pub fn pending_continuations(&self) -> Result<usize> {
        self.pending.len()
    }

    pub fn join_retry_armed(&self) -> bool {
        self.join_chain.is_armed()
    }

    pub fn min_peers_check_armed(&self) -> bool {
        self.min_peers_chain.is_armed()
    }

    /// Host a new session and advertise it in the directory
    ///
    /// Returns `Ok(false)` when the backend refuses to host; nothing is
    /// registered in that case.
    pub fn create_game(&self, name: Option<&str>, comment: Option<&str>) -> Result<bool> {
        self.lock_state()?.phase = CoordinatorPhase::Creating;

        let remote_slots = self.config.remote_slots();
        let use_relay = !self.backend.has_public_address();
        info!(
            "Creating game - slots: {}, port: {}, relay: {}, identity: {}",
            remote_slots, self.config.port, use_relay, self.identity
        );

        if let Err(e) = self
            .backend
            .initialize_host(remote_slots, self.config.port, use_relay)
        {
            let err = MatchmakingError::from(e);
            warn!("{}", err);
            self.metrics.record_session_created(false);
            self.lock_state()?.phase = CoordinatorPhase::Idle;
            return Ok(false);
        }

        let name = name
            .map(str::to_string)
            .unwrap_or_else(generate_session_name);
        let registration = SessionRegistration {
            identity: self.identity.clone(),
            name: name.clone(),
            comment: comment.map(str::to_string),
            peer_limit: self.config.peer_limit,
            port: self.config.port,
        };
        self.directory
            .register_session(&self.config.game_type_key, registration);
        self.metrics.record_session_created(true);

        {
            let mut state = self.lock_state()?;
            state.phase = CoordinatorPhase::Idle;
            state.role = Some(SessionRole::Host);
            state.current_peer_count = 0;
        }
        self.metrics.set_current_peers(0);

        info!(
            "Game '{}' registered under '{}'",
            name, self.config.game_type_key
        );
        Ok(true)
    }

    /// Look for a host to join, optionally retrying until one turns up
    pub fn join_game(
        &self,
        preference: HostPreference,
        auto_retry: bool,
        retry_interval: Duration,
    ) -> Result<()> {
        self.start_join(preference, auto_retry, retry_interval, false)
    }

    /// `join_game` with the configured retry behaviour
    pub fn join_with_defaults(&self) -> Result<()> {
        self.join_game(
            HostPreference::FirstAvailable,
            self.config.auto_retry_enabled,
            self.config.retry_interval(),
        )
    }

    /// Join the first available host, or host a session if there is none
    pub fn join_or_create_game(&self) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            if state.stopped {
                debug!("Join-or-create ignored, auto-retry was stopped");
                return Ok(());
            }
            state.phase = CoordinatorPhase::Searching;
        }

        info!("Join or create - identity: {}", self.identity);
        self.metrics.record_join_attempt(JoinKind::JoinOrCreate);

        let this = self.this.clone();
        self.request_listing_then(
            false,
            None,
            Box::new(move |listing: &SessionListing| {
                if let Some(coordinator) = this.upgrade() {
                    if let Err(e) = coordinator.finish_join_or_create(listing) {
                        error!("Join-or-create failed: {}", e);
                    }
                }
            }),
        )
    }

    /// Stop every retry loop; joins stay disabled until `reset`
    pub fn stop_auto_retry(&self) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            if !state.stopped {
                info!("Stopping auto-retry - identity: {}", self.identity);
            }
            state.stopped = true;
            state.auto_retry_active = false;
            state.ensuring_min_peers = false;
            if state.phase == CoordinatorPhase::Searching {
                state.phase = CoordinatorPhase::Idle;
            }
        }

        self.join_chain.cancel(&self.scheduler)?;
        self.min_peers_chain.cancel(&self.scheduler)?;
        Ok(())
    }

    /// Cancel everything in flight and return to the initial state
    pub fn reset(&self) -> Result<()> {
        self.join_chain.cancel(&self.scheduler)?;
        self.min_peers_chain.cancel(&self.scheduler)?;
        let dropped = self.pending.clear()?;
        self.join_generation.fetch_add(1, Ordering::SeqCst);

        *self.lock_state()? = CoordinatorState::default();
        self.metrics.set_current_peers(0);

        info!(
            "Coordinator reset - identity: {}, dropped continuations: {}",
            self.identity, dropped
        );
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, CoordinatorState>> {
        self.state
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("coordinator state").into())
    }

    fn start_join(
        &self,
        preference: HostPreference,
        auto_retry: bool,
        retry_interval: Duration,
        reissue: bool,
    ) -> Result<()> {
        let generation = {
            let mut state = self.lock_state()?;
            if state.stopped {
                debug!("Join ignored, auto-retry was stopped");
                return Ok(());
            }
            state.auto_retry_active = auto_retry;
            state.phase = CoordinatorPhase::Searching;
            self.join_generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        debug!(
            "Searching for a host - preference: {}, auto_retry: {}, identity: {}",
            preference, auto_retry, self.identity
        );
        self.metrics.record_join_attempt(JoinKind::Join);

        // Armed before the request goes out; an unanswered request is
        // abandoned once the interval passes.
        if auto_retry {
            self.arm_join_retry(preference, retry_interval)?;
        }

        let this = self.this.clone();
        self.request_listing_then(
            reissue,
            Some(generation),
            Box::new(move |listing: &SessionListing| {
                if let Some(coordinator) = this.upgrade() {
                    if let Err(e) = coordinator.finish_join(
                        listing,
                        generation,
                        preference,
                        auto_retry,
                        retry_interval,
                    ) {
                        error!("Join attempt failed: {}", e);
                    }
                }
            }),
        )
    }

    /// Queue `continuation` and issue a listing request unless one is outstanding
    ///
    /// A join continuation replaces the one of any earlier join, so reissuing
    /// for an unanswered join never grows the queue.
    fn request_listing_then(
        &self,
        reissue: bool,
        join_generation: Option<u64>,
        continuation: ListingContinuation,
    ) -> Result<()> {
        let first = match join_generation {
            Some(generation) => self.pending.enqueue_join(generation, continuation)?,
            None => self.pending.enqueue(continuation)?,
        };

        if first || reissue {
            if let Ok(mut requested_at) = self.requested_at.lock() {
                *requested_at = Some(Instant::now());
            }
            self.metrics.record_listing_request();
            self.directory.request_listing(&self.config.game_type_key);
        } else {
            debug!("Listing request already outstanding, continuation queued");
            self.metrics.record_batched_continuation();
        }
        Ok(())
    }

    fn finish_join(
        &self,
        listing: &SessionListing,
        generation: u64,
        preference: HostPreference,
        auto_retry: bool,
        retry_interval: Duration,
    ) -> Result<()> {
        {
            let state = self.lock_state()?;
            if state.stopped {
                debug!("Listing arrived after stop, ignoring");
                return Ok(());
            }
        }
        if self.join_generation.load(Ordering::SeqCst) != generation {
            debug!("Join {} superseded, ignoring listing", generation);
            return Ok(());
        }

        if let Some(host) = self
            .selector
            .select(listing, preference, &self.identity, false)
        {
            return self.connect_to(host);
        }

        let retry = {
            let mut state = self.lock_state()?;
            let retry = auto_retry && state.auto_retry_active && !state.stopped;
            if !retry {
                state.phase = CoordinatorPhase::Idle;
            }
            retry
        };

        if retry {
            debug!(
                "No host available among {} listed, retrying in {:?}",
                listing.len(),
                retry_interval
            );
            self.arm_join_retry(preference, retry_interval)?;
            self.metrics.record_retry_scheduled(self.join_chain.name());
        } else {
            info!("No host available - preference: {}", preference);
        }
        Ok(())
    }

    fn arm_join_retry(&self, preference: HostPreference, retry_interval: Duration) -> Result<()> {
        let this = self.this.clone();
        self.join_chain
            .arm(&self.scheduler, retry_interval, move || {
                if let Some(coordinator) = this.upgrade() {
                    if let Err(e) = coordinator.retry_join(preference, retry_interval) {
                        error!("Join retry failed: {}", e);
                    }
                }
            })?;

        // A stop that raced the arm above must not leave a live handle behind.
        if self.lock_state()?.stopped {
            self.join_chain.cancel(&self.scheduler)?;
        }
        Ok(())
    }

    fn retry_join(&self, preference: HostPreference, retry_interval: Duration) -> Result<()> {
        {
            let state = self.lock_state()?;
            if state.stopped || !state.auto_retry_active {
                debug!("Join retry lapsed");
                return Ok(());
            }
        }
        debug!("Retrying join - identity: {}", self.identity);
        self.start_join(preference, true, retry_interval, true)
    }

    fn finish_join_or_create(&self, listing: &SessionListing) -> Result<()> {
        {
            let state = self.lock_state()?;
            if state.stopped {
                debug!("Listing arrived after stop, ignoring");
                return Ok(());
            }
            if state.phase == CoordinatorPhase::Connecting {
                debug!("Already connecting, join-or-create has nothing to do");
                return Ok(());
            }
        }

        if let Some(host) =
            self.selector
                .select(listing, HostPreference::FirstAvailable, &self.identity, false)
        {
            return self.connect_to(host);
        }

        if self.create_game(None, None)? {
            self.begin_ensuring_min_peers()
        } else {
            warn!("Could not host a game, falling back to an auto-retrying join");
            self.join_game(
                HostPreference::FirstAvailable,
                true,
                self.config.retry_interval(),
            )
        }
    }

    fn begin_ensuring_min_peers(&self) -> Result<()> {
        let min_remote = self.config.min_remote_peers();
        let max_attempts = self.config.max_min_peers_attempts;

        {
            let mut state = self.lock_state()?;
            state.min_peers_attempts = 0;
            state.ensuring_min_peers = state.wants_more_peers(min_remote, max_attempts);
            if !state.ensuring_min_peers {
                return Ok(());
            }
        }

        info!(
            "Waiting for {} peers - probes: {}, interval: {:?}",
            self.config.min_peers,
            max_attempts,
            self.config.min_peers_retry_interval()
        );
        self.arm_min_peers_check()
    }

    fn arm_min_peers_check(&self) -> Result<()> {
        let this = self.this.clone();
        self.min_peers_chain.arm(
            &self.scheduler,
            self.config.min_peers_retry_interval(),
            move || {
                if let Some(coordinator) = this.upgrade() {
                    if let Err(e) = coordinator.check_min_peers() {
                        error!("Min-peers check failed: {}", e);
                    }
                }
            },
        )?;
        self.metrics
            .record_retry_scheduled(self.min_peers_chain.name());

        if self.lock_state()?.stopped {
            self.min_peers_chain.cancel(&self.scheduler)?;
        }
        Ok(())
    }

    fn check_min_peers(&self) -> Result<()> {
        let min_remote = self.config.min_remote_peers();
        let max_attempts = self.config.max_min_peers_attempts;

        let (attempt, more) = {
            let mut state = self.lock_state()?;
            if !state.ensuring_min_peers || !state.wants_more_peers(min_remote, max_attempts) {
                state.ensuring_min_peers = false;
                return Ok(());
            }
            state.min_peers_attempts += 1;
            let more = state.min_peers_attempts < max_attempts;
            state.ensuring_min_peers = more;
            (state.min_peers_attempts, more)
        };

        debug!(
            "Probing for a preferred host - attempt {}/{}, identity: {}",
            attempt, max_attempts, self.identity
        );
        self.metrics.record_join_attempt(JoinKind::MinPeersProbe);

        let this = self.this.clone();
        self.request_listing_then(
            false,
            None,
            Box::new(move |listing: &SessionListing| {
                if let Some(coordinator) = this.upgrade() {
                    if let Err(e) = coordinator.finish_min_peers_probe(listing) {
                        error!("Min-peers probe failed: {}", e);
                    }
                }
            }),
        )?;

        if more {
            self.arm_min_peers_check()
        } else {
            info!(
                "Min-peers probes exhausted, staying host - identity: {}",
                self.identity
            );
            Ok(())
        }
    }

    fn finish_min_peers_probe(&self, listing: &SessionListing) -> Result<()> {
        {
            let state = self.lock_state()?;
            if state.stopped
                || state.phase == CoordinatorPhase::Connecting
                || state.role == Some(SessionRole::Client)
                || state.current_peer_count >= self.config.min_remote_peers()
            {
                return Ok(());
            }
        }

        match self.selector.select(
            listing,
            HostPreference::FirstAvailable,
            &self.identity,
            true,
        ) {
            Some(host) => {
                info!(
                    "Yielding to preferred host {} - identity: {}",
                    host.identity, self.identity
                );
                self.connect_to(host)
            }
            None => {
                debug!("No preferred host listed yet");
                Ok(())
            }
        }
    }

    fn connect_to(&self, host: &HostRecord) -> Result<()> {
        {
            let mut state = self.lock_state()?;
            state.phase = CoordinatorPhase::Connecting;
            state.auto_retry_active = false;
            state.ensuring_min_peers = false;
        }
        // Any join still queued behind this listing is now stale.
        self.join_generation.fetch_add(1, Ordering::SeqCst);
        self.join_chain.cancel(&self.scheduler)?;
        self.min_peers_chain.cancel(&self.scheduler)?;

        info!("Connecting to host - {}", host);
        self.metrics.record_connect();
        self.backend.connect(host);
        Ok(())
    }

    fn handle_listing(&self, listing: SessionListing) -> Result<()> {
        let (listing, rejected) = listing.sanitized();
        for e in &rejected {
            warn!("Dropping host record from listing: {}", e);
        }

        let wait = self
            .requested_at
            .lock()
            .ok()
            .and_then(|mut requested_at| requested_at.take())
            .map(|at| at.elapsed());
        self.metrics.record_listing_received(wait, rejected.len());
        self.directory.record_listing(&listing)?;

        let delivered = self.pending.deliver(&listing)?;
        debug!(
            "Listing of {} hosts delivered to {} continuations",
            listing.len(),
            delivered
        );
        Ok(())
    }
}

impl ListingObserver for MatchCoordinator {
    fn on_listing_received(&self, listing: SessionListing) {
        if let Err(e) = self.handle_listing(listing) {
            error!("Failed to process listing: {}", e);
        }
    }
}

impl SessionEvents for MatchCoordinator {
    fn on_peer_connected(&self, peer: PeerId) {
        let (count, reached) = match self.lock_state() {
            Ok(mut state) => {
                state.current_peer_count += 1;
                let reached = state.ensuring_min_peers
                    && state.current_peer_count >= self.config.min_remote_peers();
                if reached {
                    state.ensuring_min_peers = false;
                }
                (state.current_peer_count, reached)
            }
            Err(e) => {
                error!("Dropping peer connect for {}: {}", peer, e);
                return;
            }
        };

        self.metrics.set_current_peers(count);
        info!("Peer connected - peer: {}, peers: {}", peer, count);

        if reached {
            info!("Reached {} peers, no longer probing", self.config.min_peers);
            if let Err(e) = self.min_peers_chain.cancel(&self.scheduler) {
                error!("Failed to cancel min-peers check: {}", e);
            }
        }
    }

    fn on_peer_disconnected(&self, peer: PeerId) {
        let count = match self.lock_state() {
            Ok(mut state) => {
                state.current_peer_count = state.current_peer_count.saturating_sub(1);
                state.current_peer_count
            }
            Err(e) => {
                error!("Dropping peer disconnect for {}: {}", peer, e);
                return;
            }
        };

        self.metrics.set_current_peers(count);
        info!("Peer disconnected - peer: {}, peers: {}", peer, count);
    }

    fn on_host_initialized(&self) {
        match self.lock_state() {
            Ok(mut state) => {
                state.role = Some(SessionRole::Host);
                state.phase = CoordinatorPhase::Idle;
            }
            Err(e) => error!("Dropping host-initialized event: {}", e),
        }
        debug!("Hosting confirmed - identity: {}", self.identity);
    }

    fn on_connected_to_host(&self) {
        match self.lock_state() {
            Ok(mut state) => {
                state.role = Some(SessionRole::Client);
                state.phase = CoordinatorPhase::Idle;
                state.current_peer_count = 0;
                state.ensuring_min_peers = false;
            }
            Err(e) => {
                error!("Dropping connected-to-host event: {}", e);
                return;
            }
        }
        self.metrics.set_current_peers(0);
        if let Err(e) = self.min_peers_chain.cancel(&self.scheduler) {
            error!("Failed to cancel min-peers check: {}", e);
        }
        info!("Connected to host - identity: {}", self.identity);
    }
}
