//! Metrics collection using Prometheus
//!
//! This module provides metrics for the matchmaking coordinator: directory
//! traffic, join attempts, retry scheduling and session outcomes.

use anyhow::Result;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Kind of join attempt issued by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Join,
    JoinOrCreate,
    MinPeersProbe,
}

impl JoinKind {
    fn label(self) -> &'static str {
        match self {
            JoinKind::Join => "join",
            JoinKind::JoinOrCreate => "join_or_create",
            JoinKind::MinPeersProbe => "min_peers_probe",
        }
    }
}

/// Main metrics collector for the matchmaking coordinator
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Directory-related metrics
    directory_metrics: DirectoryMetrics,

    /// Matchmaking flow metrics
    match_metrics: MatchMetrics,
}

/// Directory-related metrics
#[derive(Clone)]
pub struct DirectoryMetrics {
    /// Listing requests actually sent to the registry
    pub listing_requests_total: IntCounter,

    /// Listings received from the registry
    pub listings_received_total: IntCounter,

    /// Continuations queued behind an already outstanding request
    pub batched_continuations_total: IntCounter,

    /// Malformed host records dropped from listings
    pub malformed_records_total: IntCounter,

    /// Time between issuing a request and receiving its listing
    pub listing_wait_seconds: Histogram,
}

/// Matchmaking flow metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Join attempts by kind
    pub join_attempts_total: IntCounterVec,

    /// Retries scheduled by chain
    pub retries_scheduled_total: IntCounterVec,

    /// Hosting attempts by outcome
    pub sessions_created_total: IntCounterVec,

    /// Connect calls issued to the backend
    pub connects_total: IntCounter,

    /// Remote peers currently connected to the local session
    pub current_peers: IntGauge,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let directory_metrics = DirectoryMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;

        Ok(Self {
            registry,
            directory_metrics,
            match_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get directory metrics
    pub fn directory(&self) -> &DirectoryMetrics {
        &self.directory_metrics
    }

    /// Get matchmaking metrics
    pub fn matching(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    pub fn record_listing_request(&self) {
        self.directory_metrics.listing_requests_total.inc();
    }

    pub fn record_batched_continuation(&self) {
        self.directory_metrics.batched_continuations_total.inc();
    }

    /// Record a received listing and how long it took to arrive
    pub fn record_listing_received(&self, wait: Option<Duration>, malformed: usize) {
        self.directory_metrics.listings_received_total.inc();
        self.directory_metrics
            .malformed_records_total
            .inc_by(malformed as u64);
        if let Some(wait) = wait {
            self.directory_metrics
                .listing_wait_seconds
                .observe(wait.as_secs_f64());
        }
    }

    pub fn record_join_attempt(&self, kind: JoinKind) {
        self.match_metrics
            .join_attempts_total
            .with_label_values(&[kind.label()])
            .inc();
    }

    pub fn record_retry_scheduled(&self, chain: &str) {
        self.match_metrics
            .retries_scheduled_total
            .with_label_values(&[chain])
            .inc();
    }

    pub fn record_session_created(&self, success: bool) {
        let outcome = if success { "created" } else { "init_failed" };
        self.match_metrics
            .sessions_created_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_connect(&self) {
        self.match_metrics.connects_total.inc();
    }

    pub fn set_current_peers(&self, peers: usize) {
        self.match_metrics.current_peers.set(peers as i64);
    }

    /// Join attempts recorded so far for `kind`
    pub fn join_attempts(&self, kind: JoinKind) -> u64 {
        self.match_metrics
            .join_attempts_total
            .with_label_values(&[kind.label()])
            .get()
    }

    /// Render every registered metric in the Prometheus text format
    pub fn gather_text(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl DirectoryMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let listing_requests_total = IntCounter::new(
            "matchmaker_listing_requests_total",
            "Listing requests sent to the registry",
        )?;
        registry.register(Box::new(listing_requests_total.clone()))?;

        let listings_received_total = IntCounter::new(
            "matchmaker_listings_received_total",
            "Listings received from the registry",
        )?;
        registry.register(Box::new(listings_received_total.clone()))?;

        let batched_continuations_total = IntCounter::new(
            "matchmaker_batched_continuations_total",
            "Continuations queued behind an outstanding listing request",
        )?;
        registry.register(Box::new(batched_continuations_total.clone()))?;

        let malformed_records_total = IntCounter::new(
            "matchmaker_malformed_records_total",
            "Malformed host records dropped from listings",
        )?;
        registry.register(Box::new(malformed_records_total.clone()))?;

        let listing_wait_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "matchmaker_listing_wait_seconds",
                "Time between a listing request and its response",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(listing_wait_seconds.clone()))?;

        Ok(Self {
            listing_requests_total,
            listings_received_total,
            batched_continuations_total,
            malformed_records_total,
            listing_wait_seconds,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let join_attempts_total = IntCounterVec::new(
            Opts::new("matchmaker_join_attempts_total", "Join attempts by kind"),
            &["kind"],
        )?;
        registry.register(Box::new(join_attempts_total.clone()))?;

        let retries_scheduled_total = IntCounterVec::new(
            Opts::new(
                "matchmaker_retries_scheduled_total",
                "Retries scheduled by chain",
            ),
            &["chain"],
        )?;
        registry.register(Box::new(retries_scheduled_total.clone()))?;

        let sessions_created_total = IntCounterVec::new(
            Opts::new(
                "matchmaker_sessions_created_total",
                "Hosting attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(sessions_created_total.clone()))?;

        let connects_total = IntCounter::new(
            "matchmaker_connects_total",
            "Connect calls issued to the backend",
        )?;
        registry.register(Box::new(connects_total.clone()))?;

        let current_peers = IntGauge::new(
            "matchmaker_current_peers",
            "Remote peers connected to the local session",
        )?;
        registry.register(Box::new(current_peers.clone()))?;

        Ok(Self {
            join_attempts_total,
            retries_scheduled_total,
            sessions_created_total,
            connects_total,
            current_peers,
        })
    }
}
