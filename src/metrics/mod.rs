//! Metrics for the matchmaking core
//!
//! Each coordinator records into its own Prometheus registry, so independent
//! coordinators in one process never share counters.

pub mod collector;

pub use collector::{DirectoryMetrics, JoinKind, MatchMetrics, MetricsCollector};
