//! Matchmaking configuration supplied by the caller

use crate::error::{MatchmakingError, Result};
use crate::utils::seconds_to_duration;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for one coordinator; immutable once the coordinator is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Directory key all sessions of this game are listed under
    pub game_type_key: String,
    /// Total peers per session, the host included
    pub peer_limit: usize,
    /// Population the host tries to reach before it stops looking for peers
    pub min_peers: usize,
    /// Port the backend binds when hosting
    pub port: u16,
    /// Default auto-retry behaviour for plain joins
    pub auto_retry_enabled: bool,
    /// Delay between auto-retried join attempts
    pub retry_interval_seconds: f64,
    /// Cap on symmetry-breaking probes while under-populated
    pub max_min_peers_attempts: u32,
    /// Delay before each symmetry-breaking probe
    pub min_peers_retry_interval_seconds: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            game_type_key: "MatchMaker_testGame".to_string(),
            peer_limit: 4,
            min_peers: 2,
            port: 25000,
            auto_retry_enabled: true,
            retry_interval_seconds: 1.0,
            max_min_peers_attempts: 5,
            min_peers_retry_interval_seconds: 2.0,
        }
    }
}

impl MatchConfig {
    /// Remote slots the backend should open when hosting
    pub fn remote_slots(&self) -> usize {
        self.peer_limit.saturating_sub(1)
    }

    /// Remote peers needed before the host stops probing for a peer host
    pub fn min_remote_peers(&self) -> usize {
        self.min_peers.saturating_sub(1)
    }

    pub fn retry_interval(&self) -> Duration {
        seconds_to_duration(self.retry_interval_seconds)
    }

    pub fn min_peers_retry_interval(&self) -> Duration {
        seconds_to_duration(self.min_peers_retry_interval_seconds)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.game_type_key.trim().is_empty() {
            return Err(config_error("game_type_key cannot be empty"));
        }

        if self.peer_limit < 2 {
            return Err(config_error("peer_limit must be at least 2"));
        }

        if self.min_peers > self.peer_limit {
            return Err(config_error("min_peers cannot exceed peer_limit"));
        }

        if self.port == 0 {
            return Err(config_error("port cannot be 0"));
        }

        if !(self.retry_interval_seconds.is_finite() && self.retry_interval_seconds > 0.0) {
            return Err(config_error("retry_interval_seconds must be positive"));
        }

        if !(self.min_peers_retry_interval_seconds.is_finite()
            && self.min_peers_retry_interval_seconds > 0.0)
        {
            return Err(config_error(
                "min_peers_retry_interval_seconds must be positive",
            ));
        }

        Ok(())
    }
}

fn config_error(message: &str) -> anyhow::Error {
    MatchmakingError::ConfigurationError {
        message: message.to_string(),
    }
    .into()
}
