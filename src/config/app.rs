//! Main application configuration
//!
//! This module defines the configuration of the simulation binary: service
//! settings, the matchmaking settings every simulated peer shares, and the
//! in-process simulation knobs. Values come from defaults, environment
//! variables or a TOML file.

use crate::config::matchmaking::MatchConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub matchmaking: MatchConfig,
    pub simulation: SimulationSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// In-process simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Number of simulated participants
    pub peers: usize,
    /// Delay before the in-memory directory answers a listing request
    pub directory_latency_ms: u64,
    /// How long the simulation runs before reporting
    pub run_seconds: u64,
    /// Whether simulated backends report a public address (no relay)
    pub public_address: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "peer-matchmaker".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            peers: 4,
            directory_latency_ms: 50,
            run_seconds: 15,
            public_address: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }

        // Matchmaking settings
        if let Ok(key) = env::var("GAME_TYPE_KEY") {
            config.matchmaking.game_type_key = key;
        }
        if let Ok(limit) = env::var("PEER_LIMIT") {
            config.matchmaking.peer_limit = limit
                .parse()
                .map_err(|_| anyhow!("Invalid PEER_LIMIT value: {}", limit))?;
        }
        if let Ok(min_peers) = env::var("MIN_PEERS") {
            config.matchmaking.min_peers = min_peers
                .parse()
                .map_err(|_| anyhow!("Invalid MIN_PEERS value: {}", min_peers))?;
        }
        if let Ok(port) = env::var("HOST_PORT") {
            config.matchmaking.port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HOST_PORT value: {}", port))?;
        }
        if let Ok(auto_retry) = env::var("AUTO_RETRY") {
            config.matchmaking.auto_retry_enabled = auto_retry
                .parse()
                .map_err(|_| anyhow!("Invalid AUTO_RETRY value: {}", auto_retry))?;
        }
        if let Ok(interval) = env::var("RETRY_INTERVAL_SECONDS") {
            config.matchmaking.retry_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid RETRY_INTERVAL_SECONDS value: {}", interval))?;
        }
        if let Ok(attempts) = env::var("MAX_MIN_PEERS_ATTEMPTS") {
            config.matchmaking.max_min_peers_attempts = attempts
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_MIN_PEERS_ATTEMPTS value: {}", attempts))?;
        }
        if let Ok(interval) = env::var("MIN_PEERS_RETRY_INTERVAL_SECONDS") {
            config.matchmaking.min_peers_retry_interval_seconds =
                interval.parse().map_err(|_| {
                    anyhow!("Invalid MIN_PEERS_RETRY_INTERVAL_SECONDS value: {}", interval)
                })?;
        }

        // Simulation settings
        if let Ok(peers) = env::var("SIM_PEERS") {
            config.simulation.peers = peers
                .parse()
                .map_err(|_| anyhow!("Invalid SIM_PEERS value: {}", peers))?;
        }
        if let Ok(latency) = env::var("SIM_DIRECTORY_LATENCY_MS") {
            config.simulation.directory_latency_ms = latency
                .parse()
                .map_err(|_| anyhow!("Invalid SIM_DIRECTORY_LATENCY_MS value: {}", latency))?;
        }
        if let Ok(run_seconds) = env::var("SIM_RUN_SECONDS") {
            config.simulation.run_seconds = run_seconds
                .parse()
                .map_err(|_| anyhow!("Invalid SIM_RUN_SECONDS value: {}", run_seconds))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Get the simulated directory latency as Duration
    pub fn directory_latency(&self) -> Duration {
        Duration::from_millis(self.simulation.directory_latency_ms)
    }

    /// Get the simulation run time as Duration
    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(self.simulation.run_seconds)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    config.matchmaking.validate()?;

    if config.simulation.peers == 0 {
        return Err(anyhow!("Simulation needs at least one peer"));
    }
    if config.simulation.run_seconds == 0 {
        return Err(anyhow!("Simulation run time must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.directory_latency(), Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "loud".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_matchmaking_section_rejected() {
        let mut config = AppConfig::default();
        config.matchmaking.peer_limit = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let raw = r#"
            [matchmaking]
            game_type_key = "arena"
            min_peers = 3

            [simulation]
            peers = 6
        "#;

        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.matchmaking.game_type_key, "arena");
        assert_eq!(config.matchmaking.min_peers, 3);
        assert_eq!(config.matchmaking.peer_limit, 4);
        assert_eq!(config.simulation.peers, 6);
        assert_eq!(config.service.log_level, "info");
        assert!(validate_config(&config).is_ok());
    }
}
