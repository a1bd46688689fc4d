//! Configuration management for the matchmaking core
//!
//! This module handles configuration loading from environment variables and
//! TOML files, validation, and default values.

pub mod app;
pub mod matchmaking;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServiceSettings, SimulationSettings};
pub use matchmaking::MatchConfig;
