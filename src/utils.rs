//! Utility functions for the matchmaking core

use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Generate a new unique session name
pub fn generate_session_name() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a new unique participant identity
pub fn generate_identity() -> String {
    Uuid::new_v4().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Convert a configured interval in (fractional) seconds to a Duration
///
/// Negative and non-finite values collapse to zero.
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::from_secs_f64(seconds)
    } else {
        Duration::ZERO
    }
}
