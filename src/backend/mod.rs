//! Session backend seam
//!
//! The coordinator hosts and joins through `SessionBackend` and hears back
//! through `SessionEvents`.

pub mod session;
pub mod simulated;

// Re-export commonly used types
pub use session::{HostInitCall, RecordingBackend, SessionBackend, SessionEvents};
pub use simulated::{SessionSummary, SimulatedBackend, SimulatedNetwork};
