//! Timed retry support for the matchmaking core
//!
//! This module provides the timer collaborator interface and the scheduler
//! that turns timer callbacks into cancellable retry chains.

pub mod scheduler;
pub mod timer;

// Re-export commonly used types
pub use scheduler::{RetryChain, RetryHandle, RetryScheduler};
pub use timer::{CancelToken, ManualTimer, Timer, TimerCallback, TokioTimer};
