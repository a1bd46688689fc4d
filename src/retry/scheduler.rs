//! Cancellable retry scheduling on top of a `Timer`
//!
//! Every scheduled action gets its own `RetryHandle`. A `RetryChain` owns the
//! single live handle of one logical retry loop: arming the chain again
//! cancels whatever the previous handle still had pending.

use crate::error::{MatchmakingError, Result};
use crate::retry::timer::{CancelToken, Timer};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
struct HandleState {
    cancelled: AtomicBool,
    fired: AtomicBool,
}

/// One scheduled pending retry
#[derive(Debug)]
pub struct RetryHandle {
    id: u64,
    delay: Duration,
    state: Arc<HandleState>,
    token: CancelToken,
}

impl RetryHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub fn has_fired(&self) -> bool {
        self.state.fired.load(Ordering::SeqCst)
    }

    /// Still waiting to run
    pub fn is_pending(&self) -> bool {
        !self.is_cancelled() && !self.has_fired()
    }
}

/// Schedules delayed actions whose cancellation is checked at fire time
pub struct RetryScheduler {
    timer: Arc<dyn Timer>,
    next_id: AtomicU64,
}

impl RetryScheduler {
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        Self {
            timer,
            next_id: AtomicU64::new(1),
        }
    }

    /// Run `action` once after `delay` unless the returned handle is cancelled first
    pub fn schedule<F>(&self, delay: Duration, action: F) -> RetryHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let state = Arc::new(HandleState::default());
        let fire_state = Arc::clone(&state);

        let token = self.timer.after(
            delay,
            Box::new(move || {
                if fire_state.cancelled.load(Ordering::SeqCst) {
                    debug!("Retry {} was cancelled before it ran", id);
                    return;
                }
                fire_state.fired.store(true, Ordering::SeqCst);
                action();
            }),
        );

        RetryHandle {
            id,
            delay,
            state,
            token,
        }
    }

    /// Mark `handle` inert; idempotent
    pub fn cancel(&self, handle: &RetryHandle) {
        handle.state.cancelled.store(true, Ordering::SeqCst);
        self.timer.cancel(&handle.token);
    }
}

/// Holder of the single live handle of one retry loop
pub struct RetryChain {
    name: &'static str,
    slot: Mutex<Option<RetryHandle>>,
}

impl RetryChain {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Schedule `action`, replacing and cancelling any previous handle
    pub fn arm<F>(&self, scheduler: &RetryScheduler, delay: Duration, action: F) -> Result<u64>
    where
        F: FnOnce() + Send + 'static,
    {
        // Scheduling under the slot lock keeps a fast-firing action that
        // re-arms this chain from being overwritten by its own predecessor.
        let (id, previous) = {
            let mut slot = self
                .slot
                .lock()
                .map_err(|_| MatchmakingError::lock_poisoned(self.name))?;
            let handle = scheduler.schedule(delay, action);
            (handle.id(), slot.replace(handle))
        };

        if let Some(previous) = previous {
            scheduler.cancel(&previous);
        }

        debug!("Armed {} retry {} in {:?}", self.name, id, delay);
        Ok(id)
    }

    /// Cancel the live handle, returning whether one was still pending
    pub fn cancel(&self, scheduler: &RetryScheduler) -> Result<bool> {
        let previous = self
            .slot
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned(self.name))?
            .take();

        Ok(match previous {
            Some(handle) => {
                let was_pending = handle.is_pending();
                scheduler.cancel(&handle);
                was_pending
            }
            None => false,
        })
    }

    /// Whether the chain has a handle that has neither fired nor been cancelled
    pub fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .map(|slot| slot.as_ref().map(RetryHandle::is_pending).unwrap_or(false))
            .unwrap_or(false)
    }
}
