//! Timer collaborator interface and implementations
//!
//! A timer delivers a callback once after a delay. Cancelling marks the
//! token inert; timers check the token right before the callback runs, so a
//! cancel that races a due timer still suppresses the callback.

use crate::error::{MatchmakingError, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::warn;

/// Callback delivered by a timer
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Handle to one pending timer callback
#[derive(Debug, Clone)]
pub struct CancelToken {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    fn new(id: u64) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Trait for delayed callback delivery
pub trait Timer: Send + Sync {
    /// Run `callback` once, no earlier than `delay` from now
    ///
    /// The callback must never run inside this call.
    fn after(&self, delay: Duration, callback: TimerCallback) -> CancelToken;

    /// Suppress the callback behind `token` if it has not run yet
    fn cancel(&self, token: &CancelToken);
}

/// Timer backed by tokio tasks and `tokio::time::sleep`
pub struct TokioTimer {
    handle: Handle,
    next_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, AbortHandle>>>,
}

impl TokioTimer {
    /// Create a timer on the runtime the caller is running in
    pub fn try_current() -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| MatchmakingError::InternalError {
            message: format!("No tokio runtime available for timer: {}", e),
        })?;
        Ok(Self::with_handle(handle))
    }

    /// Create a timer that spawns onto `handle`
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            handle,
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of callbacks still waiting to fire
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}

impl Timer for TokioTimer {
    fn after(&self, delay: Duration, callback: TimerCallback) -> CancelToken {
        let token = CancelToken::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let task_token = token.clone();
        let pending = Arc::clone(&self.pending);

        // Hold the map lock across spawn so the task cannot remove its entry
        // before it has been inserted.
        let mut guard = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Timer bookkeeping lock poisoned, recovering");
                poisoned.into_inner()
            }
        };

        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Ok(mut pending) = pending.lock() {
                pending.remove(&task_token.id);
            }
            if !task_token.is_cancelled() {
                callback();
            }
        });
        guard.insert(token.id, task.abort_handle());

        token
    }

    fn cancel(&self, token: &CancelToken) {
        token.mark_cancelled();
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(task) = pending.remove(&token.id) {
                task.abort();
            }
        }
    }
}

struct ManualEntry {
    due: Duration,
    token: CancelToken,
    callback: TimerCallback,
}

#[derive(Default)]
struct ManualClock {
    now: Duration,
    entries: Vec<ManualEntry>,
}

/// Timer driven by an explicit virtual clock
///
/// Nothing fires until `advance` is called. Callbacks run on the caller's
/// thread in due order, ties in scheduling order; callbacks may schedule
/// further timers, which fire within the same `advance` if they fall due.
#[derive(Default)]
pub struct ManualTimer {
    clock: Mutex<ManualClock>,
    next_id: AtomicU64,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation
    pub fn now(&self) -> Duration {
        self.clock.lock().map(|clock| clock.now).unwrap_or_default()
    }

    /// Number of live (uncancelled) pending callbacks
    pub fn pending_count(&self) -> usize {
        self.clock
            .lock()
            .map(|clock| {
                clock
                    .entries
                    .iter()
                    .filter(|entry| !entry.token.is_cancelled())
                    .count()
            })
            .unwrap_or(0)
    }

    /// Due times of the live pending callbacks, earliest first
    pub fn pending_due_times(&self) -> Vec<Duration> {
        let mut due: Vec<Duration> = self
            .clock
            .lock()
            .map(|clock| {
                clock
                    .entries
                    .iter()
                    .filter(|entry| !entry.token.is_cancelled())
                    .map(|entry| entry.due)
                    .collect()
            })
            .unwrap_or_default();
        due.sort();
        due
    }

    /// Move the clock forward by `by`, firing everything that falls due
    ///
    /// Returns the number of callbacks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut fired = 0;

        loop {
            let next = {
                let Ok(mut clock) = self.clock.lock() else {
                    return fired;
                };
                clock.entries.retain(|entry| !entry.token.is_cancelled());

                let earliest = clock
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.due <= target)
                    .min_by_key(|(_, entry)| (entry.due, entry.token.id))
                    .map(|(index, _)| index);

                match earliest {
                    Some(index) => {
                        let entry = clock.entries.remove(index);
                        clock.now = clock.now.max(entry.due);
                        Some(entry)
                    }
                    None => {
                        clock.now = target;
                        None
                    }
                }
            };

            match next {
                Some(entry) => {
                    if !entry.token.is_cancelled() {
                        (entry.callback)();
                        fired += 1;
                    }
                }
                None => return fired,
            }
        }
    }
}

impl Timer for ManualTimer {
    fn after(&self, delay: Duration, callback: TimerCallback) -> CancelToken {
        let token = CancelToken::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        if let Ok(mut clock) = self.clock.lock() {
            let due = clock.now + delay;
            clock.entries.push(ManualEntry {
                due,
                token: token.clone(),
                callback,
            });
        }
        token
    }

    fn cancel(&self, token: &CancelToken) {
        token.mark_cancelled();
        if let Ok(mut clock) = self.clock.lock() {
            clock.entries.retain(|entry| entry.token.id != token.id);
        }
    }
}
