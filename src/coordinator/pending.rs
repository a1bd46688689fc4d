//! Continuations waiting on the outstanding listing request
//!
//! Several joins may ask for a listing before the first response lands. Only
//! the first of them issues a directory request; the rest queue up behind it
//! and all of them run against the same response. Join continuations are
//! tagged with their join generation and a newer join replaces any older one
//! still queued, so at most one join continuation waits at a time.

use crate::error::{MatchmakingError, Result};
use crate::types::SessionListing;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Work to run once the next listing arrives
pub type ListingContinuation = Box<dyn FnOnce(&SessionListing) + Send + 'static>;

struct Pending {
    join_generation: Option<u64>,
    continuation: ListingContinuation,
}

#[derive(Default)]
pub struct PendingListingQueue {
    queue: Mutex<VecDeque<Pending>>,
}

impl PendingListingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, VecDeque<Pending>>> {
        self.queue
            .lock()
            .map_err(|_| MatchmakingError::lock_poisoned("pending listing queue").into())
    }

    /// Queue `continuation`; returns true when the caller must issue the request
    pub fn enqueue(&self, continuation: ListingContinuation) -> Result<bool> {
        self.push(None, continuation)
    }

    /// Queue the continuation of join `generation`, dropping superseded joins
    ///
    /// Returns true when nothing was queued before, i.e. no request is
    /// outstanding and the caller must issue one.
    pub fn enqueue_join(&self, generation: u64, continuation: ListingContinuation) -> Result<bool> {
        self.push(Some(generation), continuation)
    }

    fn push(&self, join_generation: Option<u64>, continuation: ListingContinuation) -> Result<bool> {
        let mut queue = self.lock()?;
        let first = queue.is_empty();
        if join_generation.is_some() {
            let before = queue.len();
            queue.retain(|pending| pending.join_generation.is_none());
            let superseded = before - queue.len();
            if superseded > 0 {
                debug!("Replaced {} superseded join continuation(s)", superseded);
            }
        }
        queue.push_back(Pending {
            join_generation,
            continuation,
        });
        Ok(first)
    }

    /// Run every queued continuation against `listing`, in queue order
    ///
    /// The queue is swapped out under the lock and the continuations run
    /// after it is released, so they may enqueue again for the next request.
    pub fn deliver(&self, listing: &SessionListing) -> Result<usize> {
        let drained = self.drain()?;
        let count = drained.len();
        if count > 1 {
            debug!("Delivering one listing to {} batched continuations", count);
        }
        for continuation in drained {
            continuation(listing);
        }
        Ok(count)
    }

    /// Remove every queued continuation without running it
    pub fn drain(&self) -> Result<Vec<ListingContinuation>> {
        let mut queue = self.lock()?;
        Ok(std::mem::take(&mut *queue)
            .into_iter()
            .map(|pending| pending.continuation)
            .collect())
    }

    pub fn clear(&self) -> Result<usize> {
        Ok(self.drain()?.len())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HostRecord;
    use std::sync::Arc;

    #[test]
    fn test_only_first_enqueue_requests() {
        let queue = PendingListingQueue::new();
        assert!(queue.enqueue(Box::new(|_| {})).unwrap());
        assert!(!queue.enqueue(Box::new(|_| {})).unwrap());
        assert_eq!(queue.len().unwrap(), 2);
    }

    #[test]
    fn test_deliver_runs_in_order_against_one_listing() {
        let queue = PendingListingQueue::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            queue
                .enqueue(Box::new(move |listing: &SessionListing| {
                    seen.lock()
                        .unwrap()
                        .push((tag, listing.hosts[0].identity.clone()));
                }))
                .unwrap();
        }

        let listing = SessionListing::new(vec![HostRecord::new("h1", 0, 4)]);
        assert_eq!(queue.deliver(&listing).unwrap(), 3);
        assert!(queue.is_empty().unwrap());

        let seen = seen.lock().unwrap();
        let tags: Vec<_> = seen.iter().map(|(tag, _)| *tag).collect();
        assert_eq!(tags, vec!["first", "second", "third"]);
        assert!(seen.iter().all(|(_, id)| id == "h1"));
    }

    #[test]
    fn test_continuation_can_enqueue_for_next_request() {
        let queue = Arc::new(PendingListingQueue::new());
        let requeued = Arc::new(Mutex::new(None));

        {
            let inner = Arc::clone(&queue);
            let requeued = Arc::clone(&requeued);
            queue
                .enqueue(Box::new(move |_| {
                    *requeued.lock().unwrap() = Some(inner.enqueue(Box::new(|_| {})).unwrap());
                }))
                .unwrap();
        }

        assert_eq!(queue.deliver(&SessionListing::empty()).unwrap(), 1);
        assert_eq!(*requeued.lock().unwrap(), Some(true));
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn test_clear_drops_without_running() {
        let queue = PendingListingQueue::new();
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        queue
            .enqueue(Box::new(move |_| *flag.lock().unwrap() = true))
            .unwrap();

        assert_eq!(queue.clear().unwrap(), 1);
        assert_eq!(queue.deliver(&SessionListing::empty()).unwrap(), 0);
        assert!(!*ran.lock().unwrap());
    }
    #[test]
    fn test_newer_join_replaces_queued_join() {
        let queue = PendingListingQueue::new();
        let ran = Arc::new(Mutex::new(Vec::new()));

        let record = |tag: &'static str| -> ListingContinuation {
            let ran = Arc::clone(&ran);
            Box::new(move |_| ran.lock().unwrap().push(tag))
        };

        assert!(queue.enqueue_join(1, record("join-1")).unwrap());
        assert!(!queue.enqueue(record("create")).unwrap());
        assert!(!queue.enqueue_join(2, record("join-2")).unwrap());
        assert!(!queue.enqueue_join(3, record("join-3")).unwrap());
        assert_eq!(queue.len().unwrap(), 2);

        assert_eq!(queue.deliver(&SessionListing::empty()).unwrap(), 2);
        assert_eq!(*ran.lock().unwrap(), vec!["create", "join-3"]);
    }

    #[test]
    fn test_poisoned_queue_reports_error() {
        let queue = Arc::new(PendingListingQueue::new());
        let poisoner = Arc::clone(&queue);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.queue.lock().unwrap();
            panic!("poison the queue");
        })
        .join();

        assert!(queue.len().is_err());
        assert!(queue.is_empty().is_err());
        assert!(queue.enqueue(Box::new(|_| {})).is_err());
    }
}
