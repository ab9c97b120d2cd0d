//! Blocking FIFO queue (Mutex + two Condvars)
//!
//! Design:
//! - `VecDeque<T>` guarded by a single mutex
//! - `not_empty` parks consumers, `not_full` parks producers
//! - Capacity 0 (`QUEUE_UNBOUNDED`) disables the `not_full` wait
//! - Consumers return `None` once shutdown is observed on an empty queue
//!
//! There is deliberately no `try_enqueue`: a full queue blocks the
//! producer. For the server the producer is the dispatcher, so a
//! saturated worker pool throttles how fast new requests are accepted.
//!
//! Every wait re-checks its predicate after waking, which covers both
//! spurious wakeups and broadcasts meant for the other side. Producers
//! also wake every `SHUTDOWN_RECHECK` on their own: a shutdown marked from
//! signal context broadcasts nothing.

use crate::error::Rejected;
use crate::shutdown::ShutdownContext;
use crate::QUEUE_UNBOUNDED;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Longest a blocked producer sleeps before re-reading the shutdown state.
pub const SHUTDOWN_RECHECK: Duration = Duration::from_millis(100);

pub struct BlockingQueue<T> {
    items: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    /// Maximum number of queued items, 0 = unbounded
    max_size: usize,
    shutdown: Arc<ShutdownContext>,
}

impl<T> BlockingQueue<T> {
    /// Create a queue holding at most `capacity` items (0 = unbounded).
    pub fn new(capacity: usize, shutdown: Arc<ShutdownContext>) -> Self {
        let initial = if capacity == QUEUE_UNBOUNDED { 16 } else { capacity };
        Self {
            items: Mutex::new(VecDeque::with_capacity(initial)),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            max_size: capacity,
            shutdown,
        }
    }

    /// A worker panicking while holding the lock must not take the whole
    /// queue down with it; the deque itself is never left half-modified.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[inline]
    fn full(&self, items: &VecDeque<T>) -> bool {
        self.max_size != QUEUE_UNBOUNDED && items.len() >= self.max_size
    }

    /// Append `item` at the tail, blocking while the queue is full.
    ///
    /// Fails only when shutdown is observed while waiting for space; the
    /// item is handed back inside [`Rejected`].
    pub fn enqueue(&self, item: T) -> Result<(), Rejected<T>> {
        let mut items = self.lock();
        while self.full(&items) {
            if self.shutdown.is_shutdown() {
                return Err(Rejected(item));
            }
            let (guard, _) = self
                .not_full
                .wait_timeout(items, SHUTDOWN_RECHECK)
                .unwrap_or_else(|e| e.into_inner());
            items = guard;
        }
        items.push_back(item);
        drop(items);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop the head, blocking while the queue is empty.
    ///
    /// Returns `None` when the queue is empty and shutdown has been
    /// requested. Items still queued at shutdown are returned normally;
    /// callers that want to stop immediately check the shutdown state
    /// themselves.
    pub fn dequeue(&self) -> Option<T> {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.not_full.notify_one();
                return Some(item);
            }
            if self.shutdown.is_shutdown() {
                return None;
            }
            items = self.not_empty.wait(items).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Inspect the head without removing it.
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.lock().front().map(f)
    }

    /// Clone of the head, if any.
    pub fn peek(&self) -> Option<T>
    where
        T: Clone,
    {
        self.peek_with(T::clone)
    }

    /// Drop every queued item and return how many were removed.
    ///
    /// Items are dropped outside the lock; a `Task` runs its cleanup on drop
    /// and that cleanup may itself touch other shared structures.
    pub fn clear(&self) -> usize {
        let drained: Vec<T> = self.lock().drain(..).collect();
        let n = drained.len();
        drop(drained);
        if n > 0 {
            self.not_full.notify_all();
        }
        n
    }

    /// Wake every producer and consumer so they re-check shutdown.
    ///
    /// The broadcast happens while holding the queue mutex: a thread that
    /// has checked the shutdown flag but not yet started waiting still
    /// holds the lock, so it cannot miss this wakeup.
    pub fn wake_all(&self) {
        let _items = self.lock();
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Always `false` for an unbounded queue.
    pub fn is_full(&self) -> bool {
        self.full(&self.lock())
    }

    /// Configured capacity, 0 = unbounded.
    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn is_bounded(&self) -> bool {
        self.max_size != QUEUE_UNBOUNDED
    }
}

impl<T> std::fmt::Debug for BlockingQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingQueue")
            .field("len", &self.len())
            .field("max_size", &self.max_size)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
