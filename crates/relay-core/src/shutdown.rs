//! Shutdown context shared by every server component
//!
//! One `ShutdownContext` is created per server and handed out by `Arc`
//! to the dispatcher, the worker pool, the task queue and whichever
//! signal coordinator delivers the request. There is no global flag.
//!
//! The state is an atomic so hot loops (dispatcher iteration, worker
//! dequeue) can read it without locking. The condvar lets threads that
//! have nothing else to do park until shutdown is requested.
//!
//! Components that sleep somewhere the condvar cannot reach (the
//! dispatcher inside `poll`) register a wake hook with
//! [`on_shutdown`](ShutdownContext::on_shutdown).
//!
//! The transition is monotonic: `Active -> Shutdown`, never back.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Server lifecycle state
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Active = 0,
    Shutdown = 1,
}

impl ShutdownState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => ShutdownState::Active,
            _ => ShutdownState::Shutdown,
        }
    }
}

type Hook = Box<dyn Fn() + Send + Sync + 'static>;

pub struct ShutdownContext {
    state: AtomicU8,
    lock: Mutex<()>,
    cond: Condvar,
    hooks: Mutex<Vec<Hook>>,
}

impl ShutdownContext {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ShutdownState::Active as u8),
            lock: Mutex::new(()),
            cond: Condvar::new(),
            hooks: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub fn state(&self) -> ShutdownState {
        ShutdownState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.state() == ShutdownState::Shutdown
    }

    /// Store `Shutdown` without touching the mutex or condvar.
    ///
    /// The only operation that is safe to call from a signal handler.
    /// Waiters parked in [`wait`](Self::wait) are not woken; they are
    /// expected to use [`wait_timeout`](Self::wait_timeout) when this path
    /// is in play.
    #[inline]
    pub fn mark_shutdown(&self) -> bool {
        self.state.swap(ShutdownState::Shutdown as u8, Ordering::AcqRel)
            == ShutdownState::Active as u8
    }

    /// Request shutdown and wake every thread parked on this context.
    ///
    /// Wake hooks run on every call, not only the first: a previous
    /// [`mark_shutdown`](Self::mark_shutdown) from signal context could not
    /// run them.
    ///
    /// Returns `true` for the call that performed the transition.
    pub fn request_shutdown(&self) -> bool {
        let first = self.mark_shutdown();
        {
            // Notify under the lock so a waiter between "check" and "wait"
            // cannot miss the broadcast.
            let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
            self.cond.notify_all();
        }
        for hook in self.hooks.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            hook();
        }
        first
    }

    /// Register a hook run by [`request_shutdown`](Self::request_shutdown).
    ///
    /// Hooks must be cheap and must not block. If shutdown was already
    /// requested the hook runs immediately.
    pub fn on_shutdown<F>(&self, hook: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.is_shutdown() {
            hook();
        }
        self.hooks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(hook));
    }

    /// Block until shutdown is requested.
    pub fn wait(&self) {
        let mut guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        while !self.is_shutdown() {
            guard = self.cond.wait(guard).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Block until shutdown is requested or `timeout` elapses.
    ///
    /// Returns `true` if shutdown was observed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        while !self.is_shutdown() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (g, _) = self
                .cond
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            guard = g;
        }
        true
    }
}

impl Default for ShutdownContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownContext")
            .field("state", &self.state())
            .finish()
    }
}
