//! Socket registry: the set of descriptors the dispatcher polls.
//!
//! Design:
//! - Index 0 is the listening socket; it is never removable
//! - Indices `1..len` are idle client connections
//! - Logical capacity starts at `initial_capacity` and doubles when full
//! - Removal is O(1) swap-remove, so client order is not preserved
//! - One mutex; the dispatcher polls a snapshot, never the live set
//!
//! A connection added while the dispatcher is inside `poll` is picked up
//! on the next iteration. When a [`Waker`] is attached, `add` also wakes
//! the dispatcher so that iteration starts right away.

use std::os::fd::RawFd;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::connection::Connection;
use crate::error::{Result, ServerError};
use crate::waker::Waker;

/// Initial slot count, listener included.
pub const DEFAULT_FD_CAPACITY: usize = 5;

/// Events the dispatcher waits for on every slot.
pub const READ_INTEREST: libc::c_short = libc::POLLIN;

struct Slots {
    listener: RawFd,
    clients: Vec<Connection>,
    capacity: usize,
}

impl Slots {
    #[inline]
    fn len(&self) -> usize {
        1 + self.clients.len()
    }
}

pub struct SocketRegistry {
    slots: Mutex<Slots>,
    waker: Option<Arc<Waker>>,
}

impl SocketRegistry {
    /// Registry holding only `listener`, with room for `initial_capacity`
    /// slots in total (at least 2).
    pub fn new(listener: RawFd, initial_capacity: usize) -> Self {
        let capacity = initial_capacity.max(2);
        Self {
            slots: Mutex::new(Slots {
                listener,
                clients: Vec::with_capacity(capacity - 1),
                capacity,
            }),
            waker: None,
        }
    }

    pub fn with_waker(mut self, waker: Arc<Waker>) -> Self {
        self.waker = Some(waker);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `conn` with read interest and return its index.
    pub fn add(&self, conn: Connection) -> usize {
        let index = {
            let mut slots = self.lock();
            if slots.len() == slots.capacity {
                slots.capacity *= 2;
                let extra = slots.capacity - slots.len();
                slots.clients.reserve_exact(extra);
            }
            slots.clients.push(conn);
            slots.len() - 1
        };
        if let Some(waker) = &self.waker {
            waker.wake();
        }
        index
    }

    /// Swap-remove the client at `index` and hand it back.
    ///
    /// The last client moves into `index`.
    pub fn remove(&self, index: usize) -> Result<Connection> {
        let mut slots = self.lock();
        if index == 0 {
            return Err(ServerError::ListenerSlot);
        }
        if index >= slots.len() {
            return Err(ServerError::InvalidIndex(index));
        }
        Ok(slots.clients.swap_remove(index - 1))
    }

    /// Remove the client whose socket is `fd`.
    ///
    /// Indices shift under swap-remove, so the dispatcher addresses
    /// clients by descriptor while walking a poll snapshot.
    pub fn take(&self, fd: RawFd) -> Option<Connection> {
        let mut slots = self.lock();
        let pos = slots.clients.iter().position(|c| c.fd() == fd)?;
        Some(slots.clients.swap_remove(pos))
    }

    pub fn contains(&self, fd: RawFd) -> bool {
        let slots = self.lock();
        slots.listener == fd || slots.clients.iter().any(|c| c.fd() == fd)
    }

    /// Descriptor at `index`, 0 being the listener.
    pub fn fd_at(&self, index: usize) -> Option<RawFd> {
        let slots = self.lock();
        match index {
            0 => Some(slots.listener),
            i => slots.clients.get(i - 1).map(Connection::fd),
        }
    }

    /// Copy of every `(fd, events)` pair, listener first, ready for `poll`.
    pub fn snapshot(&self) -> Vec<libc::pollfd> {
        let slots = self.lock();
        let mut fds = Vec::with_capacity(slots.len() + 1);
        fds.push(pollfd(slots.listener));
        fds.extend(slots.clients.iter().map(|c| pollfd(c.fd())));
        fds
    }

    /// Drop (and so close) every client connection; returns how many.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Connection> = self.lock().clients.drain(..).collect();
        drained.len()
    }

    pub fn listener_fd(&self) -> RawFd {
        self.lock().listener
    }

    /// Slot count including the listener.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn client_count(&self) -> usize {
        self.lock().clients.len()
    }

    /// Logical capacity including the listener slot.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }
}

#[inline]
fn pollfd(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: READ_INTEREST,
        revents: 0,
    }
}

impl std::fmt::Debug for SocketRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slots = self.lock();
        f.debug_struct("SocketRegistry")
            .field("listener", &slots.listener)
            .field("len", &slots.len())
            .field("capacity", &slots.capacity)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
