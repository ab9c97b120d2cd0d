//! eventfd used to interrupt the dispatcher's `poll`.
//!
//! Workers wake it after giving a connection back to the registry, and the
//! shutdown context wakes it when shutdown is requested. Multiple wakes
//! before the dispatcher drains the counter coalesce into one.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use log::warn;

pub struct Waker {
    fd: OwnedFd,
}

impl Waker {
    pub fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    pub fn wake(&self) {
        let val: u64 = 1;
        let ret = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                &val as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if ret < 0 {
            let err = io::Error::last_os_error();
            // EAGAIN: counter saturated, a wakeup is already pending
            if err.kind() != io::ErrorKind::WouldBlock {
                warn!("waker write failed: {}", err);
            }
        }
    }

    /// Reset the counter so the next `poll` blocks again.
    pub fn drain(&self) {
        let mut val: u64 = 0;
        // EAGAIN: already drained, nothing pending
        unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                &mut val as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            );
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl std::fmt::Debug for Waker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waker").field("fd", &self.fd()).finish()
    }
}
