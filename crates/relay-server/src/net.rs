//! Listening socket setup
//!
//! Raw `socket`/`bind`/`listen` so the backlog is ours to choose (std's
//! `TcpListener::bind` hard-codes it). The socket is non-blocking: the
//! dispatcher only accepts after `poll` reports it readable.

use std::io;
use std::net::TcpListener;
use std::os::fd::{FromRawFd, OwnedFd};

use crate::error::{Result, ServerError};

/// Bind `0.0.0.0:port` with `SO_REUSEADDR` and start listening.
pub fn bind_listener(port: u16, backlog: i32) -> Result<TcpListener> {
    let bind_err = |source: io::Error| ServerError::Bind { port, source };

    let raw = unsafe {
        libc::socket(
            libc::AF_INET,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            0,
        )
    };
    if raw < 0 {
        return Err(bind_err(io::Error::last_os_error()));
    }
    // Closed on every early return below
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let opt: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            raw,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &opt as *const _ as *const libc::c_void,
            std::mem::size_of_val(&opt) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(bind_err(io::Error::last_os_error()));
    }

    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();
    addr.sin_port = port.to_be();

    let ret = unsafe {
        libc::bind(
            raw,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of_val(&addr) as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(bind_err(io::Error::last_os_error()));
    }

    if unsafe { libc::listen(raw, backlog) } != 0 {
        return Err(bind_err(io::Error::last_os_error()));
    }

    Ok(TcpListener::from(fd))
}
