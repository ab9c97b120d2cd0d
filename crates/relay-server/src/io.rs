//! Reliable chunked socket I/O
//!
//! `send_all` and `recv_all` move a whole buffer across a stream socket in
//! pieces of at most [`MAX_CHUNK`] bytes, resuming after short transfers.
//!
//! - `EINTR` is retried silently
//! - `EAGAIN` on a non-blocking socket waits for readiness on that one
//!   descriptor, bounded by [`IO_WAIT_TIMEOUT`]
//! - A zero-byte result before completion means the peer closed the
//!   connection, reported as [`TransferError::PeerClosed`] and kept
//!   distinct from a failing syscall ([`TransferError::Os`])

use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::time::Duration;

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::socket::{recv, send, MsgFlags};
use thiserror::Error;

/// Largest piece handed to a single `send`/`recv` call.
pub const MAX_CHUNK: usize = 1400;

/// How long a transfer waits for a non-blocking socket to become ready.
pub const IO_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("peer closed the connection after {transferred} of {expected} bytes")]
    PeerClosed { transferred: usize, expected: usize },

    #[error("socket error: {0}")]
    Os(#[from] Errno),

    #[error("timed out waiting for the socket to become ready")]
    TimedOut,

    #[error("nothing to transfer")]
    Empty,
}

impl TransferError {
    pub fn is_peer_closed(&self) -> bool {
        matches!(self, TransferError::PeerClosed { .. })
    }
}

#[inline]
fn next_chunk(total: usize, done: usize) -> usize {
    (total - done).min(MAX_CHUNK)
}

/// Send the whole of `buf`.
///
/// Returns the number of bytes sent, always `buf.len()` on success.
pub fn send_all<F: AsFd>(fd: &F, buf: &[u8]) -> Result<usize, TransferError> {
    if buf.is_empty() {
        return Err(TransferError::Empty);
    }
    let raw = fd.as_fd().as_raw_fd();
    let mut sent = 0;
    while sent < buf.len() {
        let end = sent + next_chunk(buf.len(), sent);
        // MSG_NOSIGNAL: a closed peer yields EPIPE instead of killing the process
        match send(raw, &buf[sent..end], MsgFlags::MSG_NOSIGNAL) {
            Ok(0) | Err(Errno::EPIPE) => {
                return Err(TransferError::PeerClosed {
                    transferred: sent,
                    expected: buf.len(),
                })
            }
            Ok(n) => sent += n,
            Err(Errno::EINTR) => continue,
            Err(Errno::EAGAIN) => wait_ready(raw, libc::POLLOUT, IO_WAIT_TIMEOUT)?,
            Err(e) => return Err(TransferError::Os(e)),
        }
    }
    Ok(sent)
}

/// Fill the whole of `buf`.
///
/// Returns the number of bytes received, always `buf.len()` on success.
pub fn recv_all<F: AsFd>(fd: &F, buf: &mut [u8]) -> Result<usize, TransferError> {
    if buf.is_empty() {
        return Err(TransferError::Empty);
    }
    let raw = fd.as_fd().as_raw_fd();
    let expected = buf.len();
    let mut received = 0;
    while received < expected {
        let end = received + next_chunk(expected, received);
        match recv(raw, &mut buf[received..end], MsgFlags::empty()) {
            Ok(0) => {
                return Err(TransferError::PeerClosed {
                    transferred: received,
                    expected,
                })
            }
            Ok(n) => received += n,
            Err(Errno::EINTR) => continue,
            Err(Errno::EAGAIN) => wait_ready(raw, libc::POLLIN, IO_WAIT_TIMEOUT)?,
            Err(e) => return Err(TransferError::Os(e)),
        }
    }
    Ok(received)
}

/// Receive whatever is available, at most `min(buf.len(), MAX_CHUNK)` bytes.
///
/// Waits for readiness like [`recv_all`] when nothing is available yet.
pub fn recv_some<F: AsFd>(fd: &F, buf: &mut [u8]) -> Result<usize, TransferError> {
    if buf.is_empty() {
        return Err(TransferError::Empty);
    }
    let raw = fd.as_fd().as_raw_fd();
    let len = buf.len().min(MAX_CHUNK);
    loop {
        match recv(raw, &mut buf[..len], MsgFlags::empty()) {
            Ok(0) => {
                return Err(TransferError::PeerClosed {
                    transferred: 0,
                    expected: len,
                })
            }
            Ok(n) => return Ok(n),
            Err(Errno::EINTR) => continue,
            Err(Errno::EAGAIN) => wait_ready(raw, libc::POLLIN, IO_WAIT_TIMEOUT)?,
            Err(e) => return Err(TransferError::Os(e)),
        }
    }
}

/// Put the descriptor in non-blocking mode, keeping its other status flags.
pub fn set_nonblocking<F: AsFd>(fd: &F) -> Result<(), Errno> {
    let raw = fd.as_fd().as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    if !flags.contains(OFlag::O_NONBLOCK) {
        fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    }
    Ok(())
}

/// Wait until `raw` reports one of `events`, an error or a hangup.
///
/// Error and hangup conditions return `Ok`; the following `send`/`recv`
/// reports them properly.
fn wait_ready(raw: RawFd, events: libc::c_short, timeout: Duration) -> Result<(), TransferError> {
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd {
        fd: raw,
        events,
        revents: 0,
    };
    loop {
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            match Errno::last() {
                Errno::EINTR => continue,
                e => return Err(TransferError::Os(e)),
            }
        }
        if rc == 0 {
            return Err(TransferError::TimedOut);
        }
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::Shutdown;
    use std::os::unix::net::UnixStream;
    use std::thread;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_next_chunk() {
        assert_eq!(next_chunk(5000, 0), MAX_CHUNK);
        assert_eq!(next_chunk(5000, 4200), 800);
        assert_eq!(next_chunk(10, 0), 10);
    }

    #[test]
    fn test_round_trip_multiple_chunks() {
        let len = 5 * MAX_CHUNK + 37;
        let (a, b) = UnixStream::pair().unwrap();
        let payload = pattern(len);

        let sender = {
            let payload = payload.clone();
            thread::spawn(move || send_all(&a, &payload))
        };

        let mut buf = vec![0u8; len];
        assert_eq!(recv_all(&b, &mut buf), Ok(len));
        assert_eq!(sender.join().unwrap(), Ok(len));
        assert_eq!(buf, payload);
    }

    #[test]
    fn test_nonblocking_waits_for_data() {
        let (a, b) = UnixStream::pair().unwrap();
        set_nonblocking(&b).unwrap();

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut a = a;
            a.write_all(b"hel").unwrap();
            thread::sleep(Duration::from_millis(20));
            a.write_all(b"lo").unwrap();
            a
        });

        let mut buf = [0u8; 5];
        assert_eq!(recv_all(&b, &mut buf), Ok(5));
        assert_eq!(&buf, b"hello");
        drop(writer.join().unwrap());
    }

    #[test]
    fn test_peer_close_mid_transfer() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut a = a;
        a.write_all(&pattern(100)).unwrap();
        a.shutdown(Shutdown::Write).unwrap();

        let mut buf = vec![0u8; 3000];
        assert_eq!(
            recv_all(&b, &mut buf),
            Err(TransferError::PeerClosed {
                transferred: 100,
                expected: 3000
            })
        );
    }

    #[test]
    fn test_send_to_closed_peer() {
        let (a, b) = UnixStream::pair().unwrap();
        drop(b);
        let err = send_all(&a, b"ping").unwrap_err();
        assert!(err.is_peer_closed(), "{err:?}");
    }

    #[test]
    fn test_recv_some() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut a = a;
        a.write_all(b"abc").unwrap();

        let mut buf = [0u8; 64];
        assert_eq!(recv_some(&b, &mut buf), Ok(3));
        assert_eq!(&buf[..3], b"abc");

        drop(a);
        assert!(recv_some(&b, &mut buf).unwrap_err().is_peer_closed());
    }

    #[test]
    fn test_empty_buffer() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert_eq!(send_all(&a, &[]), Err(TransferError::Empty));
        assert_eq!(recv_all(&a, &mut []), Err(TransferError::Empty));
    }

    #[test]
    fn test_wait_ready_times_out() {
        let (a, _b) = UnixStream::pair().unwrap();
        assert_eq!(
            wait_ready(a.as_raw_fd(), libc::POLLIN, Duration::from_millis(20)),
            Err(TransferError::TimedOut)
        );
    }

    #[test]
    fn test_set_nonblocking_is_idempotent() {
        let (a, _b) = UnixStream::pair().unwrap();
        set_nonblocking(&a).unwrap();
        set_nonblocking(&a).unwrap();
        let flags = OFlag::from_bits_truncate(fcntl(a.as_raw_fd(), FcntlArg::F_GETFL).unwrap());
        assert!(flags.contains(OFlag::O_NONBLOCK));
    }
}
