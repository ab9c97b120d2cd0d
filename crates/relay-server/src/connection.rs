//! Client connections and the request handler seam
//!
//! A [`Connection`] is the only owner of its socket. At any instant it
//! lives either in the [`SocketRegistry`](crate::SocketRegistry) (idle,
//! watched by the dispatcher) or inside one in-flight task (being served
//! by a worker). Moving the value is the ownership transfer; dropping it
//! closes the socket.

use std::net::{SocketAddr, TcpStream};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::io::{self, TransferError};

/// What the worker does with the connection after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Give the connection back to the registry for the next request.
    Keep,
    /// Close the connection.
    Close,
}

/// Serves one readiness event on a client connection.
///
/// Runs on a worker thread. The connection is non-blocking; the
/// [`Connection`] I/O helpers wait for readiness where needed.
pub trait RequestHandler: Send + Sync + 'static {
    fn handle(&self, conn: &mut Connection) -> Outcome;
}

impl<F> RequestHandler for F
where
    F: Fn(&mut Connection) -> Outcome + Send + Sync + 'static,
{
    fn handle(&self, conn: &mut Connection) -> Outcome {
        self(conn)
    }
}

/// Decrements the server's connected-client count when the connection
/// is finally dropped, wherever that happens.
#[derive(Debug)]
struct ClientSlot(Arc<AtomicUsize>);

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: Option<SocketAddr>,
    slot: Option<ClientSlot>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: Option<SocketAddr>) -> Self {
        Self {
            stream,
            peer,
            slot: None,
        }
    }

    /// Count this connection in `clients` until it is dropped.
    pub(crate) fn tracked(mut self, clients: &Arc<AtomicUsize>) -> Self {
        clients.fetch_add(1, Ordering::AcqRel);
        self.slot = Some(ClientSlot(Arc::clone(clients)));
        self
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn send_all(&self, buf: &[u8]) -> Result<usize, TransferError> {
        io::send_all(&self.stream, buf)
    }

    pub fn recv_all(&self, buf: &mut [u8]) -> Result<usize, TransferError> {
        io::recv_all(&self.stream, buf)
    }

    pub fn recv_some(&self, buf: &mut [u8]) -> Result<usize, TransferError> {
        io::recv_some(&self.stream, buf)
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.stream.as_fd()
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.fd()
    }
}
