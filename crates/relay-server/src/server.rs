//! Connection dispatcher
//!
//! The thread calling [`Server::run`] is the dispatcher. Each iteration:
//!
//! 1. Leave the loop if shutdown was requested
//! 2. Snapshot the registry and `poll` it (plus the waker) with the
//!    configured timeout; `EINTR` restarts the iteration
//! 3. Error/hangup on a client: take it out of the registry and close it.
//!    Error on the listener is fatal
//! 4. Listener readable: accept one client, make it non-blocking, enforce
//!    `max_clients`, register it
//! 5. Client readable: take it out of the registry and submit a task that
//!    owns it to the worker pool
//!
//! The worker runs the request handler and then either drops the
//! connection or puts it back in the registry, which wakes the dispatcher.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, error, info, warn};
use relay_core::{ShutdownContext, Task};

use crate::config::ServerConfig;
use crate::connection::{Connection, Outcome, RequestHandler};
use crate::error::{Result, ServerError};
use crate::io::set_nonblocking;
use crate::net::bind_listener;
use crate::pool::WorkerPool;
use crate::registry::{SocketRegistry, DEFAULT_FD_CAPACITY};
use crate::waker::Waker;

const POLL_ERROR_EVENTS: libc::c_short = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;

pub struct Server {
    config: ServerConfig,
    handler: Arc<dyn RequestHandler>,
    listener: TcpListener,
    registry: Arc<SocketRegistry>,
    waker: Arc<Waker>,
    pool: WorkerPool,
    shutdown: Arc<ShutdownContext>,
    clients: Arc<AtomicUsize>,
}

impl Server {
    /// Validate `config`, open the listener and start the worker pool.
    ///
    /// Nothing is served until [`run`](Self::run) is called, but the port
    /// is already accepting connections into the backlog.
    pub fn bind(config: ServerConfig, shutdown: Arc<ShutdownContext>) -> Result<Self> {
        config.validate()?;
        let port = config.port_number()?;
        let handler = config
            .client_request
            .clone()
            .ok_or(relay_core::ConfigError::MissingHandler)?;

        // Spawn the pool last: dropping it requests shutdown on `shutdown`.
        let listener = bind_listener(port, config.backlog_size)?;
        let waker = Arc::new(Waker::new().map_err(ServerError::Waker)?);
        let pool = WorkerPool::new(config.num_threads, config.queue_capacity, Arc::clone(&shutdown))?;
        let registry = Arc::new(
            SocketRegistry::new(listener.as_raw_fd(), DEFAULT_FD_CAPACITY).with_waker(Arc::clone(&waker)),
        );

        let weak = Arc::downgrade(&waker);
        shutdown.on_shutdown(move || {
            if let Some(waker) = weak.upgrade() {
                waker.wake();
            }
        });

        info!(
            "listening on port {} ({} workers, max {} clients)",
            port, config.num_threads, config.max_clients
        );
        Ok(Self {
            config,
            handler,
            listener,
            registry,
            waker,
            pool,
            shutdown,
            clients: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<SocketRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn shutdown_context(&self) -> &Arc<ShutdownContext> {
        &self.shutdown
    }

    /// Connected clients, idle or being served.
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::Acquire)
    }

    /// Serve until shutdown, then tear down.
    ///
    /// Returns `Ok` after a requested shutdown. A poll failure or a
    /// listener fault is returned after the same teardown.
    pub fn run(self) -> Result<()> {
        let served = self.event_loop();
        if let Err(e) = &served {
            error!("dispatcher stopped: {}", e);
        }
        let torn_down = self.teardown();
        served.and(torn_down)
    }

    fn event_loop(&self) -> Result<()> {
        let listener_fd = self.listener.as_raw_fd();
        let timeout = self.config.timeout_ms;

        loop {
            if self.shutdown.is_shutdown() {
                info!("shutdown requested, leaving event loop");
                return Ok(());
            }

            let mut fds = self.registry.snapshot();
            fds.push(libc::pollfd {
                fd: self.waker.fd(),
                events: libc::POLLIN,
                revents: 0,
            });

            let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout) };
            if ready < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(ServerError::Poll(err));
            }
            if ready == 0 {
                continue;
            }

            for pfd in fds.iter().filter(|p| p.revents != 0) {
                if pfd.fd == self.waker.fd() {
                    self.waker.drain();
                } else if pfd.fd == listener_fd {
                    if pfd.revents & POLL_ERROR_EVENTS != 0 {
                        return Err(ServerError::ListenerFault);
                    }
                    self.accept_client();
                } else if pfd.revents & POLL_ERROR_EVENTS != 0 {
                    self.drop_faulted(pfd.fd, pfd.revents);
                } else if pfd.revents & libc::POLLIN != 0 {
                    self.dispatch(pfd.fd);
                }
            }
        }
    }

    fn accept_client(&self) {
        let (stream, peer) = match self.listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!("accept failed: {}", e);
                return;
            }
        };

        let connected = self.client_count();
        if connected >= self.config.max_clients {
            warn!(
                "rejecting {}: {} clients connected (max {})",
                peer, connected, self.config.max_clients
            );
            return;
        }
        if let Err(e) = set_nonblocking(&stream) {
            warn!("cannot make {} non-blocking: {}", peer, e);
            return;
        }

        let conn = Connection::new(stream, Some(peer)).tracked(&self.clients);
        let fd = conn.fd();
        self.registry.add(conn);
        info!("new connection from [{}] on socket [{}]", peer, fd);
    }

    fn drop_faulted(&self, fd: RawFd, revents: libc::c_short) {
        if let Some(conn) = self.registry.take(fd) {
            let what = if revents & libc::POLLHUP != 0 { "hangup" } else { "error" };
            info!("closing socket [{}] ({}) after {}", fd, peer_label(&conn), what);
        }
    }

    fn dispatch(&self, fd: RawFd) {
        let Some(conn) = self.registry.take(fd) else {
            return;
        };
        debug!("dispatching socket [{}]", fd);

        let task = request_task(conn, Arc::clone(&self.handler), Arc::clone(&self.registry));
        if self.pool.submit(task).is_err() {
            // The rejected task drops here and closes the connection.
            warn!("shutting down, dropped request on socket [{}]", fd);
        }
    }

    fn teardown(&self) -> Result<()> {
        // Join workers first: a finishing task may still re-register its
        // connection.
        let joined = self.pool.shutdown();
        let discarded = self.pool.queue().clear();
        let closed = self.registry.close_all();
        info!(
            "server stopped: closed {} idle connections, discarded {} queued requests",
            closed, discarded
        );
        joined
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("listener", &self.listener)
            .field("registry", &self.registry)
            .field("pool", &self.pool)
            .finish()
    }
}

fn peer_label(conn: &Connection) -> String {
    conn.peer().map_or_else(|| "unknown peer".to_string(), |p| p.to_string())
}

/// Task owning `conn` for one request.
///
/// If the task is discarded unexecuted, dropping it closes the connection.
fn request_task(
    mut conn: Connection,
    handler: Arc<dyn RequestHandler>,
    registry: Arc<SocketRegistry>,
) -> Task {
    Task::new(move || {
        let fd = conn.fd();
        match handler.handle(&mut conn) {
            Outcome::Keep => {
                registry.add(conn);
            }
            Outcome::Close => {
                info!("closing socket [{}] ({})", fd, peer_label(&conn));
                drop(conn);
            }
        }
    })
}

/// Bind, serve until `shutdown` is requested, tear down.
///
/// Install a [`ShutdownCoordinator`](crate::ShutdownCoordinator) on the
/// same context first so that signals can stop the server.
pub fn start_server(config: ServerConfig, shutdown: Arc<ShutdownContext>) -> Result<()> {
    config.print();
    Server::bind(config, shutdown)?.run()
}

// ============================================================================
// Tests
// ============================================================================
