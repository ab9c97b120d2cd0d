//! # relay-server
//!
//! Poll-driven TCP server substrate.
//!
//! The main thread runs the dispatcher: it polls every registered socket,
//! accepts new clients and hands ready ones to a fixed worker pool through
//! a bounded blocking queue. A worker runs the user's [`RequestHandler`]
//! and then either closes the connection or gives it back to the registry.
//!
//! ## Modules
//!
//! - `config` - `ServerConfig` builder with env overrides and validation
//! - `connection` - Owned client socket + request handler trait
//! - `io` - Chunked `send_all`/`recv_all` helpers
//! - `registry` - Growable set of watched descriptors
//! - `pool` - Fixed worker pool
//! - `server` - Dispatcher loop and `start_server`
//! - `signal` - Shutdown coordinators (signal handler or signal thread)
//! - `net` - Listening socket setup
//! - `waker` - eventfd used to interrupt the dispatcher's poll
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relay_core::ShutdownContext;
//! use relay_server::{start_server, DefaultCoordinator, Outcome, ServerConfig, ShutdownCoordinator};
//!
//! let shutdown = Arc::new(ShutdownContext::new());
//! let _signals = DefaultCoordinator::install(Arc::clone(&shutdown))?;
//! let config = ServerConfig::from_env().handler(|conn: &mut relay_server::Connection| {
//!     let mut byte = [0u8; 1];
//!     match conn.recv_all(&mut byte).and_then(|_| conn.send_all(&byte)) {
//!         Ok(_) => Outcome::Keep,
//!         Err(_) => Outcome::Close,
//!     }
//! });
//! start_server(config, shutdown)?;
//! ```

cfg_if::cfg_if! {
    if #[cfg(not(target_os = "linux"))] {
        compile_error!("relay-server currently supports Linux only (poll + eventfd)");
    }
}

pub mod config;
pub mod connection;
pub mod error;
pub mod io;
pub mod net;
pub mod pool;
pub mod registry;
pub mod server;
pub mod signal;
pub mod waker;

pub use config::ServerConfig;
pub use connection::{Connection, Outcome, RequestHandler};
pub use error::{Result, ServerError};
pub use io::{recv_all, recv_some, send_all, TransferError, MAX_CHUNK};
pub use pool::WorkerPool;
pub use registry::{SocketRegistry, DEFAULT_FD_CAPACITY};
pub use server::{start_server, Server};
pub use signal::{DefaultCoordinator, HandlerCoordinator, ShutdownCoordinator, SignalThreadCoordinator};
