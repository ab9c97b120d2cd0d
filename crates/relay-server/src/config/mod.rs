//! Server configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env()` only)
//! 3. Library defaults (`defaults.rs`)
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_server::config::ServerConfig;
//!
//! let config = ServerConfig::from_env()
//!     .port("4000")
//!     .num_threads(8)
//!     .handler(my_handler);
//! config.validate()?;
//! ```

pub mod defaults;

use std::fmt;
use std::sync::Arc;

use log::info;
use relay_core::env::{env_get, env_get_str};
use relay_core::ConfigError;

use crate::connection::RequestHandler;

/// Server configuration with builder pattern.
///
/// Treated as immutable once handed to [`Server::bind`](crate::Server::bind).
#[derive(Clone)]
pub struct ServerConfig {
    /// Decimal port to listen on
    pub port: String,
    /// `listen(2)` backlog
    pub backlog_size: i32,
    /// Poll timeout in milliseconds, -1 blocks indefinitely
    pub timeout_ms: i32,
    /// Worker threads in the pool
    pub num_threads: usize,
    /// Soft cap on connected clients; extra connections are closed on accept
    pub max_clients: usize,
    /// Bounded task queue size, 0 = unbounded
    pub queue_capacity: usize,
    /// Called by a worker each time a client socket becomes readable
    pub client_request: Option<Arc<dyn RequestHandler>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerConfig {
    /// Library defaults, no env lookup, no handler.
    pub fn new() -> Self {
        Self {
            port: defaults::PORT.to_string(),
            backlog_size: defaults::BACKLOG,
            timeout_ms: defaults::TIMEOUT_MS,
            num_threads: defaults::NUM_THREADS,
            max_clients: defaults::MAX_CLIENTS,
            queue_capacity: defaults::QUEUE_CAPACITY,
            client_request: None,
        }
    }

    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `RELAY_PORT` - Listening port
    /// - `RELAY_BACKLOG` - listen() backlog
    /// - `RELAY_TIMEOUT_MS` - Poll timeout in ms (-1 = infinite)
    /// - `RELAY_THREADS` - Worker threads
    /// - `RELAY_MAX_CLIENTS` - Max connected clients
    /// - `RELAY_QUEUE_CAPACITY` - Task queue size (0 = unbounded)
    ///
    /// Unparsable values fall back to the default; out-of-range values are
    /// kept and rejected later by [`validate`](Self::validate).
    pub fn from_env() -> Self {
        Self {
            port: env_get_str("RELAY_PORT", defaults::PORT).trim().to_string(),
            backlog_size: env_get("RELAY_BACKLOG", defaults::BACKLOG),
            timeout_ms: env_get("RELAY_TIMEOUT_MS", defaults::TIMEOUT_MS),
            num_threads: env_get("RELAY_THREADS", defaults::NUM_THREADS),
            max_clients: env_get("RELAY_MAX_CLIENTS", defaults::MAX_CLIENTS),
            queue_capacity: env_get("RELAY_QUEUE_CAPACITY", defaults::QUEUE_CAPACITY),
            client_request: None,
        }
    }

    // Builder methods

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub fn backlog_size(mut self, n: i32) -> Self {
        self.backlog_size = n;
        self
    }

    pub fn timeout_ms(mut self, ms: i32) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    pub fn max_clients(mut self, n: usize) -> Self {
        self.max_clients = n;
        self
    }

    pub fn queue_capacity(mut self, cap: usize) -> Self {
        self.queue_capacity = cap;
        self
    }

    pub fn handler<H: RequestHandler>(mut self, handler: H) -> Self {
        self.client_request = Some(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.client_request = Some(handler);
        self
    }

    /// Parsed port number.
    pub fn port_number(&self) -> Result<u16, ConfigError> {
        let port: u16 = self
            .port
            .parse()
            .map_err(|_| ConfigError::InvalidValue("port must be a number in 0..=65535"))?;
        if port <= defaults::WELL_KNOWN_PORT_MAX {
            return Err(ConfigError::InvalidValue("port must not be a well-known port (<= 1023)"));
        }
        Ok(port)
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.port_number()?;
        if !(defaults::MIN_BACKLOG..=defaults::MAX_BACKLOG).contains(&self.backlog_size) {
            return Err(ConfigError::InvalidValue("backlog_size must be 1..=128"));
        }
        if self.timeout_ms != defaults::TIMEOUT_INFINITE
            && !(defaults::MIN_TIMEOUT_MS..=defaults::MAX_TIMEOUT_MS).contains(&self.timeout_ms)
        {
            return Err(ConfigError::InvalidValue("timeout_ms must be -1 or 10..=300000"));
        }
        if !(defaults::MIN_THREADS..=defaults::MAX_THREADS).contains(&self.num_threads) {
            return Err(ConfigError::InvalidValue("num_threads must be 2..=24"));
        }
        if !(defaults::MIN_CLIENTS..=defaults::MAX_CLIENTS_LIMIT).contains(&self.max_clients) {
            return Err(ConfigError::InvalidValue("max_clients must be 1..=100"));
        }
        if self.client_request.is_none() {
            return Err(ConfigError::MissingHandler);
        }
        Ok(())
    }

    /// Log the effective configuration.
    pub fn print(&self) {
        info!("Relay server configuration:");
        info!("  port:            {}", self.port);
        info!("  backlog_size:    {}", self.backlog_size);
        info!("  timeout_ms:      {}", self.timeout_ms);
        info!("  num_threads:     {}", self.num_threads);
        info!("  max_clients:     {}", self.max_clients);
        info!("  queue_capacity:  {}", self.queue_capacity);
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("backlog_size", &self.backlog_size)
            .field("timeout_ms", &self.timeout_ms)
            .field("num_threads", &self.num_threads)
            .field("max_clients", &self.max_clients)
            .field("queue_capacity", &self.queue_capacity)
            .field("client_request", &self.client_request.is_some())
            .finish()
    }
}
