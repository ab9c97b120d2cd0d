//! Library defaults and accepted ranges for `ServerConfig`

/// Listening port (decimal string)
pub const PORT: &str = "31337";
/// `listen(2)` backlog
pub const BACKLOG: i32 = 10;
/// Poll timeout in milliseconds
pub const TIMEOUT_MS: i32 = 100;
/// Worker threads
pub const NUM_THREADS: usize = 4;
/// Soft cap on simultaneously connected clients
pub const MAX_CLIENTS: usize = 10;
/// Pending request tasks before the dispatcher blocks
pub const QUEUE_CAPACITY: usize = 64;

// Ranges enforced by `ServerConfig::validate`

/// Ports up to this value are reserved for well-known services.
pub const WELL_KNOWN_PORT_MAX: u16 = 1023;
pub const MIN_BACKLOG: i32 = 1;
pub const MAX_BACKLOG: i32 = 128;
/// Block in poll until something happens
pub const TIMEOUT_INFINITE: i32 = -1;
pub const MIN_TIMEOUT_MS: i32 = 10;
pub const MAX_TIMEOUT_MS: i32 = 300_000;
pub const MIN_THREADS: usize = 2;
pub const MAX_THREADS: usize = 24;
pub const MIN_CLIENTS: usize = 1;
pub const MAX_CLIENTS_LIMIT: usize = 100;
