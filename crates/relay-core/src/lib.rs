//! # relay-core
//!
//! Platform-agnostic building blocks for the relay TCP server.
//!
//! Nothing in this crate touches sockets or signals. The unix-specific
//! pieces (descriptor registry, poll loop, signal delivery) live in
//! `relay-server` and are built on top of these types.
//!
//! ## Modules
//!
//! - `queue` - Bounded/unbounded blocking FIFO (mutex + two condvars)
//! - `task` - Boxed job + cleanup executed by the worker pool
//! - `shutdown` - Process-wide shutdown state shared by every component
//! - `error` - Error types
//! - `env` - Environment variable utilities

pub mod queue;
pub mod task;
pub mod shutdown;
pub mod error;
pub mod env;

// Re-exports for convenience
pub use queue::BlockingQueue;
pub use task::Task;
pub use shutdown::{ShutdownContext, ShutdownState};
pub use error::{ConfigError, Rejected};
pub use env::{env_get, env_get_opt, env_get_str};

/// Queue capacity meaning "no upper bound".
pub const QUEUE_UNBOUNDED: usize = 0;
