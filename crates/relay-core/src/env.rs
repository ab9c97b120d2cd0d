//! Environment variable utilities
//!
//! Typed lookups with defaults, used by `ServerConfig::from_env()` to layer
//! `RELAY_*` overrides on top of the compiled-in defaults.
//!
//! # Usage
//!
//! ```ignore
//! use relay_core::env::{env_get, env_get_opt, env_get_str};
//!
//! let threads: usize = env_get("RELAY_THREADS", 4);
//! let timeout: i32 = env_get("RELAY_TIMEOUT_MS", 100);
//! let port = env_get_str("RELAY_PORT", "31337");
//! let queue: Option<usize> = env_get_opt("RELAY_QUEUE_CAPACITY");
//! ```

use std::str::FromStr;

/// Parse `key` as `T`, falling back to `default` when unset or unparsable.
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// `Some(T)` only when the variable is set and parses.
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Raw string lookup with a default.
#[inline]
pub fn env_get_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
