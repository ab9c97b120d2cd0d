//! Error types shared across the relay crates

use std::fmt;

use thiserror::Error;

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field is outside its accepted range.
    #[error("invalid config: {0}")]
    InvalidValue(&'static str),

    /// No request handler was supplied.
    #[error("invalid config: no client request handler")]
    MissingHandler,
}

/// Returned by [`BlockingQueue::enqueue`](crate::BlockingQueue::enqueue)
/// when shutdown was observed before the item could be stored.
///
/// The item is handed back so the caller decides how to dispose of it.
#[derive(Clone, PartialEq, Eq, Error)]
#[error("queue is shutting down")]
pub struct Rejected<T>(pub T);

impl<T> Rejected<T> {
    /// Recover the rejected item.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rejected(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = ConfigError::InvalidValue("num_threads must be >= 2");
        assert_eq!(e.to_string(), "invalid config: num_threads must be >= 2");

        let e = ConfigError::MissingHandler;
        assert_eq!(e.to_string(), "invalid config: no client request handler");
    }

    #[test]
    fn test_rejected_returns_item() {
        let r = Rejected(vec![1u8, 2, 3]);
        assert_eq!(format!("{:?}", r), "Rejected(..)");
        assert_eq!(r.into_inner(), vec![1, 2, 3]);
    }
}
