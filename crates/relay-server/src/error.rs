//! Server error types

use std::io;

use nix::errno::Errno;
use relay_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("worker pool needs at least 2 threads, got {0}")]
    InvalidThreadCount(usize),

    #[error("cannot create dispatcher waker: {0}")]
    Waker(#[source] io::Error),

    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("listening socket reported an error condition")]
    ListenerFault,

    #[error("registry index {0} is out of range")]
    InvalidIndex(usize),

    #[error("registry slot 0 holds the listening socket")]
    ListenerSlot,

    #[error("signal setup failed: {0}")]
    Signal(#[from] Errno),

    #[error("{0} thread panicked")]
    WorkerPanicked(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
