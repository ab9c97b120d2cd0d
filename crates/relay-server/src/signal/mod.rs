//! Shutdown signal delivery
//!
//! SIGINT and SIGTERM request a graceful shutdown; SIGHUP is acknowledged
//! and otherwise ignored. Two strategies turn those signals into a
//! [`ShutdownContext`] transition:
//!
//! - [`HandlerCoordinator`] installs an async-signal-safe handler that only
//!   stores the atomic state and writes a fixed notice to stdout
//! - [`SignalThreadCoordinator`] blocks the signals and receives them
//!   synchronously on a dedicated `relay-signal` thread
//!
//! The `signal-handler` cargo feature selects which one is exported as
//! [`DefaultCoordinator`]; the dedicated thread is the default.

use std::sync::Arc;

use nix::sys::signal::{SigSet, Signal};
use relay_core::ShutdownContext;

use crate::error::Result;

mod handler;
mod sigwait;

pub use handler::HandlerCoordinator;
pub use sigwait::SignalThreadCoordinator;

cfg_if::cfg_if! {
    if #[cfg(feature = "signal-handler")] {
        pub type DefaultCoordinator = HandlerCoordinator;
    } else {
        pub type DefaultCoordinator = SignalThreadCoordinator;
    }
}

/// Owns the route from process signals to a shutdown context.
///
/// Dropping a coordinator uninstalls it.
pub trait ShutdownCoordinator: Sized {
    /// Start delivering shutdown signals to `ctx`.
    fn install(ctx: Arc<ShutdownContext>) -> Result<Self>;

    fn context(&self) -> &Arc<ShutdownContext>;

    /// Short name for logs.
    fn strategy(&self) -> &'static str;
}

/// Signals the coordinators listen for.
pub const SHUTDOWN_SIGNALS: [Signal; 3] = [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP];

pub(crate) const SIGINT_NOTICE: &[u8] = b"\n[Signal] SIGINT received. Initiating graceful shutdown...\n";
pub(crate) const SIGTERM_NOTICE: &[u8] = b"\n[Signal] SIGTERM received. Initiating graceful shutdown...\n";
pub(crate) const SIGHUP_NOTICE: &[u8] = b"\n[Signal] SIGHUP received. Reload signal ignored (no-op).\n";

pub fn shutdown_sigset() -> SigSet {
    let mut set = SigSet::empty();
    for sig in SHUTDOWN_SIGNALS {
        set.add(sig);
    }
    set
}

/// Block the shutdown signals on the calling thread.
///
/// Threads spawned afterwards inherit the mask.
pub fn block_shutdown_signals() -> Result<()> {
    shutdown_sigset().thread_block()?;
    Ok(())
}

/// Write `msg` to stdout with a single `write(2)`.
pub(crate) fn write_notice(msg: &[u8]) {
    unsafe {
        libc::write(libc::STDOUT_FILENO, msg.as_ptr().cast(), msg.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigset_contents() {
        let set = shutdown_sigset();
        for sig in SHUTDOWN_SIGNALS {
            assert!(set.contains(sig));
        }
        assert!(!set.contains(Signal::SIGUSR1));
    }

    #[test]
    fn test_notices() {
        for notice in [SIGINT_NOTICE, SIGTERM_NOTICE, SIGHUP_NOTICE] {
            let text = std::str::from_utf8(notice).unwrap();
            assert!(text.starts_with("\n[Signal] SIG"));
            assert!(text.ends_with('\n'));
        }
        assert!(std::str::from_utf8(SIGHUP_NOTICE).unwrap().contains("ignored"));
    }

    #[cfg(not(feature = "signal-handler"))]
    #[test]
    fn test_default_is_signal_thread() {
        assert_eq!(
            std::any::type_name::<DefaultCoordinator>(),
            std::any::type_name::<SignalThreadCoordinator>()
        );
    }
}
