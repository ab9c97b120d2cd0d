//! Handler-based delivery
//!
//! The handler is restricted to async-signal-safe work: one atomic store
//! into the shutdown context and one `write(2)` of a fixed notice. It
//! cannot broadcast the context's condvar; threads blocked in `poll` see
//! `EINTR`, and everything else re-checks the state on its own schedule.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use relay_core::ShutdownContext;

use super::{write_notice, ShutdownCoordinator, SHUTDOWN_SIGNALS, SIGHUP_NOTICE, SIGINT_NOTICE, SIGTERM_NOTICE};
use crate::error::{Result, ServerError};

/// Context the handler marks. Null while no coordinator is installed.
static TARGET: AtomicPtr<ShutdownContext> = AtomicPtr::new(ptr::null_mut());

extern "C" fn on_signal(signo: libc::c_int) {
    let msg = match signo {
        libc::SIGINT => SIGINT_NOTICE,
        libc::SIGTERM => SIGTERM_NOTICE,
        libc::SIGHUP => {
            write_notice(SIGHUP_NOTICE);
            return;
        }
        _ => return,
    };
    let ctx = TARGET.load(Ordering::Acquire);
    if !ctx.is_null() {
        // SAFETY: the installed coordinator keeps the Arc alive until it
        // has restored the previous handlers.
        unsafe { (*ctx).mark_shutdown() };
    }
    write_notice(msg);
}

pub struct HandlerCoordinator {
    ctx: Arc<ShutdownContext>,
    previous: Vec<(Signal, SigAction)>,
}

impl ShutdownCoordinator for HandlerCoordinator {
    /// Install the handler for SIGINT, SIGTERM and SIGHUP.
    ///
    /// Only one handler coordinator can be installed at a time; a second
    /// install fails with `EBUSY`.
    fn install(ctx: Arc<ShutdownContext>) -> Result<Self> {
        let target = Arc::as_ptr(&ctx) as *mut ShutdownContext;
        if TARGET
            .compare_exchange(ptr::null_mut(), target, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ServerError::Signal(Errno::EBUSY));
        }

        // No SA_RESTART: a blocked poll must return EINTR.
        let action = SigAction::new(SigHandler::Handler(on_signal), SaFlags::empty(), SigSet::empty());
        let mut coordinator = Self {
            ctx,
            previous: Vec::with_capacity(SHUTDOWN_SIGNALS.len()),
        };
        for sig in SHUTDOWN_SIGNALS {
            // On failure `coordinator` drops here and restores what was
            // already replaced.
            let old = unsafe { sigaction(sig, &action) }?;
            coordinator.previous.push((sig, old));
        }
        debug!("signal handlers installed");
        Ok(coordinator)
    }

    fn context(&self) -> &Arc<ShutdownContext> {
        &self.ctx
    }

    fn strategy(&self) -> &'static str {
        "signal-handler"
    }
}

impl Drop for HandlerCoordinator {
    fn drop(&mut self) {
        for (sig, old) in self.previous.drain(..).rev() {
            if let Err(e) = unsafe { sigaction(sig, &old) } {
                warn!("cannot restore {} disposition: {}", sig, e);
            }
        }
        let ours = Arc::as_ptr(&self.ctx) as *mut ShutdownContext;
        let _ = TARGET.compare_exchange(ours, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire);
    }
}

impl std::fmt::Debug for HandlerCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerCoordinator")
            .field("ctx", &self.ctx)
            .field("installed", &self.previous.len())
            .finish()
    }
}
