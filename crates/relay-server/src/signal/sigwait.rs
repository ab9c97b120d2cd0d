//! Dedicated signal thread
//!
//! `install` blocks SIGINT, SIGTERM and SIGHUP in the calling thread and
//! spawns `relay-signal`, which receives them with `sigwait`. Call it on
//! the main thread before any other thread is spawned: threads inherit
//! the mask, so the signals can only be consumed by `relay-signal`.
//!
//! Running outside signal context, the thread can do a full
//! `request_shutdown()` (state + condvar broadcast + wake hooks).

use std::os::unix::thread::JoinHandleExt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::sys::pthread::pthread_kill;
use nix::sys::signal::{SigSet, Signal};
use relay_core::ShutdownContext;

use super::{shutdown_sigset, ShutdownCoordinator};
use crate::error::{Result, ServerError};

pub struct SignalThreadCoordinator {
    ctx: Arc<ShutdownContext>,
    handle: Option<JoinHandle<()>>,
}

impl ShutdownCoordinator for SignalThreadCoordinator {
    fn install(ctx: Arc<ShutdownContext>) -> Result<Self> {
        let set = shutdown_sigset();
        set.thread_block()?;

        let thread_ctx = Arc::clone(&ctx);
        let handle = thread::Builder::new()
            .name("relay-signal".into())
            .spawn(move || wait_loop(set, thread_ctx))
            .map_err(ServerError::Spawn)?;

        debug!("signal thread started");
        Ok(Self {
            ctx,
            handle: Some(handle),
        })
    }

    fn context(&self) -> &Arc<ShutdownContext> {
        &self.ctx
    }

    fn strategy(&self) -> &'static str {
        "signal-thread"
    }
}

fn wait_loop(set: SigSet, ctx: Arc<ShutdownContext>) {
    loop {
        match set.wait() {
            Ok(Signal::SIGHUP) => info!("SIGHUP received, reload ignored (no-op)"),
            Ok(sig) => {
                info!("{} received, initiating graceful shutdown", sig);
                ctx.request_shutdown();
                return;
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                error!("sigwait failed: {}", e);
                return;
            }
        }
    }
}

impl Drop for SignalThreadCoordinator {
    /// Stops the signal thread with a thread-directed SIGTERM if it is
    /// still waiting, which also requests shutdown on the context.
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if !handle.is_finished() {
            if let Err(e) = pthread_kill(handle.as_pthread_t(), Signal::SIGTERM) {
                // Joining would hang; leave the thread detached.
                warn!("cannot stop signal thread: {}", e);
                return;
            }
        }
        if handle.join().is_err() {
            error!("relay-signal thread panicked");
        }
    }
}

impl std::fmt::Debug for SignalThreadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalThreadCoordinator")
            .field("ctx", &self.ctx)
            .field("running", &self.handle.as_ref().map(|h| !h.is_finished()))
            .finish()
    }
}
