//! Fixed-size worker pool
//!
//! Design:
//! - N >= 2 named threads (`relay-worker-{i}`) consume one `BlockingQueue<Task>`
//! - The queue and the pool share the server's `ShutdownContext`
//! - A worker exits when it observes shutdown or the queue returns `None`
//! - `shutdown()` sets the state, broadcasts on the queue and joins; it
//!   runs at most once, later calls are no-ops
//! - A shutdown requested by anyone else also broadcasts on the queue, so
//!   a producer parked on a full queue is released
//! - Dropping the pool shuts it down and discards queued tasks, whose
//!   cleanups then run
//!
//! Workers block SIGINT/SIGTERM/SIGHUP so that with the handler-based
//! coordinator those signals land on the dispatcher thread and interrupt
//! its `poll`.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};
use relay_core::{BlockingQueue, Rejected, ShutdownContext, Task};

use crate::config::defaults::MIN_THREADS;
use crate::error::{Result, ServerError};
use crate::signal;

type Body = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    queue: Arc<BlockingQueue<Task>>,
    shutdown: Arc<ShutdownContext>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    thread_count: usize,
}

impl WorkerPool {
    /// Spawn `thread_count` workers over a queue of `queue_capacity`
    /// tasks (0 = unbounded).
    ///
    /// If a thread fails to spawn, the ones already running are shut down
    /// and joined before the error is returned.
    pub fn new(
        thread_count: usize,
        queue_capacity: usize,
        shutdown: Arc<ShutdownContext>,
    ) -> Result<Self> {
        Self::with_spawner(thread_count, queue_capacity, shutdown, |name, body| {
            thread::Builder::new().name(name).spawn(body)
        })
    }

    fn with_spawner<S>(
        thread_count: usize,
        queue_capacity: usize,
        shutdown: Arc<ShutdownContext>,
        mut spawn: S,
    ) -> Result<Self>
    where
        S: FnMut(String, Body) -> io::Result<JoinHandle<()>>,
    {
        if thread_count < MIN_THREADS {
            return Err(ServerError::InvalidThreadCount(thread_count));
        }

        let queue = Arc::new(BlockingQueue::new(queue_capacity, Arc::clone(&shutdown)));
        let weak: Weak<BlockingQueue<Task>> = Arc::downgrade(&queue);
        shutdown.on_shutdown(move || {
            if let Some(queue) = weak.upgrade() {
                queue.wake_all();
            }
        });

        let pool = Self {
            queue,
            shutdown,
            handles: Mutex::new(Vec::with_capacity(thread_count)),
            thread_count,
        };

        for id in 0..thread_count {
            let queue = Arc::clone(&pool.queue);
            let shutdown = Arc::clone(&pool.shutdown);
            let body: Body = Box::new(move || worker_loop(id, queue, shutdown));

            match spawn(format!("relay-worker-{}", id), body) {
                Ok(handle) => pool.lock_handles().push(handle),
                Err(e) => {
                    error!("failed to spawn worker {}: {}", id, e);
                    if let Err(join_err) = pool.shutdown() {
                        warn!("while unwinding partial pool: {}", join_err);
                    }
                    return Err(ServerError::Spawn(e));
                }
            }
        }

        debug!("worker pool started with {} threads", thread_count);
        Ok(pool)
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue `task` for the next free worker.
    ///
    /// Blocks while the queue is full. After shutdown the task is handed
    /// back instead of being queued.
    pub fn submit(&self, task: Task) -> std::result::Result<(), Rejected<Task>> {
        if self.shutdown.is_shutdown() {
            return Err(Rejected(task));
        }
        self.queue.enqueue(task)
    }

    /// Stop every worker and wait for it to exit.
    ///
    /// A task already running is finished first; queued tasks are not
    /// started once shutdown is observed. Fails if a worker panicked
    /// outside a task.
    pub fn shutdown(&self) -> Result<()> {
        let handles: Vec<JoinHandle<()>> = self.lock_handles().drain(..).collect();
        if handles.is_empty() {
            return Ok(());
        }

        self.shutdown.request_shutdown();
        self.queue.wake_all();

        let mut result = Ok(());
        for handle in handles {
            let name = handle.thread().name().unwrap_or("relay-worker").to_string();
            if handle.join().is_err() {
                error!("{} panicked", name);
                result = Err(ServerError::WorkerPanicked(name));
            }
        }
        debug!("worker pool joined");
        result
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count
    }

    /// Tasks queued but not yet picked up.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn queue(&self) -> &Arc<BlockingQueue<Task>> {
        &self.queue
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("worker pool teardown: {}", e);
        }
        let dropped = self.queue.clear();
        if dropped > 0 {
            debug!("discarded {} queued tasks", dropped);
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("thread_count", &self.thread_count)
            .field("pending", &self.pending())
            .finish()
    }
}

fn worker_loop(id: usize, queue: Arc<BlockingQueue<Task>>, shutdown: Arc<ShutdownContext>) {
    if let Err(e) = signal::block_shutdown_signals() {
        warn!("worker {}: cannot mask shutdown signals: {}", id, e);
    }
    debug!("worker {} started", id);

    while !shutdown.is_shutdown() {
        let Some(task) = queue.dequeue() else {
            break;
        };
        // A panicking handler drops its connection during unwind; the
        // worker itself stays in the pool.
        if panic::catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
            error!("worker {}: task panicked", id);
        }
    }

    debug!("worker {} exiting", id);
}

// ============================================================================
// Tests
// ============================================================================
