//! Unit of work executed by the worker pool.
//!
//! A `Task` owns everything it needs: the job closure captures its own
//! argument (for the server, the client connection plus the handler), and
//! an optional cleanup closure releases whatever the job did not consume.
//!
//! The cleanup runs exactly once: right after the job when the task is
//! executed, or on drop when the task is discarded unexecuted (queue
//! drain during shutdown).

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Task {
    job: Option<Job>,
    cleanup: Option<Job>,
}

impl Task {
    pub fn new<F>(job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            job: Some(Box::new(job)),
            cleanup: None,
        }
    }

    /// Attach a cleanup closure.
    pub fn with_cleanup<C>(mut self, cleanup: C) -> Self
    where
        C: FnOnce() + Send + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    /// Execute the job, then the cleanup.
    pub fn run(mut self) {
        if let Some(job) = self.job.take() {
            job();
        }
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        // Dropping `job` releases its captures; the cleanup still runs.
        self.job = None;
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("pending", &self.job.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_run_then_cleanup() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (Arc::clone(&log), Arc::clone(&log));

        Task::new(move || l1.lock().unwrap().push("job"))
            .with_cleanup(move || l2.lock().unwrap().push("cleanup"))
            .run();

        assert_eq!(*log.lock().unwrap(), vec!["job", "cleanup"]);
    }

    #[test]
    fn test_cleanup_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);

        Task::new(|| {})
            .with_cleanup(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .run();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_task_skips_job_runs_cleanup() {
        let ran = Arc::new(AtomicUsize::new(0));
        let cleaned = Arc::new(AtomicUsize::new(0));
        let (r, c) = (Arc::clone(&ran), Arc::clone(&cleaned));

        let task = Task::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .with_cleanup(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        drop(task);

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_captures() {
        let owned = Arc::new(());
        let captured = Arc::clone(&owned);
        let task = Task::new(move || drop(captured));
        assert_eq!(Arc::strong_count(&owned), 2);
        drop(task);
        assert_eq!(Arc::strong_count(&owned), 1);
    }
}
