//! Worker thread lifecycle.
//!
//! Every acquisition source runs on its own thread owned by a `Worker`
//! handle. The handle replaces the ad hoc `is_running` booleans of a
//! typical threaded pipeline with one explicit stop/join protocol:
//! `stop()` flips the shared flag, `join()` waits a bounded time and
//! abandons a straggler with a warning instead of hanging shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Shared cancellation flag checked by worker loops each iteration.
#[derive(Debug, Clone, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Handle to a spawned worker thread.
pub struct Worker {
    name: String,
    run: RunFlag,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn a named worker. The closure receives the run flag and must
    /// return promptly once the flag clears.
    pub fn spawn<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(RunFlag) + Send + 'static,
    {
        let run = RunFlag::new();
        let thread_flag = run.clone();
        let thread_name = name.to_string();
        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || body(thread_flag))
            .unwrap_or_else(|e| panic!("failed to spawn worker '{}': {}", thread_name, e));

        debug!("Worker '{}' started", name);
        Self {
            name: name.to_string(),
            run,
            handle: Some(handle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn run_flag(&self) -> RunFlag {
        self.run.clone()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_set()
    }

    /// Request the worker to stop without waiting for it.
    pub fn stop(&self) {
        self.run.clear();
    }

    /// Stop and join with a bounded timeout. A thread that does not stop
    /// in time is logged and abandoned; shutdown proceeds regardless.
    pub fn join(&mut self, timeout: Duration) {
        self.run.clear();
        let Some(handle) = self.handle.take() else {
            return;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("Worker '{}' did not stop within {:?}, abandoning", self.name, timeout);
                return;
            }
            thread::sleep(Duration::from_millis(10));
        }

        if handle.join().is_err() {
            warn!("Worker '{}' panicked", self.name);
        } else {
            debug!("Worker '{}' joined", self.name);
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.join(Duration::from_secs(1));
        }
    }
}
