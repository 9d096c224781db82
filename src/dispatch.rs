use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::{FlagStoreError, Result};

/// Work handed to a [`Dispatcher`], typically a completion closure.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub const DEFAULT_DISPATCHER_LABEL: &str = "flagstore.completions";

/// An execution context chosen by the store's owner for running completions.
///
/// The store never runs completions on its own flag queue, so a completion may
/// submit further store operations without stalling the queue.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs jobs one at a time, in submission order, on a dedicated named thread.
///
/// The thread exits once every clone of the dispatcher is dropped and the
/// pending jobs have run.
#[derive(Clone)]
pub struct ThreadDispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl ThreadDispatcher {
    pub fn new() -> Result<Self> {
        Self::with_label(DEFAULT_DISPATCHER_LABEL)
    }

    pub fn with_label(label: &str) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    run_job(job);
                }
            })
            .map_err(FlagStoreError::Spawn)?;
        Ok(Self { tx })
    }
}

impl Dispatcher for ThreadDispatcher {
    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("completion dispatcher thread is gone, dropping completion");
        }
    }
}

/// Spawns every job as a task on a tokio runtime.
///
/// Jobs may run concurrently and out of order on a multi-threaded runtime.
#[derive(Clone)]
pub struct TokioDispatcher {
    handle: Handle,
}

impl TokioDispatcher {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is currently running on.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Dispatcher for TokioDispatcher {
    fn dispatch(&self, job: Job) {
        self.handle.spawn(async move { run_job(job) });
    }
}

/// A panicking completion must not take its execution context down with it.
fn run_job(job: Job) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::warn!(panic = %message, "completion panicked");
    }
}
