//! Executor - where dispatched batches run
//!
//! `TokioExecutor` spawns each job on the shared runtime, optionally bounded
//! by a worker limit. `ManualExecutor` queues jobs until the caller drives
//! them, which makes ordering deterministic in tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::{Semaphore, TryAcquireError};

use crate::error::SpawnError;

/// A unit of background work
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A job the executor refused, handed back unrun
pub struct Rejected {
    pub job: Job,
    pub reason: SpawnError,
}

impl Rejected {
    fn new(job: Job, reason: SpawnError) -> Self {
        Self { job, reason }
    }
}

impl std::fmt::Debug for Rejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejected")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

/// Schedules jobs without waiting for them
///
/// `execute` must be fast and local. A refused job comes back in `Rejected`
/// so the caller decides when it is dropped.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job) -> Result<(), Rejected>;
}

/// Spawns jobs onto a tokio runtime
pub struct TokioExecutor {
    handle: Handle,
    permits: Option<Arc<Semaphore>>,
    limit: usize,
    closed: AtomicBool,
}

impl TokioExecutor {
    /// Spawn onto the given runtime, unbounded
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            permits: None,
            limit: 0,
            closed: AtomicBool::new(false),
        }
    }

    /// Spawn onto the runtime the caller is running in
    pub fn current() -> Result<Self, SpawnError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|_| SpawnError::NoRuntime)
    }

    /// Reject jobs once `max_workers` are running (`None` = unbounded)
    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        match max_workers {
            Some(limit) if limit > 0 => {
                self.permits = Some(Arc::new(Semaphore::new(limit)));
                self.limit = limit;
            }
            _ => {
                self.permits = None;
                self.limit = 0;
            }
        }
        self
    }

    /// Refuse every subsequent job
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, job: Job) -> Result<(), Rejected> {
        if self.is_closed() {
            return Err(Rejected::new(job, SpawnError::Closed));
        }

        let permit = match &self.permits {
            Some(permits) => match Arc::clone(permits).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::NoPermits) => {
                    let reason = SpawnError::Saturated { limit: self.limit };
                    return Err(Rejected::new(job, reason));
                }
                Err(TryAcquireError::Closed) => {
                    return Err(Rejected::new(job, SpawnError::Closed));
                }
            },
            None => None,
        };

        self.handle.spawn(async move {
            let _permit = permit;
            job.await;
        });
        Ok(())
    }
}

/// Queues jobs until `run_next` / `run_all` is awaited
#[derive(Clone, Default)]
pub struct ManualExecutor {
    queue: Arc<Mutex<VecDeque<Job>>>,
    closed: Arc<AtomicBool>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs waiting to run
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Run the oldest queued job; returns false when the queue is empty
    pub async fn run_next(&self) -> bool {
        let job = self.lock().pop_front();
        match job {
            Some(job) => {
                job.await;
                true
            }
            None => false,
        }
    }

    /// Run queued jobs in submission order until the queue is empty
    pub async fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next().await {
            ran += 1;
        }
        ran
    }

    /// Refuse every subsequent job
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Executor for ManualExecutor {
    fn execute(&self, job: Job) -> Result<(), Rejected> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Rejected::new(job, SpawnError::Closed));
        }
        self.lock().push_back(job);
        Ok(())
    }
}
