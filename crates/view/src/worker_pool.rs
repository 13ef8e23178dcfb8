//! A bounded pool of OS threads running blocking calls off the event loop.
//!
//! Blocking views, hooks and renderers are submitted with [`WorkerPool::run`], which resolves
//! once the call completed on a worker. Jobs wait in a bounded queue; what happens when it is
//! full is the [`BackpressureMode`]: wait for room, or fail right away with
//! [`PoolError::Saturated`].
//!
//! ## Configuration
//!
//! - `VIEW_POOL_WORKERS`: number of worker threads (default: available parallelism + 4, at most 32)
//! - `VIEW_POOL_QUEUE_BOUND`: number of jobs that may wait for a worker (default: 1024)
//! - `VIEW_POOL_BACKPRESSURE`: `block` or `shed` (default: `block`)

use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressureMode {
    /// Wait for room in the queue.
    #[default]
    Block,
    /// Fail the submission immediately.
    Shed,
}

impl BackpressureMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Some(Self::Block),
            "shed" => Some(Self::Shed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerPoolConfig {
    pub workers: usize,
    pub queue_bound: usize,
    pub backpressure: BackpressureMode,
}

const MAX_DEFAULT_WORKERS: usize = 32;

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        let cpus = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        Self { workers: (cpus + 4).min(MAX_DEFAULT_WORKERS), queue_bound: 1024, backpressure: BackpressureMode::Block }
    }
}

impl WorkerPoolConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; missing or unparsable values keep their default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let workers = lookup("VIEW_POOL_WORKERS").and_then(|s| s.parse().ok()).unwrap_or(default.workers);
        let queue_bound = lookup("VIEW_POOL_QUEUE_BOUND").and_then(|s| s.parse().ok()).unwrap_or(default.queue_bound);
        let backpressure =
            lookup("VIEW_POOL_BACKPRESSURE").and_then(|s| BackpressureMode::parse(&s)).unwrap_or(default.backpressure);

        Self { workers, queue_bound, backpressure }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is saturated ({queue_bound} jobs waiting)")]
    Saturated { queue_bound: usize },

    #[error("worker pool is shut down")]
    Closed,

    #[error("offloaded call panicked: {message}")]
    Panicked { message: String },
}

/// Counters describing the pool's activity since it started.
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    dispatched: AtomicU64,
    completed: AtomicU64,
    shed: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn shed(&self) -> u64 {
        self.shed.load(Ordering::Relaxed)
    }
}

type Job = Box<dyn FnOnce() + Send>;

#[derive(Debug)]
pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    config: WorkerPoolConfig,
    metrics: Arc<WorkerPoolMetrics>,
}

impl WorkerPool {
    /// Starts the worker threads. They exit once the pool is dropped and the queue drained.
    pub fn new(config: WorkerPoolConfig) -> std::io::Result<Self> {
        let workers = config.workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(config.queue_bound.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let metrics = Arc::new(WorkerPoolMetrics::default());

        for id in 0..workers {
            let receiver = Arc::clone(&receiver);
            let metrics = Arc::clone(&metrics);
            thread::Builder::new().name(format!("view-worker-{id}")).spawn(move || {
                debug!(worker = id, "worker started");
                loop {
                    let job = {
                        let Ok(mut receiver) = receiver.lock() else { break };
                        receiver.blocking_recv()
                    };
                    let Some(job) = job else { break };
                    job();
                    metrics.completed.fetch_add(1, Ordering::Relaxed);
                }
                debug!(worker = id, "worker stopped");
            })?;
        }

        info!(workers, queue_bound = config.queue_bound, backpressure = ?config.backpressure, "worker pool started");
        Ok(Self { sender, config, metrics })
    }

    pub fn metrics(&self) -> &WorkerPoolMetrics {
        &self.metrics
    }

    /// Runs `f` on a worker and waits for its result without blocking the caller's thread.
    ///
    /// A panic inside `f` is caught on the worker and returned as [`PoolError::Panicked`].
    pub async fn run<F, T>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| PoolError::Panicked { message: panic_message(payload.as_ref()) });
            if tx.send(result).is_err() {
                trace!("caller went away before the offloaded call completed");
            }
        });

        match self.config.backpressure {
            BackpressureMode::Block => self.sender.send(job).await.map_err(|_| PoolError::Closed)?,
            BackpressureMode::Shed => self.sender.try_send(job).map_err(|e| match e {
                TrySendError::Full(_) => {
                    self.metrics.shed.fetch_add(1, Ordering::Relaxed);
                    warn!(queue_bound = self.config.queue_bound, "worker pool saturated, shedding call");
                    PoolError::Saturated { queue_bound: self.config.queue_bound }
                }
                TrySendError::Closed(_) => PoolError::Closed,
            })?,
        }
        self.metrics.dispatched.fetch_add(1, Ordering::Relaxed);

        rx.await.map_err(|_| PoolError::Closed)?
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::pin::pin;

    fn pool(workers: usize, queue_bound: usize, backpressure: BackpressureMode) -> WorkerPool {
        WorkerPool::new(WorkerPoolConfig { workers, queue_bound, backpressure }).unwrap()
    }

    #[tokio::test]
    async fn runs_off_the_calling_thread() {
        let pool = pool(2, 4, BackpressureMode::Block);
        let caller = thread::current().id();

        let worker = pool.run(|| thread::current().id()).await.unwrap();

        assert_ne!(worker, caller);
        assert_eq!(pool.metrics().dispatched(), 1);
    }

    #[tokio::test]
    async fn panics_are_returned() {
        let pool = pool(1, 4, BackpressureMode::Block);

        let result = pool.run(|| -> u32 { panic!("boom") }).await;

        assert!(matches!(result, Err(PoolError::Panicked { message }) if message == "boom"));
        // the worker survives
        assert_eq!(pool.run(|| 7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn shed_mode_fails_when_full() {
        let pool = pool(1, 1, BackpressureMode::Shed);
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let mut first = pin!(pool.run(move || {
            started_tx.send(()).ok();
            release_rx.recv().ok();
            1
        }));
        assert!(futures::poll!(first.as_mut()).is_pending());
        started_rx.await.unwrap();

        let mut second = pin!(pool.run(|| 2));
        assert!(futures::poll!(second.as_mut()).is_pending());

        let third = pool.run(|| 3).await;
        assert!(matches!(third, Err(PoolError::Saturated { queue_bound: 1 })));
        assert_eq!(pool.metrics().shed(), 1);

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(second.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn block_mode_waits_for_a_free_slot() {
        let pool = pool(1, 1, BackpressureMode::Block);
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let mut first = pin!(pool.run(move || {
            started_tx.send(()).ok();
            release_rx.recv().ok();
            1
        }));
        assert!(futures::poll!(first.as_mut()).is_pending());
        started_rx.await.unwrap();

        let mut second = pin!(pool.run(|| 2));
        assert!(futures::poll!(second.as_mut()).is_pending());

        // queue is full: the third call waits instead of failing
        let mut third = pin!(pool.run(|| 3));
        assert!(futures::poll!(third.as_mut()).is_pending());
        assert_eq!(pool.metrics().dispatched(), 2);

        release_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(second.await.unwrap(), 2);
        assert_eq!(third.await.unwrap(), 3);
        assert_eq!(pool.metrics().dispatched(), 3);
        assert_eq!(pool.metrics().shed(), 0);
    }

    #[test]
    fn config_from_lookup() {
        let vars: HashMap<&str, &str> =
            HashMap::from([("VIEW_POOL_WORKERS", "3"), ("VIEW_POOL_QUEUE_BOUND", "oops"), ("VIEW_POOL_BACKPRESSURE", "SHED")]);

        let config = WorkerPoolConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.workers, 3);
        assert_eq!(config.queue_bound, 1024);
        assert_eq!(config.backpressure, BackpressureMode::Shed);
    }

    #[test]
    fn config_from_json() {
        let config: WorkerPoolConfig = serde_json::from_str(r#"{"workers": 2, "backpressure": "shed"}"#).unwrap();

        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_bound, 1024);
        assert_eq!(config.backpressure, BackpressureMode::Shed);
    }
}
