//! Device-pool task scheduler.
//!
//! Fans a work list out across the connected devices: the list is split
//! into balanced chunks up front, each chunk runs on its own worker thread,
//! and workers borrow a device from a shared pool for the lifetime of their
//! chunk. There is no work-stealing: chunks are pre-balanced by count, and
//! a slow device simply finishes later. The run returns once every worker
//! has joined.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::device::DeviceDriver;
use crate::error::{Error, Result};
use crate::flow::AccountFlow;
use crate::outcome::{Classification, OutcomeSink};

/// Split `items` into `n` chunks whose sizes differ by at most one,
/// preserving order. Trailing chunks may be empty when `n` exceeds the
/// item count.
pub fn split_balanced<T>(items: Vec<T>, n: usize) -> Vec<Vec<T>> {
    if n == 0 {
        return Vec::new();
    }
    let len = items.len();
    let base = len / n;
    let extra = len % n;

    let mut chunks = Vec::with_capacity(n);
    let mut iter = items.into_iter();
    for i in 0..n {
        let size = base + usize::from(i < extra);
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

/// Worker count for a device fleet: twice the device count, capped by the
/// machine's parallelism.
pub fn worker_count(devices: usize, parallelism: usize) -> usize {
    (devices * 2).min(parallelism).max(1)
}

fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Bounded pool of device ids shared across workers.
///
/// A handle is checked out by at most one worker at a time; the guard
/// returns it on drop, including on the panic path.
pub struct DevicePool {
    ids: Mutex<Vec<String>>,
    available: Condvar,
}

impl DevicePool {
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            ids: Mutex::new(ids),
            available: Condvar::new(),
        }
    }

    /// Check out a device id, blocking until one is free.
    pub fn acquire(&self) -> PooledDevice<'_> {
        let mut ids = self.ids.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            if let Some(id) = ids.pop() {
                return PooledDevice {
                    pool: self,
                    id: Some(id),
                };
            }
            ids = self
                .available
                .wait(ids)
                .unwrap_or_else(|p| p.into_inner());
        }
    }

    /// Number of ids currently checked in.
    pub fn idle(&self) -> usize {
        self.ids.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    fn release(&self, id: String) {
        self.ids
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(id);
        self.available.notify_one();
    }
}

/// RAII checkout from a [`DevicePool`].
pub struct PooledDevice<'a> {
    pool: &'a DevicePool,
    id: Option<String>,
}

impl PooledDevice<'_> {
    pub fn id(&self) -> &str {
        self.id.as_deref().expect("device id taken")
    }
}

impl Drop for PooledDevice<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.pool.release(id);
        }
    }
}

/// Progress information for run callbacks.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Device the identifier is running on.
    pub device: String,
    /// 1-based position within the worker's chunk.
    pub current: usize,
    /// Chunk length.
    pub total: usize,
    /// Identifier being processed.
    pub identifier: String,
    /// Current step status, or the terminal classification.
    pub status: String,
    /// Set once the identifier reaches a terminal classification.
    pub done: Option<Classification>,
}

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(ProgressUpdate) + Send + Sync>;

/// Totals for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub devices: usize,
    pub workers: usize,
    pub success: usize,
    pub die: usize,
    pub retry: usize,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.success + self.die + self.retry
    }
}

/// Runs one flow over a work list using all connected devices.
pub struct Scheduler {
    settle: Duration,
    progress_callback: Option<ProgressCallback>,
}

impl Scheduler {
    pub fn new(settle: Duration) -> Self {
        Self {
            settle,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn report(&self, update: ProgressUpdate) {
        if let Some(ref callback) = self.progress_callback {
            callback(update);
        }
    }

    /// Fan `identifiers` out over the fleet and run `flow` for each one.
    ///
    /// Every identifier ends up recorded in the sink exactly once per run:
    /// a worker whose device fails to connect records its whole chunk as
    /// retry instead of silently dropping it.
    pub fn run(
        &self,
        identifiers: Vec<String>,
        driver: &(dyn DeviceDriver + Sync),
        flow: &dyn AccountFlow,
        sink: &OutcomeSink,
    ) -> Result<RunReport> {
        let devices = driver.list_devices()?;
        if devices.is_empty() {
            return Err(Error::Config("no devices connected".into()));
        }

        let workers = worker_count(devices.len(), available_parallelism());
        let chunks: Vec<Vec<String>> = split_balanced(identifiers, workers)
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect();
        info!(
            devices = devices.len(),
            workers,
            chunks = chunks.len(),
            flow = flow.name(),
            "starting run"
        );

        let report = RunReport {
            devices: devices.len(),
            workers,
            ..Default::default()
        };
        let pool = DevicePool::new(devices);
        let success = AtomicUsize::new(0);
        let die = AtomicUsize::new(0);
        let retry = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for chunk in chunks {
                let pool = &pool;
                let success = &success;
                let die = &die;
                let retry = &retry;
                scope.spawn(move || {
                    let handle = pool.acquire();
                    let total = chunk.len();

                    let mut device = match driver.connect(handle.id()) {
                        Ok(device) => device,
                        Err(e) => {
                            // The whole chunk goes to the retry list rather
                            // than disappearing unclassified.
                            error!(device = handle.id(), error = %e, "device connection failed, chunk goes to retry");
                            for identifier in &chunk {
                                if let Err(e) = sink.record(identifier, Classification::Retry) {
                                    error!(identifier, error = %e, "failed to record outcome");
                                }
                                retry.fetch_add(1, Ordering::Relaxed);
                            }
                            return;
                        }
                    };

                    for (idx, identifier) in chunk.iter().enumerate() {
                        let step_progress = |status: &str| {
                            self.report(ProgressUpdate {
                                device: handle.id().to_string(),
                                current: idx + 1,
                                total,
                                identifier: identifier.clone(),
                                status: status.to_string(),
                                done: None,
                            });
                        };

                        let class = flow.run(device.as_mut(), identifier, &step_progress);

                        self.report(ProgressUpdate {
                            device: handle.id().to_string(),
                            current: idx + 1,
                            total,
                            identifier: identifier.clone(),
                            status: class.to_string(),
                            done: Some(class),
                        });
                        match class {
                            Classification::Success => success.fetch_add(1, Ordering::Relaxed),
                            Classification::Die => die.fetch_add(1, Ordering::Relaxed),
                            Classification::Retry => retry.fetch_add(1, Ordering::Relaxed),
                        };
                        if let Err(e) = sink.record(identifier, class) {
                            warn!(identifier, error = %e, "failed to record outcome");
                        }
                        std::thread::sleep(self.settle);
                    }
                    // `handle` drops here, returning the device to the pool.
                });
            }
        });

        Ok(RunReport {
            success: success.into_inner(),
            die: die.into_inner(),
            retry: retry.into_inner(),
            ..report
        })
    }
}
