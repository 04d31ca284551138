//! Bounded worker pool for external calls.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Semaphore, TryAcquireError};

/// Returned when the pool has no free slot.
///
/// Callers treat saturation as an explicit failure of the attempt rather
/// than queueing behind it; for payments that means the attempt is recorded
/// as failed and left for the retry sweep.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("worker pool \"{pool}\" saturated ({capacity} slots busy)")]
pub struct Saturated {
    pub pool: &'static str,
    pub capacity: usize,
}

/// A fixed-size pool bounding how many external calls of one kind may be in
/// flight at once.
///
/// The pool hands out permits, it does not spawn: the caller runs the work
/// on its own task while holding the permit, so per-partition ordering is
/// preserved.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    name: &'static str,
    capacity: usize,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    /// Creates a pool named for the operation kind it bounds.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            permits: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Claims a slot without waiting. Fails with [`Saturated`] when every
    /// slot is busy.
    pub fn try_acquire(&self) -> Result<WorkerSlot, Saturated> {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                metrics::gauge!("worker_pool_busy", "pool" => self.name).increment(1.0);
                Ok(WorkerSlot {
                    pool: self.name,
                    _permit: permit,
                })
            }
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => {
                metrics::counter!("worker_pool_saturated_total", "pool" => self.name).increment(1);
                Err(Saturated {
                    pool: self.name,
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A held slot; dropping it frees the slot.
#[derive(Debug)]
pub struct WorkerSlot {
    pool: &'static str,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        metrics::gauge!("worker_pool_busy", "pool" => self.pool).decrement(1.0);
    }
}
