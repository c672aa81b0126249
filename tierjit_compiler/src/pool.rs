//! Pools of reusable stage instances.
//!
//! Every analysis stage keeps its scratch buffers in a worker object so that
//! repeated compilations do not reallocate them. A compilation checks one
//! worker out, uses it, and the guard returns it on drop:
//!
//! ```text
//!   AlgorithmPool<T>
//!   ┌──────────────┐  checkout()  ┌──────────────┐
//!   │ idle workers │ ───────────▶ │ PoolGuard<T> │──▶ &mut T
//!   └──────────────┘ ◀─────────── └──────────────┘
//!                        drop
//! ```
//!
//! Workers carry no state between uses that affects results, so any worker
//! can serve any compilation and concurrent compilations never share one.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};

/// A bounded set of idle workers of one stage.
#[derive(Debug)]
pub struct AlgorithmPool<T> {
    idle: Mutex<Vec<T>>,
    make: fn() -> T,
    max_idle: usize,
}

impl<T> AlgorithmPool<T> {
    pub const DEFAULT_MAX_IDLE: usize = 8;

    pub fn new(make: fn() -> T) -> Self {
        Self::with_max_idle(make, Self::DEFAULT_MAX_IDLE)
    }

    pub fn with_max_idle(make: fn() -> T, max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            make,
            max_idle,
        }
    }

    /// Take an idle worker, or build a fresh one.
    pub fn checkout(&self) -> PoolGuard<'_, T> {
        let worker = self.idle.lock().pop().unwrap_or_else(self.make);
        PoolGuard {
            pool: self,
            worker: Some(worker),
        }
    }

    /// Number of workers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, worker: T) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(worker);
        }
    }
}

/// A checked-out worker; returned to its pool on drop.
pub struct PoolGuard<'a, T> {
    pool: &'a AlgorithmPool<T>,
    worker: Option<T>,
}

impl<T> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match &self.worker {
            Some(worker) => worker,
            None => unreachable!("worker taken before drop"),
        }
    }
}

impl<T> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.worker {
            Some(worker) => worker,
            None => unreachable!("worker taken before drop"),
        }
    }
}

impl<T> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.pool.release(worker);
        }
    }
}
