//! Single-flight background work queue.
//!
//! An ordered queue of deferred producer tasks with one guarantee: at most
//! one drain loop runs at any time. The first enqueue on an idle queue claims
//! the drain flag and spawns the loop; the loop pops and runs units in FIFO
//! order, one at a time, and exits once the queue is empty. Serializing the
//! units is intentional: it bounds the disk and CPU pressure of thumbnail
//! generation to one unit at a time.
//!
//! A failing or panicking unit is logged and skipped; it never kills the
//! loop or the units queued behind it.

use crate::cancel::CancellationToken;
use crate::error::{CacheError, Result};
use log::{debug, error, warn};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

/// A deferred producer task bound to a cache key and a cancellation token.
pub struct WorkUnit {
    key: String,
    token: CancellationToken,
    job: Box<dyn FnOnce(&CancellationToken) -> Result<()> + Send>,
}

impl WorkUnit {
    /// Creates a unit. The job receives the unit's token so it can honor
    /// cancellation at its own checkpoints.
    pub fn new(
        key: impl Into<String>,
        token: CancellationToken,
        job: Box<dyn FnOnce(&CancellationToken) -> Result<()> + Send>,
    ) -> Self {
        Self {
            key: key.into(),
            token,
            job,
        }
    }
}

/// Thread-safe FIFO queue drained by at most one background loop.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    idle: Condvar,
}

struct QueueState {
    pending: VecDeque<WorkUnit>,
    draining: bool,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    draining: false,
                }),
                idle: Condvar::new(),
            }),
        }
    }

    /// Appends a unit; if no drain loop is active, claims the flag and spawns
    /// exactly one. Claim and append happen under the same lock, so two
    /// concurrent enqueues on an idle queue cannot both spawn.
    pub fn enqueue(&self, unit: WorkUnit) {
        let mut state = self.inner.state.lock().unwrap();
        state.pending.push_back(unit);
        if state.draining {
            return;
        }
        state.draining = true;
        drop(state);

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name("thumbcache-worker".into())
            .spawn(move || drain(&inner));
        if let Err(err) = spawned {
            error!("failed to spawn worker loop: {}", err);
            let mut state = self.inner.state.lock().unwrap();
            state.draining = false;
            self.inner.idle.notify_all();
        }
    }

    /// Blocks until the queue is empty and no drain loop is active.
    pub fn wait_idle(&self) {
        let mut state = self.inner.state.lock().unwrap();
        while state.draining || !state.pending.is_empty() {
            state = self.inner.idle.wait(state).unwrap();
        }
    }

    /// Whether the queue is empty with no active drain loop.
    pub fn is_idle(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        !state.draining && state.pending.is_empty()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

fn drain(inner: &QueueInner) {
    loop {
        let unit = {
            let mut state = inner.state.lock().unwrap();
            match state.pending.pop_front() {
                Some(unit) => unit,
                None => {
                    state.draining = false;
                    inner.idle.notify_all();
                    return;
                }
            }
        };
        run_unit(unit);
    }
}

fn run_unit(unit: WorkUnit) {
    let WorkUnit { key, token, job } = unit;
    match panic::catch_unwind(AssertUnwindSafe(|| job(&token))) {
        Ok(Ok(())) => {}
        Ok(Err(CacheError::Cancelled)) => debug!("unit for {} cancelled", key),
        Ok(Err(err)) => warn!("unit for {} failed, skipping: {}", key, err),
        Err(_) => error!("unit for {} panicked, skipping", key),
    }
}
