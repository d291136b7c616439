//! FIFO async permit pool.
//!
//! A released permit is handed straight to the oldest waiter, so a late
//! `try_acquire` can never jump the queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::{Error, Result};

#[derive(Debug)]
struct State {
    available: usize,
    waiters: VecDeque<oneshot::Sender<()>>,
}

#[derive(Debug)]
pub struct Semaphore {
    max: usize,
    state: Mutex<State>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SemaphoreStats {
    pub available: usize,
    pub queued: usize,
    pub capacity: usize,
    pub utilization: f64,
}

impl Semaphore {
    pub fn new(max_permits: usize) -> Result<Self> {
        if max_permits < 1 {
            return Err(Error::Config(format!(
                "semaphore needs at least one permit, got {}",
                max_permits
            )));
        }
        Ok(Self {
            max: max_permits,
            state: Mutex::new(State {
                available: max_permits,
                waiters: VecDeque::new(),
            }),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Waits for a permit. Waiters are served in call order.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        loop {
            let rx = {
                let mut state = self.lock();
                if state.available > 0 {
                    state.available -= 1;
                    return SemaphorePermit { semaphore: self };
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                rx
            };

            let mut waiter = Waiter {
                rx,
                semaphore: self,
                granted: false,
            };
            if (&mut waiter.rx).await.is_ok() {
                waiter.granted = true;
                return SemaphorePermit { semaphore: self };
            }
        }
    }

    /// Takes a permit only if one is free right now.
    pub fn try_acquire(&self) -> Option<SemaphorePermit<'_>> {
        let mut state = self.lock();
        if state.available > 0 {
            state.available -= 1;
            Some(SemaphorePermit { semaphore: self })
        } else {
            None
        }
    }

    /// Returns one permit to the pool.
    ///
    /// Normally called by dropping a [`SemaphorePermit`]. Releasing into a
    /// pool that is already at capacity is ignored.
    pub fn release(&self) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.send(()).is_ok() {
                tracing::trace!("permit handed to queued waiter");
                return;
            }
        }
        if state.available < self.max {
            state.available += 1;
        } else {
            tracing::debug!(capacity = self.max, "release on full semaphore ignored");
        }
    }

    pub fn available(&self) -> usize {
        self.lock().available
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn is_full(&self) -> bool {
        self.lock().available == 0
    }

    pub fn stats(&self) -> SemaphoreStats {
        let mut state = self.lock();
        state.waiters.retain(|tx| !tx.is_closed());
        SemaphoreStats {
            available: state.available,
            queued: state.waiters.len(),
            capacity: self.max,
            utilization: (self.max - state.available) as f64 / self.max as f64,
        }
    }
}

/// A held permit. Dropping it releases the permit.
#[must_use = "the permit is released as soon as it is dropped"]
#[derive(Debug)]
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release();
    }
}

/// Queue slot of a pending `acquire`. If the future is dropped after a permit
/// was sent but before it was observed, the permit goes back to the pool.
struct Waiter<'a> {
    rx: oneshot::Receiver<()>,
    semaphore: &'a Semaphore,
    granted: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            self.semaphore.release();
        }
    }
}
