//! # Ready-socket queue.
//!
//! The single hand-off point between the poll thread (producer) and the worker
//! pool (consumers): a fixed-capacity ring guarded by one mutex and signalled by
//! one condition variable.
//!
//! ```text
//! poll thread ── push(token) ──► [ ring, capacity N ] ── pop() ──► worker 1..W
//!                    │                                     ▲
//!                    └─ full → Err(QueueFull)              └─ Ready::Shutdown
//! ```
//!
//! ## Rules
//! - `push` never blocks; a full ring rejects the entry.
//! - Shutdown sentinels bypass the capacity check so every worker can be woken
//!   even when the ring is full.
//! - FIFO order.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
#[cfg(test)]
use std::time::Duration;

use crate::error::TransportError;

/// Entry handed to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ready {
    /// Connection token with pending input.
    Conn(u64),
    /// Stop the worker that takes it.
    Shutdown,
}

/// Bounded FIFO of ready connections.
#[derive(Debug)]
pub struct ReadyQueue {
    ring: Mutex<VecDeque<Ready>>,
    signal: Condvar,
    capacity: usize,
}

impl ReadyQueue {
    /// Creates a queue; capacity is clamped to a minimum of 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(VecDeque::with_capacity(capacity)),
            signal: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Ready>> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues a ready connection.
    pub fn push(&self, token: u64) -> Result<(), TransportError> {
        let mut ring = self.lock();
        if ring.len() >= self.capacity {
            return Err(TransportError::QueueFull {
                capacity: self.capacity,
            });
        }
        ring.push_back(Ready::Conn(token));
        drop(ring);
        self.signal.notify_one();
        Ok(())
    }

    /// Enqueues one shutdown sentinel per worker.
    pub fn push_shutdown(&self, workers: usize) {
        let mut ring = self.lock();
        for _ in 0..workers {
            ring.push_back(Ready::Shutdown);
        }
        drop(ring);
        self.signal.notify_all();
    }

    /// Blocks until an entry is available.
    pub fn pop(&self) -> Ready {
        let mut ring = self.lock();
        loop {
            if let Some(entry) = ring.pop_front() {
                return entry;
            }
            ring = self
                .signal
                .wait(ring)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`ReadyQueue::pop`] but gives up after `timeout`.
    #[cfg(test)]
    pub(crate) fn pop_timeout(&self, timeout: Duration) -> Option<Ready> {
        let ring = self.lock();
        let (mut ring, _) = self
            .signal
            .wait_timeout_while(ring, timeout, |r| r.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        ring.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
