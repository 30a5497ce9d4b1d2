//! # Dispatch counters.
//!
//! Counters are plain atomics indexed by catalog position, allocated once at load
//! time. They are updated from whatever thread drives dispatch and never locked.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;

use serde::Serialize;

use crate::events::Catalog;

#[derive(Debug, Default)]
struct Cell {
    invocations: AtomicU64,
    failures: AtomicU64,
    latency_ns: AtomicU64,
}

/// Per-type invocation counters of one subscriber.
#[derive(Debug)]
pub struct Stats<K> {
    cells: Box<[Cell]>,
    _kind: PhantomData<fn() -> K>,
}

/// Point-in-time copy of one subscriber's counters for one type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeStats<K> {
    pub event: K,
    pub invocations: u64,
    pub failures: u64,
    pub latency: Duration,
}

impl<K: Catalog> Stats<K> {
    pub fn new() -> Self {
        Self {
            cells: (0..K::count()).map(|_| Cell::default()).collect(),
            _kind: PhantomData,
        }
    }

    /// Counts one invocation; called before the handler runs.
    #[inline]
    pub fn invoked(&self, kind: K) {
        self.cells[kind.index()]
            .invocations
            .fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Records the outcome of one invocation.
    #[inline]
    pub fn finished(&self, kind: K, elapsed: Duration, failed: bool) {
        let cell = &self.cells[kind.index()];
        let ns = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        cell.latency_ns.fetch_add(ns, AtomicOrdering::Relaxed);
        if failed {
            cell.failures.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    pub fn invocations(&self, kind: K) -> u64 {
        self.cells[kind.index()]
            .invocations
            .load(AtomicOrdering::Relaxed)
    }

    pub fn failures(&self, kind: K) -> u64 {
        self.cells[kind.index()].failures.load(AtomicOrdering::Relaxed)
    }

    /// Cumulative time spent in this subscriber for `kind`.
    pub fn latency(&self, kind: K) -> Duration {
        Duration::from_nanos(self.cells[kind.index()].latency_ns.load(AtomicOrdering::Relaxed))
    }

    /// Counters for every type invoked at least once, in catalog order.
    pub fn snapshot(&self) -> Vec<TypeStats<K>> {
        K::table()
            .iter()
            .map(|row| row.kind)
            .filter(|&k| self.invocations(k) > 0)
            .map(|k| TypeStats {
                event: k,
                invocations: self.invocations(k),
                failures: self.failures(k),
                latency: self.latency(k),
            })
            .collect()
    }
}

impl<K: Catalog> Default for Stats<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Global per-type trigger counters of one bus.
#[derive(Debug)]
pub struct Triggers<K> {
    counts: Box<[AtomicU64]>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Catalog> Triggers<K> {
    pub fn new() -> Self {
        Self {
            counts: (0..K::count()).map(|_| AtomicU64::new(0)).collect(),
            _kind: PhantomData,
        }
    }

    #[inline]
    pub fn hit(&self, kind: K) {
        self.counts[kind.index()].fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub fn get(&self, kind: K) -> u64 {
        self.counts[kind.index()].load(AtomicOrdering::Relaxed)
    }

    /// Non-zero counters in catalog order.
    pub fn snapshot(&self) -> Vec<(K, u64)> {
        K::table()
            .iter()
            .map(|row| (row.kind, self.get(row.kind)))
            .filter(|&(_, n)| n > 0)
            .collect()
    }
}

impl<K: Catalog> Default for Triggers<K> {
    fn default() -> Self {
        Self::new()
    }
}
