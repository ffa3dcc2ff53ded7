// src/epoch/stats.rs
//
// Per-partition protocol counters and point-in-time snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::PartitionId;

/// Monotonic counters, updated without taking the partition lock.
#[derive(Debug, Default)]
pub(crate) struct PartitionCounters {
    pub cache_hits: AtomicU64,
    pub substitutions: AtomicU64,
    pub direct_fetches: AtomicU64,
    pub waits: AtomicU64,
    pub fetch_failures: AtomicU64,
}

impl PartitionCounters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of one partition's state (taken under its lock; counters are relaxed reads).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionStats {
    pub partition: PartitionId,
    pub file_count: u32,
    pub unread: usize,
    pub cached: usize,
    pub in_flight: u32,
    /// Direct backend fetches currently running.
    pub fetching: u32,
    pub requested: usize,
    pub consumed: usize,
    pub waiters: u32,
    /// Ids resident in the shared cache after being consumed this pass.
    pub resident: usize,
    pub cache_hits: u64,
    pub substitutions: u64,
    pub direct_fetches: u64,
    pub waits: u64,
    pub fetch_failures: u64,
}

impl PartitionStats {
    pub(crate) fn fill_counters(mut self, counters: &PartitionCounters) -> Self {
        self.cache_hits = counters.cache_hits.load(Ordering::Relaxed);
        self.substitutions = counters.substitutions.load(Ordering::Relaxed);
        self.direct_fetches = counters.direct_fetches.load(Ordering::Relaxed);
        self.waits = counters.waits.load(Ordering::Relaxed);
        self.fetch_failures = counters.fetch_failures.load(Ordering::Relaxed);
        self
    }

    /// Nothing is left to hand out or waiting to land.
    pub fn is_drained(&self) -> bool {
        self.unread == 0 && self.cached == 0 && self.in_flight == 0 && self.fetching == 0
    }
}

/// Aggregate over every partition of a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub partitions: usize,
    pub files: u64,
    pub unread: u64,
    pub cached: u64,
    pub in_flight: u64,
    pub requested: u64,
    pub consumed: u64,
    pub cache_hits: u64,
    pub substitutions: u64,
    pub direct_fetches: u64,
    pub waits: u64,
    pub fetch_failures: u64,
}

impl PassStats {
    pub(crate) fn add(&mut self, p: &PartitionStats) {
        self.partitions += 1;
        self.files += u64::from(p.file_count);
        self.unread += p.unread as u64;
        self.cached += p.cached as u64;
        self.in_flight += u64::from(p.in_flight);
        self.requested += p.requested as u64;
        self.consumed += p.consumed as u64;
        self.cache_hits += p.cache_hits;
        self.substitutions += p.substitutions;
        self.direct_fetches += p.direct_fetches;
        self.waits += p.waits;
        self.fetch_failures += p.fetch_failures;
    }
}
