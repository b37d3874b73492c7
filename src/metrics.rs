//! Coordination metrics
//!
//! Monotonic counters for lock traffic and publish-gate outcomes. The
//! registry and the toolbox bump these inline; the embedding service reads a
//! snapshot on whatever schedule it reports at. Counters are advisory and use
//! relaxed ordering; they do not participate in any synchronization.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counter set shared by the lock registry and the publish gate
#[derive(Debug, Default)]
pub struct CoordinationMetrics {
    granted: AtomicU64,
    conflicted: AtomicU64,
    released: AtomicU64,
    revoked: AtomicU64,
    coverage_failures: AtomicU64,
    partition_set_failures: AtomicU64,
    verified: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub granted: u64,
    pub conflicted: u64,
    pub released: u64,
    pub revoked: u64,
    pub coverage_failures: u64,
    pub partition_set_failures: u64,
    pub verified: u64,
}

impl CoordinationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_granted(&self) {
        self.granted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_conflicted(&self) {
        self.conflicted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_released(&self) {
        self.released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_revoked(&self) {
        self.revoked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_coverage_failures(&self) {
        self.coverage_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_partition_set_failures(&self) {
        self.partition_set_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_verified(&self) {
        self.verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::Relaxed)
    }

    pub fn conflicted(&self) -> u64 {
        self.conflicted.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn revoked(&self) -> u64 {
        self.revoked.load(Ordering::Relaxed)
    }

    pub fn coverage_failures(&self) -> u64 {
        self.coverage_failures.load(Ordering::Relaxed)
    }

    pub fn partition_set_failures(&self) -> u64 {
        self.partition_set_failures.load(Ordering::Relaxed)
    }

    pub fn verified(&self) -> u64 {
        self.verified.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            granted: self.granted(),
            conflicted: self.conflicted(),
            released: self.released(),
            revoked: self.revoked(),
            coverage_failures: self.coverage_failures(),
            partition_set_failures: self.partition_set_failures(),
            verified: self.verified(),
        }
    }
}
