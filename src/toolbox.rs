//! Publish-gate validation
//!
//! The toolbox sits between a task that wants to publish segments and the
//! durable metadata store. It answers two questions about a proposed batch:
//! is every segment authorized by a lock the task currently holds, and is the
//! batch internally coherent, meaning all segments belong to one partition
//! set. Both checks are pure reads; the toolbox owns no mutable state of its
//! own and any number of tasks can validate concurrently.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::events::{Emitter, Event, EventKind};
use crate::lockbox::TaskLockbox;
use crate::metrics::CoordinationMetrics;
use crate::segment::DataSegment;
use crate::task::TaskId;

/// Validation front end over the lock registry
pub struct TaskActionToolbox {
    lockbox: Arc<TaskLockbox>,
    emitter: Arc<dyn Emitter>,
    metrics: Arc<CoordinationMetrics>,
}

impl TaskActionToolbox {
    pub fn new(
        lockbox: Arc<TaskLockbox>,
        emitter: Arc<dyn Emitter>,
        metrics: Arc<CoordinationMetrics>,
    ) -> Self {
        Self {
            lockbox,
            emitter,
            metrics,
        }
    }

    /// Build a toolbox, registry, and emitter from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let emitter = config.emitter()?;
        let metrics = Arc::new(CoordinationMetrics::new());
        let lockbox = Arc::new(TaskLockbox::with_observability(
            Arc::clone(&emitter),
            Arc::clone(&metrics),
        ));
        Ok(Self::new(lockbox, emitter, metrics))
    }

    pub fn lockbox(&self) -> &Arc<TaskLockbox> {
        &self.lockbox
    }

    pub fn emitter(&self) -> &Arc<dyn Emitter> {
        &self.emitter
    }

    pub fn metrics(&self) -> &CoordinationMetrics {
        &self.metrics
    }

    /// Check that every segment falls under some active lock of the task
    ///
    /// Logical AND over the batch; an empty batch is vacuously covered. The
    /// result is authoritative only at the instant of the check: a lock can
    /// be revoked between this returning true and the external commit, in
    /// which case the worst outcome is a partial insert, which the store's
    /// idempotent per-segment commits tolerate.
    pub fn task_lock_covers_segments(
        &self,
        task_id: &TaskId,
        segments: &[DataSegment],
        allow_older_versions: bool,
    ) -> bool {
        let locks = self.lockbox.find_locks_for_task(task_id);

        for segment in segments {
            let covered = locks
                .iter()
                .any(|lock| lock.covers(segment, allow_older_versions));
            if !covered {
                debug!(
                    task = %task_id,
                    segment = %segment.descriptor(),
                    "segment not covered by any held lock"
                );
                return false;
            }
        }
        true
    }

    /// Check that all segments share one (dataset, interval, version) triple
    ///
    /// Partition numbers are ignored; they are the axis a partition set spans.
    /// An empty batch is a caller contract violation, not a negative answer.
    pub fn segments_are_from_same_partition_set(
        &self,
        segments: &[DataSegment],
    ) -> Result<bool> {
        if segments.is_empty() {
            return Err(Error::InvalidArgument("segments must be nonempty".to_string()));
        }

        let first = &segments[0];
        Ok(segments
            .iter()
            .all(|segment| segment.same_partition_set(first)))
    }

    /// The publish gate: coverage first, then partition-set cohesion
    ///
    /// Returns the first failure as a non-retryable error naming the
    /// offending segments. Passing this gate is the caller's cue to hand the
    /// batch to the metadata store.
    pub fn verify_task_locks_and_single_partition_set(
        &self,
        task_id: &TaskId,
        segments: &[DataSegment],
        allow_older_versions: bool,
    ) -> Result<()> {
        let locks = self.lockbox.find_locks_for_task(task_id);
        let uncovered: Vec<String> = segments
            .iter()
            .filter(|segment| {
                !locks
                    .iter()
                    .any(|lock| lock.covers(segment, allow_older_versions))
            })
            .map(DataSegment::descriptor)
            .collect();

        if !uncovered.is_empty() {
            warn!(
                task = %task_id,
                uncovered = uncovered.len(),
                "publish batch rejected: segments not covered by locks"
            );
            self.metrics.increment_coverage_failures();
            self.emit_rejection(EventKind::CoverageRejected, task_id, &uncovered);
            return Err(Error::SegmentsNotCovered {
                task_id: task_id.clone(),
                segments: uncovered,
            });
        }

        if !self.segments_are_from_same_partition_set(segments)? {
            let descriptors: Vec<String> =
                segments.iter().map(DataSegment::descriptor).collect();
            warn!(
                task = %task_id,
                segments = descriptors.len(),
                "publish batch rejected: mixed partition set"
            );
            self.metrics.increment_partition_set_failures();
            self.emit_rejection(EventKind::PartitionSetRejected, task_id, &descriptors);
            return Err(Error::MixedPartitionSet {
                segments: descriptors,
            });
        }

        self.metrics.increment_verified();
        debug!(task = %task_id, segments = segments.len(), "publish batch verified");
        Ok(())
    }

    fn emit_rejection(&self, kind: EventKind, task_id: &TaskId, descriptors: &[String]) {
        match Event::new(kind).with_task(task_id.clone()).with_data(descriptors) {
            Ok(event) => self.emitter.emit(&event),
            Err(err) => warn!(error = %err, "failed to encode rejection event"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
