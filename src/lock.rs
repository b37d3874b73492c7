//! Task locks
//!
//! A lock is a task's claim on a (dataset, interval, version) range. The
//! interval and version never change after acquisition; the only mutable part
//! is the state flag, which flips to `Revoked` when the lock is forcibly taken
//! away. A revoked lock stays visible in the registry's internal table until
//! released, but it covers nothing and blocks nobody.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::interval::Interval;
use crate::segment::DataSegment;
use crate::task::TaskId;
use crate::version::Version;

/// Current state of a lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockState {
    /// Lock is held and enforceable
    Active,
    /// Lock was forcibly revoked; it no longer authorizes anything
    Revoked,
}

impl Default for LockState {
    fn default() -> Self {
        LockState::Active
    }
}

/// A task's claim on a (dataset, interval, version) range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLock {
    /// Unique identifier
    pub id: Uuid,

    /// Task holding the lock
    pub task_id: TaskId,

    /// Dataset the lock applies to
    pub dataset: String,

    /// Event-time range the lock reserves
    pub interval: Interval,

    /// Version the task will stamp on segments it publishes under this lock
    pub version: Version,

    /// Current state
    pub state: LockState,

    /// Acquisition timestamp
    pub acquired_at: DateTime<Utc>,
}

impl TaskLock {
    /// Create a fresh active lock
    pub fn new(
        task_id: TaskId,
        dataset: impl Into<String>,
        interval: Interval,
        version: impl Into<Version>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            dataset: dataset.into(),
            interval,
            version: version.into(),
            state: LockState::Active,
            acquired_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == LockState::Active
    }

    /// Flip the lock to the revoked state
    pub fn revoke(&mut self) {
        self.state = LockState::Revoked;
    }

    /// Check whether this lock authorizes publishing the given segment
    ///
    /// Requires an active lock on the segment's dataset whose interval
    /// contains the segment's interval. The version must match the lock's
    /// exactly, or be older than or equal to it when `allow_older_versions`
    /// is set; a segment newer than the lock is never covered.
    pub fn covers(&self, segment: &DataSegment, allow_older_versions: bool) -> bool {
        if !self.is_active() {
            return false;
        }

        let version_ok = if allow_older_versions {
            self.version >= segment.version
        } else {
            self.version == segment.version
        };

        version_ok
            && self.dataset == segment.dataset
            && self.interval.contains(&segment.interval)
    }
}
