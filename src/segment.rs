//! Published data segments
//!
//! A segment is the immutable unit a task hands to the metadata store: one
//! partition of one (dataset, interval, version) slice of a dataset. All
//! segments sharing that triple form a partition set, and a publish batch is
//! required to stay inside a single partition set.

use serde::{Deserialize, Serialize};

use crate::interval::Interval;
use crate::version::Version;

/// One immutable partition of a (dataset, interval, version) slice
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataSegment {
    /// Dataset the segment belongs to
    pub dataset: String,

    /// Event-time range the segment holds data for
    pub interval: Interval,

    /// Recency marker of the slice this segment is part of
    pub version: Version,

    /// Partition number within the partition set
    pub partition: u32,
}

impl DataSegment {
    pub fn new(
        dataset: impl Into<String>,
        interval: Interval,
        version: impl Into<Version>,
        partition: u32,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            interval,
            version: version.into(),
            partition,
        }
    }

    /// Canonical identifier: `dataset_start_end_version`, with `_partition`
    /// appended only for partitions above zero
    pub fn descriptor(&self) -> String {
        use chrono::SecondsFormat;

        let mut descriptor = format!(
            "{}_{}_{}_{}",
            self.dataset,
            self.interval.start().to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.interval.end().to_rfc3339_opts(SecondsFormat::AutoSi, true),
            self.version
        );
        if self.partition > 0 {
            descriptor.push('_');
            descriptor.push_str(&self.partition.to_string());
        }
        descriptor
    }

    /// Check whether two segments belong to the same partition set
    ///
    /// Compares (dataset, interval, version); the partition number is
    /// deliberately left out, that is the axis partition sets span.
    pub fn same_partition_set(&self, other: &DataSegment) -> bool {
        self.dataset == other.dataset
            && self.interval == other.interval
            && self.version == other.version
    }
}
