use std::sync::Arc;

use varve::events::{Emitter, NoopEmitter};
use varve::interval::Interval;
use varve::lockbox::TaskLockbox;
use varve::metrics::CoordinationMetrics;
use varve::segment::DataSegment;
use varve::task::TaskId;
use varve::toolbox::TaskActionToolbox;
use varve::version::Version;

pub const JAN: &str = "2020-01-01T00:00:00Z/2020-02-01T00:00:00Z";
pub const MID_JAN: &str = "2020-01-10T00:00:00Z/2020-01-20T00:00:00Z";
pub const FEB: &str = "2020-02-01T00:00:00Z/2020-03-01T00:00:00Z";

pub fn interval(raw: &str) -> Interval {
    raw.parse().expect("interval")
}

pub fn task(name: &str) -> TaskId {
    TaskId::from(name)
}

pub fn version(raw: &str) -> Version {
    Version::from(raw)
}

pub fn segment(dataset: &str, interval_raw: &str, version_raw: &str, partition: u32) -> DataSegment {
    DataSegment::new(dataset, interval(interval_raw), version_raw, partition)
}

/// Toolbox over a fresh registry with quiet observability.
///
/// Registry and toolbox share one metrics instance, the same wiring
/// `TaskActionToolbox::from_config` produces.
pub fn toolbox() -> TaskActionToolbox {
    let emitter: Arc<dyn Emitter> = Arc::new(NoopEmitter);
    let metrics = Arc::new(CoordinationMetrics::new());
    let lockbox = Arc::new(TaskLockbox::with_observability(
        Arc::clone(&emitter),
        Arc::clone(&metrics),
    ));
    TaskActionToolbox::new(lockbox, emitter, metrics)
}
