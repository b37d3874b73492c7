//! Event output for external integrations.
//!
//! Lock traffic and publish-gate rejections are emitted as JSON lines to
//! stdout or a configured file. Events are a side channel: a failed write is
//! logged and dropped, it never fails the operation that produced it.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::task::TaskId;

pub const EVENT_SCHEMA_VERSION: &str = "varve.event.v1";

#[derive(Debug, Clone)]
pub enum EventDestination {
    Stdout,
    File(PathBuf),
}

impl EventDestination {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.and_then(|value| {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed == "-" {
                return Some(EventDestination::Stdout);
            }
            Some(EventDestination::File(PathBuf::from(trimmed)))
        })
    }

    pub fn open(&self) -> Result<EventSink> {
        match self {
            EventDestination::Stdout => Ok(EventSink::stdout()),
            EventDestination::File(path) => EventSink::file(path),
        }
    }
}

/// High-level event kinds emitted by the registry and the publish gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    LockGranted,
    LockConflicted,
    LockReleased,
    LockRevoked,
    CoverageRejected,
    PartitionSetRejected,
}

/// A structured event with optional payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub schema_version: &'static str,
    pub event: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Event {
    /// Build a new event.
    pub fn new(event: EventKind) -> Self {
        Self {
            schema_version: EVENT_SCHEMA_VERSION,
            event,
            timestamp: Utc::now(),
            service: None,
            host: None,
            task: None,
            data: None,
        }
    }

    /// Attach the task the event concerns.
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    /// Attach a serializable payload to the event.
    pub fn with_data<T: Serialize>(mut self, data: T) -> Result<Self> {
        self.data = Some(serde_json::to_value(data)?);
        Ok(self)
    }
}

/// Event sink that writes JSONL output to a destination.
pub struct EventSink {
    writer: Box<dyn Write + Send>,
}

impl EventSink {
    /// Emit events to stdout.
    pub fn stdout() -> Self {
        Self {
            writer: Box::new(std::io::stdout()),
        }
    }

    /// Emit events to a file, creating it if necessary.
    pub fn file(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self {
            writer: Box::new(file),
        })
    }

    /// Write a single event as JSONL.
    pub fn emit(&mut self, event: &Event) -> Result<()> {
        let serialized = serde_json::to_vec(event)?;
        self.writer.write_all(&serialized)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush().map_err(Error::Io)?;
        Ok(())
    }
}

// =============================================================================
// Emitter seam
// =============================================================================

/// Pluggable destination for registry and publish-gate events.
///
/// Implementations must swallow their own failures; event emission is never
/// allowed to fail a coordination operation.
pub trait Emitter: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Emitter that discards everything. The default when no destination is
/// configured, and the standard stand-in under test.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

impl Emitter for NoopEmitter {
    fn emit(&self, _event: &Event) {}
}

/// Emitter that stamps service identity onto each event and writes it
/// through a shared sink.
pub struct SinkEmitter {
    service: String,
    host: Option<String>,
    sink: Mutex<EventSink>,
}

impl SinkEmitter {
    pub fn new(service: impl Into<String>, host: Option<String>, sink: EventSink) -> Self {
        Self {
            service: service.into(),
            host,
            sink: Mutex::new(sink),
        }
    }
}

impl Emitter for SinkEmitter {
    fn emit(&self, event: &Event) {
        let mut stamped = event.clone();
        stamped.service = Some(self.service.clone());
        stamped.host = self.host.clone();

        // A poisoned sink mutex means another emit panicked mid-write; the
        // sink itself holds no state worth salvaging beyond the writer.
        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = sink.emit(&stamped) {
            tracing::warn!(error = %err, "failed to write event");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
