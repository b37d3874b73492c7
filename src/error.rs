//! Error types for varve
//!
//! Error categories, used by embedding services to decide task fate:
//! - InvalidInput: caller contract violations (bad arguments, malformed intervals)
//! - Validation: publish-gate failures (uncovered segments, mixed partition sets)
//! - Infrastructure: IO and encoding failures from the ambient machinery
//!
//! Lock acquisition conflicts are NOT errors; they are ordinary values
//! (`lockbox::LockAttempt::Conflicted`) because contention is expected traffic.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::task::TaskId;

/// Coarse error grouping for callers that route on outcome rather than variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input from the caller
    InvalidInput,
    /// A publish batch failed validation
    Validation,
    /// IO or encoding failure in the surrounding plumbing
    Infrastructure,
}

/// Main error type for varve operations
#[derive(Error, Debug)]
pub enum Error {
    // Invalid input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid interval: end {end} precedes start {start}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid interval '{0}'. Expected: <start>/<end> in RFC 3339")]
    ParseInterval(String),

    #[error("Invalid timestamp '{0}'. Expected RFC 3339")]
    ParseTimestamp(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Validation failures
    #[error("Segments not covered by locks for task {task_id}: [{}]", .segments.join(", "))]
    SegmentsNotCovered {
        task_id: TaskId,
        segments: Vec<String>,
    },

    #[error("Segments are not in the same partition set: [{}]", .segments.join(", "))]
    MixedPartitionSet { segments: Vec<String> },

    // Infrastructure failures
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    /// Get the category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidArgument(_)
            | Error::InvalidInterval { .. }
            | Error::ParseInterval(_)
            | Error::ParseTimestamp(_)
            | Error::InvalidConfig(_) => ErrorCategory::InvalidInput,

            Error::SegmentsNotCovered { .. } | Error::MixedPartitionSet { .. } => {
                ErrorCategory::Validation
            }

            Error::Io(_) | Error::Json(_) | Error::TomlParse(_) | Error::TomlSerialize(_) => {
                ErrorCategory::Infrastructure
            }
        }
    }
}

/// Result type alias for varve operations
pub type Result<T> = std::result::Result<T, Error>;
