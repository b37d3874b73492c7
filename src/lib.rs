//! varve - Task Lock Coordination Library
//!
//! This library is the concurrency-safety layer of a data-ingestion service:
//! it decides which concurrently running tasks may write to a given slice of
//! a dataset's timeline, and validates publish batches against the locks a
//! task holds before anything reaches durable metadata storage.
//!
//! # Core Concepts
//!
//! - **Intervals**: Half-open `[start, end)` ranges of event time
//! - **Versions**: Opaque, lexicographically ordered recency markers
//! - **Task Locks**: A task's exclusive claim on a (dataset, interval, version)
//! - **Segments**: Immutable published units; equal (dataset, interval, version)
//!   triples form a partition set
//! - **Publish Gate**: Lock-coverage plus partition-set validation before commit
//!
//! # Module Organization
//!
//! - `config`: Configuration loading from TOML
//! - `error`: Error types and result aliases
//! - `events`: Structured JSONL events and the emitter seam
//! - `interval`: Half-open time intervals
//! - `lock`: Task lock values and the coverage predicate
//! - `lockbox`: In-memory lock registry, sharded by dataset
//! - `metrics`: Counters for lock and validation traffic
//! - `segment`: Published segment values and partition-set identity
//! - `task`: Task identity
//! - `toolbox`: Publish-gate validation over the registry
//! - `version`: Opaque version markers

pub mod config;
pub mod error;
pub mod events;
pub mod interval;
pub mod lock;
pub mod lockbox;
pub mod metrics;
pub mod segment;
pub mod task;
pub mod toolbox;
pub mod version;

pub use error::{Error, Result};
