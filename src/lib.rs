//! DAU Pipeline - bounded batched queries and streaming aggregation
//!
//! Computes per-day active-user counts from a column store that spreads
//! each day's rows across hash buckets. This library provides:
//! - A batch executor that runs statements in chunks of bounded size
//! - Streaming delivery of each chunk's rows as soon as it completes
//! - A range planner that fans a date range out over day × bucket queries
//! - Per-day aggregation with explicit failure reporting
//! - An injectable session pool with scoped acquisition

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Session providers, pooling and an in-memory backend
pub mod store;

/// Statement batching, streaming execution and range planning
pub mod query;

/// Per-day aggregation of streamed partial counts
pub mod aggregate;

// Re-export main types
pub use aggregate::{DauAggregator, DauReport, RunningAggregate};
pub use config::{ConfigLoader, DeploymentContext, PipelineConfig};
pub use error::{Error, Result};
pub use types::{DayRange, ProductId, Row, Value};
