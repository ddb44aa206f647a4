//! Bounded batched-query execution
//!
//! Turns a list of parameter sets into store requests of bounded size and
//! streams their rows back chunk by chunk.
//!
//! # Architecture
//!
//! ```text
//! RangePlanner            (product, [from, to), buckets)
//!      │  one executor per day
//!      ▼
//! ┌──────────────────┐
//! │  BatchExecutor   │  StatementSet → chunks of ≤ max_batch_size
//! └──────────────────┘
//!      │  one request per chunk, scoped session
//!      ▼
//! ┌──────────────────┐
//! │ StreamingPipeline│  handler(&PartialResult) per chunk, FIFO
//! └──────────────────┘
//!      │  partial sums
//!      ▼
//! DauAggregator           RunningAggregate per day
//! ```
//!
//! # Example
//!
//! ```rust
//! use dau_pipeline::query::{BatchExecutor, ExecutorConfig, QueryTemplate};
//! use dau_pipeline::store::{InMemoryStore, PoolConfig, SessionPool};
//! use std::sync::Arc;
//!
//! # fn main() -> dau_pipeline::Result<()> {
//! let pool = Arc::new(SessionPool::new(Arc::new(InMemoryStore::new()), PoolConfig::default())?);
//! let mut executor = BatchExecutor::new(
//!     pool,
//!     QueryTemplate::daily_user_count("user_activity_by_day"),
//!     ExecutorConfig::new().with_max_batch_size(32),
//! )?;
//! executor.add_statement(vec!["p1".into(), 7i64.into(), 0i64.into()])?;
//! assert_eq!(executor.planned_chunks(), 1);
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod planner;
pub mod statement;
pub mod stream;

// Re-export main types
pub use executor::{BatchExecutor, ExecutorConfig, PartialResult};
pub use planner::{DayOutcome, DayPlan, RangePlanner, COUNT_COLUMN};
pub use statement::{BoundStatement, QueryTemplate, StatementSet};
pub use stream::{PartialResultStream, StreamSummary, StreamingPipeline};
