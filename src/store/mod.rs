//! Store access for the query pipeline
//!
//! The pipeline never opens connections itself. It consumes a
//! [`ConnectionProvider`] through a [`SessionPool`], which bounds how many
//! sessions are held at once and releases each one when its guard drops.
//!
//! # Example
//!
//! ```rust
//! use dau_pipeline::store::{InMemoryStore, PoolConfig, SessionPool};
//! use std::sync::Arc;
//!
//! let store = InMemoryStore::new();
//! let pool = SessionPool::new(Arc::new(store), PoolConfig::default()).unwrap();
//! assert!(!pool.is_closed());
//! ```

pub mod memory;
pub mod pool;
pub mod traits;

// Re-export main types
pub use memory::{FaultPlan, InMemoryStore};
pub use pool::{PoolConfig, PoolMetrics, PoolMetricsSnapshot, PooledSession, SessionPool};
pub use traits::{ConnectionProvider, Session};
