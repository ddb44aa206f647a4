//! Session pool with bounded acquisition and scoped release
//!
//! Provides a session pool for store operations with:
//! - Configurable pool size and acquire timeout
//! - Guards that release their slot on every exit path
//! - Explicit `init → serve → shutdown` lifecycle
//! - Acquisition metrics tracking
//!
//! # Example
//!
//! ```rust,no_run
//! use dau_pipeline::store::{InMemoryStore, PoolConfig, SessionPool};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PoolConfig::default()
//!     .pool_size(8)
//!     .acquire_timeout(Duration::from_secs(2));
//!
//! let pool = SessionPool::new(Arc::new(InMemoryStore::new()), config)?;
//!
//! // Session is released when the guard goes out of scope
//! let session = pool.get().await?;
//! drop(session);
//!
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```

use crate::config::StoreConfig;
use crate::error::{ConnectionError, Error, StoreError};
use crate::metrics;
use crate::query::statement::BoundStatement;
use crate::store::traits::{ConnectionProvider, Session};
use crate::types::Row;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// Configuration for the session pool
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Maximum number of sessions held at once
    /// Default: 16
    pub pool_size: u32,

    /// How long `get` waits for a free slot
    /// Default: 5 seconds
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 16,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&StoreConfig> for PoolConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            pool_size: config.pool_size,
            acquire_timeout: config.acquire_timeout(),
        }
    }
}

impl PoolConfig {
    /// Set the pool size
    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the acquire timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_size == 0 {
            return Err("Pool size must be greater than 0".to_string());
        }
        if self.pool_size > 1000 {
            return Err("Pool size cannot exceed 1000".to_string());
        }
        if self.acquire_timeout.is_zero() {
            return Err("Acquire timeout must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Session pool metrics
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Sessions handed out
    pub sessions_acquired: AtomicU64,

    /// Failed acquisitions (timeout, closed pool, provider error)
    pub acquire_failures: AtomicU64,

    /// Sessions currently checked out
    pub in_use: AtomicU64,

    /// Highest number of sessions checked out at once
    pub peak_in_use: AtomicU64,
}

impl PoolMetrics {
    fn record_acquired(&self) {
        self.sessions_acquired.fetch_add(1, Ordering::Relaxed);
        let now = self.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_use.fetch_max(now, Ordering::AcqRel);
        metrics::record_session(true);
    }

    fn record_failure(&self) {
        self.acquire_failures.fetch_add(1, Ordering::Relaxed);
        metrics::record_session(false);
    }

    fn record_released(&self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }

    /// Get a snapshot of the metrics
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            sessions_acquired: self.sessions_acquired.load(Ordering::Relaxed),
            acquire_failures: self.acquire_failures.load(Ordering::Relaxed),
            in_use: self.in_use.load(Ordering::Relaxed),
            peak_in_use: self.peak_in_use.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of pool metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    /// Sessions handed out during pool lifetime
    pub sessions_acquired: u64,
    /// Failed acquisitions during pool lifetime
    pub acquire_failures: u64,
    /// Sessions currently checked out
    pub in_use: u64,
    /// Highest concurrent checkout seen
    pub peak_in_use: u64,
}

/// Session pool
///
/// Bounds concurrently held sessions with a semaphore. Constructed once at
/// startup and passed explicitly to every pipeline that needs the store.
pub struct SessionPool {
    /// Backend that opens sessions
    provider: Arc<dyn ConnectionProvider>,

    /// Pool configuration
    config: PoolConfig,

    /// Acquisition metrics
    metrics: Arc<PoolMetrics>,

    /// Semaphore to limit concurrently held sessions
    semaphore: Arc<Semaphore>,
}

impl SessionPool {
    /// Create a new pool over `provider`
    ///
    /// No session is opened until the first `get`.
    pub fn new(provider: Arc<dyn ConnectionProvider>, config: PoolConfig) -> Result<Self, Error> {
        config.validate().map_err(Error::Configuration)?;
        metrics::init();

        let semaphore = Arc::new(Semaphore::new(config.pool_size as usize));

        info!(
            provider = provider.provider_id(),
            pool_size = config.pool_size,
            "Session pool initialized"
        );

        Ok(Self {
            provider,
            config,
            metrics: Arc::new(PoolMetrics::default()),
            semaphore,
        })
    }

    /// Create a pool sized and timed by the `[store]` config section
    pub fn from_config(
        provider: Arc<dyn ConnectionProvider>,
        config: &StoreConfig,
    ) -> Result<Self, Error> {
        Self::new(provider, PoolConfig::from(config))
    }

    /// Get a session from the pool
    ///
    /// Waits up to the configured acquire timeout for a free slot. The slot
    /// is returned when the guard is dropped.
    pub async fn get(&self) -> Result<PooledSession, ConnectionError> {
        let result = self.acquire().await;
        match &result {
            Ok(_) => self.metrics.record_acquired(),
            Err(e) => {
                self.metrics.record_failure();
                warn!(error = %e, "Session acquisition failed");
            },
        }
        result
    }

    async fn acquire(&self) -> Result<PooledSession, ConnectionError> {
        let permit = tokio::time::timeout(
            self.config.acquire_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        .map_err(|_| ConnectionError::Timeout(self.config.acquire_timeout))?
        .map_err(|_| ConnectionError::PoolClosed)?;

        let session = self.provider.acquire_session().await?;

        Ok(PooledSession {
            session,
            metrics: Arc::clone(&self.metrics),
            _permit: permit,
        })
    }

    /// Stop handing out sessions
    ///
    /// Sessions already checked out stay valid until dropped.
    pub fn shutdown(&self) {
        if !self.semaphore.is_closed() {
            self.semaphore.close();
            info!(provider = self.provider.provider_id(), "Session pool shut down");
        }
    }

    /// True once `shutdown` has been called
    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Pool configuration
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Acquisition metrics
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }
}

/// A session checked out of a [`SessionPool`]
pub struct PooledSession {
    session: Box<dyn Session>,
    metrics: Arc<PoolMetrics>,
    _permit: OwnedSemaphorePermit,
}

impl PooledSession {
    /// Execute statements on the underlying session
    pub async fn execute(&mut self, statements: &[BoundStatement]) -> Result<Vec<Row>, StoreError> {
        self.session.execute(statements).await
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        self.metrics.record_released();
        debug!("Session returned to pool");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn pool(size: u32, store: InMemoryStore) -> SessionPool {
        let config = PoolConfig::default()
            .pool_size(size)
            .acquire_timeout(Duration::from_millis(50));
        SessionPool::new(Arc::new(store), config).unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(PoolConfig::default().pool_size(0).validate().is_err());
        assert!(PoolConfig::default().pool_size(1001).validate().is_err());
        assert!(PoolConfig::default()
            .acquire_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_store_config() {
        let config = StoreConfig {
            pool_size: 3,
            acquire_timeout_ms: 250,
        };
        let pool = SessionPool::from_config(Arc::new(InMemoryStore::new()), &config).unwrap();
        assert_eq!(pool.config().pool_size, 3);
        assert_eq!(pool.config().acquire_timeout, Duration::from_millis(250));
        assert_eq!(pool.available(), 3);

        let zero = StoreConfig {
            pool_size: 0,
            ..StoreConfig::default()
        };
        assert!(SessionPool::from_config(Arc::new(InMemoryStore::new()), &zero).is_err());
    }

    #[tokio::test]
    async fn test_guard_releases_slot() {
        let pool = pool(2, InMemoryStore::new());
        {
            let _a = pool.get().await.unwrap();
            let _b = pool.get().await.unwrap();
            assert_eq!(pool.available(), 0);
            assert_eq!(pool.metrics().snapshot().in_use, 2);
        }
        assert_eq!(pool.available(), 2);
        assert_eq!(pool.metrics().snapshot().in_use, 0);
        assert_eq!(pool.metrics().snapshot().peak_in_use, 2);
    }

    #[tokio::test]
    async fn test_exhausted_pool_times_out() {
        let pool = pool(1, InMemoryStore::new());
        let _held = pool.get().await.unwrap();
        let err = pool.get().await.err().unwrap();
        assert!(matches!(err, ConnectionError::Timeout(_)));
        assert_eq!(pool.metrics().snapshot().acquire_failures, 1);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_sessions() {
        let pool = pool(2, InMemoryStore::new());
        pool.shutdown();
        assert!(pool.is_closed());
        let err = pool.get().await.err().unwrap();
        assert_eq!(err, ConnectionError::PoolClosed);
    }

    #[tokio::test]
    async fn test_provider_failure_releases_slot() {
        let store = InMemoryStore::new();
        store.set_available(false);
        let pool = pool(1, store);

        let err = pool.get().await.err().unwrap();
        assert!(matches!(err, ConnectionError::Unavailable(_)));
        assert_eq!(pool.available(), 1);
    }
}
