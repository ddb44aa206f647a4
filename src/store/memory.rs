//! In-memory store backend
//!
//! Holds per-bucket user counts keyed by `(pid, day, bucketID_day)` and
//! answers the daily count statement the way the real table would: one row
//! with a `count` column per statement.
//!
//! Intended for:
//! - **Unit and integration testing** without a running store
//! - **Benchmarking** the pipeline's own overhead
//!
//! Failures can be injected through a [`FaultPlan`] to exercise the
//! pipeline's error paths.
//!
//! # Warning
//!
//! Statements are interpreted positionally as `(pid, day, bucket)`; the
//! query text is not parsed.

use crate::error::{ConnectionError, StoreError};
use crate::query::statement::BoundStatement;
use crate::store::traits::{ConnectionProvider, Session};
use crate::types::{Row, Value};
use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Failures to inject into an [`InMemoryStore`]
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// 1-based request numbers (across all sessions) that fail
    pub fail_requests: HashSet<u64>,

    /// Any request touching one of these days fails
    pub fail_days: HashSet<NaiveDate>,

    /// Delay applied to every request
    pub latency: Option<Duration>,
}

impl FaultPlan {
    /// Fail the `n`th request (1-based)
    pub fn fail_request(mut self, n: u64) -> Self {
        self.fail_requests.insert(n);
        self
    }

    /// Fail every request that touches `day`
    pub fn fail_day(mut self, day: NaiveDate) -> Self {
        self.fail_days.insert(day);
        self
    }

    /// Delay every request by `latency`
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

type BucketKey = (String, NaiveDate, i64);

#[derive(Default)]
struct MemoryInner {
    counts: RwLock<HashMap<BucketKey, i64>>,
    faults: RwLock<FaultPlan>,
    uninitialized: AtomicBool,
    unavailable: AtomicBool,
    requests: AtomicU64,
    request_sizes: Mutex<Vec<usize>>,
    open_sessions: AtomicUsize,
    peak_sessions: AtomicUsize,
}

/// In-memory store keyed by `(pid, day, bucket)`
///
/// Cloning is cheap and shares the underlying data.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<MemoryInner>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that refuses sessions until [`initialize`](Self::initialize)
    pub fn uninitialized() -> Self {
        let store = Self::default();
        store.inner.uninitialized.store(true, Ordering::SeqCst);
        store
    }

    /// Mark the store ready to hand out sessions
    pub fn initialize(&self) {
        self.inner.uninitialized.store(false, Ordering::SeqCst);
    }

    /// Set the user count stored for one bucket of one day
    pub fn insert_count(&self, pid: &str, day: NaiveDate, bucket: u32, count: i64) {
        self.inner
            .counts
            .write()
            .insert((pid.to_string(), day, i64::from(bucket)), count);
    }

    /// Seed one day from a slice of per-bucket counts (index = bucket)
    pub fn insert_day(&self, pid: &str, day: NaiveDate, counts: &[i64]) {
        let mut guard = self.inner.counts.write();
        for (bucket, count) in counts.iter().enumerate() {
            guard.insert((pid.to_string(), day, bucket as i64), *count);
        }
    }

    /// Sum of every stored count for `pid` on `day`
    pub fn reference_total(&self, pid: &str, day: NaiveDate) -> i64 {
        self.inner
            .counts
            .read()
            .iter()
            .filter(|((p, d, _), _)| p == pid && *d == day)
            .map(|(_, c)| *c)
            .sum()
    }

    /// Replace the fault plan
    pub fn set_faults(&self, plan: FaultPlan) {
        *self.inner.faults.write() = plan;
    }

    /// Toggle reachability; when unavailable, session acquisition fails
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Number of requests executed so far, failed ones included
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::SeqCst)
    }

    /// Statement count of every successful request, in execution order
    pub fn request_sizes(&self) -> Vec<usize> {
        self.inner.request_sizes.lock().clone()
    }

    /// Highest number of simultaneously open sessions
    pub fn peak_sessions(&self) -> usize {
        self.inner.peak_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionProvider for InMemoryStore {
    fn provider_id(&self) -> &str {
        "in-memory"
    }

    async fn acquire_session(&self) -> Result<Box<dyn Session>, ConnectionError> {
        if self.inner.uninitialized.load(Ordering::SeqCst) {
            return Err(ConnectionError::NotInitialized);
        }
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(ConnectionError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        let open = self.inner.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak_sessions.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemorySession {
    inner: Arc<MemoryInner>,
}

impl MemorySession {
    fn lookup(&self, statement: &BoundStatement) -> Result<Row, StoreError> {
        let key = match statement.params() {
            [Value::Text(pid), Value::Date(day), Value::Int(bucket)] => {
                (pid.clone(), *day, *bucket)
            },
            other => {
                return Err(StoreError::new(format!(
                    "unsupported parameter shape: {:?}",
                    other
                )))
            },
        };
        let count = self.inner.counts.read().get(&key).copied().unwrap_or(0);
        Ok(Row::new().with("count", count))
    }

    fn check_faults(&self, request: u64, statements: &[BoundStatement]) -> Result<(), StoreError> {
        let faults = self.inner.faults.read();
        if faults.fail_requests.contains(&request) {
            return Err(StoreError::new(format!("injected failure on request {}", request)));
        }
        let hits_failed_day = statements.iter().any(|s| {
            s.params()
                .iter()
                .filter_map(Value::as_date)
                .any(|d| faults.fail_days.contains(&d))
        });
        if hits_failed_day {
            return Err(StoreError::new("injected failure for day"));
        }
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn execute(&mut self, statements: &[BoundStatement]) -> Result<Vec<Row>, StoreError> {
        let request = self.inner.requests.fetch_add(1, Ordering::SeqCst) + 1;

        let latency = self.inner.faults.read().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        self.check_faults(request, statements)?;

        let rows = statements
            .iter()
            .map(|s| self.lookup(s))
            .collect::<Result<Vec<_>, _>>()?;

        self.inner.request_sizes.lock().push(statements.len());
        Ok(rows)
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::statement::QueryTemplate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    fn statement(bucket: u32) -> BoundStatement {
        QueryTemplate::daily_user_count("t")
            .bind(vec!["p1".into(), day(1).into(), bucket.into()])
            .unwrap()
    }

    #[tokio::test]
    async fn test_lookup_returns_one_row_per_statement() {
        let store = InMemoryStore::new();
        store.insert_day("p1", day(1), &[3, 1, 0, 2]);

        let mut session = store.acquire_session().await.unwrap();
        let rows = session
            .execute(&[statement(0), statement(3), statement(9)])
            .await
            .unwrap();

        let counts: Vec<i64> = rows.iter().map(|r| r.get_i64("count").unwrap()).collect();
        assert_eq!(counts, vec![3, 2, 0]);
        assert_eq!(store.reference_total("p1", day(1)), 6);
    }

    #[tokio::test]
    async fn test_injected_request_failure() {
        let store = InMemoryStore::new();
        store.set_faults(FaultPlan::default().fail_request(2));

        let mut session = store.acquire_session().await.unwrap();
        assert!(session.execute(&[statement(0)]).await.is_ok());
        assert!(session.execute(&[statement(0)]).await.is_err());
        assert!(session.execute(&[statement(0)]).await.is_ok());
        assert_eq!(store.request_count(), 3);
        assert_eq!(store.request_sizes(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_session_tracking() {
        let store = InMemoryStore::new();
        let a = store.acquire_session().await.unwrap();
        let b = store.acquire_session().await.unwrap();
        drop(a);
        drop(b);
        assert_eq!(store.peak_sessions(), 2);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = InMemoryStore::new();
        store.set_available(false);
        assert!(store.acquire_session().await.is_err());
    }

    #[tokio::test]
    async fn test_uninitialized_until_initialize() {
        let store = InMemoryStore::uninitialized();
        assert_eq!(
            store.acquire_session().await.err(),
            Some(ConnectionError::NotInitialized)
        );

        store.initialize();
        assert!(store.acquire_session().await.is_ok());
    }
}
