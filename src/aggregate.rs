//! Daily active user aggregation
//!
//! [`DauAggregator`] turns a product and a date range into one total per
//! day. Each day owns a [`RunningAggregate`] that only its own count
//! handler mutates, so days can run concurrently without locking; the
//! session pool is the only thing they share.
//!
//! A day whose pipeline fails is reported in [`DauReport::failures`] and
//! has no total. A failed day never shows up as zero or as the sum of the
//! chunks that happened to finish before the error.
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::NaiveDate;
//! use dau_pipeline::aggregate::DauAggregator;
//! use dau_pipeline::query::RangePlanner;
//! use dau_pipeline::types::ProductId;
//!
//! # async fn example(planner: RangePlanner) -> dau_pipeline::Result<()> {
//! let aggregator = DauAggregator::new(planner).with_day_parallelism(4);
//! let from = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
//! let to = NaiveDate::from_ymd_opt(2023, 2, 1).unwrap();
//!
//! let report = aggregator.compute_total(&ProductId::from("p1"), from, to).await?;
//! for (day, total) in &report.totals {
//!     println!("{day}: {total}");
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::query::planner::RangePlanner;
use crate::store::{ConnectionProvider, SessionPool};
use crate::types::{DayRange, ProductId};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-day accumulator of partial counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningAggregate {
    day: NaiveDate,
    total: u64,
    partials: usize,
}

impl RunningAggregate {
    /// Start at zero for `day`
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            total: 0,
            partials: 0,
        }
    }

    /// Fold in one chunk's partial sum
    pub fn add(&mut self, partial: u64) {
        self.total = self.total.saturating_add(partial);
        self.partials += 1;
    }

    /// Day being aggregated
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Sum so far
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Partial sums folded in so far
    pub fn partials(&self) -> usize {
        self.partials
    }
}

/// Per-day totals and failures for one range
#[derive(Debug, Default)]
pub struct DauReport {
    /// Days whose pipeline completed, with their totals
    pub totals: BTreeMap<NaiveDate, u64>,
    /// Days whose pipeline failed, with the error that stopped them
    pub failures: BTreeMap<NaiveDate, Error>,
}

impl DauReport {
    /// Total for `day`, absent when the day failed or is out of range
    pub fn total(&self, day: NaiveDate) -> Option<u64> {
        self.totals.get(&day).copied()
    }

    /// Error for `day`, if its pipeline failed
    pub fn failure(&self, day: NaiveDate) -> Option<&Error> {
        self.failures.get(&day)
    }

    /// True when no day failed
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Days covered, failed or not
    pub fn day_count(&self) -> usize {
        self.totals.len() + self.failures.len()
    }

    /// Sum over all days, only when every day succeeded
    pub fn grand_total(&self) -> Option<u64> {
        self.is_complete()
            .then(|| self.totals.values().copied().sum())
    }
}

/// Computes daily active users per day over a range
pub struct DauAggregator {
    planner: RangePlanner,
    day_parallelism: usize,
}

impl DauAggregator {
    /// Create an aggregator processing one day at a time
    pub fn new(planner: RangePlanner) -> Self {
        Self {
            planner,
            day_parallelism: 1,
        }
    }

    /// Build the session pool and planner from loaded configuration
    ///
    /// The pool is sized by `[store]`, so `pool_size` bounds the sessions
    /// held across all concurrent days.
    pub fn from_config(
        provider: Arc<dyn ConnectionProvider>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let pool = Arc::new(SessionPool::from_config(provider, &config.store)?);
        let planner = RangePlanner::from_config(pool, config)?;
        Ok(Self::new(planner).with_day_parallelism(config.execution.day_parallelism))
    }

    /// Run up to `n` days concurrently
    pub fn with_day_parallelism(mut self, n: usize) -> Self {
        self.day_parallelism = n.max(1);
        self
    }

    /// Days run concurrently
    pub fn day_parallelism(&self) -> usize {
        self.day_parallelism
    }

    /// Planner used for each day
    pub fn planner(&self) -> &RangePlanner {
        &self.planner
    }

    /// Count one day from its own running aggregate
    pub async fn compute_day(&self, product: &ProductId, day: NaiveDate) -> Result<u64> {
        let mut aggregate = RunningAggregate::new(day);
        let result = self
            .planner
            .stream_day(product, day, |partial| aggregate.add(partial))
            .await;
        metrics::record_day(result.is_ok());
        result.map(|_| aggregate.total())
    }

    /// Total per day for `[from, to_exclusive)`
    ///
    /// Only an inverted range is an error. Per-day failures land in the
    /// report; the other days are still computed.
    pub async fn compute_total(
        &self,
        product: &ProductId,
        from: NaiveDate,
        to_exclusive: NaiveDate,
    ) -> Result<DauReport> {
        let range = DayRange::new(from, to_exclusive)?;
        info!(
            %product,
            %range,
            parallelism = self.day_parallelism,
            "Computing daily active users"
        );

        let outcomes: Vec<(NaiveDate, Result<u64>)> = stream::iter(range.days())
            .map(|day| async move { (day, self.compute_day(product, day).await) })
            .buffer_unordered(self.day_parallelism)
            .collect()
            .await;

        let mut report = DauReport::default();
        for (day, outcome) in outcomes {
            match outcome {
                Ok(total) => {
                    report.totals.insert(day, total);
                },
                Err(e) => {
                    warn!(
                        %product,
                        %day,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Day excluded from report"
                    );
                    report.failures.insert(day, e);
                },
            }
        }

        info!(
            %product,
            days = report.totals.len(),
            failed = report.failures.len(),
            "Daily active users computed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;
    use crate::query::executor::ExecutorConfig;
    use crate::query::statement::QueryTemplate;
    use crate::store::{FaultPlan, InMemoryStore, PoolConfig};
    use std::time::Duration;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    fn aggregator(store: &InMemoryStore, max_batch_size: usize, buckets: u32) -> DauAggregator {
        let pool = SessionPool::new(Arc::new(store.clone()), PoolConfig::default()).unwrap();
        let planner = RangePlanner::new(
            Arc::new(pool),
            QueryTemplate::daily_user_count("t"),
            ExecutorConfig::new().with_max_batch_size(max_batch_size),
            buckets,
        )
        .unwrap();
        DauAggregator::new(planner)
    }

    #[test]
    fn test_running_aggregate() {
        let mut agg = RunningAggregate::new(day(1));
        agg.add(3);
        agg.add(0);
        agg.add(4);
        assert_eq!(agg.total(), 7);
        assert_eq!(agg.partials(), 3);
    }

    #[test]
    fn test_report_grand_total_requires_all_days() {
        let mut report = DauReport::default();
        report.totals.insert(day(1), 5);
        report.totals.insert(day(2), 6);
        assert_eq!(report.grand_total(), Some(11));

        report
            .failures
            .insert(day(3), Error::Configuration("x".to_string()));
        assert_eq!(report.grand_total(), None);
        assert_eq!(report.day_count(), 3);
    }

    #[tokio::test]
    async fn test_compute_total_per_day() {
        let store = InMemoryStore::new();
        store.insert_day("p1", day(1), &[3, 1, 0, 2]);
        store.insert_day("p1", day(2), &[1, 1, 1, 1]);
        store.insert_day("p2", day(1), &[100, 100, 100, 100]);

        let report = aggregator(&store, 32, 4)
            .compute_total(&ProductId::from("p1"), day(1), day(3))
            .await
            .unwrap();

        assert_eq!(report.total(day(1)), Some(6));
        assert_eq!(report.total(day(2)), Some(4));
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_failed_day_has_no_total() {
        let store = InMemoryStore::new();
        store.insert_day("p1", day(1), &[1, 1, 1, 1, 1, 1]);
        store.set_faults(FaultPlan::default().fail_request(2));

        let report = aggregator(&store, 2, 6)
            .compute_total(&ProductId::from("p1"), day(1), day(2))
            .await
            .unwrap();

        assert_eq!(report.total(day(1)), None);
        assert!(report.failure(day(1)).is_some());
    }

    #[tokio::test]
    async fn test_parallel_days_bounded_by_pool() {
        let store = InMemoryStore::new();
        for d in 1..=8 {
            store.insert_day("p1", day(d), &[d as i64; 4]);
        }
        let aggregator = aggregator(&store, 1, 4).with_day_parallelism(3);

        let report = aggregator
            .compute_total(&ProductId::from("p1"), day(1), day(9))
            .await
            .unwrap();

        for d in 1..=8u32 {
            assert_eq!(report.total(day(d)), Some(u64::from(d) * 4));
        }
        assert!(store.peak_sessions() <= 3);
    }

    #[tokio::test]
    async fn test_configured_pool_size_bounds_sessions() {
        let store = InMemoryStore::new();
        for d in 1..=4 {
            store.insert_day("p1", day(d), &[1, 2]);
        }
        store.set_faults(FaultPlan::default().latency(Duration::from_millis(20)));

        let mut config = PipelineConfig::default();
        config.store.pool_size = 1;
        config.query.bucket_count = 2;
        config.execution.day_parallelism = 4;

        let aggregator = DauAggregator::from_config(Arc::new(store.clone()), &config).unwrap();
        let report = aggregator
            .compute_total(&ProductId::from("p1"), day(1), day(5))
            .await
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.totals.values().sum::<u64>(), 12);
        assert_eq!(store.peak_sessions(), 1);
    }

    #[tokio::test]
    async fn test_configured_acquire_timeout_fails_waiting_days() {
        let store = InMemoryStore::new();
        store.insert_day("p1", day(1), &[1]);
        store.insert_day("p1", day(2), &[1]);
        store.set_faults(FaultPlan::default().latency(Duration::from_millis(200)));

        let mut config = PipelineConfig::default();
        config.store.pool_size = 1;
        config.store.acquire_timeout_ms = 20;
        config.query.bucket_count = 1;
        config.execution.day_parallelism = 2;

        let report = DauAggregator::from_config(Arc::new(store), &config)
            .unwrap()
            .compute_total(&ProductId::from("p1"), day(1), day(3))
            .await
            .unwrap();

        assert_eq!(report.totals.len(), 1);
        assert!(report
            .failures
            .values()
            .all(|e| matches!(e, Error::Connection(ConnectionError::Timeout(_)))));
        assert_eq!(report.failures.len(), 1);
    }
}
