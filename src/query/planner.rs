//! Range Planner - fans a date range out over hash buckets
//!
//! The activity table spreads each day's rows over `bucket_count` hash
//! buckets (`bucketID_day`) so no single partition grows too large.
//! Counting one day therefore takes one statement per bucket:
//!
//! ```text
//! (product, [from, to), n)
//!         │
//!         ▼
//!   day d0 ── (p, d0, 0) (p, d0, 1) … (p, d0, n-1) ──► BatchExecutor(d0)
//!   day d1 ── (p, d1, 0) (p, d1, 1) … (p, d1, n-1) ──► BatchExecutor(d1)
//!   …
//! ```
//!
//! Every day gets its own executor, so a day is the unit of aggregation
//! and of failure. Within a day the handler receives one partial sum per
//! executed chunk, not one per bucket.

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::query::executor::{BatchExecutor, ExecutorConfig};
use crate::query::statement::QueryTemplate;
use crate::query::stream::{StreamSummary, StreamingPipeline};
use crate::store::SessionPool;
use crate::types::{DayRange, ProductId, Value};
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Column the count template returns
pub const COUNT_COLUMN: &str = "count";

/// Statements needed to count one day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayPlan {
    /// Day being counted
    pub day: NaiveDate,
    /// Buckets the day is spread across
    pub bucket_count: u32,
}

impl DayPlan {
    /// `(day, bucket)` tuples in bucket order
    pub fn tuples(&self) -> impl Iterator<Item = (NaiveDate, u32)> {
        let day = self.day;
        (0..self.bucket_count).map(move |bucket| (day, bucket))
    }

    /// Positional parameters `(pid, day, bucket)` for each bucket
    pub fn parameters<'a>(
        &'a self,
        product: &'a ProductId,
    ) -> impl Iterator<Item = Vec<Value>> + 'a {
        self.tuples()
            .map(move |(day, bucket)| vec![Value::from(product), day.into(), bucket.into()])
    }
}

/// Result of one day's pipeline
#[derive(Debug)]
pub struct DayOutcome {
    /// Day the pipeline counted
    pub day: NaiveDate,
    /// Delivery summary, or the error that stopped the day
    pub result: Result<StreamSummary>,
}

impl DayOutcome {
    /// True when every chunk of the day was delivered
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Expands `(product, range)` into per-day bucket queries and streams them
pub struct RangePlanner {
    pool: Arc<SessionPool>,
    template: QueryTemplate,
    executor_config: ExecutorConfig,
    bucket_count: u32,
}

impl RangePlanner {
    /// Create a planner
    ///
    /// The template must take exactly `(pid, day, bucket)`.
    pub fn new(
        pool: Arc<SessionPool>,
        template: QueryTemplate,
        executor_config: ExecutorConfig,
        bucket_count: u32,
    ) -> Result<Self> {
        if bucket_count == 0 {
            return Err(Error::Configuration("bucket_count must be > 0".to_string()));
        }
        if template.placeholders() != 3 {
            return Err(Error::Configuration(format!(
                "count template must take (pid, day, bucket), found {} placeholders",
                template.placeholders()
            )));
        }
        executor_config.validate()?;

        Ok(Self {
            pool,
            template,
            executor_config,
            bucket_count,
        })
    }

    /// Build a planner from loaded configuration
    pub fn from_config(pool: Arc<SessionPool>, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Self::new(
            pool,
            QueryTemplate::new(config.query.template_text()),
            ExecutorConfig::from(&config.execution),
            config.query.bucket_count,
        )
    }

    /// Buckets per day
    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    /// Executor settings each day's executor is created with
    pub fn executor_config(&self) -> &ExecutorConfig {
        &self.executor_config
    }

    /// One plan per day in ascending order
    pub fn plan(&self, range: DayRange) -> Vec<DayPlan> {
        range
            .days()
            .map(|day| DayPlan {
                day,
                bucket_count: self.bucket_count,
            })
            .collect()
    }

    /// Fresh executor holding every bucket statement for `day`
    pub fn build_executor(&self, product: &ProductId, day: NaiveDate) -> Result<BatchExecutor> {
        let plan = DayPlan {
            day,
            bucket_count: self.bucket_count,
        };
        let mut executor = BatchExecutor::new(
            Arc::clone(&self.pool),
            self.template.clone(),
            self.executor_config.clone(),
        )?;
        for params in plan.parameters(product) {
            executor.add_statement(params)?;
        }
        Ok(executor)
    }

    /// Count one day, calling `count_handler` with each chunk's partial sum
    pub async fn stream_day<F>(
        &self,
        product: &ProductId,
        day: NaiveDate,
        mut count_handler: F,
    ) -> Result<StreamSummary>
    where
        F: FnMut(u64),
    {
        let executor = self.build_executor(product, day)?;
        debug!(
            %product,
            %day,
            statements = executor.pending(),
            chunks = executor.planned_chunks(),
            "Streaming day"
        );

        let mut pipeline = StreamingPipeline::new(executor);
        pipeline
            .stream(|partial| {
                let sum = partial.sum_counts(COUNT_COLUMN)?;
                count_handler(sum);
                Ok(())
            })
            .await
    }

    /// Count every day in `[from, to_exclusive)`
    ///
    /// Days run in ascending order, each on its own executor. The handler
    /// gets `(day, partial_sum)` once per executed chunk. A failed day does
    /// not stop the days after it; its outcome carries the error.
    pub async fn plan_and_stream<F>(
        &self,
        product: &ProductId,
        from: NaiveDate,
        to_exclusive: NaiveDate,
        mut count_handler: F,
    ) -> Result<Vec<DayOutcome>>
    where
        F: FnMut(NaiveDate, u64),
    {
        let range = DayRange::new(from, to_exclusive)?;
        info!(%product, %range, buckets = self.bucket_count, "Planning range");

        let mut outcomes = Vec::with_capacity(range.len_days());
        for plan in self.plan(range) {
            let day = plan.day;
            let result = self
                .stream_day(product, day, |sum| count_handler(day, sum))
                .await;
            metrics::record_day(result.is_ok());
            if let Err(e) = &result {
                warn!(%product, %day, error = %e, "Day pipeline failed");
            }
            outcomes.push(DayOutcome { day, result });
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FaultPlan, InMemoryStore, PoolConfig};
    use std::collections::HashSet;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 1, d).unwrap()
    }

    fn planner(store: &InMemoryStore, max_batch_size: usize, buckets: u32) -> RangePlanner {
        let pool = SessionPool::new(Arc::new(store.clone()), PoolConfig::default()).unwrap();
        RangePlanner::new(
            Arc::new(pool),
            QueryTemplate::daily_user_count("t"),
            ExecutorConfig::new().with_max_batch_size(max_batch_size),
            buckets,
        )
        .unwrap()
    }

    #[test]
    fn test_plan_enumerates_every_tuple_once() {
        let planner = planner(&InMemoryStore::new(), 32, 4);
        let range = DayRange::new(day(1), day(4)).unwrap();

        let tuples: Vec<_> = planner
            .plan(range)
            .iter()
            .flat_map(|p| p.tuples().collect::<Vec<_>>())
            .collect();
        let unique: HashSet<_> = tuples.iter().copied().collect();

        assert_eq!(tuples.len(), 12);
        assert_eq!(unique.len(), 12);
        assert_eq!(tuples[0], (day(1), 0));
        assert_eq!(tuples[11], (day(3), 3));
    }

    #[test]
    fn test_rejects_bad_template_and_buckets() {
        let store = InMemoryStore::new();
        let pool = Arc::new(SessionPool::new(Arc::new(store), PoolConfig::default()).unwrap());

        assert!(RangePlanner::new(
            Arc::clone(&pool),
            QueryTemplate::daily_user_count("t"),
            ExecutorConfig::default(),
            0
        )
        .is_err());
        assert!(RangePlanner::new(
            pool,
            QueryTemplate::new("SELECT count(*) FROM t WHERE pid=?"),
            ExecutorConfig::default(),
            4
        )
        .is_err());
    }

    #[test]
    fn test_build_executor_parameters() {
        let planner = planner(&InMemoryStore::new(), 32, 3);
        let product = ProductId::from("p1");
        let executor = planner.build_executor(&product, day(2)).unwrap();

        let params: Vec<_> = executor
            .pending_statements()
            .map(|s| s.params().to_vec())
            .collect();
        assert_eq!(params.len(), 3);
        assert_eq!(
            params[2],
            vec![Value::Text("p1".into()), Value::Date(day(2)), Value::Int(2)]
        );
    }

    #[tokio::test]
    async fn test_plan_and_stream_partial_sums_per_chunk() {
        let store = InMemoryStore::new();
        store.insert_day("p1", day(1), &[3, 1, 0, 2]);
        store.insert_day("p1", day(2), &[5, 5, 5, 5]);
        let planner = planner(&store, 2, 4);

        let mut calls = Vec::new();
        let outcomes = planner
            .plan_and_stream(&ProductId::from("p1"), day(1), day(3), |d, sum| {
                calls.push((d, sum))
            })
            .await
            .unwrap();

        assert_eq!(
            calls,
            vec![(day(1), 4), (day(1), 2), (day(2), 10), (day(2), 10)]
        );
        assert!(outcomes.iter().all(DayOutcome::is_success));
    }

    #[tokio::test]
    async fn test_failed_day_does_not_stop_later_days() {
        let store = InMemoryStore::new();
        store.insert_day("p1", day(2), &[1, 1]);
        store.set_faults(FaultPlan::default().fail_day(day(1)));
        let planner = planner(&store, 32, 2);

        let outcomes = planner
            .plan_and_stream(&ProductId::from("p1"), day(1), day(3), |_, _| {})
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].is_success());
        assert!(outcomes[1].is_success());
    }

    #[tokio::test]
    async fn test_empty_and_inverted_ranges() {
        let store = InMemoryStore::new();
        let planner = planner(&store, 32, 4);
        let product = ProductId::from("p1");

        let mut calls = 0;
        let outcomes = planner
            .plan_and_stream(&product, day(5), day(5), |_, _| calls += 1)
            .await
            .unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(calls, 0);

        let err = planner
            .plan_and_stream(&product, day(5), day(4), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRange { .. }));
        assert_eq!(store.request_count(), 0);
    }
}
