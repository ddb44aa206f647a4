use std::sync::Arc;

use chrono::{Days, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dau_pipeline::aggregate::DauAggregator;
use dau_pipeline::query::{ExecutorConfig, QueryTemplate, RangePlanner};
use dau_pipeline::store::{InMemoryStore, PoolConfig, SessionPool};
use dau_pipeline::types::ProductId;

const BUCKETS: u32 = 64;
const DAYS: u64 = 30;

fn seeded_store(from: NaiveDate) -> InMemoryStore {
    let store = InMemoryStore::new();
    for offset in 0..DAYS {
        let day = from.checked_add_days(Days::new(offset)).unwrap();
        let counts: Vec<i64> = (0..BUCKETS as i64).map(|b| b * 3 + offset as i64).collect();
        store.insert_day("p1", day, &counts);
    }
    store
}

fn aggregator(store: &InMemoryStore, max_batch_size: usize, parallelism: usize) -> DauAggregator {
    let pool = SessionPool::new(Arc::new(store.clone()), PoolConfig::default()).unwrap();
    let planner = RangePlanner::new(
        Arc::new(pool),
        QueryTemplate::daily_user_count("user_activity_by_day"),
        ExecutorConfig::new().with_max_batch_size(max_batch_size),
        BUCKETS,
    )
    .unwrap();
    DauAggregator::new(planner).with_day_parallelism(parallelism)
}

fn bench_compute_total(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let from = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
    let to = from.checked_add_days(Days::new(DAYS)).unwrap();
    let store = seeded_store(from);
    let product = ProductId::from("p1");

    let mut group = c.benchmark_group("compute_total_30_days");
    for max_batch_size in [1usize, 8, 32] {
        for parallelism in [1usize, 4] {
            let agg = aggregator(&store, max_batch_size, parallelism);
            let (agg, product) = (&agg, &product);
            group.bench_with_input(
                BenchmarkId::new(format!("batch_{}", max_batch_size), parallelism),
                &parallelism,
                |b, _| {
                    b.to_async(&rt).iter(|| async move {
                        black_box(agg.compute_total(&product, from, to).await.unwrap())
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_compute_total);
criterion_main!(benches);
