use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dispatch_core::prelude::*;

type Items = Vec<WorkItem<u32, u64>>;

fn work_items(count: u64) -> Items {
    (0..count)
        .map(|i| WorkItem::new((i % 5 + 1) as f64, (i / 100) as u32, i))
        .collect::<Result<_, _>>()
        .unwrap_or_default()
}

fn sum_payloads(
    block: Block<WorkItem<u32, u64>, u32>,
    _monitor: &Monitor,
) -> anyhow::Result<PartialResult<u32, u64>> {
    let total = block.iter().map(|item| *item.payload()).sum();
    Ok([(*block.group_key(), total)].into_iter().collect())
}

fn benchmark_block_splitting(c: &mut Criterion) {
    let items = work_items(10_000);
    c.bench_function("split_10k_items", |b| {
        b.iter(|| {
            split_work_items(black_box(items.clone()), 50.0)
                .map(|blocks| blocks.count())
                .unwrap_or(0)
        })
    });
}

fn benchmark_accumulation(c: &mut Criterion) {
    let partials: Vec<AccumulatingMap<u32, Vec<f64>>> = (0..256u32)
        .map(|i| [(i % 16, vec![1.0; 64])].into_iter().collect())
        .collect();

    c.bench_function("merge_256_partials", |b| {
        b.iter(|| {
            let mut acc = AccumulatingMap::new();
            for partial in black_box(&partials) {
                acc.merge_map(partial.clone());
            }
            acc
        })
    });
}

fn benchmark_dispatch(c: &mut Criterion) {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(_) => return,
    };
    let items = work_items(2_000);

    let mut group = c.benchmark_group("reduce_2k_items");
    for mode in [ExecutionMode::Sequential, ExecutionMode::Threads] {
        group.bench_with_input(BenchmarkId::from_parameter(mode), &mode, |b, &mode| {
            b.iter(|| {
                let config = DispatchConfig {
                    execution_mode: mode,
                    ..DispatchConfig::with_concurrency_limit(4)
                };
                let work_fn: Arc<dyn WorkFunction<Block<WorkItem<u32, u64>, u32>, u32, u64>> =
                    Arc::new(sum_payloads);
                runtime.block_on(async {
                    let blocks = split_work_items(items.clone(), 40.0)?;
                    TaskDispatcher::new_shared(config, work_fn)?
                        .execute(blocks, items.len() as u64)
                        .await
                })
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_block_splitting,
    benchmark_accumulation,
    benchmark_dispatch
);
criterion_main!(benches);
