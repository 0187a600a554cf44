use core::{hint::black_box, time::Duration};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::future::join_all;
use microbatch::{
    BatchConfig, Batcher, CancellationToken,
    memory::{Get, MemoryStore, Put},
};
use tokio::runtime::Builder;

const ITEMS: usize = 1024;

#[derive(Clone, Copy, Debug)]
struct BenchParams {
    max_batch: usize,
    wait: Duration,
}

fn bench_coalesced_calls(c: &mut Criterion) {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build runtime");

    let mut group = c.benchmark_group("coalesced_calls");
    group.throughput(Throughput::Elements(ITEMS as u64));

    for params in [
        BenchParams {
            max_batch: 1,
            wait: Duration::from_micros(50),
        },
        BenchParams {
            max_batch: 64,
            wait: Duration::from_micros(200),
        },
        BenchParams {
            max_batch: 512,
            wait: Duration::from_millis(1),
        },
    ] {
        let store = MemoryStore::with_rows((0..ITEMS as u64).map(|k| (k, format!("row {k}"))));
        let config = BatchConfig::new(params.max_batch, params.wait).expect("valid config");
        let batcher = runtime.block_on(async {
            Batcher::new(store, config, CancellationToken::new()).expect("valid config")
        });

        group.bench_function(format!("get/max_batch={}", params.max_batch), |b| {
            b.to_async(&runtime).iter(|| {
                let batcher = batcher.clone();
                async move {
                    let reads = (0..ITEMS as u64).map(|key| {
                        let batcher = batcher.clone();
                        tokio::spawn(async move { batcher.call(Get::new(key)).await })
                    });
                    black_box(join_all(reads).await);
                }
            });
        });

        group.bench_function(format!("put/max_batch={}", params.max_batch), |b| {
            b.to_async(&runtime).iter(|| {
                let batcher = batcher.clone();
                async move {
                    let writes = (0..ITEMS as u64).map(|key| {
                        let batcher = batcher.clone();
                        tokio::spawn(async move { batcher.call(Put::new(key, "bench")).await })
                    });
                    black_box(join_all(writes).await);
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_coalesced_calls);
criterion_main!(benches);
