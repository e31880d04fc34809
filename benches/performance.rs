//! Performance benchmarks for the execution stream.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use execution_stream::{Store, StoreConfig, StreamUpdate, UpdateStatus, DEFAULT_EXECUTION_ID};
use serde_json::json;

fn update(execution_id: &str, i: usize) -> StreamUpdate {
    let mut data = serde_json::Map::new();
    data.insert("step".to_string(), json!(i));
    StreamUpdate::new(
        execution_id,
        "bench",
        UpdateStatus::InProgress,
        "working",
        "2024-01-01T00:00:00Z",
    )
    .with_data(data)
}

/// Benchmark publish with varying subscriber counts
fn bench_publish_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_fanout");

    for subscribers in [0, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let store = Store::new(StoreConfig::default());
                let handles: Vec<_> = (0..count)
                    .map(|i| {
                        let id = if i % 2 == 0 { "exec-1" } else { DEFAULT_EXECUTION_ID };
                        store.subscribe_channel(id, 1024)
                    })
                    .collect();

                let mut i = 0;
                b.iter(|| {
                    i += 1;
                    black_box(store.publish(update("exec-1", i)));
                    if i % 512 == 0 {
                        for handle in &handles {
                            handle.drain();
                        }
                    }
                });
            },
        );
    }

    group.finish();
}

/// Benchmark history reads on a full buffer
fn bench_history_read(c: &mut Criterion) {
    let store = Store::new(StoreConfig::default());
    for i in 0..500 {
        store.publish(update("exec-1", i));
    }

    c.bench_function("history_full", |b| {
        b.iter(|| black_box(store.history("exec-1")))
    });
}

/// Benchmark a GC pass over many tracked executions
fn bench_gc_scan(c: &mut Criterion) {
    let store = Store::new(StoreConfig::default());
    for i in 0..10_000 {
        store.publish(update(&format!("exec-{}", i), i));
    }

    c.bench_function("gc_scan_10k", |b| b.iter(|| black_box(store.run_gc())));
}

criterion_group!(benches, bench_publish_fanout, bench_history_read, bench_gc_scan);
criterion_main!(benches);
