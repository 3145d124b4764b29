use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use multicache::backend::{CacheBackend, FileBackend, InMemoryBackend};
use multicache::{Cache, CacheManager, CacheManagerConfig, CacheValue, FileConfig, MemoryConfig};
use std::hint::black_box;
use std::sync::Arc;

fn memory_cache(thread_safe: bool) -> Cache {
    let config = CacheManagerConfig::new(vec![MemoryConfig::new("bench")
        .with_thread_safe(thread_safe)
        .into()]);
    Cache::new(Arc::new(
        CacheManager::new(config).expect("Failed to create manager"),
    ))
}

fn bench_memory_set_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_set_get");

    for thread_safe in [true, false] {
        let cache = memory_cache(thread_safe);
        group.bench_with_input(
            BenchmarkId::new("thread_safe", thread_safe),
            &cache,
            |b, cache| {
                let mut i = 0u64;
                b.iter(|| {
                    let key = format!("key:{}", i % 1024);
                    i += 1;
                    cache.blocking_set(&key, i as i64, None).expect("set");
                    black_box(cache.blocking_get(&key).expect("get"));
                });
            },
        );
    }

    group.finish();
}

fn bench_memory_get_many(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_get_many");
    let backend = InMemoryBackend::new(MemoryConfig::new("bench"));

    for size in [10usize, 100, 1000] {
        let keys: Vec<String> = (0..size).map(|i| format!("key:{}", i)).collect();
        futures::executor::block_on(backend.mset(
            keys.iter()
                .map(|k| (k.clone(), CacheValue::from(k.as_str())))
                .collect(),
            None,
        ))
        .expect("mset");
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &refs, |b, refs| {
            b.iter(|| black_box(futures::executor::block_on(backend.mget(refs)).expect("mget")));
        });
    }

    group.finish();
}

fn bench_file_set_get(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = runtime
        .block_on(FileBackend::new(FileConfig::new("bench", dir.path())))
        .expect("Failed to create file backend");

    c.bench_function("file_set_get", |b| {
        b.to_async(&runtime).iter(|| async {
            backend
                .set("key", CacheValue::Int(42), None)
                .await
                .expect("set");
            black_box(backend.get("key").await.expect("get"));
        });
    });
}

criterion_group!(
    benches,
    bench_memory_set_get,
    bench_memory_get_many,
    bench_file_set_get
);
criterion_main!(benches);
