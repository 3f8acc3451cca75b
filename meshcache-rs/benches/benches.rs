use criterion::{black_box, criterion_group, criterion_main, Criterion};

use meshcache::lru::LruCache;
use meshcache::ring::HashRing;

fn lru_benchmarks(c: &mut Criterion) {
    c.bench_function("lookup within a warm cache", |b| {
        let mut lru = LruCache::new(0, None);
        for index in 0..1024 {
            lru.put(format!("key-{}", index), "X".repeat(64)).unwrap();
        }

        let mut index = 0;
        b.iter(|| {
            index = (index + 1) % 1024;
            black_box(lru.get(&format!("key-{}", index)).is_some());
        })
    });

    c.bench_function("insert within a constrained budget", |b| {
        let mut lru = LruCache::new(64 * 1024, None);

        let mut index = 0_usize;
        b.iter(|| {
            index += 1;
            lru.put(format!("key-{}", index % 4096), "X".repeat(64))
                .unwrap();
        })
    });
}

fn ring_benchmarks(c: &mut Criterion) {
    c.bench_function("routing a key across 16 nodes", |b| {
        let mut ring = HashRing::new(64, None);
        ring.add((0..16).map(|index| format!("http://cache-{}:9998", index)));

        b.iter(|| {
            black_box(ring.get("Tom"));
        })
    });
}

criterion_group!(benches, lru_benchmarks, ring_benchmarks);
criterion_main!(benches);
