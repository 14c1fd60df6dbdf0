//! Benchmarks for block store lookups.
//!
//! Measures how quickly each backend answers `block` for a hit, a miss and a
//! subdomain of a blocked host (which is a miss under exact matching).

use criterion::{BenchmarkId, Criterion, Throughput, black_box};

use sinkhole::filter::{StoreBackend, new_store};

const BACKENDS: [StoreBackend; 4] = [
    StoreBackend::Hash,
    StoreBackend::Slice,
    StoreBackend::Radix,
    StoreBackend::Trie,
];

const HOSTS: usize = 50_000;

fn bench_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_store");
    group.throughput(Throughput::Elements(1));

    for backend in BACKENDS {
        let store = new_store(backend);
        for i in 0..HOSTS {
            store.add_host("bench", &format!("ads{i}.tracker{}.example.com", i % 97));
        }
        store.add_host("bench", "doubleclick.com");

        let name = format!("{backend:?}").to_lowercase();
        group.bench_function(BenchmarkId::new(&name, "hit"), |b| {
            b.iter(|| store.block(black_box("doubleclick.com")))
        });
        group.bench_function(BenchmarkId::new(&name, "subdomain"), |b| {
            b.iter(|| store.block(black_box("ads.tracking.doubleclick.com")))
        });
        group.bench_function(BenchmarkId::new(&name, "miss"), |b| {
            b.iter(|| store.block(black_box("www.google.com")))
        });
    }

    group.finish();
}

fn bench_reset(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_store_reset");

    for backend in BACKENDS {
        let name = format!("{backend:?}").to_lowercase();
        group.bench_function(BenchmarkId::new(name, 1_000), |b| {
            b.iter(|| {
                let store = new_store(backend);
                for i in 0..1_000 {
                    store.add_host("bench", &format!("host{i}.example.net"));
                }
                store.reset("bench");
                black_box(store.len())
            })
        });
    }

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_block(&mut criterion);
    bench_reset(&mut criterion);
    criterion.final_summary();
}
