use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lazytable_core::{Registry, Table, TableConfig};
use std::convert::Infallible;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn new_table(ttl: Option<Duration>) -> Table<String, i32> {
    let config = TableConfig::builder().maybe_ttl(ttl).build().unwrap();
    Table::with_config(|key: &String| Ok(key.len() as i32), config).unwrap()
}

fn bench_upsert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("upsert_sequential");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("no_ttl", size), size, |b, &size| {
            b.iter(|| {
                let table = new_table(None);
                for i in 0..size {
                    table.add_or_update(format!("key{}", i), black_box(i));
                }
            });
        });

        // Every write with a TTL also enqueues a lifetime record.
        group.bench_with_input(BenchmarkId::new("ttl", size), size, |b, &size| {
            b.iter(|| {
                let table = new_table(Some(Duration::from_secs(60)));
                for i in 0..size {
                    table.add_or_update(format!("key{}", i), black_box(i));
                }
            });
        });
    }

    group.finish();
}

fn bench_get_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_hits");

    for size in [10, 100, 1000].iter() {
        let table = new_table(Some(Duration::from_secs(60)));
        for i in 0..*size {
            table.get(&format!("key{}", i)).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for i in 0..size {
                    black_box(table.get(&format!("key{}", i)).unwrap());
                }
            });
        });
    }

    group.finish();
}

fn bench_concurrent_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_reads");

    for num_threads in [2, 4, 8].iter() {
        let table = Arc::new(new_table(None));
        for i in 0..100 {
            table.get(&format!("key{}", i)).unwrap();
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let table = Arc::clone(&table);
                            thread::spawn(move || {
                                for i in 0..100 {
                                    black_box(table.get(&format!("key{}", i)).unwrap());
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_registry_get(c: &mut Criterion) {
    let registry = Registry::new();
    for i in 0..100u32 {
        registry
            .get(&i, |id: &u32| Ok::<_, Infallible>(id.to_string()))
            .unwrap();
    }

    c.bench_function("registry_get_hit", |b| {
        b.iter(|| {
            for i in 0..100u32 {
                black_box(
                    registry
                        .get(&i, |id: &u32| Ok::<_, Infallible>(id.to_string()))
                        .unwrap(),
                );
            }
        });
    });
}

criterion_group!(
    benches,
    bench_upsert_sequential,
    bench_get_hits,
    bench_concurrent_reads,
    bench_registry_get
);
criterion_main!(benches);
