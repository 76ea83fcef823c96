//! Throughput benchmarks for the queue flavors.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use petek_queue::{Bbq, BoundedQueue, UnboundedQueue};
use std::sync::Arc;
use std::thread;

fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread");
    group.throughput(Throughput::Elements(1));

    let bounded = BoundedQueue::new(1024);
    group.bench_function("bounded_push_pop", |b| {
        b.iter(|| {
            let _ = bounded.push(black_box(1u64));
            black_box(bounded.pop());
        });
    });

    let bbq = Bbq::new(1024);
    group.bench_function("bbq_push_pop", |b| {
        b.iter(|| {
            let _ = bbq.push(black_box(1u64));
            black_box(bbq.pop());
        });
    });

    let unbounded = UnboundedQueue::new();
    group.bench_function("unbounded_push_pop", |b| {
        b.iter(|| {
            unbounded.push(black_box(1u64));
            black_box(unbounded.pop());
        });
    });
    petek::flush();

    group.finish();
}

fn bench_mpmc(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpmc_bbq");
    let per_thread = 10_000u64;

    for threads in [2usize, 4].iter() {
        group.throughput(Throughput::Elements(per_thread * *threads as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            threads,
            |b, &threads| {
                b.iter(|| {
                    let queue = Arc::new(Bbq::new(4096));
                    let mut handles = Vec::new();
                    for _ in 0..threads {
                        let queue = queue.clone();
                        handles.push(thread::spawn(move || {
                            for i in 0..per_thread {
                                while queue.push(i).is_err() {
                                    thread::yield_now();
                                }
                            }
                        }));
                    }
                    for _ in 0..threads {
                        let queue = queue.clone();
                        handles.push(thread::spawn(move || {
                            let mut taken = 0;
                            while taken < per_thread {
                                if queue.pop().is_some() {
                                    taken += 1;
                                } else {
                                    thread::yield_now();
                                }
                            }
                        }));
                    }
                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_single_thread, bench_mpmc);
criterion_main!(benches);
