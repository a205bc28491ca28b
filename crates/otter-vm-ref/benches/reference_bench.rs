//! Reference Processing Benchmarks
//!
//! Measures wrapper creation and the cost references add to a collection.
//!
//! Run with: `cargo bench -p otter-vm-ref`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use otter_vm_ref::{Heap, ReferenceConfig, ReferenceSystem, Value};
use std::hint::black_box;

fn create_system() -> (Heap, ReferenceSystem) {
    let mut heap = Heap::new();
    let refs = ReferenceSystem::new(&mut heap, ReferenceConfig::default())
        .expect("base reference classes");
    (heap, refs)
}

/// Benchmark creating weak references, fresh and cached
fn weak_creation_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("weak_creation");

    group.bench_function("fresh_1000", |b| {
        b.iter(|| {
            let (mut heap, mut refs) = create_system();
            for _ in 0..1000 {
                let target = heap.alloc_object().unwrap();
                black_box(refs.weak_new(&mut heap, target.into(), None).unwrap());
            }
        });
    });

    group.bench_function("cached_1000", |b| {
        let (mut heap, mut refs) = create_system();
        let target = heap.alloc_object().unwrap();
        b.iter(|| {
            for _ in 0..1000 {
                black_box(refs.weak_new(&mut heap, target.into(), None).unwrap());
            }
        });
    });

    group.finish();
}

/// Benchmark a collection clearing half of the weak references and
/// delivering them to a queue
fn weak_clearing_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("weak_clearing");

    for count in [100usize, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("references", count), count, |b, &n| {
            b.iter_custom(|iters| {
                let mut total = std::time::Duration::ZERO;
                for _ in 0..iters {
                    let (mut heap, mut refs) = create_system();
                    let queue = heap.alloc_queue().unwrap();
                    heap.add_root(queue);
                    for i in 0..n {
                        let target = heap.alloc_object().unwrap();
                        if i % 2 == 0 {
                            heap.add_root(target);
                        }
                        let wrapper = refs.weak_new(&mut heap, target.into(), Some(queue)).unwrap();
                        heap.add_root(wrapper);
                    }

                    let start = std::time::Instant::now();
                    refs.collect(&mut heap);
                    total += start.elapsed();
                    black_box(heap.queue(queue).map(|q| q.len()));
                }
                total
            });
        });
    }

    group.finish();
}

/// Benchmark soft decay under memory pressure
fn soft_decay_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("soft_decay");

    group.bench_function("pressure_1000", |b| {
        b.iter_custom(|iters| {
            let mut total = std::time::Duration::ZERO;
            for _ in 0..iters {
                let (mut heap, mut refs) = create_system();
                for i in 0..1000 {
                    let target = heap.alloc_plain(vec![Value::Int(i)]).unwrap();
                    let wrapper = refs.soft_new(&mut heap, target.into(), None).unwrap();
                    heap.add_root(wrapper);
                }
                refs.set_memory_pressure(3);

                let start = std::time::Instant::now();
                refs.collect(&mut heap);
                total += start.elapsed();
            }
            total
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    weak_creation_benchmark,
    weak_clearing_benchmark,
    soft_decay_benchmark,
);

criterion_main!(benches);
