//! # Arena Benchmark
//!
//! Measures:
//! 1. Bump pushes into a warm arena
//! 2. Frame-style push/rollback cycles across chained blocks
//! 3. Array growth against `Vec`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use strata_core::{Arena, ArenaParams, Array};

const PUSHES_PER_FRAME: usize = 10_000;

fn bench_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("arena_push");
    group.throughput(Throughput::Elements(PUSHES_PER_FRAME as u64));

    for size in [16usize, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut arena = Arena::new(ArenaParams::with_size(1024 * 1024));
            b.iter(|| {
                let mark = arena.position();
                for _ in 0..PUSHES_PER_FRAME {
                    black_box(arena.push(size, 8));
                }
                arena.pop_to(mark);
            });
        });
    }

    group.finish();
}

fn bench_frame_cycle(c: &mut Criterion) {
    // Small blocks force chaining; after the first frame every block comes
    // from the free list.
    let mut arena = Arena::new(ArenaParams::with_size(16 * 1024));

    c.bench_function("arena_frame_cycle_chained", |b| {
        b.iter(|| {
            arena.scope(|frame| {
                for i in 0..1_000u32 {
                    let values = frame.push_array::<u32>(64);
                    values[0] = i;
                    black_box(values);
                }
            });
        });
    });
}

fn bench_array_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_growth");
    let count = 100_000u32;
    group.throughput(Throughput::Elements(u64::from(count)));

    let mut arena = Arena::new(ArenaParams::with_size(4 * 1024 * 1024));
    group.bench_function("arena_array", |b| {
        b.iter(|| {
            arena.scope(|a| {
                let mut values = Array::new_in(a);
                for i in 0..count {
                    values.push(i);
                }
                black_box(values.len())
            })
        });
    });

    group.bench_function("std_vec", |b| {
        b.iter(|| {
            let mut values = Vec::with_capacity(64);
            for i in 0..count {
                values.push(i);
            }
            black_box(values.len())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_push, bench_frame_cycle, bench_array_growth);
criterion_main!(benches);
