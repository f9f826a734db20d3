//! Search benchmarks for performance profiling.
//!
//! Run with: `cargo bench -p sente-search`
//!
//! These benchmarks measure full episodes with the synchronous uniform
//! evaluator, so they profile the tree machinery rather than evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use games_go::GoPosition;
use sente_core::Color;
use sente_search::{PassFlags, SearchOptions, UctSearch, UniformNetwork};

fn bench_playout_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("think_playouts");

    for playouts in [50u32, 200, 800] {
        group.throughput(Throughput::Elements(playouts as u64));
        group.bench_with_input(
            BenchmarkId::new("uniform_9x9", playouts),
            &playouts,
            |b, &playouts| {
                b.iter(|| {
                    let game = GoPosition::new(9, 7.5);
                    let options = SearchOptions::for_testing().with_playouts(playouts);
                    let mut search =
                        UctSearch::new(game, UniformNetwork::new(), options).unwrap();
                    black_box(search.think(Color::Black, PassFlags::default()))
                });
            },
        );
    }

    group.finish();
}

fn bench_worker_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("worker_scaling");

    for threads in [1usize, 2, 4] {
        group.bench_with_input(
            BenchmarkId::new("threads", threads),
            &threads,
            |b, &threads| {
                b.iter(|| {
                    let game = GoPosition::new(9, 7.5);
                    let options = SearchOptions::for_testing()
                        .with_playouts(400)
                        .with_threads(threads);
                    let mut search =
                        UctSearch::new(game, UniformNetwork::new(), options).unwrap();
                    black_box(search.think(Color::Black, PassFlags::default()))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_playout_counts, bench_worker_scaling);
criterion_main!(benches);
