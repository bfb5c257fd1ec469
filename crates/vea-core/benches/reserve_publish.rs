use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vea_core::{ReservationList, VeaConfig, VeaSpace};
use vea_store::CellArenaEngine;

const CAPACITY_BLOCKS: u64 = 1 << 24;

/// Builds a device fragmented into `fragments` alternating free/reserved
/// extents, so `reserve`'s ordered-map lookups have real work to do instead
/// of hitting a single giant extent every time.
fn fragmented_space(fragments: usize) -> (CellArenaEngine, VeaSpace<CellArenaEngine>) {
    let mut engine = CellArenaEngine::new();
    let mut space = VeaSpace::format(&mut engine, VeaConfig::default(), 1, CAPACITY_BLOCKS, 0, false).unwrap();

    let mut list = ReservationList::new();
    for _ in 0..fragments {
        space.reserve(&mut engine, 4, None, &mut list).unwrap();
        space.tx_publish(&mut engine, &mut list).unwrap();
        // Skip one block before the next reservation to leave a gap behind.
        space.reserve(&mut engine, 1, None, &mut list).unwrap();
        space.tx_publish(&mut engine, &mut list).unwrap();
    }
    (engine, space)
}

fn bench_reserve(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve");
    for fragments in [0usize, 64, 1024, 16384] {
        group.bench_with_input(BenchmarkId::from_parameter(fragments), &fragments, |b, &fragments| {
            b.iter_batched(
                || fragmented_space(fragments),
                |(mut engine, mut space)| {
                    let mut list = ReservationList::new();
                    space.reserve(&mut engine, black_box(8), None, &mut list).unwrap();
                    black_box(list);
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_cancel(c: &mut Criterion) {
    let mut group = c.benchmark_group("cancel");
    for fragments in [0usize, 64, 1024, 16384] {
        group.bench_with_input(BenchmarkId::from_parameter(fragments), &fragments, |b, &fragments| {
            b.iter_batched(
                || {
                    let (mut engine, mut space) = fragmented_space(fragments);
                    let mut list = ReservationList::new();
                    space.reserve(&mut engine, 8, None, &mut list).unwrap();
                    (engine, space, list)
                },
                |(_engine, mut space, mut list)| {
                    space.cancel(black_box(&mut list)).unwrap();
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_tx_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("tx_publish");
    for fragments in [0usize, 64, 1024, 16384] {
        group.bench_with_input(BenchmarkId::from_parameter(fragments), &fragments, |b, &fragments| {
            b.iter_batched(
                || {
                    let (mut engine, mut space) = fragmented_space(fragments);
                    let mut list = ReservationList::new();
                    space.reserve(&mut engine, 8, None, &mut list).unwrap();
                    (engine, space, list)
                },
                |(mut engine, mut space, mut list)| {
                    space.tx_publish(black_box(&mut engine), &mut list).unwrap();
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reserve, bench_cancel, bench_tx_publish);
criterion_main!(benches);
