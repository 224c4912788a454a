use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use life_sim::{next_generation, step_viewport, CellGrid, EdgeMode, Margin, Viewport, World};
use rand::{rngs::SmallRng, SeedableRng};

fn random_world(size: usize) -> World {
    let mut world = World::new(size, size, EdgeMode::Wrap);
    world.randomize(0.5, &mut SmallRng::seed_from_u64(size as u64));
    world
}

fn bench_next_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("next_generation");

    for size in [32usize, 128, 512] {
        let buffer = CellGrid::from_rows(&random_world(size).to_rows());
        group.bench_with_input(BenchmarkId::new("buffer", size), &buffer, |b, buffer| {
            b.iter(|| next_generation(buffer))
        });
    }

    group.finish();
}

fn bench_step_viewport(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_viewport");

    for rows in [30u32, 120, 400] {
        let viewport = Viewport::new(650, 480, rows, rows);
        group.bench_with_input(BenchmarkId::new("viewport", rows), &viewport, |b, viewport| {
            b.iter_batched(
                || random_world(700),
                |mut world| step_viewport(&mut world, viewport, Margin::MOORE),
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(step_benches, bench_next_generation, bench_step_viewport);
criterion_main!(step_benches);
