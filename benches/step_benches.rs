use bevy_sph2d::cpu::spatial_hash::SpatialHash;
use bevy_sph2d::cpu::sph2d::SPHState;
use criterion::{Criterion, criterion_group, criterion_main};

fn bench_step(c: &mut Criterion) {
    let mut sph = match SPHState::demo_block_5k() {
        Ok(sph) => sph,
        Err(err) => panic!("demo block failed to initialise: {err}"),
    };
    // let the block settle a little so the bench sees a realistic neighbourhood
    for _ in 0..30 {
        sph.step(1.0 / 180.0);
    }

    c.bench_function("step_5k", |b| b.iter(|| sph.step(1.0 / 180.0)));
}

fn bench_grid_build(c: &mut Criterion) {
    let sph = match SPHState::demo_block_5k() {
        Ok(sph) => sph,
        Err(err) => panic!("demo block failed to initialise: {err}"),
    };
    let positions = sph.positions().to_vec();
    let radius = sph.settings().smoothing_radius;
    let mut grid = SpatialHash::new(sph.capacity());

    c.bench_function("grid_build_5k", |b| b.iter(|| grid.build(&positions, radius)));
}

criterion_group!(benches, bench_step, bench_grid_build);
criterion_main!(benches);
