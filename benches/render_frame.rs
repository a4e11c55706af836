use criterion::{Criterion, criterion_group, criterion_main};

use metaballs::{Simulation, SimulationConfig};

fn bench_frames(c: &mut Criterion) {
    let config = SimulationConfig {
        seed: Some(7),
        ..SimulationConfig::default()
    };
    let mut sim = Simulation::new(config).expect("default config is valid");
    sim.toggles().set_blur(false);

    c.bench_function("step_and_rebuild", |b| {
        b.iter(|| {
            sim.step(1.0 / 60.0);
            sim.rebuild_index();
        })
    });

    c.bench_function("render_frame", |b| {
        b.iter(|| {
            sim.render_frame().expect("frame").report().tiles
        })
    });

    sim.toggles().set_blur(true);
    c.bench_function("render_frame_blurred", |b| {
        b.iter(|| {
            sim.render_frame().expect("frame").report().tiles
        })
    });
}

criterion_group!(benches, bench_frames);
criterion_main!(benches);
