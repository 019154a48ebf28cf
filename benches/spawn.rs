use std::hint::black_box;

use criterion::*;

mod common;
use common::*;

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    for &(label, n) in &[("spawn_10k", AGENTS_SMALL), ("spawn_100k", AGENTS_MED)] {
        group.bench_function(label, |b| {
            b.iter_batched(
                make_world,
                |(world, mut archetype)| {
                    populate(&mut archetype, n);
                    black_box(world);
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.bench_function("spawn_kill_recycle_10k", |b| {
        b.iter_batched(
            || {
                let (world, mut archetype) = make_world();
                populate(&mut archetype, AGENTS_SMALL);
                (world, archetype)
            },
            |(mut world, mut archetype)| {
                let mut ids = Vec::with_capacity(AGENTS_SMALL);
                archetype.for_each(|e| ids.push(e.id()), false);
                for id in ids {
                    world.kill(id);
                }
                for _ in 0..AGENTS_SMALL {
                    archetype.new_entity();
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
