use std::hint::black_box;

use criterion::*;
use strata::Query;

mod common;
use common::*;

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    group.bench_function("for_each_write_position_100k", |b| {
        b.iter_batched(
            || {
                let (world, mut archetype) = make_world();
                populate(&mut archetype, AGENTS_MED);
                let mut q = Query::all::<(Position, Velocity)>(&world);
                q.pre_match().unwrap();
                (world, q)
            },
            |(world, mut q)| {
                q.for_each(
                    |e| {
                        let (dx, dy) = {
                            let v = e.get::<Velocity>().unwrap();
                            (v.dx, v.dy)
                        };
                        let p = e.get::<Position>().unwrap();
                        p.x += dx;
                        p.y += dy;
                    },
                    false,
                )
                .unwrap();
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("archetype_for_each_100k", |b| {
        b.iter_batched(
            || {
                let (world, mut archetype) = make_world();
                populate(&mut archetype, AGENTS_MED);
                (world, archetype)
            },
            |(world, mut archetype)| {
                let mut sum = 0.0f64;
                archetype.for_each(|e| sum += e.get::<Position>().unwrap().x, false);
                black_box((world, sum));
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);
