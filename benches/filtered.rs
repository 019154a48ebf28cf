use std::hint::black_box;

use criterion::*;
use strata::Query;

mod common;
use common::*;

fn filtered_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered");

    group.bench_function("query_between_100k", |b| {
        b.iter_batched(
            || {
                let (world, mut archetype) = make_world();
                populate(&mut archetype, AGENTS_MED);
                let filter = WEALTH_INDEX.with(|i| i.borrow().between(2_000, 4_000));
                let mut q = Query::all::<(Wealth,)>(&world).with_filters(vec![filter]);
                q.pre_match().unwrap();
                (world, q)
            },
            |(world, mut q)| {
                let mut hits = 0usize;
                q.for_each(|_| hits += 1, false).unwrap();
                black_box((world, hits));
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("cacher_maintenance_10k_updates", |b| {
        b.iter_batched(
            || {
                let (world, mut archetype) = make_world();
                populate(&mut archetype, AGENTS_SMALL);
                let filter = WEALTH_INDEX.with(|i| i.borrow().le(5_000));
                let mut q = Query::all::<(Wealth,)>(&world).with_filters(vec![filter]);
                q.pre_match().unwrap();
                let cache = q.cache().unwrap();
                let mut ids = Vec::with_capacity(AGENTS_SMALL);
                archetype.for_each(|e| ids.push(e.id()), false);
                // The cache unsubscribes from the world on drop, so it must
                // come first in the tuple.
                (cache, world, ids)
            },
            |(cache, world, ids)| {
                for (k, id) in ids.iter().enumerate() {
                    let target = if k % 2 == 0 { 9_000 } else { 1_000 };
                    world.get(*id).get::<Wealth>().unwrap().value.set(target).unwrap();
                }
                black_box((cache, world));
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, filtered_benchmark);
criterion_main!(benches);
