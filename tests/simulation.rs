//! Whole-engine integration test: a small agent economy driven for many
//! ticks, checking the incrementally maintained poverty cache against a
//! brute-force recomputation after every mutation batch.

use std::cell::RefCell;

use strata::prelude::*;
use strata::Query;

thread_local! {
    static WEALTH_IDX: RefCell<OrderedIndex<i64>> = RefCell::new(OrderedIndex::new());
}

struct Wealth {
    amount: FieldProxy<i64, OrderedIndex<i64>>,
}

impl Default for Wealth {
    fn default() -> Self {
        let mut w = Self { amount: FieldProxy::new(0) };
        WEALTH_IDX.with(|i| w.amount.bind_index(&mut i.borrow_mut()));
        w
    }
}

impl Component for Wealth {}

#[derive(Default)]
struct Health {
    hp: i64,
}

impl Component for Health {}

const POVERTY_LINE: i64 = 10;
const STARTING_HP: i64 = 4;

/// Deterministic per-entity salary.
fn salary(eid: EntityId) -> i64 {
    (eid % 5) as i64
}

/// Brute-force recomputation of the poverty set.
fn poor_by_scan(world: &World) -> Vec<EntityId> {
    let mut q = Query::all::<(Wealth,)>(world);
    q.pre_match().unwrap();
    let mut out = Vec::new();
    q.for_each(
        |e| {
            if *e.get::<Wealth>().unwrap().amount.value() < POVERTY_LINE {
                out.push(e.id());
            }
        },
        false,
    )
    .unwrap();
    out.sort_unstable();
    out
}

fn cache_ids(cache: &mut Cacher) -> Vec<EntityId> {
    let mut out = Vec::new();
    cache.for_each(|e| out.push(e.id()), false);
    out.sort_unstable();
    out
}

#[test]
fn poverty_cache_stays_consistent_over_ticks() {
    let mut world = World::new();
    WEALTH_IDX.with(|i| i.borrow_mut().bind(&world));

    let mut workers = world.new_archetype::<(Wealth, Health)>().unwrap();
    let mut drones = world.new_archetype::<(Wealth,)>().unwrap();

    for _ in 0..40 {
        let mut e = workers.new_entity();
        e.get::<Health>().unwrap().hp = STARTING_HP;
    }
    for _ in 0..20 {
        drones.new_entity();
    }

    let below = WEALTH_IDX.with(|i| i.borrow().lt(POVERTY_LINE));
    let mut poor_query = Query::all::<(Wealth,)>(&world).with_filters(vec![below]);
    poor_query.pre_match().unwrap();
    let mut poor_cache = poor_query.cache().unwrap();

    // Everyone starts broke.
    assert_eq!(cache_ids(&mut poor_cache).len(), 60);

    let mut all = Query::all::<(Wealth,)>(&world);
    all.pre_match().unwrap();
    let mut worker_query = Query::all::<(Wealth, Health)>(&world);
    worker_query.pre_match().unwrap();

    for tick in 0..12u32 {
        // Earnings. Rewriting the indexed field mid-iteration is fine for
        // an unfiltered query; the poverty cache follows along through its
        // index subscription.
        all.for_each(
            |e| {
                let pay = salary(e.id());
                e.get::<Wealth>().unwrap().amount += pay;
            },
            false,
        )
        .unwrap();

        // Aging. Exhausted workers are marked during iteration and die at
        // the end of the tick.
        worker_query
            .for_each(
                |e| {
                    let hp = {
                        let h = e.get::<Health>().unwrap();
                        h.hp -= 1;
                        h.hp
                    };
                    if hp <= 0 {
                        e.delayed_kill();
                    }
                },
                false,
            )
            .unwrap();
        world.apply_delayed_kills();

        // Periodic immigration, deferred to the tick boundary.
        if tick % 3 == 0 {
            for _ in 0..5 {
                workers.delayed_new_entity_with(|e| {
                    e.construct(Wealth::default()).unwrap();
                    e.construct(Health { hp: STARTING_HP }).unwrap();
                });
            }
            world.apply_delayed_new_entities();
        }

        assert_eq!(cache_ids(&mut poor_cache), poor_by_scan(&world));
        assert_eq!(
            WEALTH_IDX.with(|i| i.borrow().len()),
            workers.num_entities() + drones.num_entities()
        );
    }

    // Workers died and were replaced in waves; the world stayed coherent.
    assert!(workers.num_entities() > 0);
    assert_eq!(drones.num_entities(), 20);

    drop(poor_cache);
    assert_eq!(world.num_callbacks(), 0);
    assert_eq!(WEALTH_IDX.with(|i| i.borrow().num_callbacks()), 0);
}
