//! Shared fixtures for the criterion benches.
#![allow(dead_code)]

use std::cell::RefCell;

use strata::prelude::*;

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

thread_local! {
    pub static WEALTH_INDEX: RefCell<OrderedIndex<i64>> = RefCell::new(OrderedIndex::new());
}

#[derive(Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Component for Position {}

#[derive(Default)]
pub struct Velocity {
    pub dx: f64,
    pub dy: f64,
}

impl Component for Velocity {}

/// Component with an indexed field, for the filtered-query benches.
pub struct Wealth {
    pub value: FieldProxy<i64, OrderedIndex<i64>>,
}

impl Default for Wealth {
    fn default() -> Self {
        let mut w = Self { value: FieldProxy::new(0) };
        WEALTH_INDEX.with(|i| w.value.bind_index(&mut i.borrow_mut()));
        w
    }
}

impl Component for Wealth {}

pub fn make_world() -> (World, Archetype) {
    let mut world = World::new();
    WEALTH_INDEX.with(|i| i.borrow_mut().bind(&world));
    let archetype = world
        .new_archetype::<(Position, Velocity, Wealth)>()
        .expect("bench archetype");
    (world, archetype)
}

pub fn populate(archetype: &mut Archetype, n: usize) {
    archetype.reserve(n);
    for i in 0..n {
        let mut e = archetype.new_entity();
        e.get::<Position>().unwrap().x = i as f64;
        e.get::<Wealth>().unwrap().value.set((i % 10_000) as i64).unwrap();
    }
}
