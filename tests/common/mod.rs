//! Shared fixture components and indexes for the integration tests.
//!
//! Indexes live in thread-locals because component `Default` impls must be
//! able to reach them while the engine constructs rows; the test harness
//! runs every test on its own thread, so each test sees fresh indexes.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use strata::prelude::*;

thread_local! {
    pub static INDEX1: RefCell<OrderedIndex<i64>> = RefCell::new(OrderedIndex::new());
    pub static INDEX2: RefCell<UnorderedIndex<String>> = RefCell::new(UnorderedIndex::new());
    pub static INDEX3: RefCell<OrderedIndex<Status>> = RefCell::new(OrderedIndex::new());
    pub static K_DROPPED: Cell<bool> = const { Cell::new(false) };
}

/// Binds every fixture index to `world`. Call once per test, right after
/// creating the world.
pub fn bind_indexes(world: &World) {
    INDEX1.with(|i| i.borrow_mut().bind(world));
    INDEX2.with(|i| i.borrow_mut().bind(world));
    INDEX3.with(|i| i.borrow_mut().bind(world));
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum Status {
    #[default]
    S1,
    S2,
    S3,
}

pub struct A {
    pub x: i64,
    pub y: i64,
}

impl Default for A {
    fn default() -> Self {
        Self { x: 0, y: 1 }
    }
}

impl Component for A {}

pub struct B {
    pub s: String,
}

impl Default for B {
    fn default() -> Self {
        Self { s: "abc".into() }
    }
}

impl Component for B {}

/// Component with an indexed integer field.
pub struct D {
    pub x: FieldProxy<i64, OrderedIndex<i64>>,
}

impl Default for D {
    fn default() -> Self {
        let mut d = Self { x: FieldProxy::new(0) };
        INDEX1.with(|i| d.x.bind_index(&mut i.borrow_mut()));
        d
    }
}

impl Component for D {}

/// Component with a plain field and an indexed string field.
pub struct E {
    pub x: i64,
    pub z: FieldProxy<String, UnorderedIndex<String>>,
}

impl Default for E {
    fn default() -> Self {
        let mut e = Self { x: 0, z: FieldProxy::new(String::new()) };
        INDEX2.with(|i| e.z.bind_index(&mut i.borrow_mut()));
        e
    }
}

impl Component for E {}

/// Component with an indexed enum field.
pub struct F {
    pub status: FieldProxy<Status, OrderedIndex<Status>>,
}

impl Default for F {
    fn default() -> Self {
        let mut f = Self { status: FieldProxy::new(Status::S1) };
        INDEX3.with(|i| f.status.bind_index(&mut i.borrow_mut()));
        f
    }
}

impl Component for F {}

/// Component whose destructor records that it ran.
pub struct K {
    pub a: i64,
    pub b: i64,
}

impl Default for K {
    fn default() -> Self {
        Self { a: 1, b: 3 }
    }
}

impl Drop for K {
    fn drop(&mut self) {
        K_DROPPED.with(|f| f.set(true));
    }
}

impl Component for K {}

/// Collects the ids a query currently yields.
pub fn query_ids(q: &mut Query) -> Vec<EntityId> {
    let mut out = Vec::new();
    q.for_each(|e| out.push(e.id()), false).unwrap();
    out
}

/// Collects the ids a cacher currently holds.
pub fn cache_ids(c: &mut Cacher) -> Vec<EntityId> {
    let mut out = Vec::new();
    c.for_each(|e| out.push(e.id()), false);
    out
}
