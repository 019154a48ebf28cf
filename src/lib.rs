//! # Strata
//!
//! Archetype-based entity-component storage engine with secondary field
//! indexes, incremental query caches, and deferred entity lifecycle
//! operations.
//!
//! ## Design Goals
//! - Archetype-based columnar storage for cache efficiency
//! - O(1) component access, O(log N) entity lifecycle operations
//! - Indexed range and equality filters over component fields
//! - Materialized query views that stay consistent under mutation
//! - Deterministic, single-threaded execution
//!
//! Built for simulation workloads (games, agent simulations,
//! discrete-event systems) where tens to hundreds of thousands of entities
//! are created, mutated, queried, and destroyed each tick.
//!
//! ## Quick tour
//!
//! ```no_run
//! use strata::prelude::*;
//!
//! #[derive(Default)]
//! struct Position { x: f64, y: f64 }
//! impl Component for Position {}
//!
//! #[derive(Default)]
//! struct Velocity { dx: f64, dy: f64 }
//! impl Component for Velocity {}
//!
//! let mut world = World::new();
//! let mut movers = world.new_archetype::<(Position, Velocity)>().unwrap();
//! let mut e = movers.new_entity();
//! e.get::<Position>().unwrap().x = 4.0;
//!
//! let mut q = Query::all::<(Position, Velocity)>(&world);
//! q.pre_match().unwrap();
//! q.for_each(|e| {
//!     let (dx, dy) = {
//!         let v = e.get::<Velocity>().unwrap();
//!         (v.dx, v.dy)
//!     };
//!     let p = e.get::<Position>().unwrap();
//!     p.x += dx;
//!     p.y += dy;
//! }, false).unwrap();
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::types::{
    build_signature, pack, unpack_archetype, unpack_short, ArchetypeId, ComponentId, EntityId,
    EntityShortId, Signature, MAX_ARCHETYPES_PER_WORLD, MAX_COMPONENTS, MAX_ENTITIES_PER_BLOCK,
};

pub use engine::error::{EcsError, EcsResult};

pub use engine::component::{
    component_id_of, component_desc_of, num_registered_components, Component, ComponentDesc,
    ComponentSet,
};

pub use engine::cemetery::Cemetery;

pub use engine::entity::EntityRef;

pub use engine::archetype::Archetype;

pub use engine::matcher::{MatchRelation, Matcher};

pub use engine::index::{FieldIndex, IndexSlot, ListenerId, OrderedIndex, UnorderedIndex};

pub use engine::proxy::FieldProxy;

pub use engine::filter::{Filter, Filters};

pub use engine::query::Query;

pub use engine::cacher::Cacher;

pub use engine::world::{CallbackId, World};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used engine types.
///
/// Import with:
/// ```rust
/// use strata::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Archetype, Cacher, Component, EntityId, EntityRef, FieldIndex, FieldProxy, Filter,
        OrderedIndex, Query, UnorderedIndex, World,
    };
}
