//! One-shot filtered iteration over matched archetypes.
//!
//! A query pairs a signature relation (all / any / none) with an optional
//! ordered list of index filters. `pre_match` resolves the matching
//! archetypes once, at setup time, after every archetype has been created;
//! execution then either walks those archetypes directly (no filters) or
//! intersects indexed filter results (with filters).
//!
//! ## Filtered execution
//!
//! The first filter drives enumeration: it feeds an initial collector that
//! keeps only entity ids belonging to matched archetypes. Each subsequent
//! filter intersects the candidate set in place, stopping early once the
//! intersection is complete or the set runs dry. Survivors are sorted into
//! packed-id order, which groups same-archetype entities next to each
//! other, and visited through liveness-checked lookups so the callback may
//! legally kill entities mid-iteration.
//!
//! Filter order matters: the engine keeps no statistics, so the caller
//! should place the most selective filter first to shrink the candidate
//! set as early as possible.

use std::collections::HashSet;

use crate::engine::cacher::{Cacher, OrderBy};
use crate::engine::component::ComponentSet;
use crate::engine::entity::EntityRef;
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::filter::{Filter, Filters};
use crate::engine::matcher::{AidSetRef, MatchRelation};
use crate::engine::types::{unpack_archetype, ArchetypeId, EntityId, Signature};
use crate::engine::world::{World, WorldState};

/// A (relation, signature, filters) triple evaluated on demand.
pub struct Query {
    world: *mut WorldState,
    relation: MatchRelation,
    signature: Signature,
    filters: Filters,
    ready: bool,
    aids: Option<AidSetRef>,
    /// Sorted matched ids, for deterministic archetype visiting order.
    ordered_aids: Vec<ArchetypeId>,
}

impl Query {
    fn new(world: &World, relation: MatchRelation, signature: Signature) -> Self {
        Self {
            world: world.state_ptr(),
            relation,
            signature,
            filters: Filters::new(),
            ready: false,
            aids: None,
            ordered_aids: Vec::new(),
        }
    }

    /// Query over archetypes containing **all** of the components in `S`.
    pub fn all<S: ComponentSet>(world: &World) -> Self {
        Self::new(world, MatchRelation::All, S::signature())
    }

    /// Query over archetypes containing **any** of the components in `S`.
    /// With `S = ()` this matches every archetype in the world.
    pub fn any<S: ComponentSet>(world: &World) -> Self {
        Self::new(world, MatchRelation::Any, S::signature())
    }

    /// Query over archetypes containing **none** of the components in `S`.
    pub fn none<S: ComponentSet>(world: &World) -> Self {
        Self::new(world, MatchRelation::None, S::signature())
    }

    /// Seeds the query with initial filters.
    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Resolves and stores the matched archetype set.
    ///
    /// Call once at setup, after all archetypes are created; archetypes
    /// created later are not picked up. Idempotent.
    ///
    /// ## Errors
    /// `PreMatchTooEarly` if the world has no archetypes yet.
    pub fn pre_match(&mut self) -> EcsResult<&mut Self> {
        if self.ready {
            return Ok(self);
        }
        let world = unsafe { &mut *self.world };
        if world.archetypes.is_empty() {
            return Err(EcsError::PreMatchTooEarly);
        }
        let aids = world.matcher.match_and_store(self.relation, &self.signature);
        let mut ordered: Vec<ArchetypeId> = aids.iter().copied().collect();
        ordered.sort_unstable();
        self.ordered_aids = ordered;
        self.aids = Some(aids);
        self.ready = true;
        Ok(self)
    }

    /// Appends one filter. Earlier filters execute first and should narrow
    /// the candidate set most aggressively.
    pub fn filter(&mut self, f: Filter) -> &mut Self {
        self.filters.push(f);
        self
    }

    /// Appends several filters, preserving order.
    pub fn filters(&mut self, fs: Filters) -> &mut Self {
        self.filters.extend(fs);
        self
    }

    /// Removes every filter.
    pub fn clear_filters(&mut self) -> &mut Self {
        self.filters.clear();
        self
    }

    /// Executes the query, visiting matched entities in place.
    ///
    /// Entities are visited in ascending packed-id order (descending if
    /// `reversed`), so same-archetype entities are contiguous. Creating or
    /// removing entities, or writing an indexed field used by this query's
    /// filters, is undefined inside the callback unless the query has
    /// filters (whose execution re-validates liveness); prefer deferred
    /// operations or [`collect`](Self::collect).
    pub fn for_each(&mut self, mut cb: impl FnMut(&mut EntityRef), reversed: bool) -> EcsResult<()> {
        self.for_each_until_dyn(
            &mut |r| {
                cb(r);
                false
            },
            reversed,
        )
    }

    /// `for_each` that stops once the callback returns `true`.
    pub fn for_each_until(
        &mut self,
        mut cb: impl FnMut(&mut EntityRef) -> bool,
        reversed: bool,
    ) -> EcsResult<()> {
        self.for_each_until_dyn(&mut cb, reversed)
    }

    /// Executes the query, copying entity references into `out`.
    pub fn collect(&mut self, out: &mut Vec<EntityRef>, reversed: bool) -> EcsResult<()> {
        self.for_each_until_dyn(
            &mut |r| {
                out.push(*r);
                false
            },
            reversed,
        )
    }

    /// `collect` that stops *before* pushing the first entity for which
    /// `tester` returns `true`.
    pub fn collect_until(
        &mut self,
        out: &mut Vec<EntityRef>,
        mut tester: impl FnMut(&mut EntityRef) -> bool,
        reversed: bool,
    ) -> EcsResult<()> {
        self.for_each_until_dyn(
            &mut |r| {
                if tester(r) {
                    return true;
                }
                out.push(*r);
                false
            },
            reversed,
        )
    }

    /// Builds a self-maintaining cache of this query's result set, ordered
    /// by entity id.
    ///
    /// The query executes once immediately; afterwards the cache stays
    /// consistent through lifecycle and index subscriptions.
    pub fn cache(&mut self) -> EcsResult<Cacher> {
        Cacher::from_query(self, OrderBy::entity_id())
    }

    /// Like [`cache`](Self::cache) with a custom entity-id ordering.
    pub fn cache_with(
        &mut self,
        cmp: impl Fn(&EntityId, &EntityId) -> std::cmp::Ordering + 'static,
    ) -> EcsResult<Cacher> {
        Cacher::from_query(self, OrderBy::comparator(cmp))
    }

    fn for_each_until_dyn(
        &mut self,
        cb: &mut dyn FnMut(&mut EntityRef) -> bool,
        reversed: bool,
    ) -> EcsResult<()> {
        if !self.ready {
            return Err(EcsError::QueryNotReady);
        }
        if self.ordered_aids.is_empty() {
            return Ok(());
        }
        if self.filters.is_empty() {
            self.execute_for_all(cb, reversed);
        } else {
            self.execute_with_filters(cb, reversed);
        }
        Ok(())
    }

    /// No filters: delegate to each matched archetype in id order.
    fn execute_for_all(&mut self, cb: &mut dyn FnMut(&mut EntityRef) -> bool, reversed: bool) {
        let world = unsafe { &mut *self.world };
        let ids: Vec<ArchetypeId> = if reversed {
            self.ordered_aids.iter().rev().copied().collect()
        } else {
            self.ordered_aids.clone()
        };
        for aid in ids {
            let stopped = world.archetypes[aid as usize].for_each_until_dyn(cb, reversed);
            if stopped {
                break;
            }
        }
    }

    /// With filters: intersect indexed results, then visit survivors in
    /// sorted id order through liveness-checked lookups.
    fn execute_with_filters(&mut self, cb: &mut dyn FnMut(&mut EntityRef) -> bool, reversed: bool) {
        let aids = self.aids.as_ref().expect("ready query lost its match result").clone();

        // The first filter drives enumeration; keep only ids belonging to
        // matched archetypes.
        let mut candidates: HashSet<EntityId> = HashSet::new();
        self.filters[0].execute(&mut |eid| {
            if aids.contains(&unpack_archetype(eid)) {
                candidates.insert(eid);
            }
            false
        });

        // Remaining filters shrink the set in place. Each pass copies the
        // intersection into a scratch set and stops early once every
        // candidate has been re-confirmed.
        let mut scratch: HashSet<EntityId> = HashSet::new();
        for filter in &self.filters[1..] {
            if candidates.is_empty() {
                break;
            }
            filter.execute(&mut |eid| {
                if candidates.contains(&eid) {
                    scratch.insert(eid);
                }
                scratch.len() == candidates.len()
            });
            std::mem::swap(&mut candidates, &mut scratch);
            scratch.clear();
        }

        let mut survivors: Vec<EntityId> = candidates.into_iter().collect();
        survivors.sort_unstable();
        if reversed {
            survivors.reverse();
        }

        let world = unsafe { &mut *self.world };
        for eid in survivors {
            // The callback may kill entities; re-validate liveness on each
            // lookup.
            let mut r = world.get(eid);
            if r.is_null() {
                continue;
            }
            if cb(&mut r) {
                break;
            }
        }
    }

    // ~~~~ cacher construction internals ~~~~

    pub(crate) fn world_ptr(&self) -> *mut WorldState {
        self.world
    }

    pub(crate) fn matched_aids(&self) -> Option<AidSetRef> {
        self.aids.clone()
    }

    pub(crate) fn filter_list(&self) -> Filters {
        self.filters.clone()
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready
    }
}
