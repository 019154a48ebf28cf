//! Self-maintaining materialized views of query results.
//!
//! A cacher runs its query once at construction, then keeps the result set
//! consistent under arbitrary mutations by subscribing to three event
//! sources:
//!
//! 1. **Entity creation** in any matched archetype: insert the newborn if
//!    it passes every filter.
//! 2. **Entity removal** in any matched archetype: erase unconditionally;
//!    the entity is about to die.
//! 3. **Index updates** on each distinct index referenced by a filter:
//!    re-test the *entire* filter list for the touched entity, because
//!    filters on other indexes may have turned false independently, then
//!    insert or erase accordingly.
//!
//! Dropping the cacher removes every subscription, returning the world's
//! callback count and each index's listener count to their prior values.
//!
//! ## Ordering
//!
//! The default container keys entries by entity id, so iteration visits
//! same-archetype entities contiguously in packed-id order. A custom
//! comparator reorders iteration; internally that variant keeps a sorted
//! vector because a tree map cannot carry a runtime comparator, with the
//! entity id as a tie-break so ordering stays total.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ptr::NonNull;
use std::rc::Rc;

use tracing::trace;

use crate::engine::archetype::ArchetypeStorage;
use crate::engine::entity::EntityRef;
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::filter::{filters_pass, Filters};
use crate::engine::index::{IndexCore, ListenerId};
use crate::engine::matcher::AidSetRef;
use crate::engine::query::Query;
use crate::engine::types::{unpack_archetype, unpack_short, ArchetypeId, EntityId};
use crate::engine::world::{LifecycleEvent, WorldState};

type Comparator = Rc<dyn Fn(&EntityId, &EntityId) -> Ordering>;

/// Iteration order of a cacher's container.
pub(crate) enum OrderBy {
    EntityId,
    Comparator(Comparator),
}

impl OrderBy {
    pub(crate) fn entity_id() -> Self {
        OrderBy::EntityId
    }

    pub(crate) fn comparator(cmp: impl Fn(&EntityId, &EntityId) -> Ordering + 'static) -> Self {
        OrderBy::Comparator(Rc::new(cmp))
    }
}

/// Cached entity set, ordered by id or by a user comparator.
enum CacheStore {
    ById(BTreeMap<EntityId, EntityRef>),
    Custom { cmp: Comparator, entries: Vec<(EntityId, EntityRef)> },
}

impl CacheStore {
    fn new(order: OrderBy) -> Self {
        match order {
            OrderBy::EntityId => CacheStore::ById(BTreeMap::new()),
            OrderBy::Comparator(cmp) => CacheStore::Custom { cmp, entries: Vec::new() },
        }
    }

    fn len(&self) -> usize {
        match self {
            CacheStore::ById(map) => map.len(),
            CacheStore::Custom { entries, .. } => entries.len(),
        }
    }

    fn insert(&mut self, eid: EntityId, r: EntityRef) {
        match self {
            CacheStore::ById(map) => {
                map.insert(eid, r);
            }
            CacheStore::Custom { cmp, entries } => {
                let pos = entries
                    .partition_point(|(k, _)| cmp(k, &eid).then_with(|| k.cmp(&eid)) == Ordering::Less);
                if pos < entries.len() && entries[pos].0 == eid {
                    entries[pos].1 = r;
                } else {
                    entries.insert(pos, (eid, r));
                }
            }
        }
    }

    fn erase(&mut self, eid: EntityId) {
        match self {
            CacheStore::ById(map) => {
                map.remove(&eid);
            }
            CacheStore::Custom { cmp, entries } => {
                let pos = entries
                    .partition_point(|(k, _)| cmp(k, &eid).then_with(|| k.cmp(&eid)) == Ordering::Less);
                if pos < entries.len() && entries[pos].0 == eid {
                    entries.remove(pos);
                }
            }
        }
    }

    /// Snapshot of the cached references in iteration order.
    fn snapshot(&self, reversed: bool) -> Vec<EntityRef> {
        let mut out: Vec<EntityRef> = match self {
            CacheStore::ById(map) => map.values().copied().collect(),
            CacheStore::Custom { entries, .. } => entries.iter().map(|(_, r)| *r).collect(),
        };
        if reversed {
            out.reverse();
        }
        out
    }
}

/// State shared with the subscription closures; boxed for a stable address.
struct CacherState {
    store: CacheStore,
    filters: Filters,
    archetypes: HashMap<ArchetypeId, *mut ArchetypeStorage>,
}

/// A materialized, incrementally maintained result set of a query.
///
/// Stateful and tied to its subscriptions; cachers cannot be cloned and
/// must be dropped before the world and the indexes they subscribed to.
pub struct Cacher {
    world: *mut WorldState,
    state: Box<CacherState>,
    entity_cbs: Vec<u32>,
    index_cbs: Vec<(NonNull<IndexCore>, ListenerId)>,
}

impl Cacher {
    /// Runs `query` once and wires up the maintenance subscriptions.
    pub(crate) fn from_query(query: &mut Query, order: OrderBy) -> EcsResult<Self> {
        if !query.is_ready() {
            return Err(EcsError::QueryNotReady);
        }
        let world = query.world_ptr();
        let aids = query.matched_aids().expect("ready query lost its match result");
        let filters = query.filter_list();

        let mut archetypes: HashMap<ArchetypeId, *mut ArchetypeStorage> = HashMap::new();
        {
            let w = unsafe { &mut *world };
            for &aid in aids.iter() {
                archetypes.insert(aid, &mut *w.archetypes[aid as usize] as *mut ArchetypeStorage);
            }
        }

        let state = Box::new(CacherState { store: CacheStore::new(order), filters, archetypes });
        let mut cacher = Self { world, state, entity_cbs: Vec::new(), index_cbs: Vec::new() };

        // Nothing can ever match; skip seeding and subscriptions entirely.
        if aids.is_empty() {
            return Ok(cacher);
        }

        {
            let st: *mut CacherState = &mut *cacher.state;
            query.for_each(
                |r| {
                    let st = unsafe { &mut *st };
                    st.store.insert(r.id(), *r);
                },
                false,
            )?;
        }

        cacher.subscribe_entity_events(&aids);
        cacher.subscribe_index_events();
        trace!(entries = cacher.len(), "cacher constructed");
        Ok(cacher)
    }

    /// Watches entity creation and removal in the matched archetypes.
    fn subscribe_entity_events(&mut self, aids: &AidSetRef) {
        let world = unsafe { &mut *self.world };
        let st: *mut CacherState = &mut *self.state;

        let on_created = move |r: &mut EntityRef| {
            let st = unsafe { &mut *st };
            // Archetype membership needs no re-check: the callback was
            // subscribed per matched archetype id.
            if !st.filters.is_empty() && !filters_pass(&st.filters, r.id()) {
                return;
            }
            st.store.insert(r.id(), *r);
        };
        self.entity_cbs.push(world.push_lifecycle_callback(
            LifecycleEvent::Created,
            aids.clone(),
            Box::new(on_created),
        ));

        let st: *mut CacherState = &mut *self.state;
        let on_removed = move |r: &mut EntityRef| {
            // It is about to die; no filter check needed.
            let st = unsafe { &mut *st };
            st.store.erase(r.id());
        };
        self.entity_cbs.push(world.push_lifecycle_callback(
            LifecycleEvent::Removed,
            aids.clone(),
            Box::new(on_removed),
        ));
    }

    /// Watches value updates on each distinct index used by the filters.
    /// Inserts and erases are already covered by the lifecycle events.
    fn subscribe_index_events(&mut self) {
        if self.state.filters.is_empty() {
            return;
        }
        let mut seen: HashSet<usize> = HashSet::new();
        let filters = self.state.filters.clone();
        for filter in &filters {
            if !seen.insert(filter.index_identity()) {
                continue;
            }
            let st: *mut CacherState = &mut *self.state;
            let on_updated = move |eid: EntityId| {
                let st = unsafe { &mut *st };
                // Must belong to one of our archetypes.
                let Some(&arch) = st.archetypes.get(&unpack_archetype(eid)) else {
                    return;
                };
                // Re-test the whole filter list, not just the updated
                // index's filter; another filter may have become false on
                // its own.
                if filters_pass(&st.filters, eid) {
                    let r = unsafe { (*arch).unchecked_get(unpack_short(eid)) };
                    st.store.insert(eid, r);
                } else {
                    st.store.erase(eid);
                }
            };
            let core = filter.listener_core();
            let listener_id = unsafe { core.as_ref() }.on_index_value_updated(Box::new(on_updated));
            self.index_cbs.push((core, listener_id));
        }
    }

    /// Number of cached entities.
    pub fn len(&self) -> usize {
        self.state.store.len()
    }

    /// Returns `true` if the cache holds no entities.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visits every cached entity in container order (reversed on demand).
    ///
    /// Creating or removing entities, or updating indexes referenced by
    /// this cacher's filters, is undefined inside the callback; use
    /// deferred operations or [`collect`](Self::collect) instead.
    pub fn for_each(&mut self, mut cb: impl FnMut(&mut EntityRef), reversed: bool) {
        self.for_each_until(
            |r| {
                cb(r);
                false
            },
            reversed,
        )
    }

    /// `for_each` that stops once the callback returns `true`.
    pub fn for_each_until(&mut self, mut cb: impl FnMut(&mut EntityRef) -> bool, reversed: bool) {
        for mut r in self.state.store.snapshot(reversed) {
            if cb(&mut r) {
                break;
            }
        }
    }

    /// Copies the cached entity references into `out` in iteration order.
    pub fn collect(&mut self, out: &mut Vec<EntityRef>, reversed: bool) {
        self.for_each_until(
            |r| {
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
    ) {
        self.for_each_until(
            |r| {
                if tester(r) {
                    return true;
                }
                out.push(*r);
                false
            },
            reversed,
        )
    }
}

impl Drop for Cacher {
    fn drop(&mut self) {
        for (core, listener_id) in &self.index_cbs {
            unsafe { core.as_ref() }.remove_listener(*listener_id);
        }
        let world = unsafe { &mut *self.world };
        for id in &self.entity_cbs {
            world.remove_callback(*id);
        }
        trace!("cacher subscriptions removed");
    }
}
