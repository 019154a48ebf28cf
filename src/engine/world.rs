//! World: owner of archetypes, matcher, deferred queues, and lifecycle
//! callbacks.
//!
//! The world routes every entity-level operation to the owning archetype by
//! unpacking the entity id. It also carries the two deferred FIFOs (born
//! and kill) so that `apply_delayed_new_entities` and `apply_delayed_kills`
//! replay operations in exactly the order user code requested them, across
//! archetypes.
//!
//! ## Lifecycle callbacks
//!
//! `after_entity_created` and `before_entity_removed` register callbacks
//! keyed by the archetypes matching *all* of the given components.
//! Registration resolves the archetype set once, so it must happen after
//! every archetype exists. Callbacks live in an id-keyed map; a redundant
//! flat table `table[event][archetype_id]` makes firing O(k) in the
//! callbacks actually subscribed to that archetype.
//!
//! ## Creation attribution
//!
//! While an entity's components are being constructed, the world exposes
//! the entity's id through a scratch slot. Field-proxy insertions read it
//! to attribute their index entries; it is cleared as soon as construction
//! finishes.
//!
//! ## Stability
//!
//! All world state lives in a heap box, and archetype storage is itself
//! boxed, so interior back-pointers held by archetypes, queries, and
//! cachers survive moves of the [`World`] value. Queries and cachers must
//! still be dropped before the world they were built from.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use tracing::debug;

use crate::engine::archetype::{Archetype, ArchetypeStorage};
use crate::engine::component::ComponentSet;
use crate::engine::entity::{BoxedAccessor, EntityRef};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::matcher::{AidSetRef, MatchRelation, Matcher};
use crate::engine::types::{
    pack, unpack_archetype, unpack_short, ArchetypeId, EntityId, EntityShortId,
    MAX_ARCHETYPES_PER_WORLD, MAX_COMPONENTS,
};

/// Lifecycle callback registration id.
pub type CallbackId = u32;

/// Which lifecycle edge a callback subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LifecycleEvent {
    Created,
    Removed,
}

impl LifecycleEvent {
    #[inline]
    fn index(self) -> usize {
        match self {
            LifecycleEvent::Created => 0,
            LifecycleEvent::Removed => 1,
        }
    }
}

struct LifecycleCallback {
    event: LifecycleEvent,
    func: RefCell<BoxedAccessor>,
    /// Archetype set resolved at registration; shared with the matcher's
    /// store.
    aids: AidSetRef,
}

/// Heap-pinned world internals; archetypes and indexes hold raw pointers
/// back into this.
pub(crate) struct WorldState {
    pub(crate) archetypes: Vec<Box<ArchetypeStorage>>,
    pub(crate) matcher: Matcher,
    /// Deferred creations and kills in user request order.
    to_born: VecDeque<EntityId>,
    to_kill: VecDeque<EntityId>,
    /// The entity whose components are being constructed right now.
    last_created: Option<EntityId>,
    callbacks: HashMap<CallbackId, Rc<LifecycleCallback>>,
    next_callback_id: CallbackId,
    /// table[event][archetype_id] -> subscribed callbacks.
    table: [Vec<Vec<Rc<LifecycleCallback>>>; 2],
}

impl WorldState {
    fn new() -> Self {
        Self {
            archetypes: Vec::new(),
            matcher: Matcher::new(),
            to_born: VecDeque::new(),
            to_kill: VecDeque::new(),
            last_created: None,
            callbacks: HashMap::new(),
            next_callback_id: 0,
            table: [Vec::new(), Vec::new()],
        }
    }

    #[inline]
    pub(crate) fn last_created_entity_id(&self) -> Option<EntityId> {
        self.last_created
    }

    #[inline]
    pub(crate) fn set_last_created_entity_id(&mut self, eid: EntityId) {
        self.last_created = Some(eid);
    }

    #[inline]
    pub(crate) fn clear_last_created_entity_id(&mut self) {
        self.last_created = None;
    }

    pub(crate) fn get(&self, eid: EntityId) -> EntityRef {
        let aid = unpack_archetype(eid) as usize;
        match self.archetypes.get(aid) {
            None => EntityRef::null(),
            Some(a) => a.get(unpack_short(eid)),
        }
    }

    pub(crate) fn enqueue_delayed_new(&mut self, aid: ArchetypeId, e: EntityShortId) {
        self.to_born.push_back(pack(aid, e));
    }

    pub(crate) fn enqueue_delayed_kill(&mut self, aid: ArchetypeId, e: EntityShortId) {
        self.to_kill.push_back(pack(aid, e));
    }

    pub(crate) fn after_entity_created(&mut self, aid: ArchetypeId, e: EntityShortId) {
        self.trigger(aid, e, LifecycleEvent::Created);
    }

    pub(crate) fn before_entity_removed(&mut self, aid: ArchetypeId, e: EntityShortId) {
        self.trigger(aid, e, LifecycleEvent::Removed);
    }

    fn trigger(&mut self, aid: ArchetypeId, e: EntityShortId, event: LifecycleEvent) {
        let subscribed = match self.table[event.index()].get(aid as usize) {
            Some(list) if !list.is_empty() => list.clone(),
            _ => return,
        };
        for cb in subscribed {
            let mut r = self.archetypes[aid as usize].unchecked_get(e);
            (&mut *cb.func.borrow_mut())(&mut r);
        }
    }

    pub(crate) fn push_lifecycle_callback(
        &mut self,
        event: LifecycleEvent,
        aids: AidSetRef,
        func: BoxedAccessor,
    ) -> CallbackId {
        let id = self.next_callback_id;
        self.next_callback_id += 1;
        let cb = Rc::new(LifecycleCallback { event, func: RefCell::new(func), aids: aids.clone() });
        for &aid in aids.iter() {
            self.table[event.index()][aid as usize].push(Rc::clone(&cb));
        }
        self.callbacks.insert(id, cb);
        id
    }

    pub(crate) fn remove_callback(&mut self, id: CallbackId) {
        let Some(cb) = self.callbacks.remove(&id) else {
            return;
        };
        for &aid in cb.aids.iter() {
            self.table[cb.event.index()][aid as usize].retain(|c| !Rc::ptr_eq(c, &cb));
        }
    }
}

/// A single-threaded entity world.
///
/// Owns archetypes in creation order (the index is the archetype id), the
/// signature matcher, the deferred operation queues, and the lifecycle
/// callback registry.
pub struct World {
    state: Box<WorldState>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Creates an empty world.
    pub fn new() -> Self {
        Self { state: Box::new(WorldState::new()) }
    }

    #[inline]
    pub(crate) fn state_ptr(&self) -> *mut WorldState {
        &*self.state as *const WorldState as *mut WorldState
    }

    /// Creates a new archetype over the component set `S`.
    ///
    /// The returned handle stays valid for the world's lifetime. The
    /// archetype's signature is fixed at creation.
    ///
    /// ## Errors
    /// - `TooManyArchetypes` past [`MAX_ARCHETYPES_PER_WORLD`].
    /// - `TooManyComponents` if a component id exceeds [`MAX_COMPONENTS`].
    /// - `EmptyArchetype` / `DuplicateComponent` for malformed sets.
    pub fn new_archetype<S: ComponentSet>(&mut self) -> EcsResult<Archetype> {
        let id = self.state.archetypes.len();
        if id >= MAX_ARCHETYPES_PER_WORLD {
            return Err(EcsError::TooManyArchetypes { cap: MAX_ARCHETYPES_PER_WORLD });
        }
        let descs = S::descriptors();
        for desc in &descs {
            if (desc.component_id as usize) >= MAX_COMPONENTS {
                return Err(EcsError::TooManyComponents {
                    component: desc.component_id,
                    cap: MAX_COMPONENTS,
                });
            }
        }
        let signature = S::signature();
        let world_ptr: *mut WorldState = &mut *self.state;
        let storage =
            Box::new(ArchetypeStorage::new(id as ArchetypeId, world_ptr, descs, signature)?);
        self.state.matcher.put(&signature, id as ArchetypeId);
        self.state.archetypes.push(storage);
        self.state.table[0].push(Vec::new());
        self.state.table[1].push(Vec::new());
        debug!(archetype = id, components = signature.len(), "created archetype");
        let raw: *mut ArchetypeStorage = &mut *self.state.archetypes[id];
        Ok(Archetype::from_raw(raw))
    }

    /// Number of archetypes created so far.
    pub fn num_archetypes(&self) -> usize {
        self.state.archetypes.len()
    }

    /// Returns `true` if `eid` denotes an alive entity.
    pub fn is_alive(&self, eid: EntityId) -> bool {
        let aid = unpack_archetype(eid) as usize;
        match self.state.archetypes.get(aid) {
            None => false,
            Some(a) => a.is_alive(unpack_short(eid)),
        }
    }

    /// Returns the entity's reference, or a null reference if the id does
    /// not denote an alive entity.
    pub fn get(&self, eid: EntityId) -> EntityRef {
        self.state.get(eid)
    }

    /// Builds a reference without validating the id.
    ///
    /// Undefined behavior if the archetype id is out of range or the row
    /// was never allocated; intended for hot paths where the caller has
    /// already proven validity.
    pub fn unchecked_get(&self, eid: EntityId) -> EntityRef {
        self.state.archetypes[unpack_archetype(eid) as usize].unchecked_get(unpack_short(eid))
    }

    /// Kills an entity immediately. Unknown archetype ids and dead
    /// entities are silently ignored.
    pub fn kill(&mut self, eid: EntityId) {
        let aid = unpack_archetype(eid) as usize;
        if let Some(a) = self.state.archetypes.get_mut(aid) {
            a.kill(unpack_short(eid), None);
        }
    }

    /// Marks an entity to be killed by [`apply_delayed_kills`](Self::apply_delayed_kills).
    pub fn delayed_kill(&mut self, eid: EntityId) {
        let aid = unpack_archetype(eid) as usize;
        if let Some(a) = self.state.archetypes.get_mut(aid) {
            a.delayed_kill(unpack_short(eid), None);
        }
    }

    /// Deferred kill with a callback run right before the applied removal.
    /// Component destructors run on the entity's death regardless.
    pub fn delayed_kill_with(&mut self, eid: EntityId, before: impl FnMut(&mut EntityRef) + 'static) {
        let aid = unpack_archetype(eid) as usize;
        if let Some(a) = self.state.archetypes.get_mut(aid) {
            a.delayed_kill(unpack_short(eid), Some(Box::new(before)));
        }
    }

    /// Applies every deferred creation, in the order the
    /// `delayed_new_entity` calls were made across all archetypes.
    pub fn apply_delayed_new_entities(&mut self) {
        let mut applied = 0usize;
        while let Some(eid) = self.state.to_born.pop_front() {
            let aid = unpack_archetype(eid) as usize;
            if aid < self.state.archetypes.len() {
                self.state.archetypes[aid].apply_delayed_new(unpack_short(eid));
                applied += 1;
            }
        }
        debug!(applied, "applied deferred creations");
    }

    /// Applies every deferred kill, in the order the `delayed_kill` calls
    /// were made across all archetypes.
    pub fn apply_delayed_kills(&mut self) {
        let mut applied = 0usize;
        while let Some(eid) = self.state.to_kill.pop_front() {
            let aid = unpack_archetype(eid) as usize;
            if aid < self.state.archetypes.len() {
                self.state.archetypes[aid].apply_delayed_kill(unpack_short(eid));
                applied += 1;
            }
        }
        debug!(applied, "applied deferred kills");
    }

    /// Registers a callback fired right after an entity is created in any
    /// archetype containing all components of `S`.
    ///
    /// ## Errors
    /// `LifecycleRegistrationTooEarly` if no archetype exists yet; the
    /// archetype set is resolved once, at registration.
    pub fn after_entity_created<S: ComponentSet>(
        &mut self,
        cb: impl FnMut(&mut EntityRef) + 'static,
    ) -> EcsResult<CallbackId> {
        self.register_lifecycle::<S>(LifecycleEvent::Created, Box::new(cb))
    }

    /// Registers a callback fired right before an entity is removed from
    /// any archetype containing all components of `S`.
    pub fn before_entity_removed<S: ComponentSet>(
        &mut self,
        cb: impl FnMut(&mut EntityRef) + 'static,
    ) -> EcsResult<CallbackId> {
        self.register_lifecycle::<S>(LifecycleEvent::Removed, Box::new(cb))
    }

    fn register_lifecycle<S: ComponentSet>(
        &mut self,
        event: LifecycleEvent,
        func: BoxedAccessor,
    ) -> EcsResult<CallbackId> {
        if self.state.archetypes.is_empty() {
            return Err(EcsError::LifecycleRegistrationTooEarly);
        }
        let aids = self.state.matcher.match_and_store(MatchRelation::All, &S::signature());
        Ok(self.state.push_lifecycle_callback(event, aids, func))
    }

    /// Removes a lifecycle callback by id. Unknown ids are ignored.
    pub fn remove_callback(&mut self, id: CallbackId) {
        self.state.remove_callback(id);
    }

    /// Number of registered lifecycle callbacks.
    pub fn num_callbacks(&self) -> usize {
        self.state.callbacks.len()
    }
}
