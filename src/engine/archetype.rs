//! Archetype storage: contiguous columnar blocks of same-signature entities.
//!
//! An archetype owns every entity whose component set equals its signature.
//! Storage is a list of fixed-size [`Block`]s; each block holds
//! `MAX_ENTITIES_PER_BLOCK` rows laid out as:
//!
//! ```text
//!         +-------------------- cell x num_cols -------------------+
//! Row(0)  | EntityRef(0) | Component A | Component B | ...         |
//! Row(1)  | EntityRef(1) | Component A | Component B | ...         |
//!         +--------------------------------------------------------+
//! ```
//!
//! Every cell has the same width, the maximum of the component sizes and the
//! entity-reference size, so a row address plus a column index resolves any
//! component in constant time. The leading cell always holds the entity's
//! own [`EntityRef`], making a raw row pointer self-describing.
//!
//! ## Entity life cycle
//!
//! ```text
//!                          +----------------------------------------+
//!                          |                  kill                  |
//!                          |                                        v
//!      {to_born} ------> {alives} ------------> {to_kill} ------> {cemetery}
//!         ^       apply    ^  ^    delayed_kill            apply     |
//!  delayed|            new |  |                                      |
//!   new   |          ------+  +------------- recycle id -------------+
//! ```
//!
//! Short ids are recycled through the [`Cemetery`] in FIFO order. An ordered
//! set of alive ids drives `for_each` without scanning holes; liveness
//! checks go through the cemetery and the to-born map instead because both
//! are O(1).
//!
//! ## Safety
//!
//! This module contains `unsafe` code for writing entity references and
//! components into raw block memory and for calling back into the owning
//! world through a raw pointer. Row addresses are stable for the life of
//! the archetype; blocks never move.

use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::engine::cemetery::Cemetery;
use crate::engine::component::ComponentDesc;
use crate::engine::entity::{BoxedAccessor, EntityRef};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::storage::{zero_row, Block, RowLayout};
use crate::engine::types::{
    pack, ArchetypeId, ComponentId, EntityId, EntityShortId, Signature, MAX_COMPONENTS,
    MAX_ENTITIES_PER_BLOCK,
};
use crate::engine::world::WorldState;

/// Sentinel for "component not in this archetype" in the column map.
const NO_COLUMN: u16 = u16::MAX;

/// Owning storage for all entities of one signature.
pub(crate) struct ArchetypeStorage {
    id: ArchetypeId,
    world: *mut WorldState,
    signature: Signature,
    /// Descriptors in column order (ascending component id).
    comps: Vec<ComponentDesc>,
    /// cols[component_id] -> column index within a row; columns start at 1
    /// because column 0 holds the entity reference.
    cols: [u16; MAX_COMPONENTS],
    layout: RowLayout,
    blocks: Vec<Block>,
    /// Next never-used short id.
    cursor: EntityShortId,
    /// Ordered alive set, drives iteration without scanning holes.
    alives: BTreeSet<EntityShortId>,
    cemetery: Cemetery,
    /// Reserved rows waiting for `apply_delayed_new_entities`, with their
    /// recorded initializers.
    to_born: HashMap<EntityShortId, Option<BoxedAccessor>>,
    /// Alive rows marked for `apply_delayed_kills`, with their recorded
    /// before-kill callbacks.
    to_kill: HashMap<EntityShortId, Option<BoxedAccessor>>,
}

impl ArchetypeStorage {
    pub fn new(
        id: ArchetypeId,
        world: *mut WorldState,
        mut comps: Vec<ComponentDesc>,
        signature: Signature,
    ) -> EcsResult<Self> {
        if comps.is_empty() {
            return Err(EcsError::EmptyArchetype);
        }
        comps.sort_by_key(|d| d.component_id);
        for pair in comps.windows(2) {
            if pair[0].component_id == pair[1].component_id {
                return Err(EcsError::DuplicateComponent { name: pair[1].name });
            }
        }

        let mut cols = [NO_COLUMN; MAX_COMPONENTS];
        let mut max_size = std::mem::size_of::<EntityRef>();
        let mut max_align = std::mem::align_of::<EntityRef>();
        for (i, desc) in comps.iter().enumerate() {
            if (desc.component_id as usize) >= MAX_COMPONENTS {
                return Err(EcsError::TooManyComponents {
                    component: desc.component_id,
                    cap: MAX_COMPONENTS,
                });
            }
            // Column 0 is the entity reference.
            cols[desc.component_id as usize] = (i + 1) as u16;
            max_size = max_size.max(desc.size);
            max_align = max_align.max(desc.align);
        }

        let layout = RowLayout::new(comps.len() + 1, max_size, max_align);
        Ok(Self {
            id,
            world,
            signature,
            comps,
            cols,
            layout,
            blocks: Vec::new(),
            cursor: 0,
            alives: BTreeSet::new(),
            cemetery: Cemetery::new(),
            to_born: HashMap::new(),
            to_kill: HashMap::new(),
        })
    }

    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Number of alive entities plus pending kills; to-born and dead rows
    /// are excluded. Cemetery and to-born never exceed the cursor, so the
    /// subtraction cannot underflow.
    #[inline]
    pub fn num_entities(&self) -> usize {
        self.cursor as usize - self.cemetery.len() - self.to_born.len()
    }

    #[inline]
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Size of a single block in bytes.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.layout.block_size
    }

    /// Preallocates storage for `num_entities` rows.
    ///
    /// Grows the block list, the cemetery's membership blocks, and the
    /// deferred-op maps; never creates entities.
    pub fn reserve(&mut self, num_entities: usize) {
        let blocks_needed = num_entities.div_ceil(MAX_ENTITIES_PER_BLOCK);
        while self.blocks.len() < blocks_needed {
            self.blocks.push(Block::zeroed(&self.layout));
        }
        self.cemetery.reserve(blocks_needed);
        self.to_born.reserve(num_entities);
        self.to_kill.reserve(num_entities);
    }

    #[inline]
    fn self_ptr(&self) -> *mut ArchetypeStorage {
        self as *const ArchetypeStorage as *mut ArchetypeStorage
    }

    /// Address of the row for short id `e`.
    ///
    /// The row must have been allocated (`e` below the cursor).
    #[inline]
    pub fn row_ptr(&self, e: EntityShortId) -> *mut u8 {
        let block = &self.blocks[e as usize / MAX_ENTITIES_PER_BLOCK];
        unsafe {
            block
                .as_ptr()
                .add((e as usize % MAX_ENTITIES_PER_BLOCK) * self.layout.row_size)
        }
    }

    /// Resolves a component's cell within a row, checking the column map.
    pub fn component_ptr(&self, data: *mut u8, cid: ComponentId, name: &'static str) -> EcsResult<*mut u8> {
        let col = if (cid as usize) < MAX_COMPONENTS { self.cols[cid as usize] } else { NO_COLUMN };
        if col == NO_COLUMN {
            return Err(EcsError::UnknownComponent { archetype: self.id, component: cid, name });
        }
        Ok(unsafe { data.add(col as usize * self.layout.cell_size) })
    }

    /// Resolves a component's cell without validating the column map.
    ///
    /// Undefined behavior if the component is not part of this archetype.
    #[inline]
    pub fn unchecked_component_ptr(&self, data: *mut u8, cid: ComponentId) -> *mut u8 {
        debug_assert!(self.cols[cid as usize] != NO_COLUMN);
        unsafe { data.add(self.cols[cid as usize] as usize * self.layout.cell_size) }
    }

    /// O(1) liveness check: allocated, not buried, not waiting to be born.
    #[inline]
    pub fn is_alive(&self, e: EntityShortId) -> bool {
        e < self.cursor && !self.cemetery.contains(e) && !self.to_born.contains_key(&e)
    }

    /// Returns a reference to the entity, or a null reference if it is not
    /// alive.
    pub fn get(&self, e: EntityShortId) -> EntityRef {
        if !self.is_alive(e) {
            return EntityRef::null();
        }
        self.unchecked_get(e)
    }

    /// Builds a reference from the row without any liveness check.
    #[inline]
    pub fn unchecked_get(&self, e: EntityShortId) -> EntityRef {
        EntityRef::new(self.self_ptr(), self.row_ptr(e), pack(self.id, e))
    }

    /// Pops a recycled row or claims a fresh one, growing block storage on
    /// demand. The returned row is fully zeroed.
    fn allocate_row(&mut self) -> (EntityShortId, *mut u8) {
        if let Some(e) = self.cemetery.pop() {
            let data = self.row_ptr(e);
            unsafe { zero_row(data, self.layout.row_size) };
            return (e, data);
        }
        let e = self.cursor;
        self.cursor += 1;
        if e as usize >= self.blocks.len() * MAX_ENTITIES_PER_BLOCK {
            self.blocks.push(Block::zeroed(&self.layout));
            trace!(archetype = self.id, blocks = self.blocks.len(), "allocated block");
        }
        (e, self.row_ptr(e))
    }

    /// Writes the entity's self-describing reference into column 0.
    fn emplace_header(&mut self, e: EntityShortId, data: *mut u8) -> EntityRef {
        let r = EntityRef::new(self.self_ptr(), data, pack(self.id, e));
        unsafe { data.cast::<EntityRef>().write(r) };
        r
    }

    /// Default-constructs every component of the row.
    fn construct_components(&self, data: *mut u8) {
        for desc in &self.comps {
            let slot = self.unchecked_component_ptr(data, desc.component_id);
            unsafe { (desc.construct)(slot) };
        }
    }

    /// Drops every component of the row in place.
    fn destruct_components(&self, data: *mut u8) {
        for desc in &self.comps {
            let slot = self.unchecked_component_ptr(data, desc.component_id);
            unsafe { (desc.destruct)(slot) };
        }
    }

    /// Runs the construction protocol for a row: publish the creating
    /// entity id, run the initializer (or the default constructors), then
    /// clear the id and fire the post-create hook.
    fn run_initializer(
        &mut self,
        e: EntityShortId,
        data: *mut u8,
        initializer: Option<&mut dyn FnMut(&mut EntityRef)>,
    ) {
        let eid = pack(self.id, e);
        let mut r = EntityRef::new(self.self_ptr(), data, eid);
        unsafe { (*self.world).set_last_created_entity_id(eid) };
        match initializer {
            Some(init) => init(&mut r),
            None => self.construct_components(data),
        }
        unsafe { (*self.world).clear_last_created_entity_id() };
        self.alives.insert(e);
        unsafe { (*self.world).after_entity_created(self.id, e) };
    }

    /// Creates a new entity immediately and returns its reference.
    ///
    /// Dead ids and their rows are recycled first, oldest first; otherwise a
    /// fresh row is claimed, allocating a new block when the current ones
    /// are full. Without an initializer every component is
    /// default-constructed; with one, the initializer is responsible for
    /// constructing every component.
    pub fn new_entity(&mut self, initializer: Option<&mut dyn FnMut(&mut EntityRef)>) -> EntityRef {
        let (e, data) = self.allocate_row();
        let r = self.emplace_header(e, data);
        self.run_initializer(e, data, initializer);
        r
    }

    /// Reserves a row and id for an entity to be born later.
    ///
    /// The entity is not alive and holds no constructed components until
    /// `apply_delayed_new_entities` runs its initializer.
    pub fn delayed_new_entity(&mut self, initializer: Option<BoxedAccessor>) -> EntityId {
        let (e, data) = self.allocate_row();
        self.emplace_header(e, data);
        self.to_born.insert(e, initializer);
        unsafe { (*self.world).enqueue_delayed_new(self.id, e) };
        pack(self.id, e)
    }

    /// Makes a deferred entity alive, running its recorded initializer.
    pub fn apply_delayed_new(&mut self, e: EntityShortId) {
        let Some(initializer) = self.to_born.remove(&e) else {
            return;
        };
        let data = self.row_ptr(e);
        match initializer {
            Some(mut init) => self.run_initializer(e, data, Some(&mut *init)),
            None => self.run_initializer(e, data, None),
        }
    }

    /// Kills an entity immediately.
    ///
    /// Out-of-range, dead, and not-yet-born ids are silently ignored. The
    /// optional `before` callback runs first, then the world's
    /// before-removal hook, then the component destructors; finally the id
    /// is buried for FIFO recycling.
    pub fn kill(&mut self, e: EntityShortId, before: Option<&mut dyn FnMut(&mut EntityRef)>) {
        if !self.is_alive(e) {
            return;
        }
        let data = self.row_ptr(e);
        if let Some(cb) = before {
            let mut r = EntityRef::new(self.self_ptr(), data, pack(self.id, e));
            cb(&mut r);
        }
        unsafe { (*self.world).before_entity_removed(self.id, e) };
        self.destruct_components(data);
        self.cemetery.add(e);
        self.alives.remove(&e);
    }

    /// Marks an entity to be killed by `apply_delayed_kills`.
    ///
    /// The entity stays alive until the kill is applied. Repeated marks
    /// keep the first recorded callback.
    pub fn delayed_kill(&mut self, e: EntityShortId, before: Option<BoxedAccessor>) {
        if !self.is_alive(e) || self.to_kill.contains_key(&e) {
            return;
        }
        self.to_kill.insert(e, before);
        unsafe { (*self.world).enqueue_delayed_kill(self.id, e) };
    }

    /// Applies a deferred kill previously marked on `e`.
    pub fn apply_delayed_kill(&mut self, e: EntityShortId) {
        let Some(before) = self.to_kill.remove(&e) else {
            return;
        };
        match before {
            Some(mut cb) => self.kill(e, Some(&mut *cb)),
            None => self.kill(e, None),
        }
    }

    /// Visits alive entities in short-id order, or reversed. Returns `true`
    /// if the callback stopped the iteration.
    ///
    /// The alive set is snapshotted up front and each entity is re-checked
    /// before its visit, so entities killed by the callback are skipped
    /// rather than visited dead.
    pub fn for_each_until_dyn(
        &mut self,
        cb: &mut dyn FnMut(&mut EntityRef) -> bool,
        reversed: bool,
    ) -> bool {
        let ids: Vec<EntityShortId> = if reversed {
            self.alives.iter().rev().copied().collect()
        } else {
            self.alives.iter().copied().collect()
        };
        for e in ids {
            if !self.is_alive(e) {
                continue;
            }
            let mut r = self.unchecked_get(e);
            if cb(&mut r) {
                return true;
            }
        }
        false
    }
}

impl Drop for ArchetypeStorage {
    fn drop(&mut self) {
        // Alive rows still hold constructed components; to-born rows never
        // ran their constructors and the cemetery's rows were destructed on
        // kill.
        let alive: Vec<EntityShortId> = self.alives.iter().copied().collect();
        for e in alive {
            let data = self.row_ptr(e);
            self.destruct_components(data);
        }
    }
}

/// Handle to an archetype owned by a [`crate::World`].
///
/// The handle stays valid for the lifetime of the world; it is a thin
/// pointer into world-owned storage and is freely copyable. All entity
/// creation happens through this handle.
#[derive(Clone, Copy)]
pub struct Archetype {
    raw: *mut ArchetypeStorage,
}

impl Archetype {
    pub(crate) fn from_raw(raw: *mut ArchetypeStorage) -> Self {
        Self { raw }
    }

    #[inline]
    fn storage(&self) -> &ArchetypeStorage {
        unsafe { &*self.raw }
    }

    #[inline]
    fn storage_mut(&mut self) -> &mut ArchetypeStorage {
        unsafe { &mut *self.raw }
    }

    /// This archetype's id within its world.
    pub fn id(&self) -> ArchetypeId {
        self.storage().id()
    }

    /// The immutable component signature fixed at creation.
    pub fn signature(&self) -> Signature {
        *self.storage().signature()
    }

    /// Number of alive entities (pending deferred kills included).
    pub fn num_entities(&self) -> usize {
        self.storage().num_entities()
    }

    /// Number of allocated storage blocks. Blocks never shrink.
    pub fn num_blocks(&self) -> usize {
        self.storage().num_blocks()
    }

    /// Size of a single storage block in bytes.
    pub fn block_size(&self) -> usize {
        self.storage().block_size()
    }

    /// Preallocates storage for `num_entities` rows without creating any
    /// entity.
    pub fn reserve(&mut self, num_entities: usize) {
        self.storage_mut().reserve(num_entities)
    }

    /// Creates a new entity, default-constructing every component.
    pub fn new_entity(&mut self) -> EntityRef {
        self.storage_mut().new_entity(None)
    }

    /// Creates a new entity, running `initializer` instead of the default
    /// constructors. The initializer must construct every component, e.g.
    /// through [`EntityRef::construct`].
    pub fn new_entity_with(&mut self, mut initializer: impl FnMut(&mut EntityRef)) -> EntityRef {
        self.storage_mut().new_entity(Some(&mut initializer))
    }

    /// Reserves an entity to be born on `apply_delayed_new_entities`,
    /// returning its id. The entity reports `is_alive() == false` until
    /// applied.
    pub fn delayed_new_entity(&mut self) -> EntityId {
        self.storage_mut().delayed_new_entity(None)
    }

    /// Deferred creation with a recorded initializer, run at apply time.
    pub fn delayed_new_entity_with(
        &mut self,
        initializer: impl FnMut(&mut EntityRef) + 'static,
    ) -> EntityId {
        self.storage_mut().delayed_new_entity(Some(Box::new(initializer)))
    }

    /// Returns the entity's reference, or a null reference if it is not
    /// alive in this archetype.
    pub fn get(&self, e: EntityShortId) -> EntityRef {
        self.storage().get(e)
    }

    /// Builds a reference without liveness checks. Undefined behavior if
    /// the row was never allocated.
    pub fn unchecked_get(&self, e: EntityShortId) -> EntityRef {
        self.storage().unchecked_get(e)
    }

    /// Returns `true` if the short id denotes an alive entity.
    pub fn is_alive(&self, e: EntityShortId) -> bool {
        self.storage().is_alive(e)
    }

    /// Kills an entity immediately; dead or unborn ids are ignored.
    pub fn kill(&mut self, e: EntityShortId) {
        self.storage_mut().kill(e, None)
    }

    /// Immediate kill with a callback run before removal.
    pub fn kill_with(&mut self, e: EntityShortId, mut before: impl FnMut(&mut EntityRef)) {
        self.storage_mut().kill(e, Some(&mut before))
    }

    /// Marks an entity for `apply_delayed_kills`.
    pub fn delayed_kill(&mut self, e: EntityShortId) {
        self.storage_mut().delayed_kill(e, None)
    }

    /// Deferred kill with a callback run right before the applied removal.
    pub fn delayed_kill_with(
        &mut self,
        e: EntityShortId,
        before: impl FnMut(&mut EntityRef) + 'static,
    ) {
        self.storage_mut().delayed_kill(e, Some(Box::new(before)))
    }

    /// Visits every alive entity in ascending short-id order (descending if
    /// `reversed`).
    ///
    /// Creating or killing entities of this archetype from inside the
    /// callback is undefined; use deferred operations instead.
    pub fn for_each(&mut self, mut cb: impl FnMut(&mut EntityRef), reversed: bool) {
        self.storage_mut().for_each_until_dyn(
            &mut |r| {
                cb(r);
                false
            },
            reversed,
        );
    }

    /// `for_each` that stops early once the callback returns `true`.
    pub fn for_each_until(&mut self, mut cb: impl FnMut(&mut EntityRef) -> bool, reversed: bool) {
        self.storage_mut().for_each_until_dyn(&mut cb, reversed);
    }
}
