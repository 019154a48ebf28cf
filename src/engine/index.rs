//! Secondary field indexes mapping component-field values to entity ids.
//!
//! An index is external to archetype storage: it is owned by user code,
//! bound to a world, and kept current by the [`crate::FieldProxy`] wrappers
//! embedded in component structs. Queries consult indexes through the
//! filter algebra instead of scanning rows.
//!
//! Two flavors exist:
//!
//! - [`OrderedIndex`] — balanced-tree multimap; supports equality, set
//!   membership, and the full range operators.
//! - [`UnorderedIndex`] — hash multimap; supports equality and set
//!   membership only.
//!
//! ## Multimap keys and slots
//!
//! Several entities may share one field value, so entries are keyed by
//! `(value, sequence)` where the sequence is a per-index insertion counter.
//! The [`IndexSlot`] returned by `insert` records that key; it is the
//! stable position token a proxy stores to erase or re-key its entry later.
//! The *none* slot plays the role of a past-the-end position: it marks a
//! value that is tracked by a proxy but not present in the index.
//!
//! ## Creation attribution
//!
//! `insert` consults the owning world's creating-entity slot to learn which
//! entity the value belongs to. Outside an entity-creation sequence (a
//! free-standing component instance, common in tests) the slot is unset and
//! `insert` returns the none slot; the field simply stays unindexed.
//!
//! ## Update listeners
//!
//! Cachers subscribe to value updates. Listener dispatch is deferred: the
//! index mutation completes first and the pending notifications are handed
//! back to the caller as an [`UpdateFanout`], so listeners always observe a
//! consistent index.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;
use std::ops::Bound::{Excluded, Included};
use std::ptr::NonNull;
use std::rc::Rc;

use crate::engine::filter::{CompareOp, Filter, OrderedOp};
use crate::engine::types::EntityId;
use crate::engine::world::{World, WorldState};

/// Listener invoked after an indexed value changed for an entity.
pub(crate) type ListenerFn = Box<dyn FnMut(EntityId)>;

/// Registered listener id, used to unsubscribe.
pub type ListenerId = u32;

/// World binding and update-listener registry shared by both index kinds.
///
/// Interior mutability keeps subscription management usable through the
/// shared references that filters hand out.
pub(crate) struct IndexCore {
    world: Cell<*mut WorldState>,
    listeners: RefCell<HashMap<ListenerId, Rc<RefCell<ListenerFn>>>>,
    next_listener_id: Cell<ListenerId>,
}

impl IndexCore {
    fn new() -> Self {
        Self {
            world: Cell::new(std::ptr::null_mut()),
            listeners: RefCell::new(HashMap::new()),
            next_listener_id: Cell::new(0),
        }
    }

    fn bind(&self, world: &World) {
        self.world.set(world.state_ptr());
    }

    fn is_bound(&self) -> bool {
        !self.world.get().is_null()
    }

    /// The entity currently being created in the bound world, if any.
    fn creating_entity(&self) -> Option<EntityId> {
        let world = self.world.get();
        if world.is_null() {
            return None;
        }
        unsafe { (*world).last_created_entity_id() }
    }

    pub fn on_index_value_updated(&self, cb: ListenerFn) -> ListenerId {
        let id = self.next_listener_id.get();
        self.next_listener_id.set(id + 1);
        self.listeners.borrow_mut().insert(id, Rc::new(RefCell::new(cb)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.listeners.borrow_mut().remove(&id);
    }

    pub fn num_callbacks(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Collects the pending notification for `eid` without dispatching it.
    fn fanout(&self, eid: EntityId) -> UpdateFanout {
        UpdateFanout {
            eid,
            listeners: self.listeners.borrow().values().cloned().collect(),
        }
    }
}

/// Pending update notifications, dispatched after the index mutation that
/// produced them has completed.
pub struct UpdateFanout {
    eid: EntityId,
    listeners: Vec<Rc<RefCell<ListenerFn>>>,
}

impl UpdateFanout {
    fn empty() -> Self {
        Self { eid: 0, listeners: Vec::new() }
    }

    /// Invokes every pending listener.
    pub fn dispatch(self) {
        for listener in &self.listeners {
            (&mut *listener.borrow_mut())(self.eid);
        }
    }
}

/// Stable position token for an index entry.
///
/// The none slot marks a value tracked by a proxy but absent from the
/// index (the entity was never world-bound).
#[derive(Clone, Debug)]
pub struct IndexSlot<V>(pub(crate) Option<(V, u64)>);

impl<V> Default for IndexSlot<V> {
    fn default() -> Self {
        Self(None)
    }
}

impl<V> IndexSlot<V> {
    /// The none slot.
    pub fn none() -> Self {
        Self(None)
    }

    /// Returns `true` if this slot addresses an index entry.
    pub fn is_some(&self) -> bool {
        self.0.is_some()
    }
}

/// Index operations required by [`crate::FieldProxy`].
pub trait FieldIndex<V> {
    /// Inserts `value` for the entity currently being created, returning
    /// its slot. Returns the none slot when no entity creation is in
    /// progress.
    fn insert(&mut self, value: &V) -> IndexSlot<V>;

    /// Removes the entry addressed by `slot`. The none slot is ignored.
    fn erase(&mut self, slot: IndexSlot<V>);

    /// Re-keys the entry at `slot` to `value`, preserving its entity id.
    ///
    /// Returns the new slot and the pending listener fan-out; the caller
    /// dispatches the fan-out once it no longer borrows the index.
    fn update(&mut self, slot: IndexSlot<V>, value: &V) -> (IndexSlot<V>, UpdateFanout);

    /// Number of entries in the index.
    fn len(&self) -> usize;

    /// Returns `true` if the index holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry. Slots held by proxies become stale; intended
    /// for teardown between simulations.
    fn clear(&mut self);
}

//////////////////////////
/// OrderedIndex
//////////////////////////

/// Ordered field index over a balanced-tree multimap.
///
/// Erase, insert, and update are O(log n). Supports the comparison and
/// range filter operators in addition to equality and set membership.
pub struct OrderedIndex<V: Ord + Clone + 'static> {
    pub(crate) core: IndexCore,
    map: BTreeMap<(V, u64), EntityId>,
    next_seq: u64,
}

impl<V: Ord + Clone + 'static> Default for OrderedIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Ord + Clone + 'static> OrderedIndex<V> {
    /// Creates an empty, unbound index.
    pub fn new() -> Self {
        Self { core: IndexCore::new(), map: BTreeMap::new(), next_seq: 0 }
    }

    /// Binds this index to a world so insertions can attribute entries to
    /// the entity being created.
    pub fn bind(&mut self, world: &World) {
        self.core.bind(world);
    }

    /// Returns `true` once the index is bound to a world.
    pub fn is_bound(&self) -> bool {
        self.core.is_bound()
    }

    /// Number of registered update listeners.
    pub fn num_callbacks(&self) -> usize {
        self.core.num_callbacks()
    }

    /// Filter: indexed value equals `rhs`.
    pub fn eq(&self, rhs: V) -> Filter {
        Filter::compare(NonNull::from(self), CompareOp::Eq, rhs)
    }

    /// Filter: indexed value differs from `rhs`.
    pub fn ne(&self, rhs: V) -> Filter {
        Filter::compare(NonNull::from(self), CompareOp::Ne, rhs)
    }

    /// Filter: indexed value is one of `values`.
    pub fn one_of(&self, values: impl IntoIterator<Item = V>) -> Filter {
        let mut values: Vec<V> = values.into_iter().collect();
        values.sort();
        values.dedup();
        Filter::one_of(NonNull::from(self), values)
    }

    /// Filter: indexed value is strictly less than `rhs`.
    pub fn lt(&self, rhs: V) -> Filter {
        Filter::ordered(NonNull::from(self), OrderedOp::Lt, rhs)
    }

    /// Filter: indexed value is at most `rhs`.
    pub fn le(&self, rhs: V) -> Filter {
        Filter::ordered(NonNull::from(self), OrderedOp::Le, rhs)
    }

    /// Filter: indexed value is strictly greater than `rhs`.
    pub fn gt(&self, rhs: V) -> Filter {
        Filter::ordered(NonNull::from(self), OrderedOp::Gt, rhs)
    }

    /// Filter: indexed value is at least `rhs`.
    pub fn ge(&self, rhs: V) -> Filter {
        Filter::ordered(NonNull::from(self), OrderedOp::Ge, rhs)
    }

    /// Filter: indexed value lies in the closed range `[lo, hi]`.
    pub fn between(&self, lo: V, hi: V) -> Filter {
        Filter::between(NonNull::from(self), lo, hi)
    }

    // ~~~~ scans used by the filter algebra ~~~~
    // Each scan returns true when the callback stopped the enumeration.

    pub(crate) fn scan_eq(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        let range = (Included((rhs.clone(), 0)), Included((rhs.clone(), u64::MAX)));
        for (_, &eid) in self.map.range(range) {
            if cb(eid) {
                return true;
            }
        }
        false
    }

    pub(crate) fn scan_ne(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        for ((value, _), &eid) in self.map.iter() {
            if value == rhs {
                continue;
            }
            if cb(eid) {
                return true;
            }
        }
        false
    }

    pub(crate) fn scan_lt(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        for (_, &eid) in self.map.range(..(rhs.clone(), 0)) {
            if cb(eid) {
                return true;
            }
        }
        false
    }

    pub(crate) fn scan_le(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        for (_, &eid) in self.map.range(..=(rhs.clone(), u64::MAX)) {
            if cb(eid) {
                return true;
            }
        }
        false
    }

    pub(crate) fn scan_gt(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        let range = (Excluded((rhs.clone(), u64::MAX)), std::ops::Bound::Unbounded);
        for (_, &eid) in self.map.range(range) {
            if cb(eid) {
                return true;
            }
        }
        false
    }

    pub(crate) fn scan_ge(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        for (_, &eid) in self.map.range((rhs.clone(), 0)..) {
            if cb(eid) {
                return true;
            }
        }
        false
    }

    pub(crate) fn scan_between(&self, lo: &V, hi: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        for (_, &eid) in self.map.range((lo.clone(), 0)..=(hi.clone(), u64::MAX)) {
            if cb(eid) {
                return true;
            }
        }
        false
    }
}

impl<V: Ord + Clone + 'static> FieldIndex<V> for OrderedIndex<V> {
    fn insert(&mut self, value: &V) -> IndexSlot<V> {
        let Some(eid) = self.core.creating_entity() else {
            return IndexSlot::none();
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.map.insert((value.clone(), seq), eid);
        IndexSlot(Some((value.clone(), seq)))
    }

    fn erase(&mut self, slot: IndexSlot<V>) {
        if let Some(key) = slot.0 {
            self.map.remove(&key);
        }
    }

    fn update(&mut self, slot: IndexSlot<V>, value: &V) -> (IndexSlot<V>, UpdateFanout) {
        let Some(key) = slot.0 else {
            return (IndexSlot::none(), UpdateFanout::empty());
        };
        let Some(eid) = self.map.remove(&key) else {
            return (IndexSlot::none(), UpdateFanout::empty());
        };
        let seq = key.1;
        self.map.insert((value.clone(), seq), eid);
        (IndexSlot(Some((value.clone(), seq))), self.core.fanout(eid))
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn clear(&mut self) {
        self.map.clear();
    }
}

//////////////////////////
/// UnorderedIndex
//////////////////////////

/// Hash-based field index.
///
/// Erase, insert, and update are O(1) on average. Supports only equality
/// and set-membership filters; the value type needs no ordering.
pub struct UnorderedIndex<V: Eq + Hash + Clone + 'static> {
    pub(crate) core: IndexCore,
    map: HashMap<V, Vec<(u64, EntityId)>>,
    len: usize,
    next_seq: u64,
}

impl<V: Eq + Hash + Clone + 'static> Default for UnorderedIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Eq + Hash + Clone + 'static> UnorderedIndex<V> {
    /// Creates an empty, unbound index.
    pub fn new() -> Self {
        Self { core: IndexCore::new(), map: HashMap::new(), len: 0, next_seq: 0 }
    }

    /// Binds this index to a world.
    pub fn bind(&mut self, world: &World) {
        self.core.bind(world);
    }

    /// Returns `true` once the index is bound to a world.
    pub fn is_bound(&self) -> bool {
        self.core.is_bound()
    }

    /// Number of registered update listeners.
    pub fn num_callbacks(&self) -> usize {
        self.core.num_callbacks()
    }

    /// Filter: indexed value equals `rhs`.
    pub fn eq(&self, rhs: V) -> Filter {
        Filter::compare(NonNull::from(self), CompareOp::Eq, rhs)
    }

    /// Filter: indexed value differs from `rhs`.
    pub fn ne(&self, rhs: V) -> Filter {
        Filter::compare(NonNull::from(self), CompareOp::Ne, rhs)
    }

    /// Filter: indexed value is one of `values`.
    pub fn one_of(&self, values: impl IntoIterator<Item = V>) -> Filter {
        let set: HashSet<V> = values.into_iter().collect();
        Filter::one_of(NonNull::from(self), set.into_iter().collect())
    }

    pub(crate) fn scan_eq(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        if let Some(bucket) = self.map.get(rhs) {
            for &(_, eid) in bucket {
                if cb(eid) {
                    return true;
                }
            }
        }
        false
    }

    pub(crate) fn scan_ne(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        for (value, bucket) in self.map.iter() {
            if value == rhs {
                continue;
            }
            for &(_, eid) in bucket {
                if cb(eid) {
                    return true;
                }
            }
        }
        false
    }
}

impl<V: Eq + Hash + Clone + 'static> FieldIndex<V> for UnorderedIndex<V> {
    fn insert(&mut self, value: &V) -> IndexSlot<V> {
        let Some(eid) = self.core.creating_entity() else {
            return IndexSlot::none();
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        self.map.entry(value.clone()).or_default().push((seq, eid));
        self.len += 1;
        IndexSlot(Some((value.clone(), seq)))
    }

    fn erase(&mut self, slot: IndexSlot<V>) {
        let Some((value, seq)) = slot.0 else {
            return;
        };
        if let Some(bucket) = self.map.get_mut(&value) {
            let before = bucket.len();
            bucket.retain(|&(s, _)| s != seq);
            self.len -= before - bucket.len();
            if bucket.is_empty() {
                self.map.remove(&value);
            }
        }
    }

    fn update(&mut self, slot: IndexSlot<V>, value: &V) -> (IndexSlot<V>, UpdateFanout) {
        let Some((old_value, seq)) = slot.0 else {
            return (IndexSlot::none(), UpdateFanout::empty());
        };
        let mut moved: Option<EntityId> = None;
        if let Some(bucket) = self.map.get_mut(&old_value) {
            if let Some(pos) = bucket.iter().position(|&(s, _)| s == seq) {
                moved = Some(bucket.swap_remove(pos).1);
                if bucket.is_empty() {
                    self.map.remove(&old_value);
                }
            }
        }
        let Some(eid) = moved else {
            return (IndexSlot::none(), UpdateFanout::empty());
        };
        self.map.entry(value.clone()).or_default().push((seq, eid));
        (IndexSlot(Some((value.clone(), seq))), self.core.fanout(eid))
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.map.clear();
        self.len = 0;
    }
}
