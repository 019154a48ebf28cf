//! Filter algebra over field indexes.
//!
//! A filter ties one comparison, range, or set predicate to the index it
//! evaluates against. Filters are immutable once constructed and cheaply
//! shared between a query and any cacher derived from it; executing one
//! enumerates matching entity ids through the index, stopping early when
//! the callback returns `true`.
//!
//! Filters also expose their underlying index's listener registry so
//! cachers can subscribe to value-update events, and a stable index
//! identity so filters over the same index subscribe only once.

use std::hash::Hash;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::engine::index::{IndexCore, OrderedIndex, UnorderedIndex};
use crate::engine::types::EntityId;

/// Equality-class operators available on both index kinds.
#[derive(Clone, Copy, Debug)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
}

/// Range operators available on ordered indexes only.
#[derive(Clone, Copy, Debug)]
pub(crate) enum OrderedOp {
    Lt,
    Le,
    Gt,
    Ge,
}

/// Equality scans shared by both index kinds.
pub(crate) trait EqScan<V>: 'static {
    fn scan_eq(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool;
    fn scan_ne(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool;
    fn listener_core(&self) -> &IndexCore;
}

/// Range scans, ordered indexes only.
pub(crate) trait RangeScanOps<V>: EqScan<V> {
    fn scan_ordered(&self, op: OrderedOp, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool;
    fn scan_between(&self, lo: &V, hi: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool;
}

impl<V: Ord + Clone + 'static> EqScan<V> for OrderedIndex<V> {
    fn scan_eq(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        OrderedIndex::scan_eq(self, rhs, cb)
    }

    fn scan_ne(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        OrderedIndex::scan_ne(self, rhs, cb)
    }

    fn listener_core(&self) -> &IndexCore {
        &self.core
    }
}

impl<V: Ord + Clone + 'static> RangeScanOps<V> for OrderedIndex<V> {
    fn scan_ordered(&self, op: OrderedOp, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        match op {
            OrderedOp::Lt => self.scan_lt(rhs, cb),
            OrderedOp::Le => self.scan_le(rhs, cb),
            OrderedOp::Gt => self.scan_gt(rhs, cb),
            OrderedOp::Ge => self.scan_ge(rhs, cb),
        }
    }

    fn scan_between(&self, lo: &V, hi: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        OrderedIndex::scan_between(self, lo, hi, cb)
    }
}

impl<V: Eq + Hash + Clone + 'static> EqScan<V> for UnorderedIndex<V> {
    fn scan_eq(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        UnorderedIndex::scan_eq(self, rhs, cb)
    }

    fn scan_ne(&self, rhs: &V, cb: &mut dyn FnMut(EntityId) -> bool) -> bool {
        UnorderedIndex::scan_ne(self, rhs, cb)
    }

    fn listener_core(&self) -> &IndexCore {
        &self.core
    }
}

/// Object-safe filter interface shared by all predicate shapes.
pub(crate) trait IndexFilter {
    /// Enumerates matching entity ids; stops once `cb` returns `true`.
    fn execute(&self, cb: &mut dyn FnMut(EntityId) -> bool);

    /// The underlying index's listener registry.
    fn listener_core(&self) -> NonNull<IndexCore>;
}

struct CompareFilter<V: 'static, I: EqScan<V>> {
    idx: NonNull<I>,
    op: CompareOp,
    rhs: V,
}

impl<V: 'static, I: EqScan<V>> IndexFilter for CompareFilter<V, I> {
    fn execute(&self, cb: &mut dyn FnMut(EntityId) -> bool) {
        let idx = unsafe { self.idx.as_ref() };
        match self.op {
            CompareOp::Eq => idx.scan_eq(&self.rhs, cb),
            CompareOp::Ne => idx.scan_ne(&self.rhs, cb),
        };
    }

    fn listener_core(&self) -> NonNull<IndexCore> {
        NonNull::from(unsafe { self.idx.as_ref() }.listener_core())
    }
}

struct InFilter<V: 'static, I: EqScan<V>> {
    idx: NonNull<I>,
    values: Vec<V>,
}

impl<V: 'static, I: EqScan<V>> IndexFilter for InFilter<V, I> {
    fn execute(&self, cb: &mut dyn FnMut(EntityId) -> bool) {
        let idx = unsafe { self.idx.as_ref() };
        for value in &self.values {
            if idx.scan_eq(value, cb) {
                break;
            }
        }
    }

    fn listener_core(&self) -> NonNull<IndexCore> {
        NonNull::from(unsafe { self.idx.as_ref() }.listener_core())
    }
}

struct OrderedFilter<V: 'static, I: RangeScanOps<V>> {
    idx: NonNull<I>,
    op: OrderedOp,
    rhs: V,
}

impl<V: 'static, I: RangeScanOps<V>> IndexFilter for OrderedFilter<V, I> {
    fn execute(&self, cb: &mut dyn FnMut(EntityId) -> bool) {
        let idx = unsafe { self.idx.as_ref() };
        idx.scan_ordered(self.op, &self.rhs, cb);
    }

    fn listener_core(&self) -> NonNull<IndexCore> {
        NonNull::from(unsafe { self.idx.as_ref() }.listener_core())
    }
}

struct BetweenFilter<V: 'static, I: RangeScanOps<V>> {
    idx: NonNull<I>,
    lo: V,
    hi: V,
}

impl<V: 'static, I: RangeScanOps<V>> IndexFilter for BetweenFilter<V, I> {
    fn execute(&self, cb: &mut dyn FnMut(EntityId) -> bool) {
        let idx = unsafe { self.idx.as_ref() };
        idx.scan_between(&self.lo, &self.hi, cb);
    }

    fn listener_core(&self) -> NonNull<IndexCore> {
        NonNull::from(unsafe { self.idx.as_ref() }.listener_core())
    }
}

/// A shareable, immutable predicate over one field index.
///
/// Construct filters through the operator methods on
/// [`OrderedIndex`](crate::OrderedIndex) and
/// [`UnorderedIndex`](crate::UnorderedIndex). The referenced index must
/// outlive every query and cacher holding the filter.
#[derive(Clone)]
pub struct Filter(Rc<dyn IndexFilter>);

/// A list of filters, executed in order during query evaluation.
pub type Filters = Vec<Filter>;

impl Filter {
    pub(crate) fn compare<V: 'static, I: EqScan<V>>(idx: NonNull<I>, op: CompareOp, rhs: V) -> Self {
        Self(Rc::new(CompareFilter { idx, op, rhs }))
    }

    pub(crate) fn one_of<V: 'static, I: EqScan<V>>(idx: NonNull<I>, values: Vec<V>) -> Self {
        Self(Rc::new(InFilter { idx, values }))
    }

    pub(crate) fn ordered<V: 'static, I: RangeScanOps<V>>(idx: NonNull<I>, op: OrderedOp, rhs: V) -> Self {
        Self(Rc::new(OrderedFilter { idx, op, rhs }))
    }

    pub(crate) fn between<V: 'static, I: RangeScanOps<V>>(idx: NonNull<I>, lo: V, hi: V) -> Self {
        Self(Rc::new(BetweenFilter { idx, lo, hi }))
    }

    pub(crate) fn execute(&self, cb: &mut dyn FnMut(EntityId) -> bool) {
        self.0.execute(cb)
    }

    /// Stable identity of the underlying index, for grouping filters that
    /// share one.
    pub(crate) fn index_identity(&self) -> usize {
        self.0.listener_core().as_ptr() as usize
    }

    pub(crate) fn listener_core(&self) -> NonNull<IndexCore> {
        self.0.listener_core()
    }
}

/// Returns `true` if `eid` satisfies every filter in `filters`.
///
/// Each filter scan stops as soon as it reaches `eid`; a filter that never
/// reaches it rejects the entity.
pub(crate) fn filters_pass(filters: &[Filter], eid: EntityId) -> bool {
    for filter in filters {
        let mut found = false;
        filter.execute(&mut |candidate| {
            if candidate == eid {
                found = true;
            }
            found
        });
        if !found {
            return false;
        }
    }
    true
}
