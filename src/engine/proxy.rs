//! Write-forwarding wrappers that keep a field index current.
//!
//! A [`FieldProxy`] is embedded in a component struct in place of a plain
//! field. It owns the field's value plus a binding to one index: the index
//! pointer and the slot of this entity's entry. Writes route through the
//! proxy, which re-keys the index entry and fires the index's
//! update listeners.
//!
//! ## Binding protocol
//!
//! A component that embeds proxies must call [`FieldProxy::bind_index`] for
//! every proxy in its `Default` impl (or in the entity initializer). The
//! first call inserts the current value into the index and records the
//! returned slot; the engine publishes the creating entity's id to the
//! index's world during component construction, which is how the entry is
//! attributed. Later calls are no-ops.
//!
//! A proxy constructed outside an entity-creation sequence receives the
//! none slot: its value is writable but stays unindexed, which tolerates
//! free-standing component instances in tests.
//!
//! The bound index must outlive the proxy; the proxy's drop erases its
//! entry from the index.

use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Rem, RemAssign, Sub, SubAssign};
use std::ptr::NonNull;

use crate::engine::error::{EcsError, EcsResult};
use crate::engine::index::{FieldIndex, IndexSlot};

/// A component field wrapper that keeps a secondary index in sync on write.
pub struct FieldProxy<V, I: FieldIndex<V>> {
    value: V,
    index: Option<NonNull<I>>,
    slot: IndexSlot<V>,
}

impl<V, I: FieldIndex<V>> FieldProxy<V, I> {
    /// Wraps an initial value; unbound until [`bind_index`](Self::bind_index).
    pub fn new(value: V) -> Self {
        Self { value, index: None, slot: IndexSlot::none() }
    }

    /// Read access to the wrapped value.
    #[inline]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Binds this proxy to `idx`, inserting the current value.
    ///
    /// Idempotent: only the first call takes effect. The resulting slot may
    /// be the none slot when no entity creation is in progress, in which
    /// case the field stays unindexed.
    pub fn bind_index(&mut self, idx: &mut I) {
        if self.index.is_some() {
            return;
        }
        self.slot = idx.insert(&self.value);
        self.index = Some(NonNull::from(idx));
    }

    /// Returns `true` if the proxy is bound and its value is indexed.
    pub fn is_bound(&self) -> bool {
        self.index.is_some() && self.slot.is_some()
    }

    /// Assigns a new value, re-keying the index entry.
    ///
    /// ## Errors
    /// `UnboundFieldIndex` if `bind_index` never ran. A proxy holding the
    /// none slot (the entity is not world-bound) accepts the value without
    /// touching the index.
    pub fn set(&mut self, v: V) -> EcsResult<()> {
        let Some(idx) = self.index else {
            return Err(EcsError::UnboundFieldIndex);
        };
        self.value = v;
        if self.slot.is_some() {
            let slot = std::mem::take(&mut self.slot);
            let (slot, fanout) = unsafe { (*idx.as_ptr()).update(slot, &self.value) };
            self.slot = slot;
            // The index borrow above has ended; listeners may now re-enter
            // the index through filters.
            fanout.dispatch();
        }
        Ok(())
    }

    /// `set` for operator sugar, where no `Result` can be returned.
    fn must_set(&mut self, v: V) {
        if let Err(e) = self.set(v) {
            panic!("{e}");
        }
    }
}

impl<V, I: FieldIndex<V>> Drop for FieldProxy<V, I> {
    fn drop(&mut self) {
        if let Some(idx) = self.index {
            if self.slot.is_some() {
                let slot = std::mem::take(&mut self.slot);
                unsafe { (*idx.as_ptr()).erase(slot) };
            }
        }
    }
}

impl<V: Default, I: FieldIndex<V>> Default for FieldProxy<V, I> {
    fn default() -> Self {
        Self::new(V::default())
    }
}

/// Cloning copies the value only; the clone is unbound.
impl<V: Clone, I: FieldIndex<V>> Clone for FieldProxy<V, I> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<V: fmt::Debug, I: FieldIndex<V>> fmt::Debug for FieldProxy<V, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldProxy")
            .field("value", &self.value)
            .field("indexed", &self.slot.is_some())
            .finish()
    }
}

impl<V: fmt::Display, I: FieldIndex<V>> fmt::Display for FieldProxy<V, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

impl<V: PartialEq, I: FieldIndex<V>> PartialEq<V> for FieldProxy<V, I> {
    fn eq(&self, other: &V) -> bool {
        self.value == *other
    }
}

impl<V: PartialEq, I: FieldIndex<V>> PartialEq for FieldProxy<V, I> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<V: PartialOrd, I: FieldIndex<V>> PartialOrd<V> for FieldProxy<V, I> {
    fn partial_cmp(&self, other: &V) -> Option<std::cmp::Ordering> {
        self.value.partial_cmp(other)
    }
}

impl<V, I> AddAssign<V> for FieldProxy<V, I>
where
    V: Add<Output = V> + Clone,
    I: FieldIndex<V>,
{
    fn add_assign(&mut self, rhs: V) {
        self.must_set(self.value.clone() + rhs);
    }
}

impl<V, I> SubAssign<V> for FieldProxy<V, I>
where
    V: Sub<Output = V> + Clone,
    I: FieldIndex<V>,
{
    fn sub_assign(&mut self, rhs: V) {
        self.must_set(self.value.clone() - rhs);
    }
}

impl<V, I> MulAssign<V> for FieldProxy<V, I>
where
    V: Mul<Output = V> + Clone,
    I: FieldIndex<V>,
{
    fn mul_assign(&mut self, rhs: V) {
        self.must_set(self.value.clone() * rhs);
    }
}

impl<V, I> DivAssign<V> for FieldProxy<V, I>
where
    V: Div<Output = V> + Clone,
    I: FieldIndex<V>,
{
    fn div_assign(&mut self, rhs: V) {
        self.must_set(self.value.clone() / rhs);
    }
}

impl<V, I> RemAssign<V> for FieldProxy<V, I>
where
    V: Rem<Output = V> + Clone,
    I: FieldIndex<V>,
{
    fn rem_assign(&mut self, rhs: V) {
        self.must_set(self.value.clone() % rhs);
    }
}

/// String append, re-keying the index entry.
impl<I: FieldIndex<String>> AddAssign<&str> for FieldProxy<String, I> {
    fn add_assign(&mut self, rhs: &str) {
        let mut v = self.value.clone();
        v.push_str(rhs);
        self.must_set(v);
    }
}
