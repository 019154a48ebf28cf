//! Lightweight references to entity rows.
//!
//! An [`EntityRef`] is the engine's handle type: a copyable value carrying
//! the owning archetype, the entity's row address, and its packed id. Every
//! lookup and iteration API hands these out.
//!
//! ## Lifetime contract
//! A reference is valid as long as the referenced entity is alive. Holding
//! a reference across a kill of that entity and then touching components
//! through it is undefined behavior; re-fetch through the world instead.
//! The archetype's row at the head of every entity row is itself an
//! `EntityRef`, so a raw row pointer is self-describing.
//!
//! ## Null references
//! Checked lookups express "not found" through a *null* reference whose
//! `is_alive()` is `false`; they never signal an error.

use crate::engine::archetype::ArchetypeStorage;
use crate::engine::component::{component_id_of, Component};
use crate::engine::error::{EcsError, EcsResult};
use crate::engine::types::{unpack_short, ArchetypeId, EntityId};

/// Boxed entity callback stored by deferred operations and lifecycle hooks.
pub type BoxedAccessor = Box<dyn FnMut(&mut EntityRef)>;

/// A temporary, copyable reference to an entity's data row.
#[derive(Clone, Copy, Debug)]
pub struct EntityRef {
    archetype: *mut ArchetypeStorage,
    data: *mut u8,
    id: EntityId,
}

impl EntityRef {
    pub(crate) fn new(archetype: *mut ArchetypeStorage, data: *mut u8, id: EntityId) -> Self {
        Self { archetype, data, id }
    }

    /// The null reference: not alive, no archetype, no data.
    pub fn null() -> Self {
        Self { archetype: std::ptr::null_mut(), data: std::ptr::null_mut(), id: 0 }
    }

    /// Returns `true` if this is the null reference.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.archetype.is_null()
    }

    /// This entity's packed id.
    #[inline]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// The id of this entity's archetype.
    ///
    /// ## Panics
    /// Panics on the null reference.
    #[inline]
    pub fn archetype_id(&self) -> ArchetypeId {
        assert!(!self.is_null(), "archetype_id on a null entity reference");
        unsafe { (*self.archetype).id() }
    }

    /// Returns `true` if this entity is alive.
    ///
    /// A deferred-created entity is not alive until
    /// `apply_delayed_new_entities`; a deferred-killed entity stays alive
    /// until `apply_delayed_kills`.
    pub fn is_alive(&self) -> bool {
        if self.is_null() {
            return false;
        }
        unsafe { (*self.archetype).is_alive(unpack_short(self.id)) }
    }

    /// Returns the component `C` of this entity.
    ///
    /// ## Errors
    /// `UnknownComponent` if `C` is not part of this entity's archetype;
    /// `NullEntityRef` on the null reference.
    pub fn get<C: Component>(&mut self) -> EcsResult<&mut C> {
        if self.is_null() {
            return Err(EcsError::NullEntityRef);
        }
        let a = unsafe { &*self.archetype };
        let slot = a.component_ptr(self.data, component_id_of::<C>(), std::any::type_name::<C>())?;
        Ok(unsafe { &mut *slot.cast::<C>() })
    }

    /// Like [`get`](Self::get) but skips the column check.
    ///
    /// Undefined behavior if `C` is not part of this entity's archetype.
    pub fn unchecked_get<C: Component>(&mut self) -> &mut C {
        let a = unsafe { &*self.archetype };
        let slot = a.unchecked_component_ptr(self.data, component_id_of::<C>());
        unsafe { &mut *slot.cast::<C>() }
    }

    /// Writes `value` into this entity's `C` slot without dropping previous
    /// contents.
    ///
    /// Intended for initializer callbacks, where the slot holds zeroed,
    /// unconstructed memory; an initializer must construct every component
    /// of the archetype exactly once.
    pub fn construct<C: Component>(&mut self, value: C) -> EcsResult<()> {
        if self.is_null() {
            return Err(EcsError::NullEntityRef);
        }
        let a = unsafe { &*self.archetype };
        let slot = a.component_ptr(self.data, component_id_of::<C>(), std::any::type_name::<C>())?;
        unsafe { slot.cast::<C>().write(value) };
        Ok(())
    }

    /// Kills this entity right now. No-op on the null reference or a dead
    /// entity.
    pub fn kill(&mut self) {
        if self.is_null() {
            return;
        }
        unsafe { (*self.archetype).kill(unpack_short(self.id), None) };
    }

    /// Marks this entity to be killed by the world's `apply_delayed_kills`.
    pub fn delayed_kill(&mut self) {
        if self.is_null() {
            return;
        }
        unsafe { (*self.archetype).delayed_kill(unpack_short(self.id), None) };
    }

    /// Deferred kill with a callback run right before the applied removal.
    /// Component destructors run on death regardless.
    pub fn delayed_kill_with(&mut self, before: impl FnMut(&mut EntityRef) + 'static) {
        if self.is_null() {
            return;
        }
        unsafe { (*self.archetype).delayed_kill(unpack_short(self.id), Some(Box::new(before))) };
    }
}

/// Two references are equal when they address the same data row.
impl PartialEq for EntityRef {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for EntityRef {}
