//! Component registry and type-erased component descriptors.
//!
//! This module assigns stable [`ComponentId`] values to Rust component types
//! and exposes the type-erased construct/destruct thunks that archetype
//! storage invokes over raw row memory.
//!
//! ## Purpose
//! The registry decouples component type information (`TypeId`, name, size,
//! alignment) from storage, enabling archetypes to lay out heterogeneous
//! component columns without per-tuple monomorphized storage code.
//!
//! ## Design
//! - Components are registered implicitly on first use and assigned a
//!   compact, monotonically increasing `ComponentId`.
//! - Ids are memoized per `TypeId` and stable for the lifetime of the
//!   process.
//! - A [`ComponentDesc`] records everything storage needs: size, alignment,
//!   a default-construct thunk, and a drop thunk.
//!
//! ## Invariants
//! - `ComponentId` values are unique per component type and never reused.
//! - Exceeding [`MAX_COMPONENTS`] distinct types is *not* detected at
//!   registration (the counter is unbounded); archetype creation rejects
//!   out-of-range ids instead, so a process may register throwaway types
//!   freely as long as no archetype uses them.
//!
//! ## Concurrency
//! The registry is protected by an `RwLock` for concurrent reads and
//! serialized writes. Lock poisoning is absorbed via
//! [`std::sync::PoisonError::into_inner`]; the registry holds no invariants
//! that a panic mid-write could break.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::mem::{align_of, size_of};
use std::sync::{OnceLock, PoisonError, RwLock};

use crate::engine::types::{build_signature, ComponentId, Signature};

/// A component type storable in archetype rows.
///
/// Components must be default-constructible so the engine can initialize
/// row slots when an entity is created without an explicit initializer.
/// Types embedding a [`crate::FieldProxy`] should perform their index
/// binding inside `Default::default` so freshly created entities are
/// indexed immediately.
pub trait Component: Default + Sized + 'static {}

/// Default-constructs a `T` into `dst`.
///
/// ## Safety
/// `dst` must be valid for writes of `T` and properly aligned.
unsafe fn construct_thunk<T: Component>(dst: *mut u8) {
    unsafe { dst.cast::<T>().write(T::default()) }
}

/// Drops the `T` stored at `dst` in place.
///
/// ## Safety
/// `dst` must point to a properly initialized `T`.
unsafe fn destruct_thunk<T: Component>(dst: *mut u8) {
    unsafe { dst.cast::<T>().drop_in_place() }
}

/// Describes a registered component type.
///
/// ## Fields
/// - `component_id`: the runtime identifier assigned by the registry.
/// - `name`: the Rust type name, for diagnostics.
/// - `type_id`: the runtime `TypeId` of the component.
/// - `size` / `align`: memory layout of the component type.
/// - `construct` / `destruct`: type-erased thunks invoked over row memory.
///
/// `ComponentDesc` is `Copy` and safe to clone freely.
#[derive(Clone, Copy, Debug)]
pub struct ComponentDesc {
    /// Runtime identifier assigned to this component type.
    pub component_id: ComponentId,
    /// Rust type name for diagnostics.
    pub name: &'static str,
    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,
    /// Size of the component type in bytes.
    pub size: usize,
    /// Alignment of the component type in bytes.
    pub align: usize,
    /// Default-constructs the component into a raw slot.
    pub construct: unsafe fn(*mut u8),
    /// Drops the component stored in a raw slot.
    pub destruct: unsafe fn(*mut u8),
}

struct ComponentRegistry {
    next_id: ComponentId,
    by_type: HashMap<TypeId, ComponentId>,
    descriptors: Vec<ComponentDesc>,
}

impl ComponentRegistry {
    fn register<T: Component>(&mut self) -> ComponentId {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return existing;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_type.insert(type_id, id);
        self.descriptors.push(ComponentDesc {
            component_id: id,
            name: type_name::<T>(),
            type_id,
            size: size_of::<T>(),
            align: align_of::<T>(),
            construct: construct_thunk::<T>,
            destruct: destruct_thunk::<T>,
        });
        id
    }
}

static REGISTRY: OnceLock<RwLock<ComponentRegistry>> = OnceLock::new();

fn registry() -> &'static RwLock<ComponentRegistry> {
    REGISTRY.get_or_init(|| {
        RwLock::new(ComponentRegistry {
            next_id: 0,
            by_type: HashMap::new(),
            descriptors: Vec::new(),
        })
    })
}

/// Returns the process-wide `ComponentId` for `T`, registering it on first
/// use.
///
/// The returned id is stable: every call within one process yields the same
/// value, and distinct component types receive distinct ids.
pub fn component_id_of<T: Component>() -> ComponentId {
    {
        let reg = registry().read().unwrap_or_else(PoisonError::into_inner);
        if let Some(&id) = reg.by_type.get(&TypeId::of::<T>()) {
            return id;
        }
    }
    let mut reg = registry().write().unwrap_or_else(PoisonError::into_inner);
    reg.register::<T>()
}

/// Returns the descriptor for `T`, registering it on first use.
pub fn component_desc_of<T: Component>() -> ComponentDesc {
    let id = component_id_of::<T>();
    let reg = registry().read().unwrap_or_else(PoisonError::into_inner);
    reg.descriptors[id as usize]
}

/// Number of component types registered so far in this process.
pub fn num_registered_components() -> usize {
    registry().read().unwrap_or_else(PoisonError::into_inner).descriptors.len()
}

/// A set of component types, typically a tuple, usable as an archetype or
/// query signature.
///
/// Signatures are order-independent: `(A, B, C)` and `(C, B, A)` produce the
/// same [`Signature`]. The unit type `()` is the empty set, used by
/// any-relation queries that match every archetype.
pub trait ComponentSet: 'static {
    /// Component ids of the set, in declaration order.
    fn component_ids() -> Vec<ComponentId>;

    /// Descriptors of the set, in declaration order.
    fn descriptors() -> Vec<ComponentDesc>;

    /// Order-independent signature of the set.
    fn signature() -> Signature {
        build_signature(&Self::component_ids())
    }
}

impl ComponentSet for () {
    fn component_ids() -> Vec<ComponentId> {
        Vec::new()
    }

    fn descriptors() -> Vec<ComponentDesc> {
        Vec::new()
    }
}

macro_rules! impl_component_set {
    ($($c:ident),+) => {
        impl<$($c: Component),+> ComponentSet for ($($c,)+) {
            fn component_ids() -> Vec<ComponentId> {
                vec![$(component_id_of::<$c>()),+]
            }

            fn descriptors() -> Vec<ComponentDesc> {
                vec![$(component_desc_of::<$c>()),+]
            }
        }
    };
}

impl_component_set!(C0);
impl_component_set!(C0, C1);
impl_component_set!(C0, C1, C2);
impl_component_set!(C0, C1, C2, C3);
impl_component_set!(C0, C1, C2, C3, C4);
impl_component_set!(C0, C1, C2, C3, C4, C5);
impl_component_set!(C0, C1, C2, C3, C4, C5, C6);
impl_component_set!(C0, C1, C2, C3, C4, C5, C6, C7);
