//! Core identifiers, bit layouts, and component signatures.
//!
//! This module defines the **fundamental types, identifiers, and bit layouts**
//! shared by every subsystem of the storage engine: archetypes, the matcher,
//! field indexes, queries, and cachers.
//!
//! ## Entity representation
//!
//! Entities are encoded as a packed 32-bit integer:
//!
//! ```text
//! 32 bits = [ archetype id (13 bits) ][ short entity id (19 bits) ]
//! ```
//!
//! - **Archetype id** selects the archetype that owns the entity.
//! - **Short id** is the entity's row slot within that archetype.
//!
//! Sorting packed ids groups entities of the same archetype next to each
//! other, which iteration relies on for memory locality.
//!
//! ## Signatures
//!
//! Components are identified by compact [`ComponentId`] values assigned by
//! the registry in [`crate::engine::component`]. A [`Signature`] is a
//! fixed-size bitset over component ids:
//!
//! - fixed-size array of `u64` words,
//! - fast bitwise comparison and iteration over set bits,
//! - used for both archetype identity and query matching.

/// Globally unique entity identifier packed as `(archetype id, short id)`.
pub type EntityId = u32;
/// An entity's row slot within its archetype.
pub type EntityShortId = u32;
/// Unique identifier for an archetype within a world.
pub type ArchetypeId = u16;
/// Unique identifier for a component type, assigned process-wide.
pub type ComponentId = u16;

/// Number of entity rows per storage block.
pub const MAX_ENTITIES_PER_BLOCK: usize = 1024;
/// Maximum number of distinct component types usable in archetypes.
pub const MAX_COMPONENTS: usize = 128;
/// Maximum number of archetypes per world (matcher bitset width).
///
/// The archetype id field itself is 13 bits wide (8191 values); this limit
/// only bounds the matcher's bitsets and may be raised independently.
pub const MAX_ARCHETYPES_PER_WORLD: usize = 4096;

/// Number of bits reserved for the archetype id in an [`EntityId`].
pub const ARCHETYPE_ID_BITS: u32 = 13;
/// Number of bits reserved for the short id in an [`EntityId`].
pub const SHORT_ID_BITS: u32 = 19;

/// Mask selecting the archetype-id portion after shifting.
pub const ARCHETYPE_ID_MASK: u32 = (1 << ARCHETYPE_ID_BITS) - 1;
/// Mask selecting the short-id portion of an [`EntityId`].
pub const SHORT_ID_MASK: u32 = (1 << SHORT_ID_BITS) - 1;

/// Packs an archetype id and a short entity id into an [`EntityId`].
#[inline]
pub const fn pack(a: ArchetypeId, s: EntityShortId) -> EntityId {
    ((a as u32 & ARCHETYPE_ID_MASK) << SHORT_ID_BITS) | (s & SHORT_ID_MASK)
}

/// Extracts the archetype id from a packed [`EntityId`].
#[inline]
pub const fn unpack_archetype(eid: EntityId) -> ArchetypeId {
    ((eid >> SHORT_ID_BITS) & ARCHETYPE_ID_MASK) as ArchetypeId
}

/// Extracts the short entity id from a packed [`EntityId`].
#[inline]
pub const fn unpack_short(eid: EntityId) -> EntityShortId {
    eid & SHORT_ID_MASK
}

/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_WORDS: usize = MAX_COMPONENTS / 64;

/// Bitset over component ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    words: [u64; SIGNATURE_WORDS],
}

impl Signature {
    /// Returns a signature with no component bits set.
    #[inline]
    pub const fn empty() -> Self {
        Self { words: [0u64; SIGNATURE_WORDS] }
    }

    /// Sets the bit corresponding to `component_id`.
    ///
    /// ## Panics
    /// Panics if `component_id` is not below [`MAX_COMPONENTS`].
    #[inline]
    pub fn set(&mut self, component_id: ComponentId) {
        assert!(
            (component_id as usize) < MAX_COMPONENTS,
            "component id {} exceeds the {} component limit",
            component_id,
            MAX_COMPONENTS
        );
        self.words[component_id as usize / 64] |= 1u64 << (component_id as usize % 64);
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentId) {
        if (component_id as usize) < MAX_COMPONENTS {
            self.words[component_id as usize / 64] &= !(1u64 << (component_id as usize % 64));
        }
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentId) -> bool {
        if (component_id as usize) >= MAX_COMPONENTS {
            return false;
        }
        (self.words[component_id as usize / 64] >> (component_id as usize % 64)) & 1 == 1
    }

    /// Returns `true` if no component bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of component bits set.
    #[inline]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates over all component ids set in this signature, ascending.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.words.iter().enumerate().flat_map(|(word_index, &word)| {
            let base = word_index * 64;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some((base + tz) as ComponentId)
            })
        })
    }
}

/// Builds a component signature from a list of component ids.
pub fn build_signature(component_ids: &[ComponentId]) -> Signature {
    let mut signature = Signature::empty();
    for &component_id in component_ids {
        signature.set(component_id);
    }
    signature
}
