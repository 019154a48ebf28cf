//! Bitset-based archetype selection by signature relation.
//!
//! The matcher maintains, per component id, the set of archetype ids whose
//! signature contains that component. Matching a query signature reduces to
//! a handful of word-wide bit operations over these sets.
//!
//! `match_and_store` additionally retains a shared handle to the result so
//! queries and the cachers derived from them can hold a stable, shared
//! reference to the same matched set.

use std::collections::HashSet;
use std::rc::Rc;

use crate::engine::types::{ArchetypeId, Signature, MAX_ARCHETYPES_PER_WORLD, MAX_COMPONENTS};

/// Unordered set of matched archetype ids.
pub type AidSet = HashSet<ArchetypeId>;

/// Shared handle to a stored match result.
pub type AidSetRef = Rc<AidSet>;

/// Relation between a query signature and an archetype signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchRelation {
    /// The archetype contains every component in the signature.
    All,
    /// The archetype contains at least one component in the signature.
    /// An empty signature matches every archetype.
    Any,
    /// The archetype contains no component in the signature.
    None,
}

const WORDS: usize = MAX_ARCHETYPES_PER_WORLD / 64;

/// Fixed-width bitset over archetype ids.
#[derive(Clone, Copy)]
struct ArchetypeBits {
    words: [u64; WORDS],
}

impl ArchetypeBits {
    const fn zero() -> Self {
        Self { words: [0u64; WORDS] }
    }

    #[inline]
    fn set(&mut self, aid: ArchetypeId) {
        self.words[aid as usize / 64] |= 1u64 << (aid as usize % 64);
    }

    #[inline]
    fn and_assign(&mut self, other: &ArchetypeBits) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a &= b;
        }
    }

    #[inline]
    fn or_assign(&mut self, other: &ArchetypeBits) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }

    #[inline]
    fn and_not_assign(&mut self, other: &ArchetypeBits) {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a &= !b;
        }
    }

    fn collect_ids(&self) -> AidSet {
        let mut out = AidSet::new();
        for (word_index, &word) in self.words.iter().enumerate() {
            let base = word_index * 64;
            let mut bits = word;
            while bits != 0 {
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                out.insert((base + tz) as ArchetypeId);
            }
        }
        out
    }
}

/// Signature-relation matcher over registered archetypes.
pub struct Matcher {
    // All registered archetype ids.
    all: ArchetypeBits,
    // by_component[c] holds every archetype id whose signature contains c.
    by_component: Vec<ArchetypeBits>,
    // Retained results handed out by match_and_store.
    store: Vec<AidSetRef>,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Matcher {
    /// Creates an empty matcher.
    pub fn new() -> Self {
        Self {
            all: ArchetypeBits::zero(),
            by_component: vec![ArchetypeBits::zero(); MAX_COMPONENTS],
            store: Vec::new(),
        }
    }

    /// Registers an archetype id under its signature.
    pub fn put(&mut self, signature: &Signature, aid: ArchetypeId) {
        self.all.set(aid);
        for component_id in signature.iter() {
            self.by_component[component_id as usize].set(aid);
        }
    }

    /// Returns the archetype ids matching `signature` under `relation`.
    pub fn match_ids(&self, relation: MatchRelation, signature: &Signature) -> AidSet {
        let bits = match relation {
            MatchRelation::All => self.match_all(signature),
            MatchRelation::Any => {
                if signature.is_empty() {
                    self.all
                } else {
                    self.match_any(signature)
                }
            }
            MatchRelation::None => self.match_none(signature),
        };
        bits.collect_ids()
    }

    /// Matches and retains a shared handle to the result.
    pub fn match_and_store(&mut self, relation: MatchRelation, signature: &Signature) -> AidSetRef {
        let result = Rc::new(self.match_ids(relation, signature));
        self.store.push(Rc::clone(&result));
        result
    }

    fn match_all(&self, signature: &Signature) -> ArchetypeBits {
        let mut ans = self.all;
        for component_id in signature.iter() {
            ans.and_assign(&self.by_component[component_id as usize]);
        }
        ans
    }

    fn match_any(&self, signature: &Signature) -> ArchetypeBits {
        let mut ans = ArchetypeBits::zero();
        for component_id in signature.iter() {
            ans.or_assign(&self.by_component[component_id as usize]);
        }
        ans
    }

    fn match_none(&self, signature: &Signature) -> ArchetypeBits {
        let mut ans = self.all;
        ans.and_not_assign(&self.match_any(signature));
        ans
    }
}
