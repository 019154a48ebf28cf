//! Error types for archetype storage, indexes, queries, and lifecycle hooks.
//!
//! This module declares focused error types used across the storage engine.
//! Each error carries enough context to make failures actionable while
//! remaining small and cheap to pass around.
//!
//! ## Goals
//! * **Specificity:** Each variant models a single failure mode (unknown
//!   component access, premature query execution, capacity exhaustion).
//! * **Ergonomics:** All errors implement [`std::error::Error`] and
//!   [`std::fmt::Display`], and the crate-wide [`EcsResult`] alias keeps
//!   signatures short.
//! * **Actionability:** Structured fields (offending archetype, component
//!   name, configured capacity) make failures diagnosable without a
//!   reproduction.
//!
//! ## Failure philosophy
//! Every error here is a *programming error* signaled synchronously at the
//! call site; the engine never retries or degrades. Lookup APIs express
//! "not found" through a null [`crate::EntityRef`] instead of an error, and
//! `unchecked_*` variants trade the checks for undefined behavior on misuse.
//!
//! ## Display vs. Debug
//! * [`std::fmt::Display`] is optimized for operator logs (short, imperative
//!   phrasing).
//! * [`std::fmt::Debug`] (derived) retains full structure for diagnostics.

use std::fmt;

use crate::engine::types::{ArchetypeId, ComponentId};

/// Result alias used across the engine.
pub type EcsResult<T> = Result<T, EcsError>;

/// Aggregate error for all engine operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// A component was requested from an archetype whose signature does not
    /// contain it.
    UnknownComponent {
        /// Archetype whose column map was consulted.
        archetype: ArchetypeId,
        /// Identifier of the missing component.
        component: ComponentId,
        /// Type name of the missing component.
        name: &'static str,
    },

    /// A field proxy was assigned through before `bind_index` ran.
    UnboundFieldIndex,

    /// A query was executed before `pre_match` resolved its archetypes.
    QueryNotReady,

    /// `pre_match` was called before any archetype existed in the world.
    PreMatchTooEarly,

    /// A lifecycle callback was registered before any archetype existed.
    ///
    /// Registration resolves the callback's archetype set once; registering
    /// before archetypes are created would silently subscribe to nothing.
    LifecycleRegistrationTooEarly,

    /// An archetype was created with a component whose id exceeds the
    /// engine's component capacity.
    TooManyComponents {
        /// Identifier that exceeded the limit.
        component: ComponentId,
        /// Configured component capacity.
        cap: usize,
    },

    /// A world exceeded its archetype capacity.
    TooManyArchetypes {
        /// Configured archetype capacity.
        cap: usize,
    },

    /// An archetype was requested with an empty component set.
    EmptyArchetype,

    /// An archetype was requested with a duplicated component type.
    DuplicateComponent {
        /// Type name of the duplicated component.
        name: &'static str,
    },

    /// A component was accessed through a null entity reference.
    NullEntityRef,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::UnknownComponent { archetype, component, name } => {
                write!(
                    f,
                    "component {} (id {}) is not part of archetype {}",
                    name, component, archetype
                )
            }
            EcsError::UnboundFieldIndex => {
                f.write_str("field proxy assigned before bind_index was called")
            }
            EcsError::QueryNotReady => {
                f.write_str("query executed before pre_match was called")
            }
            EcsError::PreMatchTooEarly => {
                f.write_str("pre_match must be called after all archetypes are created")
            }
            EcsError::LifecycleRegistrationTooEarly => {
                f.write_str("lifecycle callbacks must register after all archetypes are created")
            }
            EcsError::TooManyComponents { component, cap } => {
                write!(f, "component id {} exceeds the {} component limit", component, cap)
            }
            EcsError::TooManyArchetypes { cap } => {
                write!(f, "world reached the {} archetype limit", cap)
            }
            EcsError::EmptyArchetype => {
                f.write_str("archetype requires at least one component type")
            }
            EcsError::DuplicateComponent { name } => {
                write!(f, "component {} appears more than once in the archetype", name)
            }
            EcsError::NullEntityRef => {
                f.write_str("component access through a null entity reference")
            }
        }
    }
}

impl std::error::Error for EcsError {}
