//! # Registry Error Types
//!
//! All errors that can occur when calling into the registry.
//!
//! Every error is produced by validation at the entry of an operation, before
//! any storage is touched, so catching one never leaves a pool half-updated.

use crate::ecs::Entity;
use thiserror::Error;

/// Errors that can occur in the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// The handle's slot is out of range or its generation is stale.
    #[error("invalid entity {entity}: slot is out of range or generation is stale")]
    InvalidEntity {
        /// The rejected handle.
        entity: Entity,
    },

    /// A strict emplace found the component already attached.
    #[error("entity {entity} already has a `{component}` component")]
    ComponentAlreadyAssigned {
        /// The entity the component was attached to.
        entity: Entity,
        /// Type name of the component.
        component: &'static str,
    },

    /// A required component is not attached to the entity.
    #[error("entity {entity} has no `{component}` component")]
    NoComponent {
        /// The entity that was queried.
        entity: Entity,
        /// Type name of the missing component.
        component: &'static str,
    },

    /// Invalid registry configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for registry operations.
pub type EcsResult<T> = Result<T, EcsError>;
