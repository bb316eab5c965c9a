//! # KEYSTONE Core
//!
//! Sparse-set Entity Component registry designed for:
//! - O(1) attach, detach and lookup of components by entity
//! - Cache-friendly iteration over densely packed pools
//! - Safe reuse of entity slots through generation counters
//!
//! ## Architecture Rules
//!
//! 1. **Handles are validated on every call** - a stale entity never reaches a pool
//! 2. **Pools stay dense** - erase fills the hole with the last element
//! 3. **Signals may re-enter** - handlers receive `&mut Registry`
//!
//! ## Example
//!
//! ```rust
//! use keystone_core::Registry;
//!
//! struct Position(f32);
//! struct Velocity(f32);
//!
//! let mut registry = Registry::new();
//! let e = registry.create_entity();
//! registry.emplace_component(e, Position(0.0)).unwrap();
//! registry.emplace_component(e, Velocity(1.5)).unwrap();
//!
//! registry
//!     .view_mut::<(Position, Velocity)>()
//!     .each_mut(|_, pos, vel| pos.0 += vel.0);
//!
//! assert_eq!(registry.get_component::<Position>(e).map(|p| p.0), Ok(1.5));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod ecs;
pub mod error;

pub use config::{DuplicatePolicy, RegistryConfig};
pub use ecs::{
    Component, ComponentId, ComponentInfo, ComponentSet, ComponentTypes, ConnectionId, Entity,
    ErasedStorage, Handler, Registry, RuntimeView, SignalKind, Signals, SparseTable, Storage,
    TypeRegistry, View, ViewMut,
};
pub use error::{EcsError, EcsResult};
