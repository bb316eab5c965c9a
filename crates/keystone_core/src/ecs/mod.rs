//! # Entity Component Registry
//!
//! Sparse-set ECS: one densely packed pool per component type, addressed
//! through a paged sparse table keyed by entity slot.
//!
//! ## Design Philosophy
//!
//! - Entities are generational handles, stale handles are detected on use
//! - Components live in contiguous arrays, erase is swap-pop
//! - Pools are created on first use and type-erased behind `ErasedStorage`
//! - Views iterate the smallest included pool and look up the others

mod component;
mod entity;
mod registry;
mod signal;
pub mod sparse_table;
mod storage;
mod view;

pub use component::{Component, ComponentId, ComponentInfo, TypeRegistry};
pub use entity::{Entity, ENTITY_MASK, ENTITY_SHIFT, VERSION_MASK};
pub use registry::Registry;
pub use signal::{ConnectionId, Handler, SignalKind, Signals};
pub use sparse_table::SparseTable;
pub use storage::{ErasedStorage, Storage};
pub use view::{ComponentSet, ComponentTypes, RuntimeView, View, ViewMut};
