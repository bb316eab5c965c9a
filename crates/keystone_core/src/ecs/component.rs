//! # Component Types
//!
//! Components are plain data attached to entities. Any `'static + Send + Sync`
//! type qualifies; it only has to be movable because swap-pop erase relocates
//! values inside a pool.
//!
//! Each component type gets a [`ComponentId`] the first time a registry sees it.
//! Ids are handed out in sequence by the registry's own [`TypeRegistry`], so two
//! registries in one process never share state.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Marker trait for ECS components.
///
/// Implemented automatically for every eligible type.
///
/// # Example
///
/// ```rust
/// use keystone_core::Component;
///
/// #[derive(Debug, PartialEq)]
/// struct Health(u32);
///
/// fn assert_component<C: Component>() {}
/// assert_component::<Health>();
/// ```
pub trait Component: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> Component for T {}

/// Sequence index of a component type inside one registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u32);

impl ComponentId {
    /// Returns the id as an index into per-type tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reflection data for a registered component type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Registry-local sequence id.
    pub id: ComponentId,
    /// Rust type name, used in error messages and by serializers.
    pub name: &'static str,
    /// Process-wide type identity.
    pub type_id: TypeId,
}

/// Assigns component ids in registration order.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_type: HashMap<TypeId, ComponentId>,
    infos: Vec<ComponentInfo>,
}

impl TypeRegistry {
    /// Creates an empty type registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `C`, assigning the next one on first sight.
    ///
    /// The second element is `true` when the id was just assigned.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` component types are registered.
    pub fn register<C: Component>(&mut self) -> (ComponentId, bool) {
        let type_id = TypeId::of::<C>();
        if let Some(&id) = self.by_type.get(&type_id) {
            return (id, false);
        }
        let id = ComponentId(u32::try_from(self.infos.len()).expect("component id space exhausted"));
        self.infos.push(ComponentInfo {
            id,
            name: type_name::<C>(),
            type_id,
        });
        self.by_type.insert(type_id, id);
        (id, true)
    }

    /// Returns the id of `C` if it was registered.
    #[inline]
    #[must_use]
    pub fn id_of<C: Component>(&self) -> Option<ComponentId> {
        self.id_of_type(TypeId::of::<C>())
    }

    /// Returns the id registered for `type_id`, if any.
    #[inline]
    #[must_use]
    pub fn id_of_type(&self, type_id: TypeId) -> Option<ComponentId> {
        self.by_type.get(&type_id).copied()
    }

    /// Returns reflection data for `id`.
    #[must_use]
    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Checks if no type was registered yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Iterates over all registered types in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }
}
