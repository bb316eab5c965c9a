//! # Registry
//!
//! Owns the entity table, one pool per component type, and the per-pool signals.
//!
//! ## Entity Table
//!
//! ```text
//! slot:      0      1      2      3
//! entities: [0v0]  [3v1]  [2v0]  [NULLv2]      available = 1
//!                   ^ dead: index field links to the next free slot
//! ```
//!
//! A live slot stores its own handle. A dead slot stores the index of the next
//! free slot and the generation its next occupant will carry, so the free list
//! costs no memory beyond the table itself.
//!
//! ## Removal
//!
//! Detaching a component notifies first and removes second. Destroy handlers
//! run while the value is still readable and may call back into the registry,
//! including removing the very component being destroyed. The removal is then
//! re-validated so nothing is erased twice.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::config::{DuplicatePolicy, RegistryConfig};
use crate::error::{EcsError, EcsResult};

use super::component::{Component, ComponentId, ComponentInfo, TypeRegistry};
use super::entity::Entity;
use super::signal::{ConnectionId, Handler, SignalKind};
use super::storage::{ErasedStorage, Pool, Storage};
use super::view::{ComponentSet, ComponentTypes, RuntimeView, View, ViewMut};

/// Index value marking the end of the free list.
const NULL_INDEX: u32 = Entity::NULL.index();

/// The entity-component registry.
///
/// # Example
///
/// ```rust
/// use keystone_core::Registry;
///
/// #[derive(Debug, PartialEq)]
/// struct Position(f32, f32);
/// struct Velocity(f32, f32);
///
/// let mut registry = Registry::new();
/// let e = registry.create_entity();
/// registry.emplace_component(e, Position(0.0, 0.0)).unwrap();
/// registry.emplace_component(e, Velocity(1.0, 2.0)).unwrap();
///
/// registry
///     .view_mut::<(Position, Velocity)>()
///     .each_mut(|_, pos, vel| {
///         pos.0 += vel.0;
///         pos.1 += vel.1;
///     });
///
/// assert_eq!(registry.try_get::<Position>(e), Some(&Position(1.0, 2.0)));
/// ```
pub struct Registry {
    /// Live handles at their own slot, free-list links elsewhere.
    entities: Vec<Entity>,
    /// Head of the free list, `NULL_INDEX` when empty.
    available: u32,
    alive: usize,
    types: TypeRegistry,
    /// Indexed by `ComponentId`.
    pools: Vec<Box<dyn Pool>>,
    /// Source of connection ids, shared by every pool.
    next_connection: u64,
    config: RegistryConfig,
}

impl Registry {
    /// Creates a registry with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Creates a registry with `config`.
    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            entities: Vec::with_capacity(config.entity_capacity),
            available: NULL_INDEX,
            alive: 0,
            types: TypeRegistry::new(),
            pools: Vec::new(),
            next_connection: 0,
            config,
        }
    }

    /// Returns the configuration this registry was built with.
    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates a new entity, recycling a destroyed slot when one is available.
    ///
    /// # Panics
    ///
    /// Panics if all `u32::MAX` entity slots are alive.
    pub fn create_entity(&mut self) -> Entity {
        let entity = if self.available == NULL_INDEX {
            let index = match u32::try_from(self.entities.len()) {
                Ok(index) if index != NULL_INDEX => index,
                _ => panic!("entity index space exhausted"),
            };
            let entity = Entity::new(index, 0);
            self.entities.push(entity);
            entity
        } else {
            let index = self.available;
            let link = self.entities[index as usize];
            self.available = link.index();
            let entity = Entity::new(index, link.generation());
            self.entities[entity.slot()] = entity;
            entity
        };
        self.alive += 1;
        entity
    }

    /// Checks if `entity` is the handle currently stored at its slot.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.entities.get(entity.slot()) == Some(&entity)
    }

    #[inline]
    fn validate(&self, entity: Entity) -> EcsResult<()> {
        if self.is_valid(entity) {
            Ok(())
        } else {
            Err(EcsError::InvalidEntity { entity })
        }
    }

    /// Releases the slot of `entity` and bumps its generation.
    ///
    /// Components are not touched. They stay unreachable through the stale
    /// handle and are overwritten when the slot is reused. Use
    /// [`Registry::despawn`] to detach them first.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is not valid.
    pub fn destroy_entity(&mut self, entity: Entity) -> EcsResult<()> {
        self.validate(entity)?;
        let next = entity.next_generation();
        self.entities[entity.slot()] = Entity::new(self.available, next.generation());
        self.available = entity.index();
        self.alive -= 1;
        Ok(())
    }

    /// Detaches every component of `entity`, firing destroy signals, then
    /// destroys it. Returns the number of components detached.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is not valid.
    pub fn despawn(&mut self, entity: Entity) -> EcsResult<usize> {
        let removed = self.remove_components(entity)?;
        // A destroy handler may already have released the slot.
        if self.is_valid(entity) {
            self.destroy_entity(entity)?;
        }
        tracing::trace!("Despawned entity {} ({} components)", entity, removed);
        Ok(removed)
    }

    /// Returns the number of alive entities.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive
    }

    /// Returns the number of slots ever allocated, alive or free.
    #[inline]
    #[must_use]
    pub fn entity_capacity(&self) -> usize {
        self.entities.len()
    }

    /// Reserves room for `additional` more entity slots.
    pub fn reserve_entities(&mut self, additional: usize) {
        self.entities.reserve(additional);
    }

    /// Iterates over the alive entities in slot order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities
            .iter()
            .enumerate()
            .filter(|&(slot, entity)| entity.slot() == slot)
            .map(|(_, &entity)| entity)
    }

    /// Returns the live handle stored at slot `index`, if any.
    #[must_use]
    pub fn current(&self, index: u32) -> Option<Entity> {
        self.entities
            .get(index as usize)
            .copied()
            .filter(|entity| entity.index() == index)
    }

    // =========================================================================
    // Component types
    // =========================================================================

    /// Registers `T` and creates its pool. Idempotent.
    pub fn register_component<T: Component>(&mut self) -> ComponentId {
        let (id, fresh) = self.types.register::<T>();
        if fresh {
            self.pools
                .push(Box::new(Storage::<T>::with_capacity(self.config.storage_capacity)));
            tracing::debug!("Registered component {} as {}", type_name::<T>(), id);
        }
        id
    }

    /// Returns the id of `T` if it was registered.
    #[must_use]
    pub fn component_id<T: Component>(&self) -> Option<ComponentId> {
        self.types.id_of::<T>()
    }

    /// Returns reflection data for `id`.
    #[must_use]
    pub fn component_info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.types.info(id)
    }

    /// Read-only access to the pool of `T`.
    #[must_use]
    pub fn storage<T: Component>(&self) -> Option<&Storage<T>> {
        let id = self.types.id_of::<T>()?;
        self.pools.get(id.index())?.as_any().downcast_ref()
    }

    fn storage_mut<T: Component>(&mut self) -> Option<&mut Storage<T>> {
        let id = self.types.id_of::<T>()?;
        self.pools.get_mut(id.index())?.as_any_mut().downcast_mut()
    }

    fn assure<T: Component>(&mut self) -> &mut Storage<T> {
        let id = self.register_component::<T>();
        self.pools[id.index()]
            .as_any_mut()
            .downcast_mut()
            .expect("pool type matches its component id")
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Attaches `value` to `entity` and fires the construct signal.
    ///
    /// If `entity` already has a `T`, the configured [`DuplicatePolicy`]
    /// decides: `Ignore` returns the existing value untouched with `false`,
    /// `Reject` fails.
    ///
    /// # Errors
    ///
    /// - [`EcsError::InvalidEntity`] if `entity` is not valid, before or after
    ///   the construct handlers ran
    /// - [`EcsError::ComponentAlreadyAssigned`] under `DuplicatePolicy::Reject`
    /// - [`EcsError::NoComponent`] if a construct handler detached the value
    pub fn emplace_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> EcsResult<(&mut T, bool)> {
        self.validate(entity)?;
        let policy = self.config.duplicate_policy;
        let storage = self.assure::<T>();
        let inserted = if storage.contains(entity) {
            if policy == DuplicatePolicy::Reject {
                return Err(EcsError::ComponentAlreadyAssigned {
                    entity,
                    component: type_name::<T>(),
                });
            }
            false
        } else {
            storage.emplace(entity, value).1
        };

        if inserted {
            if let Some(id) = self.types.id_of::<T>() {
                self.emit(id, SignalKind::Construct, entity);
            }
            self.validate(entity)?;
        }

        self.storage_mut::<T>()
            .and_then(|storage| storage.try_get_mut(entity))
            .map(|value| (value, inserted))
            .ok_or(EcsError::NoComponent {
                entity,
                component: type_name::<T>(),
            })
    }

    /// Attaches `value`, or overwrites the existing `T` in place.
    ///
    /// Overwriting fires no signal.
    ///
    /// # Errors
    ///
    /// Same as [`Registry::emplace_component`], minus the duplicate rejection.
    pub fn emplace_or_replace<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> EcsResult<&mut T> {
        self.validate(entity)?;
        if self.has_component::<T>(entity) {
            let existing = self.get_component_mut::<T>(entity)?;
            *existing = value;
            return Ok(existing);
        }
        self.emplace_component(entity, value).map(|(value, _)| value)
    }

    /// Returns the `T` of `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] or [`EcsError::NoComponent`].
    pub fn get_component<T: Component>(&self, entity: Entity) -> EcsResult<&T> {
        self.validate(entity)?;
        self.storage::<T>()
            .and_then(|storage| storage.try_get(entity))
            .ok_or(EcsError::NoComponent {
                entity,
                component: type_name::<T>(),
            })
    }

    /// Returns the `T` of `entity` mutably.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidEntity`] or [`EcsError::NoComponent`].
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> EcsResult<&mut T> {
        self.validate(entity)?;
        self.storage_mut::<T>()
            .and_then(|storage| storage.try_get_mut(entity))
            .ok_or(EcsError::NoComponent {
                entity,
                component: type_name::<T>(),
            })
    }

    /// Returns the `T` of `entity`, or `None` if it is invalid or has none.
    #[inline]
    #[must_use]
    pub fn try_get<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.is_valid(entity) {
            return None;
        }
        self.storage::<T>()?.try_get(entity)
    }

    /// Returns the `T` of `entity` mutably, or `None` if it is invalid or has none.
    #[inline]
    pub fn try_get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.is_valid(entity) {
            return None;
        }
        self.storage_mut::<T>()?.try_get_mut(entity)
    }

    /// Checks if `entity` is valid and has a `T`.
    #[inline]
    #[must_use]
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        self.try_get::<T>(entity).is_some()
    }

    /// Detaches the `T` of `entity`, firing the destroy signal first.
    ///
    /// Returns `false` if `entity` had no `T`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is not valid.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> EcsResult<bool> {
        self.validate(entity)?;
        Ok(self
            .types
            .id_of::<T>()
            .is_some_and(|id| self.remove_by_id(id, entity)))
    }

    /// Detaches every component of `entity`. Returns how many were detached.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is not valid.
    pub fn remove_components(&mut self, entity: Entity) -> EcsResult<usize> {
        self.validate(entity)?;
        let ids: Vec<ComponentId> = self.types.iter().map(|info| info.id).collect();
        let mut removed = 0;
        for id in ids {
            if self.detach(id, entity) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Detaches `T` from every entity. Returns how many values were dropped.
    ///
    /// Values held by valid entities fire the destroy signal. Values left
    /// behind by [`Registry::destroy_entity`] are dropped silently.
    pub fn clear_components<T: Component>(&mut self) -> usize {
        let Some(id) = self.types.id_of::<T>() else {
            return 0;
        };
        let owners = self.pools[id.index()].entities().to_vec();
        let mut removed = 0;
        for entity in owners {
            if self.detach(id, entity) {
                removed += 1;
            }
        }
        tracing::debug!("Cleared {} {} components", removed, type_name::<T>());
        removed
    }

    /// Signals while `entity` is still valid. Once a handler destroys it the
    /// leftovers are erased silently.
    fn detach(&mut self, id: ComponentId, entity: Entity) -> bool {
        if self.is_valid(entity) {
            self.remove_by_id(id, entity)
        } else {
            self.pools[id.index()].erase_entity(entity)
        }
    }

    /// Notify, re-validate, then erase.
    fn remove_by_id(&mut self, id: ComponentId, entity: Entity) -> bool {
        let pool = &mut self.pools[id.index()];
        if !pool.contains(entity) {
            return false;
        }
        if pool.is_destroying(entity) {
            // Nested removal from a destroy handler: already notified.
            return pool.erase_entity(entity);
        }

        pool.begin_destroy(entity);
        self.emit(id, SignalKind::Destroy, entity);

        let pool = &mut self.pools[id.index()];
        pool.end_destroy(entity);
        pool.erase_entity(entity);
        true
    }

    fn emit(&mut self, id: ComponentId, kind: SignalKind, entity: Entity) {
        let handlers = self.pools[id.index()].signals().snapshot(kind);
        for handler in handlers {
            (*handler)(self, entity);
        }
    }

    // =========================================================================
    // Signals
    // =========================================================================

    /// Connects `handler` to run after a `T` is attached.
    pub fn on_construct<T: Component>(
        &mut self,
        handler: impl Fn(&mut Registry, Entity) + Send + Sync + 'static,
    ) -> ConnectionId {
        self.connect::<T>(SignalKind::Construct, Arc::new(handler))
    }

    /// Connects `handler` to run before a `T` is detached.
    pub fn on_destroy<T: Component>(
        &mut self,
        handler: impl Fn(&mut Registry, Entity) + Send + Sync + 'static,
    ) -> ConnectionId {
        self.connect::<T>(SignalKind::Destroy, Arc::new(handler))
    }

    fn connect<T: Component>(&mut self, kind: SignalKind, handler: Handler) -> ConnectionId {
        let id = self.register_component::<T>();
        let connection = ConnectionId::new(self.next_connection);
        self.next_connection += 1;
        self.pools[id.index()]
            .signals_mut()
            .connect(kind, connection, handler);
        tracing::debug!("Connected {:?} handler to {}", kind, type_name::<T>());
        connection
    }

    /// Disconnects a handler of `T`. Returns `false` if it was not connected.
    pub fn disconnect<T: Component>(&mut self, connection: ConnectionId) -> bool {
        let Some(id) = self.types.id_of::<T>() else {
            return false;
        };
        self.pools[id.index()].signals_mut().disconnect(connection)
    }

    // =========================================================================
    // Reflection
    // =========================================================================

    /// Calls `f` with every component of `entity`, in component id order.
    /// Returns the number of components visited.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is not valid.
    pub fn visit<F>(&self, entity: Entity, mut f: F) -> EcsResult<usize>
    where
        F: FnMut(&ComponentInfo, &dyn Any),
    {
        self.validate(entity)?;
        let mut visited = 0;
        for (info, pool) in self.types.iter().zip(&self.pools) {
            if let Some(value) = pool.get_any(entity) {
                f(info, value);
                visited += 1;
            }
        }
        Ok(visited)
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Shared view over the entities owning every component of `Q`.
    #[must_use]
    pub fn view<Q: ComponentSet>(&self) -> View<'_, Q> {
        self.view_excluding::<Q, ()>()
    }

    /// Shared view over the entities owning every component of `Q` and none of `X`.
    #[must_use]
    pub fn view_excluding<Q: ComponentSet, X: ComponentTypes>(&self) -> View<'_, Q> {
        let pools = self
            .resolve(&Q::type_ids())
            .and_then(|included| self.erased_pools(&included, &self.resolve_known(&X::type_ids())));
        View::new(&self.entities, pools)
    }

    /// Mutable view over the entities owning every component of `Q`.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names the same component type twice.
    #[must_use]
    pub fn view_mut<Q: ComponentSet>(&mut self) -> ViewMut<'_, Q> {
        self.view_mut_excluding::<Q, ()>()
    }

    /// Mutable view over the entities owning every component of `Q` and none of `X`.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names the same component type twice.
    #[must_use]
    pub fn view_mut_excluding<Q: ComponentSet, X: ComponentTypes>(&mut self) -> ViewMut<'_, Q> {
        let types = Q::type_ids();
        for (i, type_id) in types.iter().enumerate() {
            assert!(
                !types[..i].contains(type_id),
                "component type requested twice in a mutable view"
            );
        }

        let Some(included) = self.resolve(&types) else {
            return ViewMut::empty(&self.entities);
        };
        let excluded = self.resolve_known(&X::type_ids());
        if excluded.iter().any(|id| included.contains(id)) {
            return ViewMut::empty(&self.entities);
        }

        let mut included_pools: Vec<Option<&mut (dyn ErasedStorage + 'static)>> =
            included.iter().map(|_| None).collect();
        let mut excluded_pools: Vec<&dyn ErasedStorage> = Vec::with_capacity(excluded.len());
        for (index, pool) in self.pools.iter_mut().enumerate() {
            if let Some(pos) = included.iter().position(|id| id.index() == index) {
                included_pools[pos] = Some(pool.as_erased_mut());
            } else if excluded.iter().any(|id| id.index() == index) {
                excluded_pools.push(pool.as_erased());
            }
        }
        ViewMut::new(&self.entities, included_pools, excluded_pools)
    }

    /// Entity-only view over pools chosen by id.
    ///
    /// Unknown included ids yield an empty view. Unknown excluded ids are ignored.
    #[must_use]
    pub fn runtime_view(
        &self,
        included: &[ComponentId],
        excluded: &[ComponentId],
    ) -> RuntimeView<'_> {
        RuntimeView::new(&self.entities, self.erased_pools(included, excluded))
    }

    /// Maps every type to its id, failing if any is unregistered.
    fn resolve(&self, types: &[TypeId]) -> Option<Vec<ComponentId>> {
        types.iter().map(|&type_id| self.types.id_of_type(type_id)).collect()
    }

    /// Maps the registered types to their ids, skipping the rest.
    fn resolve_known(&self, types: &[TypeId]) -> Vec<ComponentId> {
        types
            .iter()
            .filter_map(|&type_id| self.types.id_of_type(type_id))
            .collect()
    }

    /// Collects the pools of a view. `None` means the view is empty.
    #[allow(clippy::type_complexity)]
    fn erased_pools(
        &self,
        included: &[ComponentId],
        excluded: &[ComponentId],
    ) -> Option<(Vec<&dyn ErasedStorage>, Vec<&dyn ErasedStorage>)> {
        if excluded.iter().any(|id| included.contains(id)) {
            return None;
        }
        let included = included
            .iter()
            .map(|id| self.pool(*id))
            .collect::<Option<Vec<_>>>()?;
        let excluded = excluded.iter().filter_map(|id| self.pool(*id)).collect();
        Some((included, excluded))
    }

    fn pool(&self, id: ComponentId) -> Option<&dyn ErasedStorage> {
        Some(self.pools.get(id.index())?.as_erased())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("alive", &self.alive)
            .field("slots", &self.entities.len())
            .field("component_types", &self.types.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, PartialEq)]
    struct Frozen;

    fn pos(x: f32, y: f32) -> Position {
        Position { x, y }
    }

    fn vel(dx: f32, dy: f32) -> Velocity {
        Velocity { dx, dy }
    }

    #[test]
    fn test_create_entities_are_distinct() {
        let mut registry = Registry::new();
        let a = registry.create_entity();
        let b = registry.create_entity();
        assert_ne!(a, b);
        assert_eq!(a, Entity::new(0, 0));
        assert_eq!(b, Entity::new(1, 0));
        assert!(registry.is_valid(a));
        assert!(registry.is_valid(b));
        assert_eq!(registry.alive_count(), 2);
    }

    #[test]
    fn test_recycled_slot_bumps_generation() {
        let mut registry = Registry::new();
        let a = registry.create_entity();
        registry.destroy_entity(a).unwrap();
        assert!(!registry.is_valid(a));
        assert_eq!(registry.alive_count(), 0);

        let b = registry.create_entity();
        assert_eq!(b.index(), a.index());
        assert!(b.generation() > a.generation());
        assert!(registry.is_valid(b));
        assert!(!registry.is_valid(a));
        assert_eq!(registry.entity_capacity(), 1);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let mut registry = Registry::new();
        let entities: Vec<Entity> = (0..4).map(|_| registry.create_entity()).collect();
        registry.destroy_entity(entities[1]).unwrap();
        registry.destroy_entity(entities[3]).unwrap();

        assert_eq!(registry.create_entity(), Entity::new(3, 1));
        assert_eq!(registry.create_entity(), Entity::new(1, 1));
        assert_eq!(registry.create_entity(), Entity::new(4, 0));
    }

    #[test]
    fn test_destroy_twice_fails() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        registry.destroy_entity(e).unwrap();
        assert_eq!(
            registry.destroy_entity(e),
            Err(EcsError::InvalidEntity { entity: e })
        );
        assert!(registry.destroy_entity(Entity::new(40, 0)).is_err());
        assert!(!registry.is_valid(Entity::NULL));
        assert!(!registry.is_valid(Entity::TOMBSTONE));
    }

    #[test]
    fn test_entities_and_current() {
        let mut registry = Registry::new();
        let a = registry.create_entity();
        let b = registry.create_entity();
        let c = registry.create_entity();
        registry.destroy_entity(b).unwrap();

        assert_eq!(registry.entities().collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(registry.current(0), Some(a));
        assert_eq!(registry.current(1), None);
        assert_eq!(registry.current(9), None);
    }

    #[test]
    fn test_emplace_get_remove() {
        let mut registry = Registry::new();
        let e = registry.create_entity();

        let (value, inserted) = registry.emplace_component(e, pos(1.0, 2.0)).unwrap();
        assert!(inserted);
        value.x = 5.0;

        assert_eq!(registry.get_component::<Position>(e), Ok(&pos(5.0, 2.0)));
        assert!(registry.has_component::<Position>(e));
        assert!(!registry.has_component::<Velocity>(e));
        assert_eq!(
            registry.get_component::<Velocity>(e),
            Err(EcsError::NoComponent {
                entity: e,
                component: type_name::<Velocity>(),
            })
        );

        assert_eq!(registry.remove_component::<Position>(e), Ok(true));
        assert_eq!(registry.remove_component::<Position>(e), Ok(false));
        assert_eq!(registry.remove_component::<Velocity>(e), Ok(false));
        assert!(registry.try_get::<Position>(e).is_none());
    }

    #[test]
    fn test_duplicate_is_ignored_by_default() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        registry.emplace_component(e, pos(1.0, 1.0)).unwrap();

        let (value, inserted) = registry.emplace_component(e, pos(9.0, 9.0)).unwrap();
        assert!(!inserted);
        assert_eq!(*value, pos(1.0, 1.0));
        assert_eq!(registry.storage::<Position>().map(Storage::len), Some(1));
    }

    #[test]
    fn test_duplicate_rejected_when_strict() {
        let mut registry = Registry::with_config(RegistryConfig::default().strict());
        let e = registry.create_entity();
        registry.emplace_component(e, pos(1.0, 1.0)).unwrap();

        let err = registry.emplace_component(e, pos(9.0, 9.0)).unwrap_err();
        assert!(matches!(err, EcsError::ComponentAlreadyAssigned { entity, .. } if entity == e));
        assert_eq!(registry.try_get::<Position>(e), Some(&pos(1.0, 1.0)));
    }

    #[test]
    fn test_emplace_or_replace() {
        let mut registry = Registry::with_config(RegistryConfig::default().strict());
        let e = registry.create_entity();
        let constructed = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&constructed);
        registry.on_construct::<Position>(move |_, _| *counter.lock() += 1);

        registry.emplace_or_replace(e, pos(1.0, 1.0)).unwrap();
        let value = registry.emplace_or_replace(e, pos(2.0, 2.0)).unwrap();
        assert_eq!(*value, pos(2.0, 2.0));
        assert_eq!(*constructed.lock(), 1);
    }

    #[test]
    fn test_invalid_entity_is_rejected_everywhere() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        registry.emplace_component(e, pos(0.0, 0.0)).unwrap();
        registry.destroy_entity(e).unwrap();

        let invalid = Err(EcsError::InvalidEntity { entity: e });
        assert_eq!(registry.get_component::<Position>(e), invalid);
        assert!(registry.emplace_component(e, vel(0.0, 0.0)).is_err());
        assert!(registry.remove_component::<Position>(e).is_err());
        assert!(registry.visit(e, |_, _| {}).is_err());
        assert!(registry.despawn(e).is_err());
        assert!(registry.try_get::<Position>(e).is_none());
        assert!(!registry.has_component::<Position>(e));
    }

    #[test]
    fn test_orphan_is_overwritten_on_reuse() {
        let mut registry = Registry::new();
        let old = registry.create_entity();
        registry.emplace_component(old, pos(1.0, 1.0)).unwrap();
        registry.destroy_entity(old).unwrap();

        let new = registry.create_entity();
        assert_eq!(new.index(), old.index());
        assert!(registry.try_get::<Position>(new).is_none());
        assert_eq!(registry.view::<(Position,)>().iter().count(), 0);

        let (value, inserted) = registry.emplace_component(new, pos(2.0, 2.0)).unwrap();
        assert!(inserted);
        assert_eq!(*value, pos(2.0, 2.0));
        assert_eq!(registry.storage::<Position>().map(Storage::len), Some(1));
    }

    #[test]
    fn test_despawn_detaches_everything() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        registry.emplace_component(e, pos(0.0, 0.0)).unwrap();
        registry.emplace_component(e, vel(0.0, 0.0)).unwrap();

        assert_eq!(registry.despawn(e), Ok(2));
        assert!(!registry.is_valid(e));
        assert_eq!(registry.storage::<Position>().map(Storage::len), Some(0));
        assert_eq!(registry.storage::<Velocity>().map(Storage::len), Some(0));
    }

    #[test]
    fn test_destroy_handler_sees_value() {
        let mut registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.on_destroy::<Position>(move |registry, entity| {
            let value = registry.get_component::<Position>(entity).copied();
            sink.lock().push(value);
        });

        let e = registry.create_entity();
        registry.emplace_component(e, pos(3.0, 4.0)).unwrap();
        assert_eq!(registry.remove_component::<Position>(e), Ok(true));
        assert_eq!(*seen.lock(), vec![Ok(pos(3.0, 4.0))]);
    }

    #[test]
    fn test_reentrant_removal_is_not_repeated() {
        let mut registry = Registry::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        registry.on_destroy::<Position>(move |registry, entity| {
            *counter.lock() += 1;
            assert_eq!(registry.remove_component::<Position>(entity), Ok(true));
        });

        let a = registry.create_entity();
        let b = registry.create_entity();
        registry.emplace_component(a, pos(1.0, 1.0)).unwrap();
        registry.emplace_component(b, pos(2.0, 2.0)).unwrap();

        assert_eq!(registry.remove_component::<Position>(a), Ok(true));
        assert_eq!(*calls.lock(), 1);
        assert!(!registry.has_component::<Position>(a));
        assert_eq!(registry.try_get::<Position>(b), Some(&pos(2.0, 2.0)));

        let storage = registry.storage::<Position>().unwrap();
        assert_eq!(storage.entities(), &[b]);
    }

    #[test]
    fn test_construct_handler_can_emplace() {
        let mut registry = Registry::new();
        registry.on_construct::<Position>(|registry, entity| {
            registry.emplace_component(entity, vel(0.0, 0.0)).unwrap();
        });

        let e = registry.create_entity();
        registry.emplace_component(e, pos(0.0, 0.0)).unwrap();
        assert!(registry.has_component::<Velocity>(e));
    }

    #[test]
    fn test_construct_handler_removing_value() {
        let mut registry = Registry::new();
        registry.on_construct::<Frozen>(|registry, entity| {
            registry.remove_component::<Frozen>(entity).unwrap();
        });

        let e = registry.create_entity();
        let err = registry.emplace_component(e, Frozen).unwrap_err();
        assert!(matches!(err, EcsError::NoComponent { .. }));
        assert!(!registry.has_component::<Frozen>(e));
    }

    #[test]
    fn test_disconnect() {
        let mut registry = Registry::new();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let connection = registry.on_construct::<Position>(move |_, _| *counter.lock() += 1);

        let a = registry.create_entity();
        registry.emplace_component(a, pos(0.0, 0.0)).unwrap();
        assert!(registry.disconnect::<Position>(connection));
        assert!(!registry.disconnect::<Position>(connection));
        assert!(!registry.disconnect::<Velocity>(connection));

        let b = registry.create_entity();
        registry.emplace_component(b, pos(0.0, 0.0)).unwrap();
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_disconnect_with_other_types_connection() {
        let mut registry = Registry::new();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let position_conn = registry.on_construct::<Position>(move |_, _| sink.lock().push("pos"));
        let sink = Arc::clone(&fired);
        let velocity_conn = registry.on_construct::<Velocity>(move |_, _| sink.lock().push("vel"));
        assert_ne!(position_conn, velocity_conn);

        assert!(!registry.disconnect::<Velocity>(position_conn));
        assert!(!registry.disconnect::<Position>(velocity_conn));

        let a = registry.create_entity();
        registry.emplace_component(a, pos(0.0, 0.0)).unwrap();
        registry.emplace_component(a, vel(0.0, 0.0)).unwrap();
        assert_eq!(*fired.lock(), vec!["pos", "vel"]);

        assert!(registry.disconnect::<Position>(position_conn));
        let b = registry.create_entity();
        registry.emplace_component(b, pos(0.0, 0.0)).unwrap();
        registry.emplace_component(b, vel(0.0, 0.0)).unwrap();
        assert_eq!(*fired.lock(), vec!["pos", "vel", "vel"]);
    }

    #[test]
    fn test_despawn_stops_signalling_once_handler_destroys() {
        let mut registry = Registry::new();
        registry.on_destroy::<Position>(|registry, entity| {
            assert_eq!(registry.destroy_entity(entity), Ok(()));
        });
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        registry.on_destroy::<Velocity>(move |_, _| *counter.lock() += 1);

        let e = registry.create_entity();
        registry.emplace_component(e, pos(1.0, 2.0)).unwrap();
        registry.emplace_component(e, vel(3.0, 4.0)).unwrap();

        assert_eq!(registry.despawn(e), Ok(2));
        assert_eq!(*calls.lock(), 0);
        assert!(!registry.is_valid(e));
        assert_eq!(registry.alive_count(), 0);
        assert_eq!(registry.storage::<Position>().map(Storage::len), Some(0));
        assert_eq!(registry.storage::<Velocity>().map(Storage::len), Some(0));
    }

    #[test]
    fn test_clear_components() {
        let mut registry = Registry::new();
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&destroyed);
        registry.on_destroy::<Position>(move |_, entity| sink.lock().push(entity));

        let a = registry.create_entity();
        let b = registry.create_entity();
        let orphan = registry.create_entity();
        for e in [a, b, orphan] {
            registry.emplace_component(e, pos(0.0, 0.0)).unwrap();
        }
        registry.destroy_entity(orphan).unwrap();

        assert_eq!(registry.clear_components::<Position>(), 3);
        assert_eq!(registry.storage::<Position>().map(Storage::len), Some(0));
        let mut notified = destroyed.lock().clone();
        notified.sort();
        assert_eq!(notified, vec![a, b]);
        assert_eq!(registry.clear_components::<Velocity>(), 0);
    }

    #[test]
    fn test_visit_in_id_order() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        let other = registry.create_entity();
        registry.emplace_component(other, Frozen).unwrap();
        registry.emplace_component(e, vel(1.0, 0.0)).unwrap();
        registry.emplace_component(e, pos(0.0, 1.0)).unwrap();

        let mut names = Vec::new();
        let visited = registry
            .visit(e, |info, value| {
                if info.type_id == TypeId::of::<Position>() {
                    assert_eq!(value.downcast_ref::<Position>(), Some(&pos(0.0, 1.0)));
                }
                names.push(info.id);
            })
            .unwrap();

        assert_eq!(visited, 2);
        let vel_id = registry.component_id::<Velocity>().unwrap();
        let pos_id = registry.component_id::<Position>().unwrap();
        assert_eq!(names, vec![vel_id, pos_id]);
        assert_eq!(
            registry.component_info(pos_id).map(|info| info.name),
            Some(type_name::<Position>())
        );
    }

    #[test]
    fn test_view_matches_exactly() {
        let mut registry = Registry::new();
        let both = registry.create_entity();
        let pos_only = registry.create_entity();
        let frozen = registry.create_entity();
        registry.emplace_component(both, pos(0.0, 0.0)).unwrap();
        registry.emplace_component(both, vel(1.0, 1.0)).unwrap();
        registry.emplace_component(pos_only, pos(0.0, 0.0)).unwrap();
        registry.emplace_component(frozen, pos(0.0, 0.0)).unwrap();
        registry.emplace_component(frozen, vel(1.0, 1.0)).unwrap();
        registry.emplace_component(frozen, Frozen).unwrap();

        let view = registry.view::<(Position, Velocity)>();
        let mut matched: Vec<Entity> = view.iter().collect();
        matched.sort();
        assert_eq!(matched, vec![both, frozen]);

        let view = registry.view_excluding::<(Position, Velocity), (Frozen,)>();
        assert_eq!(view.iter().collect::<Vec<_>>(), vec![both]);
        assert!(view.contains(both));
        assert!(!view.contains(frozen));
        assert!(!view.contains(pos_only));
        assert_eq!(view.fetch(both), Some((&pos(0.0, 0.0), &vel(1.0, 1.0))));
        assert_eq!(view.fetch(frozen), None);
        assert_eq!(view.get::<Velocity>(both), &vel(1.0, 1.0));
        assert!(view.try_get::<Frozen>(both).is_none());
    }

    #[test]
    fn test_view_of_unknown_type_is_empty() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        registry.emplace_component(e, pos(0.0, 0.0)).unwrap();

        let view = registry.view::<(Position, Velocity)>();
        assert_eq!(view.iter().count(), 0);
        assert_eq!(view.size_hint(), 0);
        assert!(registry.view_mut::<(Velocity,)>().entities().is_empty());

        let view = registry.view_excluding::<(Position,), (Velocity,)>();
        assert_eq!(view.iter().collect::<Vec<_>>(), vec![e]);
    }

    #[test]
    fn test_view_driver_is_smallest_pool() {
        let mut registry = Registry::new();
        for i in 0..10 {
            let e = registry.create_entity();
            registry.emplace_component(e, pos(0.0, 0.0)).unwrap();
            if i % 5 == 0 {
                registry.emplace_component(e, vel(0.0, 0.0)).unwrap();
            }
        }
        let view = registry.view::<(Position, Velocity)>();
        assert_eq!(view.size_hint(), 2);
        assert_eq!(view.iter().count(), 2);
    }

    #[test]
    fn test_view_each() {
        let mut registry = Registry::new();
        for i in 0..4u8 {
            let e = registry.create_entity();
            registry.emplace_component(e, pos(f32::from(i), 0.0)).unwrap();
            registry.emplace_component(e, vel(1.0, 0.0)).unwrap();
        }
        let mut sum = 0.0;
        registry
            .view::<(Position, Velocity)>()
            .each(|_, p, v| sum += p.x + v.dx);
        assert!((sum - 10.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_view_mut_each_and_fetch() {
        let mut registry = Registry::new();
        let moving = registry.create_entity();
        let frozen = registry.create_entity();
        for e in [moving, frozen] {
            registry.emplace_component(e, pos(0.0, 0.0)).unwrap();
            registry.emplace_component(e, vel(1.0, 2.0)).unwrap();
        }
        registry.emplace_component(frozen, Frozen).unwrap();

        let mut view = registry.view_mut_excluding::<(Position, Velocity), (Frozen,)>();
        assert_eq!(view.entities(), vec![moving]);
        view.each_mut(|_, p, v| {
            p.x += v.dx;
            p.y += v.dy;
        });
        if let Some((p, _)) = view.fetch_mut(moving) {
            p.x *= 10.0;
        }
        assert!(view.fetch_mut(frozen).is_none());

        assert_eq!(registry.try_get::<Position>(moving), Some(&pos(10.0, 2.0)));
        assert_eq!(registry.try_get::<Position>(frozen), Some(&pos(0.0, 0.0)));
    }

    #[test]
    #[should_panic(expected = "requested twice")]
    fn test_view_mut_rejects_aliasing() {
        let mut registry = Registry::new();
        registry.register_component::<Position>();
        let _view = registry.view_mut::<(Position, Position)>();
    }

    #[test]
    fn test_view_overlapping_exclusion_is_empty() {
        let mut registry = Registry::new();
        let e = registry.create_entity();
        registry.emplace_component(e, pos(0.0, 0.0)).unwrap();
        assert_eq!(
            registry
                .view_excluding::<(Position,), (Position,)>()
                .iter()
                .count(),
            0
        );
    }

    #[test]
    fn test_runtime_view() {
        let mut registry = Registry::new();
        let a = registry.create_entity();
        let b = registry.create_entity();
        registry.emplace_component(a, pos(0.0, 0.0)).unwrap();
        registry.emplace_component(b, pos(0.0, 0.0)).unwrap();
        registry.emplace_component(b, Frozen).unwrap();

        let pos_id = registry.component_id::<Position>().unwrap();
        let frozen_id = registry.component_id::<Frozen>().unwrap();
        let view = registry.runtime_view(&[pos_id], &[frozen_id]);
        assert_eq!(view.iter().collect::<Vec<_>>(), vec![a]);
        assert!(view.contains(a));
        assert!(!view.contains(b));
        assert_eq!(view.size_hint(), 2);

        assert_eq!(registry.runtime_view(&[], &[]).iter().count(), 0);
    }

    #[test]
    fn test_registry_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<Registry>();
    }
}
