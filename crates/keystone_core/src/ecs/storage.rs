//! # Component Storage
//!
//! Sparse-set storage for a single component type.
//!
//! ```text
//! sparse (by slot):  [ . 1 . . 0 . 2 ]     SparseTable<usize>
//! packed:            [ e4, e1, e6 ]         Vec<Entity>
//! instances:         [ c4, c1, c6 ]         Vec<T>
//! ```
//!
//! - Membership and lookup are O(1) through the sparse table
//! - Iteration walks two contiguous arrays
//! - Erase is swap-pop: the last element fills the hole, so the arrays never
//!   contain gaps but iteration order is not preserved across erases

use std::any::{type_name, Any};

use super::component::Component;
use super::entity::Entity;
use super::signal::Signals;
use super::sparse_table::SparseTable;

/// Type-erased interface over every `Storage<T>`.
///
/// The registry keeps one boxed pool per component type and
/// downcasts through [`ErasedStorage::as_any`] when the concrete type is known.
pub trait ErasedStorage: Any + Send + Sync {
    /// Type name of the stored component.
    fn component_name(&self) -> &'static str;

    /// Number of stored components.
    fn len(&self) -> usize;

    /// Checks if the pool is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks if `entity` (index and generation) owns a component here.
    fn contains(&self, entity: Entity) -> bool;

    /// The packed entity array.
    fn entities(&self) -> &[Entity];

    /// Physically removes and drops the component of `entity`.
    fn erase_entity(&mut self, entity: Entity) -> bool;

    /// Returns the component of `entity` as `&dyn Any`.
    fn get_any(&self, entity: Entity) -> Option<&dyn Any>;

    /// Upcast for downcasting to `Storage<T>`.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting to `Storage<T>`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Handler lists of this pool.
    fn signals(&self) -> &Signals;
}

/// Registry-side hooks of a pool: signal wiring and the destroy-in-flight
/// marks of the two-phase removal.
pub(crate) trait Pool: ErasedStorage {
    fn as_erased(&self) -> &dyn ErasedStorage;

    fn as_erased_mut(&mut self) -> &mut (dyn ErasedStorage + 'static);

    fn signals_mut(&mut self) -> &mut Signals;

    /// Marks `entity` as having its destroy notification in flight.
    fn begin_destroy(&mut self, entity: Entity);

    /// Clears the in-flight mark of `entity`.
    fn end_destroy(&mut self, entity: Entity);

    /// Checks if a destroy notification for `entity` is in flight.
    fn is_destroying(&self, entity: Entity) -> bool;
}

/// Dense storage for a single component type.
///
/// This storage guarantees:
/// - `entities().len() == instances().len()` at all times
/// - every stored entity `e` sits at `entities()[index_of(e)]`
///
/// Signals are held here but fired by the registry, which is the only place
/// that can hand handlers a `&mut Registry`.
///
/// # Example
///
/// ```rust
/// use keystone_core::{Entity, Storage};
///
/// let mut storage: Storage<u32> = Storage::new();
/// let e = Entity::new(3, 0);
/// let (value, inserted) = storage.emplace(e, 7);
/// assert!(inserted);
/// *value += 1;
/// assert_eq!(storage.try_get(e), Some(&8));
/// assert_eq!(storage.erase(e), Some(8));
/// assert!(storage.is_empty());
/// ```
pub struct Storage<T> {
    packed: Vec<Entity>,
    instances: Vec<T>,
    sparse: SparseTable<usize>,
    signals: Signals,
    /// Entities whose destroy signal is currently being emitted.
    destroying: Vec<Entity>,
}

impl<T> Storage<T> {
    /// Creates an empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty storage with room for `capacity` components.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            packed: Vec::with_capacity(capacity),
            instances: Vec::with_capacity(capacity),
            sparse: SparseTable::new(),
            signals: Signals::new(),
            destroying: Vec::new(),
        }
    }

    /// Reserves room for `additional` more components.
    pub fn reserve(&mut self, additional: usize) {
        self.packed.reserve(additional);
        self.instances.reserve(additional);
    }

    /// Returns the number of stored components.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.packed.len()
    }

    /// Checks if the storage is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packed.is_empty()
    }

    /// Returns the packed position of `entity`, if stored.
    #[inline]
    #[must_use]
    pub fn index_of(&self, entity: Entity) -> Option<usize> {
        let pos = *self.sparse.get(entity.slot())?;
        (self.packed[pos] == entity).then_some(pos)
    }

    /// Checks if `entity` owns a component in this storage.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.index_of(entity).is_some()
    }

    /// Attaches `value` to `entity` unless it already has one.
    ///
    /// Returns the stored value and whether it was inserted. An existing value
    /// is left untouched and `value` is dropped. A leftover entry from an older
    /// generation of the same slot is overwritten in place.
    pub fn emplace(&mut self, entity: Entity, value: T) -> (&mut T, bool) {
        if let Some(&pos) = self.sparse.get(entity.slot()) {
            if self.packed[pos] == entity {
                return (&mut self.instances[pos], false);
            }
            self.packed[pos] = entity;
            self.instances[pos] = value;
            return (&mut self.instances[pos], true);
        }

        let pos = self.packed.len();
        self.packed.push(entity);
        self.instances.push(value);
        self.sparse.insert(entity.slot(), pos);
        (&mut self.instances[pos], true)
    }

    /// Returns the component of `entity`, if any.
    #[inline]
    #[must_use]
    pub fn try_get(&self, entity: Entity) -> Option<&T> {
        self.index_of(entity).map(|pos| &self.instances[pos])
    }

    /// Returns the component of `entity` mutably, if any.
    #[inline]
    pub fn try_get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.index_of(entity).map(|pos| &mut self.instances[pos])
    }

    /// Removes the component of `entity` with swap-pop and returns it.
    pub fn erase(&mut self, entity: Entity) -> Option<T> {
        let pos = self.index_of(entity)?;
        let last = self.packed.len() - 1;
        let moved = self.packed[last];

        self.packed.swap_remove(pos);
        let value = self.instances.swap_remove(pos);
        if pos != last {
            self.sparse.insert(moved.slot(), pos);
        }
        self.sparse.erase(entity.slot());
        Some(value)
    }

    /// The packed entity array, index-aligned with [`Storage::instances`].
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.packed
    }

    /// The packed component array.
    #[inline]
    #[must_use]
    pub fn instances(&self) -> &[T] {
        &self.instances
    }

    /// The packed component array, mutably. The set of entities cannot change.
    #[inline]
    pub fn instances_mut(&mut self) -> &mut [T] {
        &mut self.instances
    }

    /// Iterates over `(entity, &component)` pairs in packed order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.packed.iter().copied().zip(self.instances.iter())
    }

    /// Iterates over `(entity, &mut component)` pairs in packed order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.packed.iter().copied().zip(self.instances.iter_mut())
    }

    /// Handler lists of this storage.
    #[must_use]
    pub fn signals(&self) -> &Signals {
        &self.signals
    }
}

impl<T> Default for Storage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Component> ErasedStorage for Storage<T> {
    fn component_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn len(&self) -> usize {
        self.packed.len()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.index_of(entity).is_some()
    }

    fn entities(&self) -> &[Entity] {
        &self.packed
    }

    fn erase_entity(&mut self, entity: Entity) -> bool {
        self.erase(entity).is_some()
    }

    fn get_any(&self, entity: Entity) -> Option<&dyn Any> {
        self.try_get(entity).map(|value| value as &dyn Any)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn signals(&self) -> &Signals {
        &self.signals
    }
}

impl<T: Component> Pool for Storage<T> {
    fn as_erased(&self) -> &dyn ErasedStorage {
        self
    }

    fn as_erased_mut(&mut self) -> &mut (dyn ErasedStorage + 'static) {
        self
    }

    fn signals_mut(&mut self) -> &mut Signals {
        &mut self.signals
    }

    fn begin_destroy(&mut self, entity: Entity) {
        self.destroying.push(entity);
    }

    fn end_destroy(&mut self, entity: Entity) {
        if let Some(pos) = self.destroying.iter().rposition(|&e| e == entity) {
            self.destroying.swap_remove(pos);
        }
    }

    fn is_destroying(&self, entity: Entity) -> bool {
        self.destroying.contains(&entity)
    }
}
