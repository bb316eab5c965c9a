//! # Views
//!
//! Iteration over the entities that own every *included* component type and
//! none of the *excluded* ones.
//!
//! ```text
//! view::<(Position, Velocity)>, excluding (Frozen,)
//!
//! Position  [e0 e1 e5 e7 e9]     <- 5 entries
//! Velocity  [e1 e7]              <- driver (smallest)
//! Frozen    [e7]
//!
//! walk driver: e1 -> Position? yes, Frozen? no  -> yield
//!              e7 -> Position? yes, Frozen? yes -> skip
//! ```
//!
//! Views borrow the registry, so nothing can attach or detach components while
//! one is alive. Entities whose handle went stale through a bare
//! [`Registry::destroy_entity`](crate::Registry::destroy_entity) are skipped, as
//! are tombstone entries.

use std::any::TypeId;

use super::component::Component;
use super::entity::Entity;
use super::storage::{ErasedStorage, Storage};

/// A list of component types, used for exclusion filters.
///
/// Implemented for `()` and for tuples of up to six components.
pub trait ComponentTypes: 'static {
    /// The `TypeId` of every member, in tuple order.
    fn type_ids() -> Vec<TypeId>;
}

impl ComponentTypes for () {
    fn type_ids() -> Vec<TypeId> {
        Vec::new()
    }
}

/// A tuple of component types a view can fetch.
///
/// Implemented for tuples of one to six components.
pub trait ComponentSet: ComponentTypes {
    /// Shared references to one entity's components.
    type Refs<'a>
    where
        Self: 'a;
    /// Mutable references to one entity's components.
    type Muts<'a>
    where
        Self: 'a;
    /// Shared borrows of the member pools.
    type Pools<'a>
    where
        Self: 'a;
    /// Mutable borrows of the member pools.
    type PoolsMut<'a>
    where
        Self: 'a;

    /// Recovers the typed pools from erased ones given in tuple order.
    fn downcast<'a>(pools: &[&'a dyn ErasedStorage]) -> Option<Self::Pools<'a>>;

    /// Recovers the typed pools, taking each erased borrow out of `pools`.
    fn downcast_mut<'a>(
        pools: &mut [Option<&'a mut (dyn ErasedStorage + 'static)>],
    ) -> Option<Self::PoolsMut<'a>>;

    /// Fetches every member component of `entity`.
    fn fetch<'a>(pools: &Self::Pools<'a>, entity: Entity) -> Option<Self::Refs<'a>>;

    /// Fetches every member component of `entity` mutably.
    fn fetch_mut<'p>(pools: &'p mut Self::PoolsMut<'_>, entity: Entity) -> Option<Self::Muts<'p>>;

    /// The `i`-th packed entity of member pool `pool`.
    fn entity_at(pools: &Self::PoolsMut<'_>, pool: usize, i: usize) -> Option<Entity>;

    /// Length of member pool `pool`.
    fn len_of(pools: &Self::PoolsMut<'_>, pool: usize) -> usize;

    /// Checks if every member pool holds `entity`.
    fn contains_all(pools: &Self::PoolsMut<'_>, entity: Entity) -> bool;
}

#[inline]
fn is_live(entities: &[Entity], entity: Entity) -> bool {
    !entity.is_tombstone() && entities.get(entity.slot()) == Some(&entity)
}

#[inline]
fn admitted(entities: &[Entity], excluded: &[&dyn ErasedStorage], entity: Entity) -> bool {
    is_live(entities, entity) && !excluded.iter().any(|pool| pool.contains(entity))
}

/// The untyped half of a view: driver selection and membership filtering.
struct Filter<'r> {
    entities: &'r [Entity],
    included: Vec<&'r dyn ErasedStorage>,
    excluded: Vec<&'r dyn ErasedStorage>,
    driver: Option<usize>,
}

impl<'r> Filter<'r> {
    fn new(
        entities: &'r [Entity],
        pools: Option<(Vec<&'r dyn ErasedStorage>, Vec<&'r dyn ErasedStorage>)>,
    ) -> Self {
        let Some((included, excluded)) = pools else {
            return Self {
                entities,
                included: Vec::new(),
                excluded: Vec::new(),
                driver: None,
            };
        };
        let driver = included
            .iter()
            .enumerate()
            .min_by_key(|(_, pool)| pool.len())
            .map(|(i, _)| i);
        Self {
            entities,
            included,
            excluded,
            driver,
        }
    }

    fn driver_entities(&self) -> &'r [Entity] {
        match self.driver {
            Some(driver) => {
                let pool: &'r dyn ErasedStorage = self.included[driver];
                pool.entities()
            }
            None => &[],
        }
    }

    fn admits(&self, entity: Entity) -> bool {
        self.driver.is_some()
            && admitted(self.entities, &self.excluded, entity)
            && self
                .included
                .iter()
                .enumerate()
                .all(|(i, pool)| Some(i) == self.driver || pool.contains(entity))
    }

    /// Like `admits`, for entities that did not come from the driver.
    fn contains(&self, entity: Entity) -> bool {
        self.driver.is_some()
            && admitted(self.entities, &self.excluded, entity)
            && self.included.iter().all(|pool| pool.contains(entity))
    }

    fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.driver_entities()
            .iter()
            .copied()
            .filter(move |&entity| self.admits(entity))
    }
}

/// Shared view over the entities owning all of `Q` and none of the excluded types.
///
/// Created by [`Registry::view`](crate::Registry::view) and
/// [`Registry::view_excluding`](crate::Registry::view_excluding).
pub struct View<'r, Q: ComponentSet> {
    filter: Filter<'r>,
    pools: Option<Q::Pools<'r>>,
}

impl<'r, Q: ComponentSet> View<'r, Q> {
    pub(crate) fn new(
        entities: &'r [Entity],
        pools: Option<(Vec<&'r dyn ErasedStorage>, Vec<&'r dyn ErasedStorage>)>,
    ) -> Self {
        let filter = Filter::new(entities, pools);
        let pools = if filter.driver.is_some() {
            Q::downcast(&filter.included)
        } else {
            None
        };
        Self { filter, pools }
    }

    /// Iterates over the matching entities.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.filter.iter()
    }

    /// Length of the driver pool: an upper bound on the number of matches.
    #[must_use]
    pub fn size_hint(&self) -> usize {
        self.filter.driver_entities().len()
    }

    /// Checks if `entity` satisfies the view.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.filter.contains(entity)
    }

    /// Fetches all components of `entity`, or `None` if it does not match.
    #[must_use]
    pub fn fetch(&self, entity: Entity) -> Option<Q::Refs<'r>> {
        if !self.contains(entity) {
            return None;
        }
        Q::fetch(self.pools.as_ref()?, entity)
    }

    /// Returns component `C` of `entity`, or `None` if absent or `C` is not in the view.
    #[must_use]
    pub fn try_get<C: Component>(&self, entity: Entity) -> Option<&'r C> {
        self.filter
            .included
            .iter()
            .find_map(|&pool| {
                let pool: &'r dyn ErasedStorage = pool;
                pool.as_any().downcast_ref::<Storage<C>>()
            })
            .and_then(|storage| storage.try_get(entity))
    }

    /// Returns component `C` of an entity the caller knows matches the view.
    ///
    /// # Panics
    ///
    /// Panics if `C` is not part of the view or `entity` has no `C`.
    #[must_use]
    pub fn get<C: Component>(&self, entity: Entity) -> &'r C {
        self.try_get::<C>(entity).unwrap_or_else(|| {
            panic!(
                "entity {entity} has no `{}` in this view",
                std::any::type_name::<C>()
            )
        })
    }
}

/// Mutable view over the entities owning all of `Q` and none of the excluded types.
///
/// Created by [`Registry::view_mut`](crate::Registry::view_mut) and
/// [`Registry::view_mut_excluding`](crate::Registry::view_mut_excluding).
pub struct ViewMut<'r, Q: ComponentSet> {
    entities: &'r [Entity],
    excluded: Vec<&'r dyn ErasedStorage>,
    pools: Option<Q::PoolsMut<'r>>,
    driver: usize,
}

impl<'r, Q: ComponentSet> ViewMut<'r, Q> {
    pub(crate) fn empty(entities: &'r [Entity]) -> Self {
        Self {
            entities,
            excluded: Vec::new(),
            pools: None,
            driver: 0,
        }
    }

    pub(crate) fn new(
        entities: &'r [Entity],
        mut included: Vec<Option<&'r mut (dyn ErasedStorage + 'static)>>,
        excluded: Vec<&'r dyn ErasedStorage>,
    ) -> Self {
        let driver = included
            .iter()
            .enumerate()
            .min_by_key(|(_, pool)| match pool {
                Some(pool) => pool.len(),
                None => usize::MAX,
            })
            .map_or(0, |(i, _)| i);
        Self {
            entities,
            excluded,
            pools: Q::downcast_mut(&mut included),
            driver,
        }
    }

    /// Length of the driver pool: an upper bound on the number of matches.
    #[must_use]
    pub fn size_hint(&self) -> usize {
        self.pools
            .as_ref()
            .map_or(0, |pools| Q::len_of(pools, self.driver))
    }

    /// Checks if `entity` satisfies the view.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.pools
            .as_ref()
            .is_some_and(|pools| Q::contains_all(pools, entity))
            && admitted(self.entities, &self.excluded, entity)
    }

    /// Collects the matching entities.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        let Some(pools) = self.pools.as_ref() else {
            return Vec::new();
        };
        (0..Q::len_of(pools, self.driver))
            .filter_map(|i| Q::entity_at(pools, self.driver, i))
            .filter(|&entity| self.contains(entity))
            .collect()
    }

    /// Fetches all components of `entity` mutably, or `None` if it does not match.
    pub fn fetch_mut(&mut self, entity: Entity) -> Option<Q::Muts<'_>> {
        if !admitted(self.entities, &self.excluded, entity) {
            return None;
        }
        Q::fetch_mut(self.pools.as_mut()?, entity)
    }
}

macro_rules! impl_component_set {
    ($($name:ident $var:ident $idx:tt),+) => {
        impl<$($name: Component),+> ComponentTypes for ($($name,)+) {
            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$name>()),+]
            }
        }

        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            type Refs<'a> = ($(&'a $name,)+);
            type Muts<'a> = ($(&'a mut $name,)+);
            type Pools<'a> = ($(&'a Storage<$name>,)+);
            type PoolsMut<'a> = ($(&'a mut Storage<$name>,)+);

            fn downcast<'a>(pools: &[&'a dyn ErasedStorage]) -> Option<Self::Pools<'a>> {
                Some(($({
                    let pool: &'a dyn ErasedStorage = *pools.get($idx)?;
                    pool.as_any().downcast_ref::<Storage<$name>>()?
                },)+))
            }

            fn downcast_mut<'a>(
                pools: &mut [Option<&'a mut (dyn ErasedStorage + 'static)>],
            ) -> Option<Self::PoolsMut<'a>> {
                Some(($({
                    let pool = pools.get_mut($idx)?.take()?;
                    pool.as_any_mut().downcast_mut::<Storage<$name>>()?
                },)+))
            }

            fn fetch<'a>(pools: &Self::Pools<'a>, entity: Entity) -> Option<Self::Refs<'a>> {
                Some(($({
                    let pool: &'a Storage<$name> = pools.$idx;
                    pool.try_get(entity)?
                },)+))
            }

            fn fetch_mut<'p>(
                pools: &'p mut Self::PoolsMut<'_>,
                entity: Entity,
            ) -> Option<Self::Muts<'p>> {
                let ($($var,)+) = pools;
                Some(($($var.try_get_mut(entity)?,)+))
            }

            fn entity_at(pools: &Self::PoolsMut<'_>, pool: usize, i: usize) -> Option<Entity> {
                match pool {
                    $($idx => pools.$idx.entities().get(i).copied(),)+
                    _ => None,
                }
            }

            fn len_of(pools: &Self::PoolsMut<'_>, pool: usize) -> usize {
                match pool {
                    $($idx => pools.$idx.len(),)+
                    _ => 0,
                }
            }

            fn contains_all(pools: &Self::PoolsMut<'_>, entity: Entity) -> bool {
                $(pools.$idx.contains(entity))&&+
            }
        }

        impl<'r, $($name: Component),+> View<'r, ($($name,)+)> {
            /// Calls `f` with every matching entity and its components.
            pub fn each<Func>(&self, mut f: Func)
            where
                Func: FnMut(Entity, $(&'r $name),+),
            {
                let Some(pools) = self.pools else {
                    return;
                };
                for entity in self.filter.iter() {
                    $(
                        let Some($var) = pools.$idx.try_get(entity) else {
                            continue;
                        };
                    )+
                    f(entity, $($var),+);
                }
            }
        }

        impl<'r, $($name: Component),+> ViewMut<'r, ($($name,)+)> {
            /// Calls `f` with every matching entity and its components, mutably.
            pub fn each_mut<Func>(&mut self, mut f: Func)
            where
                Func: FnMut(Entity, $(&mut $name),+),
            {
                let Some(pools) = self.pools.as_mut() else {
                    return;
                };
                let mut i = 0;
                while let Some(entity) =
                    <($($name,)+) as ComponentSet>::entity_at(pools, self.driver, i)
                {
                    i += 1;
                    if !admitted(self.entities, &self.excluded, entity) {
                        continue;
                    }
                    let ($($var,)+) = &mut *pools;
                    $(
                        let Some($var) = $var.try_get_mut(entity) else {
                            continue;
                        };
                    )+
                    f(entity, $($var),+);
                }
            }
        }
    };
}

impl_component_set!(T0 t0 0);
impl_component_set!(T0 t0 0, T1 t1 1);
impl_component_set!(T0 t0 0, T1 t1 1, T2 t2 2);
impl_component_set!(T0 t0 0, T1 t1 1, T2 t2 2, T3 t3 3);
impl_component_set!(T0 t0 0, T1 t1 1, T2 t2 2, T3 t3 3, T4 t4 4);
impl_component_set!(T0 t0 0, T1 t1 1, T2 t2 2, T3 t3 3, T4 t4 4, T5 t5 5);

/// Entity-only view over pools chosen at runtime by [`ComponentId`](crate::ComponentId).
///
/// Created by [`Registry::runtime_view`](crate::Registry::runtime_view). Used by
/// reflection-driven consumers that do not know component types statically.
pub struct RuntimeView<'r> {
    filter: Filter<'r>,
}

impl<'r> RuntimeView<'r> {
    pub(crate) fn new(
        entities: &'r [Entity],
        pools: Option<(Vec<&'r dyn ErasedStorage>, Vec<&'r dyn ErasedStorage>)>,
    ) -> Self {
        Self {
            filter: Filter::new(entities, pools),
        }
    }

    /// Iterates over the matching entities.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.filter.iter()
    }

    /// Checks if `entity` satisfies the view.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.filter.contains(entity)
    }

    /// Length of the driver pool: an upper bound on the number of matches.
    #[must_use]
    pub fn size_hint(&self) -> usize {
        self.filter.driver_entities().len()
    }
}
