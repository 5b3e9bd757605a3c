// entity_set.rs - Table storage for all entities of one archetype

use super::{ComponentColumn, ComponentSet, StorageError};
use crate::config::SceneConfig;
use crate::ecs::{
    Archetype, ArchetypeRegistry, Component, ComponentId, EntityId, HookContext, HookKind,
};
use crate::pool::ArrayPools;
use std::any::type_name;
use std::collections::HashMap;
use std::mem;

/// All entities whose archetype is exactly `archetype`.
///
/// Rows are dense: row `i` of `entities` and row `i` of every column
/// describe the same entity, and `rows` is the inverse of `entities`.
/// Removal swaps the last row into the hole, so row order is not stable.
///
/// Adding a row is two-phase. [`EntitySet::add`] reserves the row and the
/// caller then writes every column; until it does, the columns are shorter
/// than `entities`.
pub struct EntitySet {
    archetype: Archetype,
    entities: Vec<EntityId>,
    columns: Vec<Box<dyn ComponentColumn>>,
    rows: HashMap<EntityId, usize>,
    capacity: usize,
    max_capacity: usize,
}

impl EntitySet {
    pub fn new(
        archetype: Archetype,
        registry: &ArchetypeRegistry,
        config: &SceneConfig,
        pools: &mut ArrayPools,
    ) -> Result<Self, StorageError> {
        let max_capacity = config.max_set_capacity.max(1);
        let capacity = config.initial_set_capacity.clamp(1, max_capacity);

        // Sorted by id, so a column's slot is `archetype.rank(id)`.
        let mut columns = Vec::with_capacity(archetype.len());
        for id in archetype.ids() {
            let def = registry
                .def_by_id(id)
                .ok_or(StorageError::UnregisteredComponent { component: id })?;
            columns.push(def.new_column(capacity, pools));
        }

        tracing::debug!(%archetype, capacity, columns = columns.len(), "created entity set");

        Ok(Self {
            archetype,
            entities: pools.rent(capacity),
            columns,
            rows: HashMap::with_capacity(capacity),
            capacity,
            max_capacity,
        })
    }

    #[inline]
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Live entity ids in row order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.rows.contains_key(&entity)
    }

    pub fn row_of(&self, entity: EntityId) -> Option<usize> {
        self.rows.get(&entity).copied()
    }

    pub fn columns(&self) -> &[Box<dyn ComponentColumn>] {
        &self.columns
    }

    pub fn column_by_id(&self, id: ComponentId) -> Option<&dyn ComponentColumn> {
        if !self.archetype.includes(id) {
            return None;
        }
        self.columns
            .get(self.archetype.rank(id))
            .map(|column| &**column)
    }

    pub fn column<T: Component>(&self, id: ComponentId) -> Result<&ComponentSet<T>, StorageError> {
        let column = self.slot(id)?;
        let found = column.component_name();
        column
            .as_any()
            .downcast_ref::<ComponentSet<T>>()
            .ok_or(StorageError::ColumnTypeMismatch {
                expected: type_name::<T>(),
                found,
            })
    }

    pub fn column_mut<T: Component>(
        &mut self,
        id: ComponentId,
    ) -> Result<&mut ComponentSet<T>, StorageError> {
        let slot = self.slot(id).map(|_| self.archetype.rank(id))?;
        let column = &mut self.columns[slot];
        let found = column.component_name();
        column
            .as_any_mut()
            .downcast_mut::<ComponentSet<T>>()
            .ok_or(StorageError::ColumnTypeMismatch {
                expected: type_name::<T>(),
                found,
            })
    }

    fn slot(&self, id: ComponentId) -> Result<&dyn ComponentColumn, StorageError> {
        self.column_by_id(id).ok_or(StorageError::MissingColumn {
            component: id,
            archetype: self.archetype,
        })
    }

    pub fn get<T: Component>(&self, entity: EntityId, id: ComponentId) -> Option<&T> {
        let row = self.row_of(entity)?;
        self.column::<T>(id).ok()?.get(row)
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityId, id: ComponentId) -> Option<&mut T> {
        let row = self.row_of(entity)?;
        self.column_mut::<T>(id).ok()?.get_mut(row)
    }

    /// Write a component value at `row` (append or overwrite).
    pub fn write<T: Component>(
        &mut self,
        row: usize,
        id: ComponentId,
        value: T,
    ) -> Result<(), StorageError> {
        self.column_mut::<T>(id)?.put(row, value)
    }

    /// Reserve a row for `entity`, growing first if the set is full.
    ///
    /// The new row's component cells are unset until written.
    pub fn add(&mut self, entity: EntityId, pools: &mut ArrayPools) -> Result<usize, StorageError> {
        debug_assert!(!self.contains(entity), "{entity} already stored in {}", self.archetype);
        if self.entities.len() == self.capacity {
            self.grow(pools)?;
        }
        let row = self.entities.len();
        self.entities.push(entity);
        self.rows.insert(entity, row);
        Ok(row)
    }

    /// Fails with `CapacityExceeded` when the set is full and can no
    /// longer grow, so callers can check before committing to a move.
    pub fn ensure_room(&self) -> Result<(), StorageError> {
        if self.entities.len() >= self.max_capacity {
            return Err(StorageError::CapacityExceeded {
                archetype: self.archetype,
                max: self.max_capacity,
            });
        }
        Ok(())
    }

    /// Double the capacity (clamped to the maximum) of the id array and
    /// every column. Returns the new capacity.
    pub fn grow(&mut self, pools: &mut ArrayPools) -> Result<usize, StorageError> {
        if self.capacity >= self.max_capacity {
            return Err(StorageError::CapacityExceeded {
                archetype: self.archetype,
                max: self.max_capacity,
            });
        }
        let next = self.capacity.saturating_mul(2).min(self.max_capacity);

        let mut entities = pools.rent::<EntityId>(next);
        entities.append(&mut self.entities);
        pools.give_back(mem::replace(&mut self.entities, entities));
        for column in &mut self.columns {
            column.grow(next, pools);
        }

        tracing::debug!(archetype = %self.archetype, from = self.capacity, to = next, "grew entity set");
        self.capacity = next;
        Ok(next)
    }

    /// Move `entity` into `dst`, carrying every component both sets share.
    ///
    /// Components `dst` lacks are dropped without hooks; components only
    /// `dst` has are left for the caller to write. Returns the row in `dst`.
    pub fn move_to(
        &mut self,
        entity: EntityId,
        dst: &mut EntitySet,
        pools: &mut ArrayPools,
    ) -> Result<usize, StorageError> {
        let row = self.require_row(entity)?;
        let dst_row = dst.add(entity, pools)?;
        for column in &mut self.columns {
            let id = column.component_id();
            if dst.archetype.includes(id) {
                let slot = dst.archetype.rank(id);
                column.transfer(row, &mut *dst.columns[slot], dst_row)?;
            } else {
                column.swap_remove(row);
            }
        }
        self.remove_row(row);
        Ok(dst_row)
    }

    /// Remove `entity`, running remove hooks for all its components first.
    pub fn swap_remove(
        &mut self,
        entity: EntityId,
        registry: &ArchetypeRegistry,
    ) -> Result<(), StorageError> {
        let row = self.require_row(entity)?;
        if self.archetype.includes_any(registry.remove_hook_mask()) {
            self.fire_hooks(HookKind::Remove, entity, self.archetype, registry)?;
        }
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        self.remove_row(row);
        Ok(())
    }

    /// Run `kind` hooks of the components in `components` for `entity`.
    ///
    /// Each hook sees the entity's other columns through its context.
    pub fn fire_hooks(
        &mut self,
        kind: HookKind,
        entity: EntityId,
        components: Archetype,
        registry: &ArchetypeRegistry,
    ) -> Result<(), StorageError> {
        let row = self.require_row(entity)?;
        let hooked = match kind {
            HookKind::Add => registry.add_hook_mask(),
            HookKind::Remove => registry.remove_hook_mask(),
        };
        for slot in 0..self.columns.len() {
            let id = self.columns[slot].component_id();
            if !components.includes(id) || !hooked.includes(id) {
                continue;
            }
            let Some(def) = registry.def_by_id(id) else {
                continue;
            };
            let (before, rest) = self.columns.split_at_mut(slot);
            let Some((column, after)) = rest.split_first_mut() else {
                continue;
            };
            let ctx = HookContext::new(entity, self.archetype, row, &*before, &*after);
            column.fire_hook(kind, row, def.hooks(), &ctx);
        }
        Ok(())
    }

    /// Entity ids and columns for lockstep iteration.
    pub fn split_for_query(&mut self) -> (&[EntityId], &mut [Box<dyn ComponentColumn>]) {
        (&self.entities, &mut self.columns)
    }

    fn require_row(&self, entity: EntityId) -> Result<usize, StorageError> {
        self.row_of(entity).ok_or(StorageError::UnknownEntity {
            entity,
            archetype: self.archetype,
        })
    }

    fn remove_row(&mut self, row: usize) {
        let removed = self.entities.swap_remove(row);
        self.rows.remove(&removed);
        if let Some(&moved) = self.entities.get(row) {
            self.rows.insert(moved, row);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::ComponentHooks;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Health(i64);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Armor(u32);

    struct Fixture {
        registry: ArchetypeRegistry,
        pools: ArrayPools,
        health: ComponentId,
        armor: ComponentId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = ArchetypeRegistry::new();
            let health = registry.register::<Health>().unwrap();
            let armor = registry.register::<Armor>().unwrap();
            Self {
                registry,
                pools: ArrayPools::default(),
                health,
                armor,
            }
        }

        fn set(&mut self, archetype: Archetype, initial: usize) -> EntitySet {
            let config = SceneConfig {
                initial_set_capacity: initial,
                ..SceneConfig::default()
            };
            EntitySet::new(archetype, &self.registry, &config, &mut self.pools).unwrap()
        }

        fn both(&self) -> Archetype {
            Archetype::single(self.health).with(self.armor)
        }

        fn insert(&mut self, set: &mut EntitySet, raw: u64) -> EntityId {
            let entity = EntityId::from_raw(raw);
            let row = set.add(entity, &mut self.pools).unwrap();
            set.write(row, self.health, Health(raw as i64 * 10)).unwrap();
            if set.archetype().includes(self.armor) {
                set.write(row, self.armor, Armor(raw as u32)).unwrap();
            }
            entity
        }
    }

    fn assert_rows_consistent(set: &EntitySet) {
        for (row, &entity) in set.entities().iter().enumerate() {
            assert_eq!(set.row_of(entity), Some(row), "row map out of sync for {entity}");
        }
        assert_eq!(set.rows.len(), set.len());
        for column in set.columns() {
            assert_eq!(column.len(), set.len());
        }
    }

    #[test]
    fn swap_remove_keeps_row_map_inverse() {
        let mut fx = Fixture::new();
        let mut set = fx.set(fx.both(), 2);
        let ids: Vec<EntityId> = (1..=6).map(|raw| fx.insert(&mut set, raw)).collect();

        set.swap_remove(ids[0], &fx.registry).unwrap();
        assert_rows_consistent(&set);
        // Last row took the hole.
        assert_eq!(set.entities()[0], ids[5]);

        set.swap_remove(ids[5], &fx.registry).unwrap();
        set.swap_remove(ids[3], &fx.registry).unwrap();
        assert_rows_consistent(&set);
        assert_eq!(set.len(), 3);
        for &entity in &[ids[1], ids[2], ids[4]] {
            let raw = entity.raw();
            assert_eq!(set.get::<Health>(entity, fx.health), Some(&Health(raw as i64 * 10)));
            assert_eq!(set.get::<Armor>(entity, fx.armor), Some(&Armor(raw as u32)));
        }
        assert!(!set.contains(ids[0]));
    }

    #[test]
    fn remove_unknown_entity_is_an_error() {
        let mut fx = Fixture::new();
        let mut set = fx.set(fx.both(), 4);
        let err = set.swap_remove(EntityId::from_raw(9), &fx.registry).unwrap_err();
        assert!(matches!(err, StorageError::UnknownEntity { .. }));
    }

    #[test]
    fn growth_replays_against_linear_model() {
        for n in [1u64, 4, 5, 1000] {
            let mut fx = Fixture::new();
            let mut set = fx.set(fx.both(), 4);
            let mut model: Vec<(EntityId, Health, Armor)> = Vec::new();

            for raw in 1..=n {
                let entity = fx.insert(&mut set, raw);
                model.push((entity, Health(raw as i64 * 10), Armor(raw as u32)));
            }

            let mut expected_capacity = 4;
            while (expected_capacity as u64) < n {
                expected_capacity *= 2;
            }
            assert_eq!(set.capacity(), expected_capacity, "n = {n}");
            assert_eq!(set.len() as u64, n);
            assert_eq!(set.entities(), model.iter().map(|m| m.0).collect::<Vec<_>>().as_slice());
            for (entity, health, armor) in &model {
                assert_eq!(set.get::<Health>(*entity, fx.health), Some(health));
                assert_eq!(set.get::<Armor>(*entity, fx.armor), Some(armor));
            }
            assert_rows_consistent(&set);
        }
    }

    #[test]
    fn growth_stops_at_max_capacity() {
        let mut fx = Fixture::new();
        let config = SceneConfig {
            initial_set_capacity: 2,
            max_set_capacity: 3,
            ..SceneConfig::default()
        };
        let mut set =
            EntitySet::new(Archetype::single(fx.health), &fx.registry, &config, &mut fx.pools).unwrap();
        for raw in 1..=3 {
            fx.insert(&mut set, raw);
        }
        assert_eq!(set.capacity(), 3);
        assert!(matches!(
            set.ensure_room(),
            Err(StorageError::CapacityExceeded { max: 3, .. })
        ));

        let err = set.add(EntityId::from_raw(4), &mut fx.pools).unwrap_err();
        assert!(matches!(err, StorageError::CapacityExceeded { max: 3, .. }));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn move_to_carries_shared_columns_only() {
        let mut fx = Fixture::new();
        let mut src = fx.set(fx.both(), 4);
        let mut dst = fx.set(Archetype::single(fx.health), 4);
        let a = fx.insert(&mut src, 1);
        let b = fx.insert(&mut src, 2);

        let row = src.move_to(a, &mut dst, &mut fx.pools).unwrap();
        assert_eq!(row, 0);
        assert_eq!(dst.get::<Health>(a, fx.health), Some(&Health(10)));
        assert!(dst.get::<Armor>(a, fx.armor).is_none());
        assert!(!src.contains(a));
        assert_eq!(src.get::<Armor>(b, fx.armor), Some(&Armor(2)));
        assert_rows_consistent(&src);
        assert_rows_consistent(&dst);
    }

    #[test]
    fn move_to_leaves_new_columns_unwritten() {
        let mut fx = Fixture::new();
        let mut src = fx.set(Archetype::single(fx.health), 4);
        let mut dst = fx.set(fx.both(), 4);
        let a = fx.insert(&mut src, 1);

        let row = src.move_to(a, &mut dst, &mut fx.pools).unwrap();
        assert_eq!(dst.column::<Armor>(fx.armor).unwrap().len(), 0);
        dst.write(row, fx.armor, Armor(7)).unwrap();
        assert_rows_consistent(&dst);
    }

    #[test]
    fn typed_access_checks_column_type() {
        let mut fx = Fixture::new();
        let set = fx.set(fx.both(), 4);
        assert!(matches!(
            set.column::<Armor>(fx.health),
            Err(StorageError::ColumnTypeMismatch { .. })
        ));
        assert!(matches!(
            fx.set(Archetype::single(fx.health), 1).column::<Armor>(fx.armor),
            Err(StorageError::MissingColumn { .. })
        ));
    }

    #[test]
    fn remove_hook_registered_after_set_creation_still_fires() {
        let mut fx = Fixture::new();
        let mut set = fx.set(fx.both(), 4);
        let a = fx.insert(&mut set, 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        fx.registry
            .set_on_remove::<Armor>(Some(Box::new(move |ctx: &HookContext<'_>, armor: &mut Armor| {
                let health = ctx.get::<Health>().copied();
                sink.borrow_mut().push((ctx.entity(), armor.0, health));
            })))
            .unwrap();

        set.swap_remove(a, &fx.registry).unwrap();
        assert_eq!(*seen.borrow(), vec![(a, 1, Some(Health(10)))]);
    }

    #[test]
    fn hooks_only_fire_for_requested_components() {
        let mut registry = ArchetypeRegistry::new();
        let counter = Rc::new(RefCell::new(0));
        let c = Rc::clone(&counter);
        let health = registry
            .register_with(ComponentHooks::<Health>::new().on_add(move |_, hp| {
                hp.0 += 1;
                *c.borrow_mut() += 1;
            }))
            .unwrap();
        let armor = registry.register::<Armor>().unwrap();
        let mut pools = ArrayPools::default();
        let archetype = Archetype::single(health).with(armor);
        let mut set =
            EntitySet::new(archetype, &registry, &SceneConfig::default(), &mut pools).unwrap();
        let e = EntityId::from_raw(1);
        let row = set.add(e, &mut pools).unwrap();
        set.write(row, health, Health(1)).unwrap();
        set.write(row, armor, Armor(1)).unwrap();

        set.fire_hooks(HookKind::Add, e, Archetype::single(armor), &registry).unwrap();
        assert_eq!(*counter.borrow(), 0);
        set.fire_hooks(HookKind::Add, e, archetype, &registry).unwrap();
        assert_eq!(*counter.borrow(), 1);
        assert_eq!(set.get::<Health>(e, health), Some(&Health(2)));
    }
}
