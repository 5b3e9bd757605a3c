// scene.rs - Entity lifecycle, archetype migration, queries and the update loop

use crate::config::SceneConfig;
use crate::ecs::post_frame::DeferredRemoval;
use crate::ecs::query::run_query;
use crate::ecs::storage::{EntitySet, StorageError};
use crate::ecs::{
    Archetype, ArchetypeRegistry, Bundle, Component, ComponentHooks, ComponentId, Disabled,
    EntityBuilder, EntityId, EntityRegistry, HookKind, PostFrameQueue, Query, QueryFilter,
    QueryFn, RegistryError, SceneError, System,
};
use crate::metrics::{EventCounter, FrameStats, SystemProfiler};
use crate::pool::{ArrayPools, PoolStats};
use std::collections::HashMap;
use std::mem;
use tracing::{trace, warn};

/// Frames kept by the update-time rolling window.
const FRAME_WINDOW: usize = 120;

struct ScheduledSystem {
    name: String,
    system: Box<dyn System>,
}

/// Owns every entity, table and system of one simulation.
///
/// Component types must be registered before use. `Disabled` is always
/// registered first and gets id 0.
pub struct EcsScene {
    config: SceneConfig,
    registry: ArchetypeRegistry,
    entities: EntityRegistry,
    sets: Vec<EntitySet>,
    set_lookup: HashMap<Archetype, usize>,
    pools: ArrayPools,
    post_frame: PostFrameQueue,
    systems: Vec<ScheduledSystem>,
    systems_replaced: bool,
    profiler: SystemProfiler,
    frame_stats: FrameStats,
    counters: EventCounter,
    frame: u64,
}

impl EcsScene {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default()).expect("default scene configuration is valid")
    }

    pub fn with_config(config: SceneConfig) -> Result<Self, SceneError> {
        config.validate()?;
        let mut registry = ArchetypeRegistry::new();
        registry.register::<Disabled>()?;
        Ok(Self {
            pools: ArrayPools::new(config.pool_retain_per_bucket),
            config,
            registry,
            entities: EntityRegistry::new(),
            sets: Vec::new(),
            set_lookup: HashMap::new(),
            post_frame: PostFrameQueue::new(),
            systems: Vec::new(),
            systems_replaced: false,
            profiler: SystemProfiler::new(),
            frame_stats: FrameStats::new(FRAME_WINDOW),
            counters: EventCounter::new(),
            frame: 0,
        })
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    pub fn register_component<T: Component>(&mut self) -> Result<ComponentId, RegistryError> {
        self.registry.register::<T>()
    }

    pub fn register_component_with<T: Component>(
        &mut self,
        hooks: ComponentHooks<T>,
    ) -> Result<ComponentId, RegistryError> {
        self.registry.register_with(hooks)
    }

    pub fn registry(&self) -> &ArchetypeRegistry {
        &self.registry
    }

    /// Mutable registry access, for changing hooks after startup.
    pub fn registry_mut(&mut self) -> &mut ArchetypeRegistry {
        &mut self.registry
    }

    // ------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------

    /// Create an entity from a tuple of component values.
    ///
    /// Add hooks of the new components run after every value is written.
    pub fn create_entity<B: Bundle>(&mut self, bundle: B) -> Result<EntityId, SceneError> {
        let archetype = B::archetype(&self.registry)?;
        let (entity, index, row) = self.allocate(archetype)?;
        bundle.write_into(&mut self.sets[index], row, &self.registry)?;
        self.fire_add_hooks(index, entity, archetype)?;
        Ok(entity)
    }

    /// Create an entity from a builder.
    pub fn spawn(&mut self, builder: EntityBuilder) -> Result<EntityId, SceneError> {
        let archetype = builder.archetype(&self.registry)?;
        let (entity, index, row) = self.allocate(archetype)?;
        builder.write_into(&mut self.sets[index], row, &self.registry)?;
        self.fire_add_hooks(index, entity, archetype)?;
        Ok(entity)
    }

    /// Issue an id and reserve its row. Components are written by the caller.
    fn allocate(&mut self, archetype: Archetype) -> Result<(EntityId, usize, usize), SceneError> {
        let index = self.ensure_set(archetype)?;
        let entity = self.entities.alloc(archetype);
        match self.add_row(index, entity) {
            Ok(row) => Ok((entity, index, row)),
            Err(err) => {
                self.entities.free(entity);
                Err(err)
            }
        }
    }

    /// Destroy `entity`, running remove hooks for all of its components.
    pub fn remove_entity(&mut self, entity: EntityId) -> Result<(), SceneError> {
        let archetype = self.current_archetype(entity)?;
        let index = self.set_index(entity, archetype)?;
        self.sets[index].swap_remove(entity, &self.registry)?;
        self.entities.free(entity);
        Ok(())
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.entities.contains(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Current archetype of `entity`.
    pub fn archetype(&self, entity: EntityId) -> Option<Archetype> {
        self.entities.archetype_of(entity)
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        match (self.registry.id_of::<T>(), self.archetype(entity)) {
            (Some(id), Some(archetype)) => archetype.includes(id),
            _ => false,
        }
    }

    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let id = self.registry.id_of::<T>()?;
        let archetype = self.archetype(entity)?;
        let index = *self.set_lookup.get(&archetype)?;
        self.sets[index].get::<T>(entity, id)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let id = self.registry.id_of::<T>()?;
        let archetype = self.archetype(entity)?;
        let index = *self.set_lookup.get(&archetype)?;
        self.sets[index].get_mut::<T>(entity, id)
    }

    /// Like [`get_component`](Self::get_component) but panics if the
    /// entity or component is missing.
    pub fn component<T: Component>(&self, entity: EntityId) -> &T {
        if let Err(err) = self.check_component::<T>(entity) {
            panic!("{err}");
        }
        self.get_component::<T>(entity)
            .unwrap_or_else(|| panic!("storage for {entity} is out of sync with its archetype"))
    }

    /// Like [`get_component_mut`](Self::get_component_mut) but panics if
    /// the entity or component is missing.
    pub fn component_mut<T: Component>(&mut self, entity: EntityId) -> &mut T {
        if let Err(err) = self.check_component::<T>(entity) {
            panic!("{err}");
        }
        self.get_component_mut::<T>(entity)
            .unwrap_or_else(|| panic!("storage for {entity} is out of sync with its archetype"))
    }

    fn check_component<T: Component>(&self, entity: EntityId) -> Result<(), SceneError> {
        let def = self.registry.def::<T>()?;
        let archetype = self.current_archetype(entity)?;
        if archetype.includes(def.id()) {
            Ok(())
        } else {
            Err(SceneError::MissingComponent {
                entity,
                component: def.name(),
            })
        }
    }

    /// Set `T` on `entity`.
    ///
    /// If the entity already has `T` the value is overwritten in place and
    /// no hook runs. Otherwise the entity migrates to the archetype with
    /// `T` added and the add hook of `T` runs on the new value.
    pub fn set_component<T: Component>(
        &mut self,
        entity: EntityId,
        value: T,
    ) -> Result<(), SceneError> {
        let def = self.registry.def::<T>()?;
        let (id, bit) = (def.id(), def.archetype());
        let current = self.current_archetype(entity)?;
        let src = self.set_index(entity, current)?;

        if current.includes(id) {
            let set = &mut self.sets[src];
            let row = set.row_of(entity).ok_or(StorageError::UnknownEntity {
                entity,
                archetype: current,
            })?;
            set.write(row, id, value)?;
            return Ok(());
        }

        let target = current.union(bit);
        let dst = self.ensure_set(target)?;
        let row = self.migrate(entity, src, dst)?;
        self.entities.set_archetype(entity, target);
        self.sets[dst].write(row, id, value)?;
        self.fire_add_hooks(dst, entity, bit)?;
        Ok(())
    }

    /// Remove `T` from `entity`.
    ///
    /// The remove hook of `T` runs before the entity migrates, so it can
    /// still read every sibling component.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Result<(), SceneError> {
        let id = self.registry.def::<T>()?.id();
        self.remove_component_id(entity, id)
    }

    fn remove_component_id(&mut self, entity: EntityId, id: ComponentId) -> Result<(), SceneError> {
        let component = self
            .registry
            .def_by_id(id)
            .map_or("<unregistered>", |def| def.name());
        let current = self.current_archetype(entity)?;
        if !current.includes(id) {
            return Err(SceneError::MissingComponent { entity, component });
        }
        let target = current.without(id);
        if target.is_empty() {
            return Err(SceneError::LastComponent { entity, component });
        }

        let src = self.set_index(entity, current)?;
        // The hook reports a finished removal, so the row must be able to move.
        let dst = self.ensure_set(target)?;
        self.sets[dst].ensure_room()?;
        if self.registry.remove_hook_mask().includes(id) {
            self.sets[src].fire_hooks(
                HookKind::Remove,
                entity,
                Archetype::single(id),
                &self.registry,
            )?;
        }
        self.migrate(entity, src, dst)?;
        self.entities.set_archetype(entity, target);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Deferred mutation
    // ------------------------------------------------------------------

    pub fn remove_entity_after_frame(&mut self, entity: EntityId) {
        self.post_frame.remove_entity(entity);
    }

    pub fn remove_component_after_frame<T: Component>(&mut self, entity: EntityId) {
        self.post_frame.remove_component::<T>(entity);
    }

    pub fn set_component_after_frame<T: Component>(&mut self, entity: EntityId, value: T) {
        self.post_frame.set_component(entity, value);
    }

    pub fn pending_post_frame(&self) -> &PostFrameQueue {
        &self.post_frame
    }

    /// Apply everything queued for after the frame.
    ///
    /// Operations on entities that no longer exist, and removals of
    /// components already gone, are skipped. A failing operation does not
    /// stop the drain: every queued operation is attempted and the first
    /// error is returned afterwards. Returns the number of operations
    /// applied.
    pub fn apply_post_frame(&mut self) -> Result<usize, SceneError> {
        let (removals, sets, entities) = mem::take(&mut self.post_frame).into_parts();
        let mut drain = Drain::default();

        for DeferredRemoval {
            entity,
            type_id,
            name,
        } in removals
        {
            let Some(current) = self.archetype(entity) else {
                warn!(%entity, component = name, "skipping deferred component removal for missing entity");
                continue;
            };
            let outcome = match self.registry.def_by_type(type_id).map(|def| def.id()) {
                Some(id) if !current.includes(id) => {
                    warn!(%entity, component = name, "skipping deferred removal of absent component");
                    continue;
                }
                Some(id) => self.remove_component_id(entity, id),
                None => Err(RegistryError::Unregistered { name }.into()),
            };
            drain.record(outcome);
        }

        for (entity, apply) in sets {
            if !self.contains(entity) {
                warn!(%entity, "skipping deferred component set for missing entity");
                continue;
            }
            drain.record(apply(self));
        }

        for entity in entities {
            if !self.contains(entity) {
                warn!(%entity, "skipping deferred removal of missing entity");
                continue;
            }
            let outcome = self.remove_entity(entity);
            drain.record(outcome);
        }

        drain.finish()
    }

    // ------------------------------------------------------------------
    // Systems & update
    // ------------------------------------------------------------------

    /// Replace the system list.
    ///
    /// Called from a running system, the new list takes effect from the
    /// next update and the rest of the current frame still runs the old one.
    pub fn set_systems(&mut self, systems: Vec<Box<dyn System>>) {
        self.systems_replaced = true;
        self.systems = systems
            .into_iter()
            .map(|system| ScheduledSystem {
                name: system.name().to_owned(),
                system,
            })
            .collect();
    }

    pub fn add_system(&mut self, system: impl System + 'static) {
        self.systems.push(ScheduledSystem {
            name: system.name().to_owned(),
            system: Box::new(system),
        });
    }

    pub fn system_names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|s| s.name.as_str())
    }

    /// Run every system in order, then apply the post-frame queue.
    pub fn update(&mut self) -> Result<(), SceneError> {
        self.frame_stats.begin();

        self.systems_replaced = false;
        let mut systems = mem::take(&mut self.systems);
        let mut profiler = mem::take(&mut self.profiler);
        let mut outcome = Ok(());
        for ScheduledSystem { name, system } in systems.iter_mut() {
            outcome = profiler.time_system(name, || system.execute(self));
            if outcome.is_err() {
                break;
            }
        }
        // Systems added while running go after the existing ones, unless a
        // system installed a whole new list.
        if !mem::take(&mut self.systems_replaced) {
            systems.append(&mut self.systems);
            self.systems = systems;
        }
        self.profiler = profiler;
        outcome?;

        let applied = self.apply_post_frame()?;
        self.frame += 1;
        self.frame_stats.end();
        trace!(frame = self.frame, applied, sets = self.sets.len(), "scene updated");
        Ok(())
    }

    /// Number of completed updates.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Call `f(entity, &mut c1, ..)` for every entity having all of `Q`'s
    /// components and `also_include`, and none of `exclude`. Returns the
    /// number of entities visited.
    ///
    /// `f` must not change entity structure; use the post-frame queue.
    pub fn for_each_match<Q, F>(
        &mut self,
        exclude: Archetype,
        also_include: Archetype,
        mut f: F,
    ) -> usize
    where
        Q: Query,
        F: QueryFn<(), Q>,
    {
        let Some(required) = Q::archetype(&self.registry) else {
            return 0;
        };
        run_query::<Q, _, F>(
            &mut self.sets,
            required.union(also_include),
            exclude,
            &mut (),
            &mut f,
        )
    }

    /// [`for_each_match`](Self::for_each_match) whose callback also gets
    /// the post-frame queue: `f(queue, entity, &mut c1, ..)`.
    pub fn for_each_match_queued<Q, F>(
        &mut self,
        exclude: Archetype,
        also_include: Archetype,
        mut f: F,
    ) -> usize
    where
        Q: Query,
        F: QueryFn<PostFrameQueue, Q>,
    {
        self.run_queued::<Q, F>(exclude, also_include, &mut f)
    }

    /// Run `Q` under a type-keyed filter.
    pub fn query<Q, F>(&mut self, filter: &QueryFilter, f: F) -> usize
    where
        Q: Query,
        F: QueryFn<(), Q>,
    {
        match filter.resolve(&self.registry) {
            Some((include, exclude)) => self.for_each_match::<Q, F>(exclude, include, f),
            None => 0,
        }
    }

    pub fn query_queued<Q, F>(&mut self, filter: &QueryFilter, mut f: F) -> usize
    where
        Q: Query,
        F: QueryFn<PostFrameQueue, Q>,
    {
        self.run_filtered_queued::<Q, F>(filter, &mut f)
    }

    pub(crate) fn run_filtered_queued<Q, F>(&mut self, filter: &QueryFilter, f: &mut F) -> usize
    where
        Q: Query,
        F: QueryFn<PostFrameQueue, Q> + ?Sized,
    {
        match filter.resolve(&self.registry) {
            Some((include, exclude)) => self.run_queued::<Q, F>(exclude, include, f),
            None => 0,
        }
    }

    fn run_queued<Q, F>(&mut self, exclude: Archetype, also_include: Archetype, f: &mut F) -> usize
    where
        Q: Query,
        F: QueryFn<PostFrameQueue, Q> + ?Sized,
    {
        let Some(required) = Q::archetype(&self.registry) else {
            return 0;
        };
        run_query::<Q, _, F>(
            &mut self.sets,
            required.union(also_include),
            exclude,
            &mut self.post_frame,
            f,
        )
    }

    // ------------------------------------------------------------------
    // Tables & statistics
    // ------------------------------------------------------------------

    pub fn entity_sets(&self) -> &[EntitySet] {
        &self.sets
    }

    pub fn entity_set(&self, archetype: Archetype) -> Option<&EntitySet> {
        self.set_lookup.get(&archetype).map(|&index| &self.sets[index])
    }

    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    pub fn frame_stats(&self) -> &FrameStats {
        &self.frame_stats
    }

    pub fn counters(&self) -> &EventCounter {
        &self.counters
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pools.stats()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn current_archetype(&self, entity: EntityId) -> Result<Archetype, SceneError> {
        self.entities
            .archetype_of(entity)
            .ok_or(SceneError::EntityNotFound { entity })
    }

    fn set_index(&self, entity: EntityId, archetype: Archetype) -> Result<usize, StorageError> {
        self.set_lookup
            .get(&archetype)
            .copied()
            .ok_or(StorageError::UnknownEntity { entity, archetype })
    }

    /// Index of the table for `archetype`, created on first use.
    fn ensure_set(&mut self, archetype: Archetype) -> Result<usize, SceneError> {
        if archetype.is_empty() {
            return Err(SceneError::EmptyArchetype);
        }
        if let Some(&index) = self.set_lookup.get(&archetype) {
            return Ok(index);
        }
        let set = EntitySet::new(archetype, &self.registry, &self.config, &mut self.pools)?;
        let index = self.sets.len();
        self.sets.push(set);
        self.set_lookup.insert(archetype, index);
        self.counters.add("entity_sets_created", 1);
        Ok(index)
    }

    fn add_row(&mut self, index: usize, entity: EntityId) -> Result<usize, SceneError> {
        let set = &mut self.sets[index];
        let before = set.capacity();
        let row = set.add(entity, &mut self.pools)?;
        if set.capacity() != before {
            self.counters.add("set_growths", 1);
        }
        Ok(row)
    }

    /// Move `entity` from table `src` to table `dst`; returns its new row.
    fn migrate(&mut self, entity: EntityId, src: usize, dst: usize) -> Result<usize, SceneError> {
        let (from, to) = pair_mut(&mut self.sets, src, dst);
        let before = to.capacity();
        let row = from.move_to(entity, to, &mut self.pools)?;
        if to.capacity() != before {
            self.counters.add("set_growths", 1);
        }
        self.counters.add("migrations", 1);
        Ok(row)
    }

    fn fire_add_hooks(
        &mut self,
        index: usize,
        entity: EntityId,
        components: Archetype,
    ) -> Result<(), SceneError> {
        if components.includes_any(self.registry.add_hook_mask()) {
            self.sets[index].fire_hooks(HookKind::Add, entity, components, &self.registry)?;
        }
        Ok(())
    }
}

/// Outcome of a post-frame drain.
#[derive(Default)]
struct Drain {
    applied: usize,
    first_error: Option<SceneError>,
}

impl Drain {
    fn record(&mut self, outcome: Result<(), SceneError>) {
        match outcome {
            Ok(()) => self.applied += 1,
            Err(err) => {
                warn!(error = %err, "deferred operation failed");
                self.first_error.get_or_insert(err);
            }
        }
    }

    fn finish(self) -> Result<usize, SceneError> {
        match self.first_error {
            Some(err) => Err(err),
            None => Ok(self.applied),
        }
    }
}

impl Default for EcsScene {
    fn default() -> Self {
        Self::new()
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "pair_mut needs two distinct indices");
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &mut right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &mut left[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{FnSystem, HookContext, QuerySystem};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    struct Velocity {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct A(u32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct B(u32);
    #[derive(Debug, Clone, Copy, PartialEq)]
    struct C(u32);

    type Log = Rc<RefCell<Vec<String>>>;

    fn scene_with_abc() -> EcsScene {
        let mut scene = EcsScene::new();
        scene.register_component::<A>().unwrap();
        scene.register_component::<B>().unwrap();
        scene.register_component::<C>().unwrap();
        scene
    }

    fn id_of<T: Component>(scene: &EcsScene) -> ComponentId {
        scene.registry().id_of::<T>().unwrap()
    }

    #[test]
    fn disabled_is_preregistered_and_ids_start_at_one() {
        let mut scene = scene_with_abc();
        assert_eq!(scene.registry().id_of::<Disabled>(), Some(0));
        let e = scene.create_entity((A(1),)).unwrap();
        assert_eq!(e, EntityId::from_raw(1));
        assert!(scene.contains(e));
        assert_eq!(scene.entity_count(), 1);
    }

    #[test]
    fn position_velocity_scenario() {
        let mut scene = EcsScene::new();
        scene.register_component::<Position>().unwrap();
        scene.register_component::<Velocity>().unwrap();

        let e = scene
            .create_entity((Position { x: 0.0, y: 0.0 }, Velocity { x: 1.0, y: 1.0 }))
            .unwrap();

        let visits = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&visits);
        scene.add_system(QuerySystem::<(Position, Velocity)>::new(
            "movement",
            move |_: &mut PostFrameQueue, _: EntityId, pos: &mut Position, vel: &mut Velocity| {
                pos.x += vel.x;
                pos.y += vel.y;
                *counter.borrow_mut() += 1;
            },
        ));

        scene.update().unwrap();
        assert_eq!(*scene.component::<Position>(e), Position { x: 1.0, y: 1.0 });
        assert_eq!(*visits.borrow(), 1);

        scene.remove_component::<Velocity>(e).unwrap();
        scene.update().unwrap();
        assert_eq!(*visits.borrow(), 1);
        assert_eq!(*scene.component::<Position>(e), Position { x: 1.0, y: 1.0 });
        assert_eq!(scene.frame(), 2);
    }

    #[test]
    fn set_then_get_round_trips_across_migrations() {
        let mut scene = scene_with_abc();
        let e = scene.create_entity((A(1), C(3))).unwrap();
        let other = scene.create_entity((A(10), C(30))).unwrap();

        scene.set_component(e, B(2)).unwrap();
        assert_eq!(scene.get_component::<B>(e), Some(&B(2)));
        assert_eq!(scene.get_component::<A>(e), Some(&A(1)));
        assert_eq!(scene.get_component::<C>(e), Some(&C(3)));

        // In-place overwrite keeps the archetype.
        let archetype = scene.archetype(e);
        scene.set_component(e, A(5)).unwrap();
        assert_eq!(scene.archetype(e), archetype);
        assert_eq!(scene.get_component::<A>(e), Some(&A(5)));

        // The entity left behind in the old table is intact.
        assert_eq!(scene.get_component::<A>(other), Some(&A(10)));
        assert_eq!(scene.get_component::<C>(other), Some(&C(30)));
        if crate::metrics::enabled() {
            assert_eq!(scene.counters().get("migrations"), 1);
        }
    }

    #[test]
    fn archetype_follows_set_and_remove() {
        let mut scene = scene_with_abc();
        let (a, b) = (id_of::<A>(&scene), id_of::<B>(&scene));
        let e = scene.create_entity((A(1),)).unwrap();

        scene.set_component(e, B(2)).unwrap();
        assert!(scene.has_component::<B>(e));
        assert_eq!(scene.archetype(e), Some(Archetype::single(a).with(b)));

        scene.remove_component::<B>(e).unwrap();
        assert!(!scene.has_component::<B>(e));
        assert_eq!(scene.archetype(e), Some(Archetype::single(a)));
        assert!(scene.get_component::<B>(e).is_none());
    }

    #[test]
    fn removing_last_or_missing_component_is_rejected() {
        let mut scene = scene_with_abc();
        let e = scene.create_entity((A(1),)).unwrap();

        assert!(matches!(
            scene.remove_component::<A>(e),
            Err(SceneError::LastComponent { .. })
        ));
        assert!(matches!(
            scene.remove_component::<B>(e),
            Err(SceneError::MissingComponent { .. })
        ));
        assert!(scene.has_component::<A>(e));

        let ghost = EntityId::from_raw(99);
        assert!(matches!(
            scene.set_component(ghost, A(0)),
            Err(SceneError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn unregistered_types_fail_without_leaking_ids() {
        struct Unknown;
        let mut scene = scene_with_abc();
        assert!(matches!(
            scene.create_entity((A(1), Unknown)),
            Err(SceneError::Registry(RegistryError::Unregistered { .. }))
        ));
        assert_eq!(scene.entity_count(), 0);
        assert!(matches!(
            scene.spawn(EntityBuilder::new()),
            Err(SceneError::EmptyArchetype)
        ));
    }

    #[test]
    #[should_panic(expected = "has no")]
    fn component_panics_on_missing_component() {
        let mut scene = scene_with_abc();
        let e = scene.create_entity((A(1),)).unwrap();
        scene.component::<B>(e);
    }

    #[test]
    fn component_mut_writes_through() {
        let mut scene = scene_with_abc();
        let e = scene.create_entity((A(1), B(1))).unwrap();
        scene.component_mut::<B>(e).0 = 9;
        assert_eq!(scene.get_component::<B>(e), Some(&B(9)));
        if let Some(a) = scene.get_component_mut::<A>(e) {
            a.0 = 4;
        }
        assert_eq!(scene.component::<A>(e), &A(4));
    }

    #[test]
    fn query_skips_disabled_and_non_matching_shapes() {
        let mut scene = scene_with_abc();
        let ab = scene.create_entity((A(1), B(1))).unwrap();
        let a = scene.create_entity((A(2),)).unwrap();
        let _b = scene.create_entity((B(3),)).unwrap();
        let abc = scene.create_entity((A(4), B(4), C(4))).unwrap();
        scene.set_component(ab, Disabled).unwrap();

        let mut filter = QueryFilter::new();
        filter.must_include::<A>();
        let mut seen = Vec::new();
        let visited = scene.query::<(A,), _>(&filter, |entity: EntityId, _: &mut A| {
            seen.push(entity)
        });
        seen.sort();
        assert_eq!(seen, vec![a, abc]);
        assert_eq!(visited, 2);

        filter.set_exclude_disabled(false);
        let visited = scene.query::<(A,), _>(&filter, |_: EntityId, _: &mut A| {});
        assert_eq!(visited, 3);
    }

    #[test]
    fn for_each_match_honours_masks() {
        let mut scene = scene_with_abc();
        let (b, c) = (id_of::<B>(&scene), id_of::<C>(&scene));
        scene.create_entity((A(1), B(1))).unwrap();
        scene.create_entity((A(2), C(2))).unwrap();
        scene.create_entity((A(3), B(3), C(3))).unwrap();

        let mut total = 0;
        let visited = scene.for_each_match::<(A,), _>(
            Archetype::single(c),
            Archetype::single(b),
            |_: EntityId, a: &mut A| total += a.0,
        );
        assert_eq!((visited, total), (1, 1));

        let visited = scene.for_each_match::<(C, A), _>(
            Archetype::EMPTY,
            Archetype::EMPTY,
            |_: EntityId, c: &mut C, a: &mut A| c.0 += a.0,
        );
        assert_eq!(visited, 2);
    }

    #[test]
    fn remove_hook_sees_siblings_before_migration() {
        let log: Log = Rc::default();
        let mut scene = EcsScene::new();
        scene.register_component::<A>().unwrap();
        let sink = Rc::clone(&log);
        scene
            .register_component_with(ComponentHooks::<B>::new().on_remove(
                move |ctx: &HookContext<'_>, b: &mut B| {
                    let a = ctx.get::<A>().map(|a| a.0);
                    sink.borrow_mut().push(format!("remove B({}) with A={:?}", b.0, a));
                },
            ))
            .unwrap();

        let e = scene.create_entity((A(7), B(8))).unwrap();
        scene.remove_component::<B>(e).unwrap();
        assert_eq!(*log.borrow(), vec!["remove B(8) with A=Some(7)".to_string()]);
        assert_eq!(scene.get_component::<A>(e), Some(&A(7)));
    }

    #[test]
    fn add_hooks_fire_on_create_and_migration_only() {
        let log: Log = Rc::default();
        let mut scene = EcsScene::new();
        let sink = Rc::clone(&log);
        scene
            .register_component_with(ComponentHooks::<A>::new().on_add(
                move |ctx: &HookContext<'_>, a: &mut A| {
                    sink.borrow_mut().push(format!("add A({}) to {}", a.0, ctx.entity()));
                    a.0 += 100;
                },
            ))
            .unwrap();
        scene.register_component::<B>().unwrap();

        let e = scene.create_entity((A(1),)).unwrap();
        assert_eq!(scene.get_component::<A>(e), Some(&A(101)));

        // Overwrite: no hook.
        scene.set_component(e, A(2)).unwrap();
        assert_eq!(scene.get_component::<A>(e), Some(&A(2)));

        let f = crate::spawn!(scene, B(1)).unwrap();
        scene.set_component(f, A(3)).unwrap();
        assert_eq!(scene.get_component::<A>(f), Some(&A(103)));
        assert_eq!(
            *log.borrow(),
            vec![format!("add A(1) to {e}"), format!("add A(3) to {f}")]
        );
    }

    #[test]
    fn remove_entity_runs_remove_hooks_for_every_component() {
        let log: Log = Rc::default();
        let mut scene = EcsScene::new();
        let (la, lb) = (Rc::clone(&log), Rc::clone(&log));
        scene
            .register_component_with(
                ComponentHooks::<A>::new()
                    .on_remove(move |_: &HookContext<'_>, a: &mut A| la.borrow_mut().push(format!("A{}", a.0))),
            )
            .unwrap();
        scene
            .register_component_with(
                ComponentHooks::<B>::new()
                    .on_remove(move |_: &HookContext<'_>, b: &mut B| lb.borrow_mut().push(format!("B{}", b.0))),
            )
            .unwrap();

        let e = scene.create_entity((A(1), B(2))).unwrap();
        let keep = scene.create_entity((A(3), B(4))).unwrap();
        scene.remove_entity(e).unwrap();

        assert_eq!(*log.borrow(), vec!["A1".to_string(), "B2".to_string()]);
        assert!(!scene.contains(e));
        assert_eq!(scene.get_component::<B>(keep), Some(&B(4)));
        assert!(matches!(
            scene.remove_entity(e),
            Err(SceneError::EntityNotFound { .. })
        ));
    }

    #[test]
    fn post_frame_drains_removals_then_sets_then_entities() {
        let log: Log = Rc::default();
        let mut scene = EcsScene::new();
        let (la, lb, lc) = (Rc::clone(&log), Rc::clone(&log), Rc::clone(&log));
        scene
            .register_component_with(
                ComponentHooks::<A>::new()
                    .on_remove(move |_: &HookContext<'_>, _: &mut A| la.borrow_mut().push("remove A".into())),
            )
            .unwrap();
        scene
            .register_component_with(
                ComponentHooks::<B>::new()
                    .on_remove(move |_: &HookContext<'_>, _: &mut B| lb.borrow_mut().push("remove B".into())),
            )
            .unwrap();
        scene
            .register_component_with(
                ComponentHooks::<C>::new()
                    .on_add(move |_: &HookContext<'_>, _: &mut C| lc.borrow_mut().push("add C".into())),
            )
            .unwrap();

        let e = scene.create_entity((A(1), B(2))).unwrap();
        scene.remove_entity_after_frame(e);
        scene.set_component_after_frame(e, C(3));
        scene.remove_component_after_frame::<A>(e);
        assert_eq!(scene.pending_post_frame().len(), 3);
        assert!(log.borrow().is_empty());

        scene.update().unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["remove A".to_string(), "add C".to_string(), "remove B".to_string()]
        );
        assert!(!scene.contains(e));
        assert!(scene.pending_post_frame().is_empty());
    }

    #[test]
    fn deferred_ops_on_removed_entities_are_skipped() {
        let mut scene = scene_with_abc();
        let e = scene.create_entity((A(1), B(1))).unwrap();
        scene.remove_component_after_frame::<B>(e);
        scene.set_component_after_frame(e, C(1));
        scene.remove_entity_after_frame(e);
        scene.remove_entity(e).unwrap();

        assert_eq!(scene.apply_post_frame().unwrap(), 0);
    }

    #[test]
    fn query_system_defers_structural_changes() {
        let mut scene = scene_with_abc();
        let doomed = scene.create_entity((A(0),)).unwrap();
        let grown = scene.create_entity((A(1),)).unwrap();

        scene.add_system(QuerySystem::<(A,)>::new(
            "sort",
            |queue: &mut PostFrameQueue, entity: EntityId, a: &mut A| {
                if a.0 == 0 {
                    queue.remove_entity(entity);
                } else {
                    queue.set_component(entity, B(a.0));
                }
            },
        ));
        scene.update().unwrap();

        assert!(!scene.contains(doomed));
        assert_eq!(scene.get_component::<B>(grown), Some(&B(1)));
        assert_eq!(scene.system_names().collect::<Vec<_>>(), vec!["sort"]);
        if crate::metrics::enabled() {
            assert_eq!(scene.profiler().timing("sort").map(|t| t.calls), Some(1));
        }
    }

    #[test]
    fn query_system_filter_excludes_types() {
        let mut scene = scene_with_abc();
        scene.create_entity((A(1),)).unwrap();
        scene.create_entity((A(2), C(0))).unwrap();
        let e = scene.create_entity((A(3), B(0))).unwrap();
        scene.set_component(e, Disabled).unwrap();

        let sum = Rc::new(RefCell::new(0));
        let total = Rc::clone(&sum);
        scene.add_system(
            QuerySystem::<(A,)>::new("sum", move |_: &mut PostFrameQueue, _: EntityId, a: &mut A| {
                *total.borrow_mut() += a.0;
            })
            .must_exclude::<C>(),
        );
        scene.update().unwrap();
        assert_eq!(*sum.borrow(), 1);
    }

    #[test]
    fn failing_system_stops_update_and_keeps_systems() {
        let mut scene = scene_with_abc();
        let e = scene.create_entity((A(1),)).unwrap();
        scene.add_system(FnSystem::new("remove-a", move |scene: &mut EcsScene| {
            scene.remove_component::<A>(e)
        }));

        assert!(matches!(scene.update(), Err(SceneError::LastComponent { .. })));
        assert_eq!(scene.frame(), 0);
        assert_eq!(scene.system_names().count(), 1);
    }

    #[test]
    fn tables_persist_and_grow() {
        let config = SceneConfig {
            initial_set_capacity: 2,
            ..SceneConfig::default()
        };
        let mut scene = EcsScene::with_config(config).unwrap();
        scene.register_component::<A>().unwrap();
        let ids: Vec<EntityId> = (0..5).map(|i| scene.create_entity((A(i),)).unwrap()).collect();
        for (i, &id) in ids.iter().enumerate() {
            assert_eq!(scene.get_component::<A>(id), Some(&A(i as u32)));
        }
        for &id in &ids {
            scene.remove_entity(id).unwrap();
        }

        let archetype = Archetype::single(id_of::<A>(&scene));
        let set = scene.entity_set(archetype).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.capacity(), 8);
        assert_eq!(scene.entity_sets().len(), 1);
        if crate::metrics::enabled() {
            assert_eq!(scene.counters().get("set_growths"), 2);
            assert_eq!(scene.counters().get("entity_sets_created"), 1);
        }
        assert!(scene.pool_stats().returned >= 2);
    }

    #[test]
    fn late_remove_hook_applies_to_existing_tables() {
        let mut scene = scene_with_abc();
        let e = scene.create_entity((A(1), B(2))).unwrap();
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        scene
            .registry_mut()
            .set_on_remove::<B>(Some(Box::new(move |_: &HookContext<'_>, b: &mut B| {
                *sink.borrow_mut() = Some(b.0);
            })))
            .unwrap();

        scene.remove_entity(e).unwrap();
        assert_eq!(*seen.borrow(), Some(2));
    }

    #[test]
    fn repeated_deferred_removals_do_not_block_the_drain() {
        let mut scene = scene_with_abc();
        let e = scene.create_entity((A(1), B(2))).unwrap();
        let doomed = scene.create_entity((A(3),)).unwrap();

        // Two callbacks asking for the same removal cannot see each other.
        scene.remove_component_after_frame::<B>(e);
        scene.remove_component_after_frame::<B>(e);
        scene.remove_entity_after_frame(doomed);

        scene.update().unwrap();
        assert!(!scene.has_component::<B>(e));
        assert_eq!(scene.get_component::<A>(e), Some(&A(1)));
        assert!(!scene.contains(doomed));
        assert!(scene.pending_post_frame().is_empty());
        assert_eq!(scene.frame(), 1);
    }

    #[test]
    fn failed_deferred_op_still_drains_the_rest() {
        let mut scene = scene_with_abc();
        let e = scene.create_entity((A(1),)).unwrap();
        let other = scene.create_entity((B(1),)).unwrap();
        let grown = scene.create_entity((C(1),)).unwrap();

        scene.remove_component_after_frame::<A>(e);
        scene.set_component_after_frame(grown, A(7));
        scene.remove_entity_after_frame(other);

        assert!(matches!(
            scene.apply_post_frame(),
            Err(SceneError::LastComponent { .. })
        ));
        assert!(scene.contains(e));
        assert_eq!(scene.get_component::<A>(grown), Some(&A(7)));
        assert!(!scene.contains(other));
        assert!(scene.pending_post_frame().is_empty());
    }

    #[test]
    fn remove_hook_waits_for_room_in_destination() {
        let fired = Rc::new(RefCell::new(0));
        let config = SceneConfig {
            initial_set_capacity: 1,
            max_set_capacity: 1,
            ..SceneConfig::default()
        };
        let mut scene = EcsScene::with_config(config).unwrap();
        scene.register_component::<A>().unwrap();
        let sink = Rc::clone(&fired);
        scene
            .register_component_with(
                ComponentHooks::<B>::new()
                    .on_remove(move |_: &HookContext<'_>, _: &mut B| *sink.borrow_mut() += 1),
            )
            .unwrap();

        let filler = scene.create_entity((A(0),)).unwrap();
        let e = scene.create_entity((A(1), B(2))).unwrap();

        assert!(matches!(
            scene.remove_component::<B>(e),
            Err(SceneError::Storage(StorageError::CapacityExceeded { max: 1, .. }))
        ));
        assert_eq!(*fired.borrow(), 0);
        assert_eq!(scene.get_component::<B>(e), Some(&B(2)));

        scene.remove_entity(filler).unwrap();
        scene.remove_component::<B>(e).unwrap();
        assert_eq!(*fired.borrow(), 1);
        assert!(!scene.has_component::<B>(e));
    }

    #[test]
    fn migration_does_not_fire_remove_hooks() {
        let fired = Rc::new(RefCell::new(0));
        let mut scene = EcsScene::new();
        let sink = Rc::clone(&fired);
        scene
            .register_component_with(
                ComponentHooks::<A>::new()
                    .on_remove(move |_: &HookContext<'_>, _: &mut A| *sink.borrow_mut() += 1),
            )
            .unwrap();
        scene.register_component::<B>().unwrap();
        scene.register_component::<C>().unwrap();

        let e = scene.create_entity((A(1), B(2))).unwrap();
        scene.set_component(e, C(3)).unwrap();
        scene.remove_component::<B>(e).unwrap();
        assert_eq!(*fired.borrow(), 0);
        assert_eq!(scene.get_component::<A>(e), Some(&A(1)));

        scene.remove_entity(e).unwrap();
        assert_eq!(*fired.borrow(), 1);
    }

    #[test]
    fn set_systems_from_a_running_system_replaces_the_list() {
        let mut scene = scene_with_abc();
        scene.add_system(FnSystem::new("bootstrap", |scene: &mut EcsScene| {
            let steady: Box<dyn System> = Box::new(FnSystem::new("steady", |_: &mut EcsScene| Ok(())));
            scene.set_systems(vec![steady]);
            Ok(())
        }));
        scene.add_system(FnSystem::new("second", |_: &mut EcsScene| Ok(())));

        scene.update().unwrap();
        assert_eq!(scene.system_names().collect::<Vec<_>>(), vec!["steady"]);
        scene.update().unwrap();
        assert_eq!(scene.system_names().collect::<Vec<_>>(), vec!["steady"]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SceneConfig {
            initial_set_capacity: 0,
            ..SceneConfig::default()
        };
        assert!(matches!(
            EcsScene::with_config(config),
            Err(SceneError::Config(_))
        ));
    }
}
