//! Structural changes requested while the scene is being iterated.
//!
//! Query callbacks cannot migrate or destroy entities in place because
//! that would move rows under the iterator. They record the intent here
//! instead, and `EcsScene::update` applies it once all systems have run:
//! component removals first, then component sets, then entity removals.

use crate::ecs::{Component, EcsScene, EntityId, SceneError};
use std::any::{type_name, TypeId};
use std::collections::HashSet;
use std::fmt;

pub(crate) type DeferredSet = Box<dyn FnOnce(&mut EcsScene) -> Result<(), SceneError>>;

pub(crate) struct DeferredRemoval {
    pub(crate) entity: EntityId,
    pub(crate) type_id: TypeId,
    pub(crate) name: &'static str,
}

/// Deferred mutations, applied in request order within each kind.
#[derive(Default)]
pub struct PostFrameQueue {
    remove_components: Vec<DeferredRemoval>,
    set_components: Vec<(EntityId, DeferredSet)>,
    remove_entities: Vec<EntityId>,
    removal_set: HashSet<EntityId>,
}

impl PostFrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Destroy `entity` after the frame. Repeated requests collapse.
    pub fn remove_entity(&mut self, entity: EntityId) {
        if self.removal_set.insert(entity) {
            self.remove_entities.push(entity);
        }
    }

    pub fn remove_component<T: Component>(&mut self, entity: EntityId) {
        self.remove_components.push(DeferredRemoval {
            entity,
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
        });
    }

    /// Set (add or overwrite) a component after the frame.
    pub fn set_component<T: Component>(&mut self, entity: EntityId, value: T) {
        self.set_components.push((
            entity,
            Box::new(move |scene: &mut EcsScene| scene.set_component(entity, value)),
        ));
    }

    pub fn is_removal_pending(&self, entity: EntityId) -> bool {
        self.removal_set.contains(&entity)
    }

    /// Total number of queued operations.
    pub fn len(&self) -> usize {
        self.remove_components.len() + self.set_components.len() + self.remove_entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.remove_components.clear();
        self.set_components.clear();
        self.remove_entities.clear();
        self.removal_set.clear();
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<DeferredRemoval>,
        Vec<(EntityId, DeferredSet)>,
        Vec<EntityId>,
    ) {
        (self.remove_components, self.set_components, self.remove_entities)
    }
}

impl fmt::Debug for PostFrameQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostFrameQueue")
            .field("remove_components", &self.remove_components.len())
            .field("set_components", &self.set_components.len())
            .field("remove_entities", &self.remove_entities)
            .finish()
    }
}
