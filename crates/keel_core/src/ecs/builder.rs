// builder.rs - Incremental entity construction

use crate::ecs::storage::{EntitySet, StorageError};
use crate::ecs::{Archetype, ArchetypeRegistry, Component, ComponentId, RegistryError, SceneError};
use std::any::{type_name, TypeId};
use std::fmt;

type WriteFn = Box<dyn FnOnce(&mut EntitySet, usize, ComponentId) -> Result<(), StorageError>>;

struct PendingComponent {
    type_id: TypeId,
    name: &'static str,
    write: WriteFn,
}

/// Collects component values for an entity of any shape.
///
/// Hand the builder to [`EcsScene::spawn`](crate::ecs::EcsScene::spawn);
/// the archetype is composed once and the entity lands directly in its
/// final table. Adding a type twice keeps the last value.
#[derive(Default)]
pub struct EntityBuilder {
    components: Vec<PendingComponent>,
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    pub fn with<T: Component>(mut self, value: T) -> Self {
        let type_id = TypeId::of::<T>();
        let write: WriteFn = Box::new(move |set: &mut EntitySet, row: usize, id: ComponentId| {
            set.write(row, id, value)
        });
        match self.components.iter_mut().find(|c| c.type_id == type_id) {
            Some(existing) => existing.write = write,
            None => self.components.push(PendingComponent {
                type_id,
                name: type_name::<T>(),
                write,
            }),
        }
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub(crate) fn archetype(&self, registry: &ArchetypeRegistry) -> Result<Archetype, SceneError> {
        let mut archetype = Archetype::EMPTY;
        for component in &self.components {
            archetype = archetype.union(resolve(registry, component)?.1);
        }
        Ok(archetype)
    }

    pub(crate) fn write_into(
        self,
        set: &mut EntitySet,
        row: usize,
        registry: &ArchetypeRegistry,
    ) -> Result<(), SceneError> {
        for component in self.components {
            let (id, _) = resolve(registry, &component)?;
            (component.write)(set, row, id)?;
        }
        Ok(())
    }
}

fn resolve(
    registry: &ArchetypeRegistry,
    component: &PendingComponent,
) -> Result<(ComponentId, Archetype), RegistryError> {
    registry
        .def_by_type(component.type_id)
        .map(|def| (def.id(), def.archetype()))
        .ok_or(RegistryError::Unregistered {
            name: component.name,
        })
}

impl fmt::Debug for EntityBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.components.iter().map(|c| c.name))
            .finish()
    }
}
