// registry.rs - Component type registration
//
// Registration is append-only: ids are handed out densely from 0 and can
// never be taken back. Every scene owns one registry.

use crate::ecs::storage::ComponentSet;
use crate::ecs::{
    Archetype, Component, ComponentDef, ComponentHooks, ComponentId, Hook, HookKind,
    MAX_COMPONENTS,
};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("component '{name}' is already registered")]
    DuplicateComponent { name: &'static str },

    #[error("cannot register '{name}': all {max} component ids are in use")]
    BudgetExceeded { name: &'static str, max: usize },

    #[error("component '{name}' is not registered")]
    Unregistered { name: &'static str },
}

/// Per-scene table of component definitions.
pub struct ArchetypeRegistry {
    defs: Vec<ComponentDef>,
    by_type: HashMap<TypeId, ComponentId>,
    add_hook_mask: Archetype,
    remove_hook_mask: Archetype,
}

impl ArchetypeRegistry {
    pub fn new() -> Self {
        Self {
            defs: Vec::new(),
            by_type: HashMap::new(),
            add_hook_mask: Archetype::EMPTY,
            remove_hook_mask: Archetype::EMPTY,
        }
    }

    /// Register `T` without hooks.
    pub fn register<T: Component>(&mut self) -> Result<ComponentId, RegistryError> {
        self.register_with::<T>(ComponentHooks::new())
    }

    /// Register `T` with add/remove hooks.
    pub fn register_with<T: Component>(
        &mut self,
        hooks: ComponentHooks<T>,
    ) -> Result<ComponentId, RegistryError> {
        let name = type_name::<T>();
        let type_id = TypeId::of::<T>();
        if self.by_type.contains_key(&type_id) {
            return Err(RegistryError::DuplicateComponent { name });
        }
        if self.defs.len() >= MAX_COMPONENTS {
            return Err(RegistryError::BudgetExceeded {
                name,
                max: MAX_COMPONENTS,
            });
        }

        let id = self.defs.len() as ComponentId;
        let flags = hooks.flags();
        let def = ComponentDef::new(
            id,
            name,
            type_id,
            Box::new(hooks),
            flags,
            ComponentSet::<T>::boxed,
        );
        self.defs.push(def);
        self.by_type.insert(type_id, id);
        self.refresh_masks(id);

        tracing::debug!(component = name, id, "registered component");
        Ok(id)
    }

    /// Replace (or clear, with `None`) the add hook of `T`.
    pub fn set_on_add<T: Component>(&mut self, hook: Option<Hook<T>>) -> Result<(), RegistryError> {
        self.set_hook::<T>(HookKind::Add, hook)
    }

    /// Replace (or clear, with `None`) the remove hook of `T`.
    ///
    /// Takes effect immediately for every entity set, including ones that
    /// already exist.
    pub fn set_on_remove<T: Component>(
        &mut self,
        hook: Option<Hook<T>>,
    ) -> Result<(), RegistryError> {
        self.set_hook::<T>(HookKind::Remove, hook)
    }

    fn set_hook<T: Component>(
        &mut self,
        kind: HookKind,
        hook: Option<Hook<T>>,
    ) -> Result<(), RegistryError> {
        let name = type_name::<T>();
        let id = self
            .id_of::<T>()
            .ok_or(RegistryError::Unregistered { name })?;
        let def = &mut self.defs[id as usize];
        let flags = match def.hooks_mut().downcast_mut::<ComponentHooks<T>>() {
            Some(hooks) => {
                hooks.set(kind, hook);
                hooks.flags()
            }
            None => unreachable!("hooks stored under the wrong component type"),
        };
        def.set_hook_flags(flags.0, flags.1);
        self.refresh_masks(id);
        Ok(())
    }

    fn refresh_masks(&mut self, id: ComponentId) {
        let def = &self.defs[id as usize];
        let bit = def.archetype();
        self.add_hook_mask = if def.has_on_add() {
            self.add_hook_mask.union(bit)
        } else {
            self.add_hook_mask.difference(bit)
        };
        self.remove_hook_mask = if def.has_on_remove() {
            self.remove_hook_mask.union(bit)
        } else {
            self.remove_hook_mask.difference(bit)
        };
    }

    pub fn get<T: Component>(&self) -> Option<&ComponentDef> {
        self.def_by_type(TypeId::of::<T>())
    }

    /// Definition of `T`, or `Unregistered`.
    pub fn def<T: Component>(&self) -> Result<&ComponentDef, RegistryError> {
        self.get::<T>().ok_or(RegistryError::Unregistered {
            name: type_name::<T>(),
        })
    }

    pub fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    pub fn archetype_of<T: Component>(&self) -> Option<Archetype> {
        self.get::<T>().map(ComponentDef::archetype)
    }

    pub fn def_by_id(&self, id: ComponentId) -> Option<&ComponentDef> {
        self.defs.get(id as usize)
    }

    pub fn def_by_type(&self, type_id: TypeId) -> Option<&ComponentDef> {
        self.by_type
            .get(&type_id)
            .and_then(|&id| self.defs.get(id as usize))
    }

    /// Components that currently have an add hook.
    pub fn add_hook_mask(&self) -> Archetype {
        self.add_hook_mask
    }

    /// Components that currently have a remove hook.
    pub fn remove_hook_mask(&self) -> Archetype {
        self.remove_hook_mask
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentDef> {
        self.defs.iter()
    }
}

impl Default for ArchetypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
