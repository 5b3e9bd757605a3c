//! Add/remove callbacks attached to component types.
//!
//! Hooks run synchronously inside the structural operation that triggered
//! them. They get the affected value by `&mut` and a [`HookContext`] that
//! can read the other components of the same entity as they were at that
//! moment (before the row moves, for removals).

use crate::ecs::storage::{ComponentColumn, ComponentSet};
use crate::ecs::{Archetype, Component, EntityId};

/// Callback signature for component hooks.
pub type Hook<T> = Box<dyn Fn(&HookContext<'_>, &mut T)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Add,
    Remove,
}

/// Optional add/remove callbacks for component type `T`.
pub struct ComponentHooks<T> {
    on_add: Option<Hook<T>>,
    on_remove: Option<Hook<T>>,
}

impl<T: Component> ComponentHooks<T> {
    pub fn new() -> Self {
        Self {
            on_add: None,
            on_remove: None,
        }
    }

    pub fn on_add(mut self, hook: impl Fn(&HookContext<'_>, &mut T) + 'static) -> Self {
        self.on_add = Some(Box::new(hook));
        self
    }

    pub fn on_remove(mut self, hook: impl Fn(&HookContext<'_>, &mut T) + 'static) -> Self {
        self.on_remove = Some(Box::new(hook));
        self
    }

    pub(crate) fn set(&mut self, kind: HookKind, hook: Option<Hook<T>>) {
        match kind {
            HookKind::Add => self.on_add = hook,
            HookKind::Remove => self.on_remove = hook,
        }
    }

    pub(crate) fn get(&self, kind: HookKind) -> Option<&Hook<T>> {
        match kind {
            HookKind::Add => self.on_add.as_ref(),
            HookKind::Remove => self.on_remove.as_ref(),
        }
    }

    pub(crate) fn flags(&self) -> (bool, bool) {
        (self.on_add.is_some(), self.on_remove.is_some())
    }
}

impl<T: Component> Default for ComponentHooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a hook can see besides the value it was called for.
pub struct HookContext<'a> {
    entity: EntityId,
    archetype: Archetype,
    row: usize,
    before: &'a [Box<dyn ComponentColumn>],
    after: &'a [Box<dyn ComponentColumn>],
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        entity: EntityId,
        archetype: Archetype,
        row: usize,
        before: &'a [Box<dyn ComponentColumn>],
        after: &'a [Box<dyn ComponentColumn>],
    ) -> Self {
        Self {
            entity,
            archetype,
            row,
            before,
            after,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Archetype of the table the entity occupies while the hook runs.
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    /// Read a sibling component of the same entity.
    ///
    /// Returns `None` for the component the hook was invoked for, for
    /// types the entity does not have, and for a sibling column that has
    /// not been written yet.
    pub fn get<U: Component>(&self) -> Option<&'a U> {
        self.before
            .iter()
            .chain(self.after.iter())
            .find_map(|column| column.as_any().downcast_ref::<ComponentSet<U>>())
            .and_then(|set| set.get(self.row))
    }
}
