// component.rs - Component types and their per-registry definitions
//
// Components are plain Rust values. A registry assigns each type a dense
// id in [0, 128) when it is registered; the id doubles as the type's bit
// in every Archetype.

use crate::ecs::storage::ComponentColumn;
use crate::ecs::Archetype;
use crate::pool::ArrayPools;
use std::any::{Any, TypeId};
use std::fmt;

pub type ComponentId = u32;

/// Marker for types that can be stored as components.
///
/// Any `'static` type qualifies; there is nothing to derive.
pub trait Component: 'static {}

impl<T: 'static> Component for T {}

/// Built-in marker component registered by every scene.
///
/// Query systems skip entities carrying it unless told otherwise, which
/// gives a pause/soft-delete switch without removing the entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Disabled;

pub(crate) type ColumnFactory = fn(ComponentId, usize, &mut ArrayPools) -> Box<dyn ComponentColumn>;

/// Metadata for one registered component type.
pub struct ComponentDef {
    id: ComponentId,
    archetype: Archetype,
    name: &'static str,
    type_id: TypeId,
    hooks: Box<dyn Any>,
    has_on_add: bool,
    has_on_remove: bool,
    new_column: ColumnFactory,
}

impl ComponentDef {
    pub(crate) fn new(
        id: ComponentId,
        name: &'static str,
        type_id: TypeId,
        hooks: Box<dyn Any>,
        (has_on_add, has_on_remove): (bool, bool),
        new_column: ColumnFactory,
    ) -> Self {
        Self {
            id,
            archetype: Archetype::single(id),
            name,
            type_id,
            hooks,
            has_on_add,
            has_on_remove,
            new_column,
        }
    }

    #[inline]
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Singleton archetype containing only this component.
    #[inline]
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn has_on_add(&self) -> bool {
        self.has_on_add
    }

    pub fn has_on_remove(&self) -> bool {
        self.has_on_remove
    }

    /// Type-erased `ComponentHooks<T>` for this component.
    pub(crate) fn hooks(&self) -> &dyn Any {
        self.hooks.as_ref()
    }

    pub(crate) fn hooks_mut(&mut self) -> &mut dyn Any {
        self.hooks.as_mut()
    }

    pub(crate) fn set_hook_flags(&mut self, has_on_add: bool, has_on_remove: bool) {
        self.has_on_add = has_on_add;
        self.has_on_remove = has_on_remove;
    }

    pub(crate) fn new_column(&self, capacity: usize, pools: &mut ArrayPools) -> Box<dyn ComponentColumn> {
        (self.new_column)(self.id, capacity, pools)
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("on_add", &self.has_on_add)
            .field("on_remove", &self.has_on_remove)
            .finish()
    }
}
