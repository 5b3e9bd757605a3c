//! Archetype tables: one `EntitySet` per archetype, one column per
//! component type in it.

mod column;
mod entity_set;

pub use column::{ComponentColumn, ComponentSet};
pub use entity_set::EntitySet;

use crate::ecs::{Archetype, ComponentId, EntityId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("entity set {archetype} is full ({max} rows)")]
    CapacityExceeded { archetype: Archetype, max: usize },

    #[error("column holds '{found}' but '{expected}' was requested")]
    ColumnTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("entity set {archetype} has no column for component id {component}")]
    MissingColumn {
        component: ComponentId,
        archetype: Archetype,
    },

    #[error("component id {component} is not registered")]
    UnregisteredComponent { component: ComponentId },

    #[error("entity {entity} is not stored in entity set {archetype}")]
    UnknownEntity {
        entity: EntityId,
        archetype: Archetype,
    },

    #[error("row {row} is past the end of a column of length {len}")]
    RowOutOfBounds { row: usize, len: usize },
}
