use crate::config::ConfigError;
use crate::ecs::storage::StorageError;
use crate::ecs::{EntityId, RegistryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("entity {entity} does not exist")]
    EntityNotFound { entity: EntityId },

    #[error("entity {entity} has no '{component}' component")]
    MissingComponent {
        entity: EntityId,
        component: &'static str,
    },

    #[error("removing '{component}' would leave entity {entity} with no components; remove the entity instead")]
    LastComponent {
        entity: EntityId,
        component: &'static str,
    },

    #[error("an entity must have at least one component")]
    EmptyArchetype,
}
