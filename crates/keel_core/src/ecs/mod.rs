//! Entity Component System storage and query engine.
//!
//! Entities are grouped by their exact component composition
//! ([`Archetype`]). Each composition gets one [`EntitySet`] table with a
//! dense column per component type. Adding or removing a component moves
//! the entity's row to another table; queries visit whole tables whose
//! archetype matches and walk their columns in lockstep.
//!
//! Everything here is single-threaded and driven by [`EcsScene::update`].

mod archetype;
mod builder;
mod bundle;
mod component;
mod entity;
mod hooks;
mod macros;
mod post_frame;
mod query;
mod registry;
mod scene;
mod scene_error;
pub mod storage;
mod system;

pub use archetype::{Archetype, ArchetypeIds, MAX_COMPONENTS};
pub use builder::EntityBuilder;
pub use bundle::{Bundle, ComponentTuple};
pub use component::{Component, ComponentDef, ComponentId, Disabled};
pub use entity::{EntityId, EntityRegistry};
pub use hooks::{ComponentHooks, Hook, HookContext, HookKind};
pub use post_frame::PostFrameQueue;
pub use query::{Query, QueryFilter, QueryFn};
pub use registry::{ArchetypeRegistry, RegistryError};
pub use scene::EcsScene;
pub use scene_error::SceneError;
pub use storage::{ComponentColumn, ComponentSet, EntitySet, StorageError};
pub use system::{FnSystem, QuerySystem, System};
