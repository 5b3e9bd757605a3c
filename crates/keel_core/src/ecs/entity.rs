//! Entity identity
//!
//! Entities are opaque 64-bit ids with no data of their own. The
//! [`EntityRegistry`] is the single source of truth for which ids are
//! alive and which [`Archetype`] each one currently has.

use crate::ecs::Archetype;
use std::collections::HashMap;
use std::fmt;

/// Opaque, monotonically increasing entity handle.
///
/// Ids are never reused within one registry; `0` is never issued.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Maps live entity ids to their current archetype.
pub struct EntityRegistry {
    /// `None` once `u64::MAX` has been issued.
    next_id: Option<u64>,
    archetypes: HashMap<EntityId, Archetype>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Registry whose first issued id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next_id: Some(first.max(1)),
            archetypes: HashMap::new(),
        }
    }

    /// Issue a fresh id recorded with `archetype`.
    ///
    /// # Panics
    /// Panics once the 64-bit id space is exhausted, i.e. on the call after
    /// `u64::MAX` was issued; ids are never recycled.
    pub fn alloc(&mut self, archetype: Archetype) -> EntityId {
        debug_assert!(!archetype.is_empty(), "entities need at least one component");
        let Some(raw) = self.next_id else {
            panic!("entity id space exhausted after {}", u64::MAX);
        };
        let id = EntityId(raw);
        self.next_id = raw.checked_add(1);
        self.archetypes.insert(id, archetype);
        id
    }

    /// Forget `id`, returning the archetype it had.
    pub fn free(&mut self, id: EntityId) -> Option<Archetype> {
        self.archetypes.remove(&id)
    }

    pub fn archetype_of(&self, id: EntityId) -> Option<Archetype> {
        self.archetypes.get(&id).copied()
    }

    /// Record a migration. Returns false when `id` is not alive.
    pub fn set_archetype(&mut self, id: EntityId, archetype: Archetype) -> bool {
        debug_assert!(!archetype.is_empty());
        match self.archetypes.get_mut(&id) {
            Some(slot) => {
                *slot = archetype;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.archetypes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, Archetype)> + '_ {
        self.archetypes.iter().map(|(id, archetype)| (*id, *archetype))
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}
