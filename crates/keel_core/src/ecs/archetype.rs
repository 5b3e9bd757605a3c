// archetype.rs - Component composition bitsets
//
// An archetype is the exact set of component types an entity holds.
// Two 64-bit words cover the 128 component ids a registry can issue, so
// every set operation is a couple of bitwise instructions.

use crate::ecs::{ComponentDef, ComponentId};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Hard ceiling on component types per registry.
pub const MAX_COMPONENTS: usize = 128;

/// Immutable bitset of component ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Archetype {
    low: u64,
    high: u64,
}

impl Archetype {
    /// The empty composition. Never valid for a live entity.
    pub const EMPTY: Archetype = Archetype { low: 0, high: 0 };

    pub const fn from_words(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    pub const fn words(self) -> (u64, u64) {
        (self.low, self.high)
    }

    /// Archetype holding exactly one component id.
    pub const fn single(id: ComponentId) -> Self {
        debug_assert!((id as usize) < MAX_COMPONENTS);
        if id < 64 {
            Self { low: 1 << id, high: 0 }
        } else {
            Self { low: 0, high: 1 << (id - 64) }
        }
    }

    pub fn add(self, def: &ComponentDef) -> Self {
        self.union(def.archetype())
    }

    pub fn remove(self, def: &ComponentDef) -> Self {
        self.difference(def.archetype())
    }

    pub const fn with(self, id: ComponentId) -> Self {
        self.union(Self::single(id))
    }

    pub const fn without(self, id: ComponentId) -> Self {
        self.difference(Self::single(id))
    }

    pub const fn includes(self, id: ComponentId) -> bool {
        if id as usize >= MAX_COMPONENTS {
            return false;
        }
        self.includes_any(Self::single(id))
    }

    /// True when every bit of `partial` is set here.
    pub const fn includes_all(self, partial: Archetype) -> bool {
        self.low & partial.low == partial.low && self.high & partial.high == partial.high
    }

    /// True when at least one bit of `partial` is set here.
    pub const fn includes_any(self, partial: Archetype) -> bool {
        self.low & partial.low != 0 || self.high & partial.high != 0
    }

    pub const fn union(self, other: Archetype) -> Self {
        Self {
            low: self.low | other.low,
            high: self.high | other.high,
        }
    }

    pub const fn difference(self, other: Archetype) -> Self {
        Self {
            low: self.low & !other.low,
            high: self.high & !other.high,
        }
    }

    /// N-ary union.
    pub fn combine<I>(parts: I) -> Self
    where
        I: IntoIterator<Item = Archetype>,
    {
        parts.into_iter().fold(Self::EMPTY, Self::union)
    }

    pub const fn is_empty(self) -> bool {
        self.low == 0 && self.high == 0
    }

    /// Number of component types in the composition.
    pub const fn len(self) -> usize {
        (self.low.count_ones() + self.high.count_ones()) as usize
    }

    /// Number of ids below `id` in this set.
    ///
    /// Entity sets keep their columns sorted by component id, so the rank
    /// of an included id is its column slot.
    pub const fn rank(self, id: ComponentId) -> usize {
        debug_assert!((id as usize) < MAX_COMPONENTS);
        if id < 64 {
            (self.low & ((1u64 << id) - 1)).count_ones() as usize
        } else {
            let high_mask = (1u64 << (id - 64)) - 1;
            (self.low.count_ones() + (self.high & high_mask).count_ones()) as usize
        }
    }

    /// Included ids in ascending order.
    pub fn ids(self) -> ArchetypeIds {
        ArchetypeIds {
            words: [self.low, self.high],
            word: 0,
        }
    }
}

/// Iterator over the ids of an [`Archetype`].
pub struct ArchetypeIds {
    words: [u64; 2],
    word: usize,
}

impl Iterator for ArchetypeIds {
    type Item = ComponentId;

    fn next(&mut self) -> Option<ComponentId> {
        while self.word < self.words.len() {
            let bits = self.words[self.word];
            if bits != 0 {
                let tz = bits.trailing_zeros();
                self.words[self.word] = bits & (bits - 1);
                return Some(self.word as ComponentId * 64 + tz);
            }
            self.word += 1;
        }
        None
    }
}

impl FromIterator<ComponentId> for Archetype {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl BitOr for Archetype {
    type Output = Archetype;

    fn bitor(self, rhs: Archetype) -> Archetype {
        self.union(rhs)
    }
}

impl BitOrAssign for Archetype {
    fn bitor_assign(&mut self, rhs: Archetype) {
        *self = self.union(rhs);
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Archetype{}", self)
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, id) in self.ids().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{id}")?;
        }
        f.write_str("}")
    }
}
