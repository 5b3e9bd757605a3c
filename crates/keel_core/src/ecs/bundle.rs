//! Fixed sets of component types and values.
//!
//! `ComponentTuple` composes an archetype from a tuple of types;
//! `Bundle` additionally writes a tuple of values into a reserved row.
//! Both cover tuples of one to nine components.

use crate::ecs::storage::EntitySet;
use crate::ecs::{Archetype, ArchetypeRegistry, Component, RegistryError, SceneError};

pub trait ComponentTuple: 'static {
    /// Number of types in the tuple.
    const LEN: usize;

    fn archetype(registry: &ArchetypeRegistry) -> Result<Archetype, RegistryError>;
}

pub trait Bundle: ComponentTuple {
    /// Write every value into `row` of `set`.
    fn write_into(
        self,
        set: &mut EntitySet,
        row: usize,
        registry: &ArchetypeRegistry,
    ) -> Result<(), SceneError>;
}

macro_rules! count {
    () => { 0 };
    ($head:ident $($tail:ident)*) => { 1 + count!($($tail)*) };
}

macro_rules! impl_tuple {
    ($(($ty:ident, $idx:tt)),+) => {
        impl<$($ty: Component),+> ComponentTuple for ($($ty,)+) {
            const LEN: usize = count!($($ty)+);

            fn archetype(registry: &ArchetypeRegistry) -> Result<Archetype, RegistryError> {
                let mut archetype = Archetype::EMPTY;
                $( archetype = archetype.union(registry.def::<$ty>()?.archetype()); )+
                Ok(archetype)
            }
        }

        impl<$($ty: Component),+> Bundle for ($($ty,)+) {
            fn write_into(
                self,
                set: &mut EntitySet,
                row: usize,
                registry: &ArchetypeRegistry,
            ) -> Result<(), SceneError> {
                $( set.write(row, registry.def::<$ty>()?.id(), self.$idx)?; )+
                Ok(())
            }
        }
    };
}

impl_tuple!((A, 0));
impl_tuple!((A, 0), (B, 1));
impl_tuple!((A, 0), (B, 1), (C, 2));
impl_tuple!((A, 0), (B, 1), (C, 2), (D, 3));
impl_tuple!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_tuple!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_tuple!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_tuple!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));
impl_tuple!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7), (I, 8));
