// query.rs - Typed iteration over matching entity sets

use crate::ecs::storage::{ComponentColumn, ComponentSet, EntitySet};
use crate::ecs::{Archetype, ArchetypeRegistry, Component, Disabled, EntityId, PostFrameQueue};
use std::any::{type_name, TypeId};

/// A tuple of component types iterated together.
///
/// Implemented for tuples of one to five components.
pub trait Query: 'static {
    /// Borrowed column slices of one entity set.
    type Fetch<'a>;

    /// Required archetype, or `None` if a component is not registered (in
    /// which case nothing can match).
    fn archetype(registry: &ArchetypeRegistry) -> Option<Archetype>;

    /// Borrow the matching column slices of one entity set.
    fn fetch<'a>(columns: &'a mut [Box<dyn ComponentColumn>]) -> Option<Self::Fetch<'a>>;
}

/// Per-entity callback of a query over `Q`.
///
/// Implemented for closures taking the entity id followed by one `&mut`
/// per component of `Q`, in order. With `C = PostFrameQueue` the closure
/// takes the queue first.
pub trait QueryFn<C, Q: Query> {
    fn call_row(&mut self, ctx: &mut C, entity: EntityId, fetch: &mut Q::Fetch<'_>, row: usize);
}

macro_rules! impl_query {
    ($(($ty:ident, $var:ident)),+) => {
        impl<$($ty: Component),+> Query for ($($ty,)+) {
            type Fetch<'a> = ($(&'a mut [$ty],)+);

            fn archetype(registry: &ArchetypeRegistry) -> Option<Archetype> {
                let mut archetype = Archetype::EMPTY;
                $( archetype = archetype.union(registry.archetype_of::<$ty>()?); )+
                Some(archetype)
            }

            fn fetch<'a>(columns: &'a mut [Box<dyn ComponentColumn>]) -> Option<Self::Fetch<'a>> {
                $( let mut $var: Option<&'a mut [$ty]> = None; )+
                for column in columns.iter_mut() {
                    let ty = column.component_type();
                    $(
                        if ty == TypeId::of::<$ty>() {
                            $var = column
                                .as_any_mut()
                                .downcast_mut::<ComponentSet<$ty>>()
                                .map(ComponentSet::as_mut_slice);
                            continue;
                        }
                    )+
                }
                Some(($($var?,)+))
            }
        }

        impl<Func, $($ty: Component),+> QueryFn<(), ($($ty,)+)> for Func
        where
            Func: FnMut(EntityId, $(&mut $ty),+),
        {
            #[inline]
            fn call_row(
                &mut self,
                _: &mut (),
                entity: EntityId,
                fetch: &mut <($($ty,)+) as Query>::Fetch<'_>,
                row: usize,
            ) {
                let ($($var,)+) = fetch;
                (self)(entity, $(&mut $var[row]),+);
            }
        }

        impl<Func, $($ty: Component),+> QueryFn<PostFrameQueue, ($($ty,)+)> for Func
        where
            Func: FnMut(&mut PostFrameQueue, EntityId, $(&mut $ty),+),
        {
            #[inline]
            fn call_row(
                &mut self,
                queue: &mut PostFrameQueue,
                entity: EntityId,
                fetch: &mut <($($ty,)+) as Query>::Fetch<'_>,
                row: usize,
            ) {
                let ($($var,)+) = fetch;
                (self)(queue, entity, $(&mut $var[row]),+);
            }
        }
    };
}

impl_query!((A, a));
impl_query!((A, a), (B, b));
impl_query!((A, a), (B, b), (C, c));
impl_query!((A, a), (B, b), (C, c), (D, d));
impl_query!((A, a), (B, b), (C, c), (D, d), (E, e));

/// Include/exclude filter keyed by component type.
///
/// Types are resolved against the registry each time the filter runs, so
/// a filter can be built before its components are registered.
#[derive(Debug, Clone)]
pub struct QueryFilter {
    include: Vec<(TypeId, &'static str)>,
    exclude: Vec<(TypeId, &'static str)>,
    exclude_disabled: bool,
}

impl QueryFilter {
    /// Empty filter that skips `Disabled` entities.
    pub fn new() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            exclude_disabled: true,
        }
    }

    pub fn must_include<T: Component>(&mut self) -> &mut Self {
        push_unique::<T>(&mut self.include);
        self
    }

    pub fn must_exclude<T: Component>(&mut self) -> &mut Self {
        push_unique::<T>(&mut self.exclude);
        self
    }

    pub fn set_exclude_disabled(&mut self, exclude: bool) -> &mut Self {
        self.exclude_disabled = exclude;
        self
    }

    pub fn excludes_disabled(&self) -> bool {
        self.exclude_disabled
    }

    /// `(include, exclude)` masks for the current registry.
    ///
    /// `None` when an included type is unregistered. Unregistered excluded
    /// types are ignored since no entity can carry them.
    pub fn resolve(&self, registry: &ArchetypeRegistry) -> Option<(Archetype, Archetype)> {
        let mut include = Archetype::EMPTY;
        for (type_id, _) in &self.include {
            include = include.union(registry.def_by_type(*type_id)?.archetype());
        }
        let mut exclude: Archetype = self
            .exclude
            .iter()
            .filter_map(|(type_id, _)| registry.def_by_type(*type_id))
            .map(|def| def.id())
            .collect();
        if self.exclude_disabled {
            if let Some(disabled) = registry.archetype_of::<Disabled>() {
                exclude = exclude.union(disabled);
            }
        }
        Some((include, exclude))
    }
}

impl Default for QueryFilter {
    fn default() -> Self {
        Self::new()
    }
}

fn push_unique<T: Component>(list: &mut Vec<(TypeId, &'static str)>) {
    let type_id = TypeId::of::<T>();
    if !list.iter().any(|(id, _)| *id == type_id) {
        list.push((type_id, type_name::<T>()));
    }
}

/// Run `f` over every row of every non-empty set whose archetype
/// includes `include` and avoids `exclude`. Returns the rows visited.
pub(crate) fn run_query<Q, C, F>(
    sets: &mut [EntitySet],
    include: Archetype,
    exclude: Archetype,
    ctx: &mut C,
    f: &mut F,
) -> usize
where
    Q: Query,
    F: QueryFn<C, Q> + ?Sized,
{
    let mut visited = 0;
    for set in sets.iter_mut() {
        let archetype = set.archetype();
        if set.is_empty() || !archetype.includes_all(include) || archetype.includes_any(exclude) {
            continue;
        }
        let (entities, columns) = set.split_for_query();
        let Some(mut fetch) = Q::fetch(columns) else {
            continue;
        };
        for (row, &entity) in entities.iter().enumerate() {
            f.call_row(ctx, entity, &mut fetch, row);
        }
        visited += entities.len();
    }
    visited
}
