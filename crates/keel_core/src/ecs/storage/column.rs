// column.rs - Typed component columns behind a type-erased interface

use super::StorageError;
use crate::ecs::{Component, ComponentHooks, ComponentId, HookContext, HookKind};
use crate::pool::ArrayPools;
use std::any::{type_name, Any, TypeId};

/// Object-safe view of a `ComponentSet<T>`.
///
/// An `EntitySet` stores its columns as `Box<dyn ComponentColumn>` and
/// downcasts back to `ComponentSet<T>` when the caller names `T`.
pub trait ComponentColumn: Any {
    fn component_id(&self) -> ComponentId;
    fn component_type(&self) -> TypeId;
    fn component_name(&self) -> &'static str;

    /// Number of rows written.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserved rows. Always at least `len()`.
    fn capacity(&self) -> usize;

    /// Rent a larger backing array and move the live prefix into it.
    fn grow(&mut self, capacity: usize, pools: &mut ArrayPools);

    /// Drop the value at `row`, moving the last value into its slot.
    fn swap_remove(&mut self, row: usize);

    /// Swap-remove the value at `row` and write it to `dst_row` of `dst`.
    ///
    /// Fails without touching either column if `dst` holds another type or
    /// `dst_row` is not writable.
    fn transfer(
        &mut self,
        row: usize,
        dst: &mut dyn ComponentColumn,
        dst_row: usize,
    ) -> Result<(), StorageError>;

    /// Run the add or remove hook stored in `hooks` (a `ComponentHooks<T>`)
    /// on the value at `row`.
    fn fire_hook(&mut self, kind: HookKind, row: usize, hooks: &dyn Any, ctx: &HookContext<'_>);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Dense, pooled array of one component type.
///
/// Row `i` belongs to whichever entity sits at row `i` of the owning
/// `EntitySet`.
pub struct ComponentSet<T> {
    id: ComponentId,
    values: Vec<T>,
    capacity: usize,
}

impl<T: Component> ComponentSet<T> {
    pub fn with_capacity(id: ComponentId, capacity: usize, pools: &mut ArrayPools) -> Self {
        Self {
            id,
            values: pools.rent(capacity),
            capacity,
        }
    }

    pub(crate) fn boxed(
        id: ComponentId,
        capacity: usize,
        pools: &mut ArrayPools,
    ) -> Box<dyn ComponentColumn> {
        Box::new(Self::with_capacity(id, capacity, pools))
    }

    #[inline]
    pub fn get(&self, row: usize) -> Option<&T> {
        self.values.get(row)
    }

    #[inline]
    pub fn get_mut(&mut self, row: usize) -> Option<&mut T> {
        self.values.get_mut(row)
    }

    /// Write `value` at `row`: overwrite a written row or append at the end.
    pub fn put(&mut self, row: usize, value: T) -> Result<(), StorageError> {
        let len = self.values.len();
        match row.cmp(&len) {
            std::cmp::Ordering::Less => {
                self.values[row] = value;
                Ok(())
            }
            std::cmp::Ordering::Equal => {
                self.values.push(value);
                Ok(())
            }
            std::cmp::Ordering::Greater => Err(StorageError::RowOutOfBounds { row, len }),
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }
}

impl<T: Component> ComponentColumn for ComponentSet<T> {
    fn component_id(&self) -> ComponentId {
        self.id
    }

    fn component_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn component_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn grow(&mut self, capacity: usize, pools: &mut ArrayPools) {
        if capacity <= self.capacity {
            return;
        }
        let mut next = pools.rent::<T>(capacity);
        next.append(&mut self.values);
        let old = std::mem::replace(&mut self.values, next);
        pools.give_back(old);
        self.capacity = capacity;
    }

    fn swap_remove(&mut self, row: usize) {
        if row < self.values.len() {
            self.values.swap_remove(row);
        }
    }

    fn transfer(
        &mut self,
        row: usize,
        dst: &mut dyn ComponentColumn,
        dst_row: usize,
    ) -> Result<(), StorageError> {
        let found = dst.component_name();
        let dst = dst
            .as_any_mut()
            .downcast_mut::<ComponentSet<T>>()
            .ok_or(StorageError::ColumnTypeMismatch {
                expected: type_name::<T>(),
                found,
            })?;
        if row >= self.values.len() {
            return Err(StorageError::RowOutOfBounds {
                row,
                len: self.values.len(),
            });
        }
        if dst_row > dst.values.len() {
            return Err(StorageError::RowOutOfBounds {
                row: dst_row,
                len: dst.values.len(),
            });
        }
        let value = self.values.swap_remove(row);
        dst.put(dst_row, value)
    }

    fn fire_hook(&mut self, kind: HookKind, row: usize, hooks: &dyn Any, ctx: &HookContext<'_>) {
        let Some(hook) = hooks
            .downcast_ref::<ComponentHooks<T>>()
            .and_then(|hooks| hooks.get(kind))
        else {
            return;
        };
        if let Some(value) = self.values.get_mut(row) {
            hook(ctx, value);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
