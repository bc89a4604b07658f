// query.rs - Component sets iterated by parallel tasks
//
// A component set resolves to one typed base pointer per column for a given
// chunk. Slices of the same task own disjoint row ranges, so handing out
// `&mut` references per row is sound as long as no component type appears
// twice in a set.

use crate::ecs::{Archetype, Component};
use std::any::TypeId;
use std::ptr::NonNull;

/// Base pointer of one chunk of one column.
pub struct ColumnPtr<T>(NonNull<T>);

impl<T> Clone for ColumnPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ColumnPtr<T> {}

// Components are Send + Sync; the pointer is only dereferenced for rows the
// owning slice was given exclusively.
unsafe impl<T: Send + Sync> Send for ColumnPtr<T> {}
unsafe impl<T: Send + Sync> Sync for ColumnPtr<T> {}

impl<T> ColumnPtr<T> {
    /// # Safety
    /// `index` must be a live row of the chunk, not accessed by anyone else
    /// for the lifetime `'a`.
    #[inline]
    pub(crate) unsafe fn row<'a>(self, index: usize) -> &'a mut T {
        unsafe { &mut *self.0.as_ptr().add(index) }
    }
}

/// Tuple of component types a parallel task reads and writes.
pub trait ComponentSet: 'static {
    type Columns: Copy + Send + Sync + 'static;
    type Refs<'a>;

    fn type_ids() -> Vec<TypeId>;

    /// Panics if a component type is listed twice.
    fn assert_unique() {
        let mut ids = Self::type_ids();
        let total = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(
            ids.len(),
            total,
            "component set {} lists a component twice",
            std::any::type_name::<Self>()
        );
    }

    fn matches(archetype: &Archetype) -> bool {
        Self::type_ids().into_iter().all(|t| archetype.has_type_id(t))
    }

    fn columns(archetype: &mut Archetype, chunk: usize) -> Self::Columns;

    /// # Safety
    /// Same contract as [`ColumnPtr::row`] for every column.
    unsafe fn fetch<'a>(columns: Self::Columns, index: usize) -> Self::Refs<'a>;
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            type Columns = ($(ColumnPtr<$name>,)+);
            type Refs<'a> = ($(&'a mut $name,)+);

            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$name>()),+]
            }

            fn columns(archetype: &mut Archetype, chunk: usize) -> Self::Columns {
                ($(ColumnPtr(archetype.chunk_ptr_of::<$name>(chunk)),)+)
            }

            #[allow(non_snake_case)]
            unsafe fn fetch<'a>(columns: Self::Columns, index: usize) -> Self::Refs<'a> {
                let ($($name,)+) = columns;
                unsafe { ($($name.row(index),)+) }
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;
    use crate::ecs::World;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Mass(f32);
    define_component!(Mass, 1, "Mass", copy);

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Charge(f32);
    define_component!(Charge, 2, "Charge", copy);

    #[test]
    fn fetch_reaches_each_row() {
        let mut world = World::default();
        let a = world.spawn((Mass(1.0), Charge(-1.0)));
        let b = world.spawn((Mass(2.0), Charge(1.0)));

        let archetype = world.archetypes_mut().get_by_id_mut(a.archetype_id());
        assert!(<(Mass, Charge)>::matches(archetype));
        let columns = <(Charge, Mass)>::columns(archetype, 0);
        for row in 0..2 {
            let (charge, mass) = unsafe { <(Charge, Mass)>::fetch(columns, row) };
            mass.0 *= 10.0;
            charge.0 = -charge.0;
        }

        assert_eq!(world.get_component::<Mass>(b), Some(&Mass(20.0)));
        assert_eq!(world.get_component::<Charge>(a), Some(&Charge(1.0)));
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn duplicate_component_panics() {
        <(Mass, Charge, Mass)>::assert_unique();
    }
}
