// bundle.rs - Typed component tuples for entity creation

use crate::ecs::{Archetype, Component, TypeDescriptor, TypeRegistry};
use std::any::TypeId;
use std::sync::Arc;

/// A statically typed set of component values, implemented for tuples of up
/// to eight components.
pub trait ComponentBundle: Send + 'static {
    /// Register every type of the bundle and return their descriptors in
    /// tuple order.
    fn register(registry: &TypeRegistry) -> Vec<Arc<TypeDescriptor>>;

    fn type_ids() -> Vec<TypeId>;

    /// Push each value into its column. The caller has checked the signature.
    fn push_into(self, archetype: &mut Archetype);
}

macro_rules! impl_bundle {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentBundle for ($($name,)+) {
            fn register(registry: &TypeRegistry) -> Vec<Arc<TypeDescriptor>> {
                vec![$(registry.register::<$name>()),+]
            }

            fn type_ids() -> Vec<TypeId> {
                vec![$(TypeId::of::<$name>()),+]
            }

            #[allow(non_snake_case)]
            fn push_into(self, archetype: &mut Archetype) {
                let ($($name,)+) = self;
                $(archetype.push_component($name);)+
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;

    #[derive(Clone, Copy)]
    struct A1(u8);
    define_component!(A1, 1, "A1", copy);

    #[derive(Clone, Copy)]
    struct B1(u16);
    define_component!(B1, 2, "B1", copy);

    #[test]
    fn registers_in_tuple_order() {
        let registry = TypeRegistry::new();
        let types = <(B1, A1)>::register(&registry);
        assert_eq!(types.len(), 2);
        assert!(types[0].is::<B1>());
        assert!(types[1].is::<A1>());
        assert_eq!(<(B1, A1)>::type_ids(), vec![TypeId::of::<B1>(), TypeId::of::<A1>()]);
        assert_eq!(registry.len(), 2);
    }
}
