// component.rs - Component trait and definition macro
//
// Components are identified by u32 tags chosen by their author, not by Rust
// TypeIds. The same tag space is shared with raw (run-time described)
// components registered through `TypeRegistry::register_raw`.

pub type ComponentId = u32;

/// Tag reserved for the entities column of every archetype.
pub const ENTITY_COMPONENT_ID: ComponentId = ComponentId::MAX;

/// Trait for Rust-defined components.
///
/// Implement it with [`define_component!`] rather than by hand.
pub trait Component: 'static + Sized + Send + Sync + Clone {
    /// Globally unique component tag.
    const ID: ComponentId;

    /// Human-readable name for debugging.
    const NAME: &'static str;

    /// Whether copies may be made with a plain byte copy.
    ///
    /// Only the `copy` arm of [`define_component!`] sets this, and it
    /// statically checks that the type is `Copy`.
    const TRIVIALLY_COPYABLE: bool = false;
}

/// Helper macro to implement the [`Component`] trait.
///
/// # Example
/// ```
/// use weft_core::define_component;
///
/// #[derive(Clone, Copy)]
/// struct Position { x: f32, y: f32 }
/// define_component!(Position, 1, "Position", copy);
///
/// #[derive(Clone)]
/// struct Name(String);
/// define_component!(Name, 2, "Name");
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty, $id:expr, $name:expr) => {
        impl $crate::ecs::Component for $ty {
            const ID: $crate::ecs::ComponentId = $id;
            const NAME: &'static str = $name;
        }
    };
    ($ty:ty, $id:expr, $name:expr, copy) => {
        impl $crate::ecs::Component for $ty {
            const ID: $crate::ecs::ComponentId = $id;
            const NAME: &'static str = $name;
            const TRIVIALLY_COPYABLE: bool = {
                const fn assert_copy<T: Copy>() {}
                assert_copy::<$ty>();
                true
            };
        }
    };
}
