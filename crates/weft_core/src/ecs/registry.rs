// registry.rs - Component tag to type descriptor mapping
//
// One registry is owned by each World. Descriptors are shared out as Arcs and
// never change after registration.

use crate::ecs::{Component, ComponentId, EntityId, TypeDescriptor, ENTITY_COMPONENT_ID};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct TypeRegistry {
    by_tag: RwLock<HashMap<ComponentId, Arc<TypeDescriptor>>>,
    entity: Arc<TypeDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            by_tag: RwLock::new(HashMap::new()),
            entity: Arc::new(TypeDescriptor::typed::<EntityId>(
                ENTITY_COMPONENT_ID,
                "EntityId",
                true,
            )),
        }
    }

    /// Register a Rust component type, returning its descriptor.
    ///
    /// Registering the same type twice returns the existing descriptor. Two
    /// different types claiming the same tag is a programming error.
    pub fn register<T: Component>(&self) -> Arc<TypeDescriptor> {
        if let Some(existing) = self.by_tag.read().get(&T::ID) {
            assert!(
                existing.is::<T>(),
                "component id {} already registered as '{}', cannot reuse it for '{}'",
                T::ID,
                existing.name(),
                T::NAME
            );
            return existing.clone();
        }

        assert_ne!(T::ID, ENTITY_COMPONENT_ID, "component id {} is reserved", T::ID);

        let mut map = self.by_tag.write();
        // Another thread may have won the race between the two locks.
        let descriptor = map
            .entry(T::ID)
            .or_insert_with(|| {
                tracing::debug!(component = T::NAME, id = T::ID, "registered component");
                Arc::new(TypeDescriptor::of::<T>())
            })
            .clone();
        assert!(
            descriptor.is::<T>(),
            "component id {} already registered as '{}'",
            T::ID,
            descriptor.name()
        );
        descriptor
    }

    /// Register a plain-bytes component described only at run time.
    ///
    /// Re-registering with the same layout returns the existing descriptor.
    pub fn register_raw(
        &self,
        component_id: ComponentId,
        name: &str,
        size: usize,
        align: usize,
    ) -> Arc<TypeDescriptor> {
        assert_ne!(
            component_id, ENTITY_COMPONENT_ID,
            "component id {component_id} is reserved"
        );

        let mut map = self.by_tag.write();
        if let Some(existing) = map.get(&component_id) {
            assert!(
                existing.is_raw() && existing.size() == size && existing.align() == align,
                "component id {component_id} already registered as '{}' with a different layout",
                existing.name()
            );
            return existing.clone();
        }

        let descriptor = Arc::new(TypeDescriptor::raw(component_id, name, size, align));
        map.insert(component_id, descriptor.clone());
        tracing::debug!(component = name, id = component_id, size, align, "registered raw component");
        descriptor
    }

    pub fn get(&self, component_id: ComponentId) -> Option<Arc<TypeDescriptor>> {
        if component_id == ENTITY_COMPONENT_ID {
            return Some(self.entity.clone());
        }
        self.by_tag.read().get(&component_id).cloned()
    }

    /// Descriptor for `T`, if `T` has been registered.
    pub fn descriptor_of<T: Component>(&self) -> Option<Arc<TypeDescriptor>> {
        self.by_tag
            .read()
            .get(&T::ID)
            .filter(|d| d.is::<T>())
            .cloned()
    }

    /// Descriptor of the identifier column every archetype carries.
    pub fn entity_descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.entity
    }

    /// Independent registry sharing the current descriptors.
    pub fn snapshot(&self) -> TypeRegistry {
        TypeRegistry {
            by_tag: RwLock::new(self.by_tag.read().clone()),
            entity: self.entity.clone(),
        }
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.by_tag.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
