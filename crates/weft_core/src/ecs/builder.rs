use crate::ecs::{Component, ComponentId, TypeRegistry};
use crate::pool::ErasedValue;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityBuilderError {
    #[error("component id {component_id} is not registered")]
    ComponentNotRegistered { component_id: ComponentId },
    #[error(
        "component id {component_id} expects stride {expected} bytes but received {actual} bytes"
    )]
    StrideMismatch {
        component_id: ComponentId,
        expected: usize,
        actual: usize,
    },
    #[error("component id {component_id} ('{name}') is a Rust type and cannot be built from bytes")]
    NotRawType { component_id: ComponentId, name: String },
}

type MakeValue = Box<dyn FnOnce(&TypeRegistry) -> ErasedValue + Send>;

enum Pending {
    Typed(MakeValue),
    Raw(Vec<u8>),
}

/// Builder for entities whose component set is only known at run time.
///
/// Adding the same component id twice keeps the last value.
#[derive(Default)]
pub struct EntityBuilder {
    components: BTreeMap<ComponentId, Pending>,
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a Rust-typed component by value.
    pub fn with<T: Component>(mut self, value: T) -> Self {
        let make: MakeValue = Box::new(move |registry| ErasedValue::new(registry.register::<T>(), value));
        self.components.insert(T::ID, Pending::Typed(make));
        self
    }

    /// Add a raw component by its bytes. The id must name a raw component
    /// in the registry the builder is spawned into; that is checked when the
    /// entity is built.
    pub fn with_raw_bytes(mut self, component_id: ComponentId, bytes: Vec<u8>) -> Self {
        self.components.insert(component_id, Pending::Raw(bytes));
        self
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Resolve every pending component against `registry`.
    pub fn build(self, registry: &TypeRegistry) -> Result<Vec<ErasedValue>, EntityBuilderError> {
        // Validate raw payloads before constructing anything.
        for (&component_id, pending) in &self.components {
            let Pending::Raw(bytes) = pending else {
                continue;
            };
            let descriptor = registry
                .get(component_id)
                .ok_or(EntityBuilderError::ComponentNotRegistered { component_id })?;
            if !descriptor.is_raw() {
                return Err(EntityBuilderError::NotRawType {
                    component_id,
                    name: descriptor.name().to_string(),
                });
            }
            if bytes.len() != descriptor.size() {
                return Err(EntityBuilderError::StrideMismatch {
                    component_id,
                    expected: descriptor.size(),
                    actual: bytes.len(),
                });
            }
        }

        let mut values = Vec::with_capacity(self.components.len());
        for (component_id, pending) in self.components {
            match pending {
                Pending::Typed(make) => values.push(make(registry)),
                Pending::Raw(bytes) => {
                    let descriptor = registry
                        .get(component_id)
                        .ok_or(EntityBuilderError::ComponentNotRegistered { component_id })?;
                    let actual = bytes.len();
                    let value = ErasedValue::from_bytes(descriptor.clone(), &bytes).ok_or(
                        EntityBuilderError::StrideMismatch {
                            component_id,
                            expected: descriptor.size(),
                            actual,
                        },
                    )?;
                    values.push(value);
                }
            }
        }
        Ok(values)
    }
}
