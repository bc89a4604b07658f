// world.rs - Entity lifecycle and structural change
//
// The world owns the type registry and the archetype manager. Entity ids it
// hands out stay valid until the next structural change of their archetype;
// use `stable_reference` to follow an entity across moves.

use crate::config::{ConfigError, EngineConfig};
use crate::ecs::{
    Archetype, ArchetypeManager, Component, ComponentBundle, ComponentId, EntityBuilder, EntityBuilderError,
    EntityId, StableEntity, TypeDescriptor, TypeRegistry,
};
use crate::pool::ErasedValue;
use crate::task::{Task, TaskError};
use crate::work::WorkManager;
use std::sync::Arc;

pub struct World {
    registry: TypeRegistry,
    archetypes: ArchetypeManager,
    config: EngineConfig,
}

impl World {
    /// Create an empty world.
    ///
    /// Panics if `config` does not pass [`EngineConfig::validate`]; use
    /// [`try_new`](Self::try_new) for configuration read at run time.
    pub fn new(config: EngineConfig) -> Self {
        Self::try_new(config).unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = TypeRegistry::new();
        let archetypes = ArchetypeManager::new(
            registry.entity_descriptor().clone(),
            config.storage.clone(),
        );
        Ok(Self {
            registry,
            archetypes,
            config,
        })
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn register<T: Component>(&self) -> Arc<TypeDescriptor> {
        self.registry.register::<T>()
    }

    /// Register a plain-bytes component for use with [`EntityBuilder::with_raw_bytes`].
    pub fn register_raw(&self, component_id: ComponentId, name: &str, size: usize, align: usize) -> Arc<TypeDescriptor> {
        self.registry.register_raw(component_id, name, size, align)
    }

    pub fn archetypes(&self) -> &ArchetypeManager {
        &self.archetypes
    }

    pub fn archetypes_mut(&mut self) -> &mut ArchetypeManager {
        &mut self.archetypes
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Spawn an entity from a tuple of components.
    ///
    /// The same component set in any tuple order lands in the same archetype.
    pub fn spawn<B: ComponentBundle>(&mut self, bundle: B) -> EntityId {
        let mut signature = B::register(&self.registry);
        signature.sort_by_key(|d| d.id());
        assert!(
            signature.windows(2).all(|w| w[0].id() != w[1].id()),
            "component bundle lists a component twice"
        );
        self.archetypes.get_or_create(&signature).create(bundle)
    }

    /// Spawn an entity from a builder.
    pub fn spawn_built(&mut self, builder: EntityBuilder) -> Result<EntityId, EntityBuilderError> {
        let mut values = builder.build(&self.registry)?;
        values.sort_by_key(|v| v.descriptor().id());
        let signature: Vec<Arc<TypeDescriptor>> =
            values.iter().map(|v| v.descriptor().clone()).collect();
        Ok(self.archetypes.get_or_create(&signature).create_dynamic(values))
    }

    /// Spawn a copy of `entity` into the same archetype.
    ///
    /// Returns `None` if the id is null or its row no longer exists.
    pub fn clone_entity(&mut self, entity: EntityId) -> Option<EntityId> {
        if entity.is_null() {
            return None;
        }
        let archetype = self.archetypes.try_get_mut(entity.archetype_id())?;
        if !archetype.contains(entity) {
            return None;
        }
        Some(archetype.clone_row(entity))
    }

    /// Deep copy of every entity and component.
    ///
    /// Entity ids are equal in both worlds. Stable references keep tracking
    /// the original.
    pub fn snapshot(&self) -> World {
        World {
            registry: self.registry.snapshot(),
            archetypes: self.archetypes.snapshot(),
            config: self.config.clone(),
        }
    }

    /// Destroy an entity.
    ///
    /// Returns false if the id is null or its row no longer exists. Any other
    /// entity of the archetype may be renumbered.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        if entity.is_null() {
            return false;
        }
        self.archetypes
            .get_by_id_mut(entity.archetype_id())
            .destroy(entity)
    }

    /// Add a component, moving the entity to the archetype with the enlarged
    /// signature. Returns the entity's new id, or `None` when it already has
    /// a `T` (the value is dropped).
    pub fn add_component<T: Component>(&mut self, entity: EntityId, value: T) -> Option<EntityId> {
        let descriptor = self.registry.register::<T>();
        let source = self.archetypes.get_by_id(entity.archetype_id());
        if source.has_type(&descriptor) {
            return None;
        }

        let mut signature = source.component_types().to_vec();
        signature.push(descriptor.clone());
        signature.sort_by_key(|d| d.id());
        let target = self.archetypes.get_or_create(&signature).id();

        let (source, target) = self.archetypes.pair_mut(entity.archetype_id(), target);
        Some(source.move_row_to(target, entity, Some(ErasedValue::new(descriptor, value))))
    }

    /// Remove a component, moving the entity to the archetype without it.
    /// Returns the new id, or `None` when the entity has no `T`.
    pub fn remove_component<T: Component>(&mut self, entity: EntityId) -> Option<EntityId> {
        let descriptor = self.registry.descriptor_of::<T>()?;
        let source = self.archetypes.get_by_id(entity.archetype_id());
        if !source.has_type(&descriptor) {
            return None;
        }

        let signature: Vec<Arc<TypeDescriptor>> = source
            .component_types()
            .iter()
            .filter(|d| d.id() != descriptor.id())
            .cloned()
            .collect();
        let target = self.archetypes.get_or_create(&signature).id();

        let (source, target) = self.archetypes.pair_mut(entity.archetype_id(), target);
        Some(source.move_row_to(target, entity, None))
    }

    /// A reference that keeps tracking `entity` across structural changes.
    pub fn stable_reference(&mut self, entity: EntityId) -> StableEntity {
        self.archetypes
            .get_by_id_mut(entity.archetype_id())
            .track_stable(entity)
    }

    /// Get a component, or `None` if the entity is gone or lacks it.
    pub fn get_component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        self.archetypes
            .try_get(entity.archetype_id())?
            .try_component(entity)
    }

    pub fn get_component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        self.archetypes
            .try_get_mut(entity.archetype_id())?
            .try_component_mut(entity)
    }

    /// Overwrite a component in place, returning the previous value.
    pub fn set_component<T: Component>(&mut self, entity: EntityId, value: T) -> Option<T> {
        let slot = self.get_component_mut::<T>(entity)?;
        Some(std::mem::replace(slot, value))
    }

    pub fn has_component<T: Component>(&self, entity: EntityId) -> bool {
        self.get_component::<T>(entity).is_some()
    }

    /// Read a raw component as a plain-old-data value.
    ///
    /// Returns `None` if the tag is unknown, its size differs from `P`, or the
    /// entity does not carry it.
    pub fn get_raw_component<P: bytemuck::Pod>(&self, entity: EntityId, component_id: ComponentId) -> Option<P> {
        let (archetype, descriptor) = self.raw_target(entity, component_id, std::mem::size_of::<P>())?;
        let data = archetype.get_component_data(entity, &descriptor);
        // SAFETY: the slot holds `descriptor.size()` initialized bytes.
        let bytes = unsafe { std::slice::from_raw_parts(data, descriptor.size()) };
        Some(bytemuck::pod_read_unaligned(bytes))
    }

    /// Write a raw component from a plain-old-data value. Returns false under
    /// the same conditions in which [`get_raw_component`](Self::get_raw_component)
    /// returns `None`.
    pub fn set_raw_component<P: bytemuck::Pod>(&mut self, entity: EntityId, component_id: ComponentId, value: P) -> bool {
        let Some((_, descriptor)) = self.raw_target(entity, component_id, std::mem::size_of::<P>()) else {
            return false;
        };
        let bytes = bytemuck::bytes_of(&value);
        let archetype = self.archetypes.get_by_id_mut(entity.archetype_id());
        // SAFETY: raw descriptors are byte-copyable and the sizes match.
        unsafe { archetype.set_component_data(entity, &descriptor, bytes.as_ptr()) };
        true
    }

    fn raw_target(
        &self,
        entity: EntityId,
        component_id: ComponentId,
        size: usize,
    ) -> Option<(&Archetype, Arc<TypeDescriptor>)> {
        let descriptor = self.registry.get(component_id)?;
        if !descriptor.is_raw() || descriptor.size() != size {
            return None;
        }
        let archetype = self.archetypes.try_get(entity.archetype_id())?;
        if !archetype.contains(entity) || !archetype.has_type(&descriptor) {
            return None;
        }
        Some((archetype, descriptor))
    }

    /// Live entities across every archetype.
    pub fn entity_count(&self) -> usize {
        self.archetypes.entity_count()
    }

    /// Submit a task and its dependencies against this world's storage.
    pub fn run(&mut self, task: &Task, work: &WorkManager) -> Result<(), TaskError> {
        task.submit(&mut self.archetypes, work)
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Position(f32, f32);
    define_component!(Position, 1, "Position", copy);

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Velocity(f32, f32);
    define_component!(Velocity, 2, "Velocity", copy);

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Rotation(f32);
    define_component!(Rotation, 3, "Rotation", copy);

    #[derive(Clone, Debug, PartialEq)]
    struct Name(String);
    define_component!(Name, 4, "Name");

    fn world() -> World {
        let mut config = EngineConfig::default();
        config.storage.chunk_size = 4;
        World::new(config)
    }

    #[test]
    fn three_creates_make_two_archetypes() {
        let mut world = world();
        let a = world.spawn((Position(0.0, 0.0), Velocity(1.0, 0.0)));
        let b = world.spawn((Position(1.0, 0.0), Rotation(0.5), Velocity(1.0, 0.0)));
        let c = world.spawn((Velocity(2.0, 0.0), Position(2.0, 0.0), Rotation(0.25)));

        assert_eq!(world.archetypes().len(), 2);
        assert_eq!(b.archetype_id(), c.archetype_id());
        assert_ne!(a.archetype_id(), b.archetype_id());
        assert_eq!(world.archetypes().get_by_id(a.archetype_id()).len(), 1);
        assert_eq!(world.archetypes().get_by_id(b.archetype_id()).len(), 2);
        assert_eq!(world.entity_count(), 3);
        assert_eq!(world.get_component::<Rotation>(c), Some(&Rotation(0.25)));
    }

    #[test]
    fn add_component_moves_entity_and_keeps_stable_reference() {
        let mut world = world();
        let entity = world.spawn((Position(3.0, 4.0), Velocity(1.0, 1.0)));
        let stable = world.stable_reference(entity);

        let moved = world
            .add_component(entity, Rotation(1.5))
            .expect("entity had no rotation");
        assert_ne!(moved.archetype_id(), entity.archetype_id());
        assert_eq!(stable.id(), moved);
        assert_eq!(world.get_component::<Position>(moved), Some(&Position(3.0, 4.0)));
        assert_eq!(world.get_component::<Rotation>(moved), Some(&Rotation(1.5)));
        assert!(world.archetypes().get_by_id(entity.archetype_id()).is_empty());
    }

    #[test]
    fn add_existing_component_is_a_no_op() {
        let mut world = world();
        let entity = world.spawn((Position(0.0, 0.0),));
        assert_eq!(world.add_component(entity, Position(9.0, 9.0)), None);
        assert_eq!(world.get_component::<Position>(entity), Some(&Position(0.0, 0.0)));
    }

    #[test]
    fn remove_component_round_trip() {
        let mut world = world();
        let entity = world.spawn((Position(1.0, 1.0), Name("crate".into())));
        let stable = world.stable_reference(entity);

        let without = world.remove_component::<Name>(entity).expect("had a name");
        assert_eq!(stable.id(), without);
        assert!(!world.has_component::<Name>(without));
        assert!(world.has_component::<Position>(without));
        assert_eq!(world.remove_component::<Name>(without), None);
        assert_eq!(world.remove_component::<Rotation>(without), None);
    }

    #[test]
    fn despawn_is_idempotent_for_the_last_row() {
        let mut world = world();
        let entity = world.spawn((Position(0.0, 0.0),));
        let stable = world.stable_reference(entity);
        assert!(world.despawn(entity));
        assert!(!world.despawn(entity));
        assert!(!stable.is_alive());
        assert!(!world.despawn(EntityId::NULL));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn despawn_renumbers_swapped_entity() {
        let mut world = world();
        let first = world.spawn((Position(0.0, 0.0), Velocity(0.0, 0.0)));
        let second = world.spawn((Position(1.0, 0.0), Velocity(0.0, 0.0)));
        let third = world.spawn((Position(2.0, 0.0), Velocity(0.0, 0.0)));
        let third_ref = world.stable_reference(third);

        world.despawn(first);
        assert_eq!(third_ref.id(), first);
        assert_eq!(world.get_component::<Position>(first), Some(&Position(2.0, 0.0)));
        assert_eq!(world.get_component::<Position>(second), Some(&Position(1.0, 0.0)));
        assert!(world.get_component::<Position>(third).is_none());
    }

    #[test]
    fn builder_spawns_into_same_archetype_as_bundle() {
        let mut world = world();
        let typed = world.spawn((Velocity(0.0, 1.0), Position(1.0, 0.0)));
        let built = world
            .spawn_built(
                EntityBuilder::new()
                    .with(Position(5.0, 0.0))
                    .with(Velocity(0.0, 5.0)),
            )
            .expect("valid builder");
        assert_eq!(typed.archetype_id(), built.archetype_id());
        assert_eq!(world.get_component::<Velocity>(built), Some(&Velocity(0.0, 5.0)));
    }

    #[test]
    fn raw_components_read_and_write_as_pod() {
        let mut world = world();
        world.register_raw(50, "Health", 4, 4);
        let entity = world
            .spawn_built(
                EntityBuilder::new()
                    .with(Position(0.0, 0.0))
                    .with_raw_bytes(50, 75u32.to_ne_bytes().to_vec()),
            )
            .expect("valid builder");

        assert_eq!(world.get_raw_component::<u32>(entity, 50), Some(75));
        assert!(world.set_raw_component(entity, 50, 60u32));
        assert_eq!(world.get_raw_component::<u32>(entity, 50), Some(60));
        assert_eq!(world.get_raw_component::<u64>(entity, 50), None);
        assert_eq!(world.get_raw_component::<u32>(entity, 51), None);
    }

    #[test]
    fn set_component_returns_previous() {
        let mut world = world();
        let entity = world.spawn((Name("old".into()),));
        assert_eq!(world.set_component(entity, Name("new".into())), Some(Name("old".into())));
        assert_eq!(world.set_component(entity, Position(0.0, 0.0)), None);
    }

    #[test]
    fn columns_stay_consistent_under_churn() {
        let mut world = world();
        let mut ids = Vec::new();
        for i in 0..20 {
            ids.push(world.spawn((Position(i as f32, 0.0), Velocity(0.0, 0.0))));
        }
        for _ in 0..5 {
            let last = *ids.last().expect("ids");
            world.add_component(last, Rotation(0.0));
            ids.pop();
        }
        while ids.len() > 3 {
            let last = ids.pop().expect("ids");
            world.despawn(last);
        }
        for archetype in world.archetypes().archetypes() {
            assert!(archetype.columns_consistent());
        }
        assert_eq!(world.entity_count(), 8);
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn duplicate_bundle_types_panic() {
        let mut world = world();
        world.spawn((Position(0.0, 0.0), Position(1.0, 1.0)));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = EngineConfig::default();
        config.storage.chunk_size = 4094;
        assert!(matches!(World::try_new(config), Err(ConfigError::Invalid(_))));
        assert!(World::try_new(EngineConfig::default()).is_ok());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn new_panics_on_invalid_config() {
        let mut config = EngineConfig::default();
        config.storage.chunk_size = 0;
        let _ = World::new(config);
    }

    #[test]
    fn clone_entity_copies_components() {
        let mut world = world();
        let original = world.spawn((Position(1.0, 2.0), Name("crate".into())));
        let copy = world.clone_entity(original).expect("live entity");

        assert_eq!(copy.archetype_id(), original.archetype_id());
        assert_ne!(copy, original);
        assert_eq!(world.get_component::<Name>(copy), Some(&Name("crate".into())));
        world.set_component(copy, Position(9.0, 9.0));
        assert_eq!(world.get_component::<Position>(original), Some(&Position(1.0, 2.0)));

        world.despawn(copy);
        assert_eq!(world.clone_entity(copy), None);
        assert_eq!(world.clone_entity(EntityId::NULL), None);
    }

    #[test]
    fn snapshot_keeps_state_at_the_time_it_was_taken() {
        let mut world = world();
        let ids: Vec<_> = (0..6)
            .map(|i| world.spawn((Position(i as f32, 0.0), Name(format!("n{i}")))))
            .collect();
        let stable = world.stable_reference(ids[5]);

        let snapshot = world.snapshot();
        world.despawn(ids[0]);
        world.add_component(ids[1], Velocity(1.0, 0.0));

        assert_eq!(snapshot.entity_count(), 6);
        assert_eq!(snapshot.archetypes().len(), 1);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(snapshot.get_component::<Position>(*id), Some(&Position(i as f32, 0.0)));
        }
        // The live world's reference followed the swap; the snapshot's row did not move.
        assert_eq!(stable.id(), ids[0]);
        assert_eq!(snapshot.get_component::<Name>(ids[5]), Some(&Name("n5".into())));
        assert!(snapshot.registry().descriptor_of::<Name>().is_some());
        assert!(snapshot.registry().descriptor_of::<Velocity>().is_none());
    }

    mod churn {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Spawn { moving: bool },
            Despawn(usize),
            Duplicate(usize),
            AddName(usize),
            RemoveName(usize),
            AddRotation(usize),
            RemoveVelocity(usize),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                4 => any::<bool>().prop_map(|moving| Op::Spawn { moving }),
                2 => any::<usize>().prop_map(Op::Despawn),
                1 => any::<usize>().prop_map(Op::Duplicate),
                1 => any::<usize>().prop_map(Op::AddName),
                1 => any::<usize>().prop_map(Op::RemoveName),
                1 => any::<usize>().prop_map(Op::AddRotation),
                1 => any::<usize>().prop_map(Op::RemoveVelocity),
            ]
        }

        fn label(serial: f32) -> Name {
            Name(format!("e{serial}"))
        }

        proptest! {
            #[test]
            fn random_churn_keeps_columns_and_references_in_step(
                ops in prop::collection::vec(op(), 1..120),
            ) {
                let mut world = world();
                // Every entity carries Position(serial, 0) for its whole life.
                let mut live: Vec<(StableEntity, f32)> = Vec::new();
                let mut dead: Vec<StableEntity> = Vec::new();
                let mut next_serial = 0.0f32;

                for op in ops {
                    let len = live.len().max(1);
                    let pick = |i: usize| i % len;
                    match op {
                        Op::Spawn { moving } => {
                            let position = Position(next_serial, 0.0);
                            let entity = if moving {
                                world.spawn((position, Velocity(1.0, 0.0)))
                            } else {
                                world.spawn((position,))
                            };
                            live.push((world.stable_reference(entity), next_serial));
                            next_serial += 1.0;
                        }
                        _ if live.is_empty() => {}
                        Op::Despawn(i) => {
                            let (stable, _) = live.swap_remove(pick(i));
                            prop_assert!(world.despawn(stable.id()));
                            dead.push(stable);
                        }
                        Op::Duplicate(i) => {
                            let (stable, serial) = live[pick(i)].clone();
                            let copy = world.clone_entity(stable.id()).expect("live entity");
                            live.push((world.stable_reference(copy), serial));
                        }
                        Op::AddName(i) => {
                            let (stable, serial) = &live[pick(i)];
                            world.add_component(stable.id(), label(*serial));
                        }
                        Op::RemoveName(i) => {
                            world.remove_component::<Name>(live[pick(i)].0.id());
                        }
                        Op::AddRotation(i) => {
                            world.add_component(live[pick(i)].0.id(), Rotation(0.5));
                        }
                        Op::RemoveVelocity(i) => {
                            world.remove_component::<Velocity>(live[pick(i)].0.id());
                        }
                    }

                    for archetype in world.archetypes().archetypes() {
                        prop_assert!(archetype.columns_consistent());
                    }
                    prop_assert_eq!(world.entity_count(), live.len());
                    for (stable, serial) in &live {
                        let id = stable.id();
                        prop_assert!(stable.is_alive());
                        prop_assert_eq!(world.get_component::<Position>(id), Some(&Position(*serial, 0.0)));
                        if let Some(name) = world.get_component::<Name>(id) {
                            prop_assert_eq!(name, &label(*serial));
                        }
                    }
                    for stable in &dead {
                        prop_assert!(!stable.is_alive());
                    }
                }
            }
        }
    }
}
