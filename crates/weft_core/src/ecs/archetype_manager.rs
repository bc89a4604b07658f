// archetype_manager.rs - Signature to archetype registry
//
// Exactly one archetype exists per distinct sorted set of descriptor ids.
// Archetypes are never removed, so slot indices stay valid for the
// manager's lifetime.

use crate::config::StorageConfig;
use crate::ecs::{Archetype, ArchetypeId, TypeDescriptor, TypeDescriptorId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

pub struct ArchetypeManager {
    archetypes: Vec<Archetype>,
    by_signature: BTreeMap<Vec<TypeDescriptorId>, usize>,
    by_id: HashMap<ArchetypeId, usize>,
    comp_index: HashMap<TypeDescriptorId, Vec<usize>>,
    entity_descriptor: Arc<TypeDescriptor>,
    storage: StorageConfig,
}

impl ArchetypeManager {
    pub fn new(entity_descriptor: Arc<TypeDescriptor>, storage: StorageConfig) -> Self {
        Self {
            archetypes: Vec::new(),
            by_signature: BTreeMap::new(),
            by_id: HashMap::new(),
            comp_index: HashMap::new(),
            entity_descriptor,
            storage,
        }
    }

    /// Return the archetype for `signature`, creating it on first use.
    ///
    /// The signature must be sorted by descriptor id.
    pub fn get_or_create(&mut self, signature: &[Arc<TypeDescriptor>]) -> &mut Archetype {
        let slot = self.resolve(signature);
        &mut self.archetypes[slot]
    }

    fn resolve(&mut self, signature: &[Arc<TypeDescriptor>]) -> usize {
        debug_assert!(
            signature.windows(2).all(|w| w[0].id() < w[1].id()),
            "signature is not sorted by descriptor id"
        );
        let key: Vec<TypeDescriptorId> = signature.iter().map(|d| d.id()).collect();
        if let Some(&slot) = self.by_signature.get(&key) {
            return slot;
        }

        let archetype = Archetype::new(
            signature.to_vec(),
            self.entity_descriptor.clone(),
            &self.storage,
        );
        let slot = self.archetypes.len();
        tracing::debug!(
            archetype = archetype.id(),
            components = ?signature.iter().map(|d| d.name()).collect::<Vec<_>>(),
            "created archetype"
        );

        for &descriptor in &key {
            self.comp_index.entry(descriptor).or_default().push(slot);
        }
        self.by_id.insert(archetype.id(), slot);
        self.by_signature.insert(key, slot);
        self.archetypes.push(archetype);
        slot
    }

    fn slot_of(&self, id: ArchetypeId) -> usize {
        *self
            .by_id
            .get(&id)
            .unwrap_or_else(|| panic!("unknown archetype id {id}"))
    }

    /// Look up an archetype by id. Unknown ids are a programming error.
    pub fn get_by_id(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[self.slot_of(id)]
    }

    pub fn get_by_id_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        let slot = self.slot_of(id);
        &mut self.archetypes[slot]
    }

    pub fn try_get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.by_id.get(&id).map(|&slot| &self.archetypes[slot])
    }

    pub fn try_get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        let slot = *self.by_id.get(&id)?;
        Some(&mut self.archetypes[slot])
    }

    /// Two distinct archetypes borrowed mutably at once.
    pub fn pair_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> (&mut Archetype, &mut Archetype) {
        let (sa, sb) = (self.slot_of(a), self.slot_of(b));
        assert_ne!(sa, sb, "archetype {a} requested twice");
        if sa < sb {
            let (left, right) = self.archetypes.split_at_mut(sb);
            (&mut left[sa], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(sa);
            (&mut right[0], &mut left[sb])
        }
    }

    /// Deep copy of every archetype, keeping ids and lookup tables.
    pub fn snapshot(&self) -> ArchetypeManager {
        ArchetypeManager {
            archetypes: self.archetypes.iter().map(Archetype::snapshot).collect(),
            by_signature: self.by_signature.clone(),
            by_id: self.by_id.clone(),
            comp_index: self.comp_index.clone(),
            entity_descriptor: self.entity_descriptor.clone(),
            storage: self.storage.clone(),
        }
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    pub fn archetypes_mut(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Ids of every archetype containing all the given descriptors.
    pub fn archetypes_with_all(&self, descriptors: &[TypeDescriptorId]) -> Vec<ArchetypeId> {
        let Some((first, rest)) = descriptors.split_first() else {
            return self.archetypes.iter().map(|a| a.id()).collect();
        };
        let Some(candidates) = self.comp_index.get(first) else {
            return Vec::new();
        };
        candidates
            .iter()
            .filter(|&&slot| {
                rest.iter()
                    .all(|d| self.comp_index.get(d).is_some_and(|slots| slots.contains(&slot)))
            })
            .map(|&slot| self.archetypes[slot].id())
            .collect()
    }

    /// Live entities across all archetypes.
    pub fn entity_count(&self) -> usize {
        self.archetypes.iter().map(|a| a.len()).sum()
    }

    pub fn storage_config(&self) -> &StorageConfig {
        &self.storage
    }
}
