// archetype.rs - Table of all entities sharing one component signature
//
// One chunked column per component type, sorted by descriptor id, plus a
// column of entity identifiers. All columns always have the same length.
// Rows are dense: destroying a row moves the last row into the hole.

use crate::config::StorageConfig;
use crate::ecs::{
    ArchetypeId, ComponentBundle, EntityId, StableEntity, TypeDescriptor, TypeDescriptorId,
    MAX_ARCHETYPE_ID,
};
use crate::pool::{ChunkedBuffer, ErasedValue};
use std::any::TypeId;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ARCHETYPE_ID: AtomicU64 = AtomicU64::new(1);

pub struct Archetype {
    id: ArchetypeId,
    types: Vec<Arc<TypeDescriptor>>,
    entities: ChunkedBuffer,
    columns: Vec<ChunkedBuffer>,
    stable_references: Vec<StableEntity>,
}

impl Archetype {
    /// Create an empty archetype. `types` must be sorted by descriptor id
    /// without duplicates.
    pub(crate) fn new(
        types: Vec<Arc<TypeDescriptor>>,
        entity_descriptor: Arc<TypeDescriptor>,
        storage: &StorageConfig,
    ) -> Self {
        assert!(
            types.windows(2).all(|w| w[0].id() < w[1].id()),
            "archetype signature must be sorted and free of duplicates"
        );
        let id = NEXT_ARCHETYPE_ID.fetch_add(1, Ordering::Relaxed);
        assert!(id <= MAX_ARCHETYPE_ID, "archetype id space exhausted");

        let rows = storage.chunk_size;
        let unused = storage.max_unused_chunks;
        let columns = types
            .iter()
            .map(|d| ChunkedBuffer::new(d.clone(), rows, unused))
            .collect();

        Self {
            id,
            entities: ChunkedBuffer::new(entity_descriptor, rows, unused),
            columns,
            types,
            stable_references: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Component types of this archetype, sorted by descriptor id.
    pub fn component_types(&self) -> &[Arc<TypeDescriptor>] {
        &self.types
    }

    pub fn signature(&self) -> Vec<TypeDescriptorId> {
        self.types.iter().map(|d| d.id()).collect()
    }

    pub fn has_type(&self, descriptor: &TypeDescriptor) -> bool {
        self.position_of(descriptor.id()).is_some()
    }

    pub fn has_component<T: 'static>(&self) -> bool {
        self.has_type_id(TypeId::of::<T>())
    }

    pub fn has_type_id(&self, type_id: TypeId) -> bool {
        self.types.iter().any(|d| d.type_id() == Some(type_id))
    }

    /// Column index of a type in the signature. Panics if absent.
    pub fn index_of_type(&self, descriptor: &TypeDescriptor) -> usize {
        self.position_of(descriptor.id()).unwrap_or_else(|| {
            panic!(
                "archetype {} has no component '{}'",
                self.id,
                descriptor.name()
            )
        })
    }

    fn position_of(&self, descriptor: TypeDescriptorId) -> Option<usize> {
        self.types.binary_search_by_key(&descriptor, |d| d.id()).ok()
    }

    fn column_of<T: 'static>(&self) -> usize {
        self.types
            .iter()
            .position(|d| d.is::<T>())
            .unwrap_or_else(|| {
                panic!(
                    "archetype {} has no component {}",
                    self.id,
                    std::any::type_name::<T>()
                )
            })
    }

    pub fn chunk_size(&self) -> usize {
        self.entities.chunk_size()
    }

    pub fn chunk_count(&self) -> usize {
        self.entities.chunk_count()
    }

    /// Live rows in `chunk`.
    pub fn chunk_len(&self, chunk: usize) -> usize {
        self.entities.chunk_len(chunk)
    }

    pub fn entity_at(&self, row: usize) -> EntityId {
        *self.entities.get::<EntityId>(row)
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter::<EntityId>().copied()
    }

    /// Whether `entity` names a live row of this archetype.
    pub fn contains(&self, entity: EntityId) -> bool {
        entity.archetype_id() == self.id && entity.index() < self.len()
    }

    fn check_entity(&self, entity: EntityId) {
        assert_eq!(
            entity.archetype_id(),
            self.id,
            "entity {entity} does not belong to archetype {}",
            self.id
        );
    }

    fn check_row(&self, entity: EntityId) -> usize {
        self.check_entity(entity);
        let index = entity.index();
        assert!(
            index < self.len(),
            "entity {entity} is past the end of archetype {} ({} rows)",
            self.id,
            self.len()
        );
        index
    }

    fn push_entity(&mut self) -> EntityId {
        let id = EntityId::new(self.id, self.entities.len());
        self.entities.push(id);
        debug_assert!(self.columns_consistent());
        id
    }

    /// Add an entity from a typed bundle whose types match the signature exactly.
    pub fn create<B: ComponentBundle>(&mut self, bundle: B) -> EntityId {
        let mut type_ids = B::type_ids();
        let listed = type_ids.len();
        type_ids.sort_unstable();
        type_ids.dedup();
        assert_eq!(
            type_ids.len(),
            listed,
            "bundle {} lists a component twice",
            std::any::type_name::<B>()
        );
        assert!(
            type_ids.len() == self.types.len() && type_ids.iter().all(|t| self.has_type_id(*t)),
            "bundle does not match the signature of archetype {}",
            self.id
        );
        bundle.push_into(self);
        self.push_entity()
    }

    pub(crate) fn push_component<T: 'static>(&mut self, value: T) {
        let column = self.column_of::<T>();
        self.columns[column].push(value);
    }

    /// Add an entity from values whose descriptors match the signature exactly.
    pub fn create_dynamic(&mut self, mut values: Vec<ErasedValue>) -> EntityId {
        values.sort_by_key(|v| v.descriptor().id());
        assert!(
            values.len() == self.types.len()
                && values
                    .iter()
                    .zip(&self.types)
                    .all(|(v, d)| v.descriptor().id() == d.id()),
            "values do not match the signature of archetype {}",
            self.id
        );
        for (column, value) in self.columns.iter_mut().zip(values) {
            // SAFETY: the value is live and consumed exactly once.
            value.consume(|src| unsafe { column.push_raw(src) });
        }
        self.push_entity()
    }

    /// Add an entity by moving one value per signature type in from raw
    /// addresses. Parts may come in any order.
    ///
    /// # Safety
    /// Each pointer must reference a live value of its descriptor's type.
    /// Ownership of every value moves into the archetype.
    pub unsafe fn create_raw(&mut self, parts: &[(&TypeDescriptor, *const u8)]) -> EntityId {
        assert_eq!(
            parts.len(),
            self.types.len(),
            "wrong number of components for archetype {}",
            self.id
        );
        let mut sources = vec![std::ptr::null::<u8>(); self.types.len()];
        for (descriptor, src) in parts {
            let column = self.index_of_type(descriptor);
            assert!(
                sources[column].is_null(),
                "component '{}' supplied twice",
                descriptor.name()
            );
            sources[column] = *src;
        }
        unsafe { self.push_row_raw(&sources) }
    }

    /// Append a copy of `entity`'s row and return the copy's id.
    pub fn clone_row(&mut self, entity: EntityId) -> EntityId {
        let index = self.check_row(entity);
        for column in &mut self.columns {
            let src = column.get_raw(index);
            // SAFETY: the row is live; push_clone finishes cloning before it
            // grows the column.
            unsafe { column.push_clone(src) };
        }
        self.push_entity()
    }

    /// # Safety
    /// `sources` is in signature order, one live value per column.
    unsafe fn push_row_raw(&mut self, sources: &[*const u8]) -> EntityId {
        for (column, src) in self.columns.iter_mut().zip(sources) {
            unsafe { column.push_raw(*src) };
        }
        self.push_entity()
    }

    /// Destroy an entity, moving the last row into its place.
    ///
    /// An index past the end is treated as already destroyed.
    pub fn destroy(&mut self, entity: EntityId) -> bool {
        self.check_entity(entity);
        if entity.index() >= self.len() {
            tracing::warn!(%entity, archetype = self.id, "destroy of a row past the end ignored");
            return false;
        }
        self.remove_row(entity.index(), None);
        true
    }

    /// Swap-remove a row from every column. Columns flagged in `moved_out`
    /// had their value moved elsewhere and are not dropped.
    fn remove_row(&mut self, index: usize, moved_out: Option<&[bool]>) {
        let removed = self.entity_at(index);
        if let Some(pos) = self.stable_position(removed) {
            self.stable_references.swap_remove(pos).update(EntityId::NULL);
        }

        for (column_index, column) in self.columns.iter_mut().enumerate() {
            if moved_out.is_some_and(|m| m[column_index]) {
                column.swap_remove_forget(index);
            } else {
                column.swap_remove(index);
            }
        }

        if let Some(from) = self.entities.swap_remove(index) {
            let old_id = EntityId::new(self.id, from);
            let new_id = EntityId::new(self.id, index);
            *self.entities.get_mut::<EntityId>(index) = new_id;
            if let Some(pos) = self.stable_position(old_id) {
                self.stable_references[pos].update(new_id);
            }
        }
    }

    /// Move an entity into `target`, which must hold a superset or subset of
    /// this signature differing by the optional `extra` value.
    ///
    /// Values of types `target` lacks are dropped. Returns the new identifier.
    pub(crate) fn move_row_to(
        &mut self,
        target: &mut Archetype,
        entity: EntityId,
        extra: Option<ErasedValue>,
    ) -> EntityId {
        let index = self.check_row(entity);
        assert_ne!(self.id, target.id, "cannot move an entity into its own archetype");

        let mut moved_out = vec![false; self.columns.len()];
        let mut sources = Vec::with_capacity(target.types.len());
        let mut extra_used = false;
        for descriptor in &target.types {
            if let Some(column) = self.position_of(descriptor.id()) {
                moved_out[column] = true;
                sources.push(self.columns[column].get_raw(index));
            } else if let Some(value) = extra.as_ref().filter(|v| v.descriptor().id() == descriptor.id()) {
                extra_used = true;
                sources.push(value.as_ptr());
            } else {
                panic!(
                    "archetype {} needs '{}' which entity {entity} cannot supply",
                    target.id,
                    descriptor.name()
                );
            }
        }
        assert!(
            extra.is_none() || extra_used,
            "archetype {} has no column for the added component",
            target.id
        );

        // SAFETY: sources follow the target's signature order and every value
        // is live; ownership moves into the target.
        let new_id = unsafe { target.push_row_raw(&sources) };
        if let Some(value) = extra {
            // The value now lives in the target; free the staging storage only.
            value.consume(|_| ());
        }

        if let Some(pos) = self.stable_position(entity) {
            let stable = self.stable_references.swap_remove(pos);
            stable.update(new_id);
            target.stable_references.push(stable);
        }
        self.remove_row(index, Some(&moved_out));

        tracing::debug!(from = self.id, to = target.id, %entity, %new_id, "moved entity");
        new_id
    }

    fn stable_position(&self, entity: EntityId) -> Option<usize> {
        self.stable_references.iter().position(|s| s.id() == entity)
    }

    /// Hand out a reference that follows `entity` across moves. An existing
    /// reference for the entity is reused.
    pub fn track_stable(&mut self, entity: EntityId) -> StableEntity {
        self.check_row(entity);
        if let Some(pos) = self.stable_position(entity) {
            return self.stable_references[pos].clone();
        }
        let stable = StableEntity::new(entity);
        self.stable_references.push(stable.clone());
        stable
    }

    /// Number of stable references this archetype keeps up to date.
    pub fn stable_reference_count(&self) -> usize {
        self.stable_references.len()
    }

    pub fn get_component<T: 'static>(&self, entity: EntityId) -> &T {
        let index = self.check_row(entity);
        self.columns[self.column_of::<T>()].get(index)
    }

    pub fn get_component_mut<T: 'static>(&mut self, entity: EntityId) -> &mut T {
        let index = self.check_row(entity);
        let column = self.column_of::<T>();
        self.columns[column].get_mut(index)
    }

    /// Overwrite a component, returning the previous value.
    pub fn set_component<T: 'static>(&mut self, entity: EntityId, value: T) -> T {
        let index = self.check_row(entity);
        let column = self.column_of::<T>();
        self.columns[column].replace(index, value)
    }

    /// Soft lookup: `None` when the entity is not a live row here or the
    /// archetype lacks `T`.
    pub fn try_component<T: 'static>(&self, entity: EntityId) -> Option<&T> {
        if !self.contains(entity) {
            return None;
        }
        let column = self.types.iter().position(|d| d.is::<T>())?;
        Some(self.columns[column].get(entity.index()))
    }

    pub fn try_component_mut<T: 'static>(&mut self, entity: EntityId) -> Option<&mut T> {
        if !self.contains(entity) {
            return None;
        }
        let column = self.types.iter().position(|d| d.is::<T>())?;
        Some(self.columns[column].get_mut(entity.index()))
    }

    /// Address of one component value.
    pub fn get_component_data(&self, entity: EntityId, descriptor: &TypeDescriptor) -> *const u8 {
        let index = self.check_row(entity);
        self.columns[self.index_of_type(descriptor)].get_raw(index)
    }

    /// Copy-assign a component value from a raw address.
    ///
    /// # Safety
    /// `src` must reference a live value of `descriptor`'s type.
    pub unsafe fn set_component_data(&mut self, entity: EntityId, descriptor: &TypeDescriptor, src: *const u8) {
        let index = self.check_row(entity);
        let column = self.index_of_type(descriptor);
        unsafe { self.columns[column].clone_into_slot(index, src) };
    }

    /// Base address of one chunk of a component column.
    pub fn column_chunk_ptr(&self, descriptor: &TypeDescriptor, chunk: usize) -> *mut u8 {
        self.columns[self.index_of_type(descriptor)].chunk_ptr(chunk)
    }

    /// Typed base address of one chunk, for handing to parallel slices.
    pub(crate) fn chunk_ptr_of<T: 'static>(&mut self, chunk: usize) -> NonNull<T> {
        let column = self.column_of::<T>();
        NonNull::new(self.columns[column].chunk_ptr(chunk).cast::<T>())
            .expect("chunk pointers are never null")
    }

    /// Live values of `T` in one chunk.
    pub fn chunk_slice<T: 'static>(&self, chunk: usize) -> &[T] {
        self.columns[self.column_of::<T>()].chunk_slice(chunk)
    }

    pub fn chunk_slice_mut<T: 'static>(&mut self, chunk: usize) -> &mut [T] {
        let column = self.column_of::<T>();
        self.columns[column].chunk_slice_mut(chunk)
    }

    /// Every column has as many rows as the entity column.
    pub fn columns_consistent(&self) -> bool {
        self.columns.iter().all(|c| c.len() == self.entities.len())
    }

    /// Copy of every row under the same archetype id. Stable references stay
    /// with `self`; the copy tracks none.
    pub fn snapshot(&self) -> Archetype {
        Archetype {
            id: self.id,
            types: self.types.clone(),
            entities: self.entities.clone(),
            columns: self.columns.clone(),
            stable_references: Vec::new(),
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("types", &self.types.iter().map(|d| d.name()).collect::<Vec<_>>())
            .field("len", &self.len())
            .field("stable_references", &self.stable_references.len())
            .finish()
    }
}
