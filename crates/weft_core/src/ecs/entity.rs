//! Entity identifiers and stable references
//!
//! An [`EntityId`] names a row of an archetype and is only valid until the
//! next structural change touching that archetype. Code that needs to follow
//! an entity across moves holds a [`StableEntity`] instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type ArchetypeId = u64;

/// Bits of an identifier used for the row index. The rest hold the archetype id.
pub const INDEX_BITS: u32 = 40;
pub const ARCHETYPE_BITS: u32 = u64::BITS - INDEX_BITS;
pub const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
pub const MAX_ARCHETYPE_ID: ArchetypeId = (1 << ARCHETYPE_BITS) - 1;

/// Entity identifier
///
/// Format: [24-bit archetype id | 40-bit row index]
///
/// Archetype ids start at 1, so the all-zero value is never a live entity.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct EntityId(u64);

impl EntityId {
    pub const NULL: Self = Self(0);

    pub fn new(archetype: ArchetypeId, index: usize) -> Self {
        debug_assert!(archetype <= MAX_ARCHETYPE_ID, "archetype id {archetype} overflows");
        debug_assert!((index as u64) <= INDEX_MASK, "row index {index} overflows");
        Self((archetype << INDEX_BITS) | (index as u64 & INDEX_MASK))
    }

    #[inline]
    pub fn archetype_id(self) -> ArchetypeId {
        self.0 >> INDEX_BITS
    }

    #[inline]
    pub fn index(self) -> usize {
        (self.0 & INDEX_MASK) as usize
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub fn to_bits(self) -> u64 {
        self.0
    }

    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("EntityId(null)")
        } else {
            write!(f, "EntityId({}:{})", self.archetype_id(), self.index())
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.archetype_id(), self.index())
    }
}

/// Shared handle that always holds an entity's current identifier.
///
/// The archetype hosting the entity is the only writer. After the entity is
/// destroyed the handle reads [`EntityId::NULL`].
#[derive(Clone)]
pub struct StableEntity {
    current: Arc<AtomicU64>,
}

impl StableEntity {
    pub(crate) fn new(id: EntityId) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(id.to_bits())),
        }
    }

    #[inline]
    pub fn id(&self) -> EntityId {
        EntityId(self.current.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.id().is_null()
    }

    /// Whether both handles share the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.current, &other.current)
    }

    #[inline]
    pub(crate) fn update(&self, id: EntityId) {
        self.current.store(id.to_bits(), Ordering::Release);
    }
}

impl fmt::Debug for StableEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StableEntity").field(&self.id()).finish()
    }
}
