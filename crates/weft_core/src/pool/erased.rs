// erased.rs - A single owned value of a run-time described type
//
// Used by the dynamic creation path and by structural change, where the
// component being added is known only through its descriptor.

use crate::ecs::TypeDescriptor;
use crate::pool::chunk::Chunk;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::{fmt, ptr};

pub struct ErasedValue {
    descriptor: Arc<TypeDescriptor>,
    storage: Chunk,
}

impl ErasedValue {
    pub fn new<T: 'static>(descriptor: Arc<TypeDescriptor>, value: T) -> Self {
        assert!(
            descriptor.is::<T>(),
            "descriptor '{}' does not describe {}",
            descriptor.name(),
            std::any::type_name::<T>()
        );
        let storage = Chunk::allocate(descriptor.size(), descriptor.align(), 1);
        // SAFETY: storage is sized and aligned for T.
        unsafe { ptr::write(storage.as_ptr().cast::<T>(), value) };
        Self { descriptor, storage }
    }

    /// Build a value of a raw descriptor from its bytes.
    ///
    /// Returns `None` when the descriptor is not raw or the length differs
    /// from its size.
    pub fn from_bytes(descriptor: Arc<TypeDescriptor>, bytes: &[u8]) -> Option<Self> {
        if !descriptor.is_raw() || bytes.len() != descriptor.size() {
            return None;
        }
        let storage = Chunk::allocate(descriptor.size(), descriptor.align(), 1);
        // SAFETY: lengths match and the destination is freshly allocated.
        unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), storage.as_ptr(), bytes.len()) };
        Some(Self { descriptor, storage })
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.storage.as_ptr()
    }

    /// Hand the value's address to `f`, which takes ownership of it by moving
    /// it out. The storage is freed afterwards without dropping the value.
    pub fn consume<R>(self, f: impl FnOnce(*const u8) -> R) -> R {
        let this = ManuallyDrop::new(self);
        // SAFETY: fields are read exactly once and `this` is never dropped.
        let (descriptor, storage) = unsafe { (ptr::read(&this.descriptor), ptr::read(&this.storage)) };
        let result = f(storage.as_ptr());
        drop(storage);
        drop(descriptor);
        result
    }
}

impl Drop for ErasedValue {
    fn drop(&mut self) {
        // SAFETY: the value is live until consumed or dropped here.
        unsafe { self.descriptor.drop_in_place(self.storage.as_ptr()) };
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedValue")
            .field("type", &self.descriptor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_runs_value_destructor() {
        let marker = Arc::new(());
        let descriptor = Arc::new(TypeDescriptor::typed::<Arc<()>>(1, "Arc", false));
        let value = ErasedValue::new(descriptor, marker.clone());
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(value);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn consume_transfers_ownership() {
        let marker = Arc::new(());
        let descriptor = Arc::new(TypeDescriptor::typed::<Arc<()>>(1, "Arc", false));
        let value = ErasedValue::new(descriptor, marker.clone());
        let taken: Arc<()> = value.consume(|src| unsafe { ptr::read(src.cast()) });
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(taken);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn raw_bytes_must_match_size() {
        let descriptor = Arc::new(TypeDescriptor::raw(9, "Pair", 8, 4));
        assert!(ErasedValue::from_bytes(descriptor.clone(), &[0; 4]).is_none());
        let value = ErasedValue::from_bytes(descriptor, &[1, 0, 0, 0, 2, 0, 0, 0]).expect("sized");
        let bytes = unsafe { std::slice::from_raw_parts(value.as_ptr(), 8) };
        assert_eq!(bytes, &[1, 0, 0, 0, 2, 0, 0, 0]);
    }
}
