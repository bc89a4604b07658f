// chunked_buffer.rs - Type-erased column of fixed-size chunks
//
// Acts like one contiguous array but grows a chunk at a time, so element
// addresses never move while the buffer grows. Rows per chunk is a power of
// two and a global index splits into (chunk, offset) with a shift and a mask.

use crate::ecs::TypeDescriptor;
use crate::pool::chunk::Chunk;
use std::sync::Arc;
use std::{fmt, mem, ptr, slice};

pub struct ChunkedBuffer {
    descriptor: Arc<TypeDescriptor>,
    chunks: Vec<Chunk>,
    rows_per_chunk: usize,
    shift: u32,
    mask: usize,
    max_unused_chunks: usize,
    len: usize,
}

impl ChunkedBuffer {
    pub fn new(descriptor: Arc<TypeDescriptor>, rows_per_chunk: usize, max_unused_chunks: usize) -> Self {
        assert!(
            rows_per_chunk.is_power_of_two(),
            "rows per chunk must be a non-zero power of two, got {rows_per_chunk}"
        );
        Self {
            descriptor,
            chunks: Vec::new(),
            rows_per_chunk,
            shift: rows_per_chunk.trailing_zeros(),
            mask: rows_per_chunk - 1,
            max_unused_chunks,
            len: 0,
        }
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.rows_per_chunk
    }

    /// Allocated chunks, including empty ones kept for reuse.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of live elements in `chunk`.
    pub fn chunk_len(&self, chunk: usize) -> usize {
        let start = chunk << self.shift;
        self.len.saturating_sub(start).min(self.rows_per_chunk)
    }

    #[inline]
    fn chunk_of(&self, index: usize) -> usize {
        index >> self.shift
    }

    #[inline]
    fn local_of(&self, index: usize) -> usize {
        index & self.mask
    }

    #[inline]
    fn slot(&self, index: usize) -> *mut u8 {
        let base = self.chunks[self.chunk_of(index)].as_ptr();
        // SAFETY: local offset is within the chunk's allocation.
        unsafe { base.add(self.local_of(index) * self.descriptor.size()) }
    }

    #[inline]
    fn check_index(&self, index: usize) {
        assert!(
            index < self.len,
            "index {index} out of bounds for '{}' column of length {}",
            self.descriptor.name(),
            self.len
        );
    }

    #[inline]
    fn check_type<T: 'static>(&self) {
        assert!(
            self.descriptor.is::<T>(),
            "column holds '{}', not {}",
            self.descriptor.name(),
            std::any::type_name::<T>()
        );
    }

    /// Grow by one uninitialized slot and return its address.
    fn reserve_slot(&mut self) -> *mut u8 {
        if self.len == self.chunks.len() * self.rows_per_chunk {
            self.chunks.push(Chunk::allocate(
                self.descriptor.size(),
                self.descriptor.align(),
                self.rows_per_chunk,
            ));
        }
        self.len += 1;
        self.slot(self.len - 1)
    }

    pub fn push<T: 'static>(&mut self, value: T) {
        self.check_type::<T>();
        let dst = self.reserve_slot();
        // SAFETY: slot is fresh, aligned and sized for T.
        unsafe { ptr::write(dst.cast::<T>(), value) };
    }

    /// Move one value of the column's type in from `src`.
    ///
    /// # Safety
    /// `src` must point at a live value of the described type. Ownership
    /// moves into the buffer; the caller must not drop the source.
    pub unsafe fn push_raw(&mut self, src: *const u8) {
        let dst = self.reserve_slot();
        unsafe { self.descriptor.move_to(src, dst) };
    }

    /// Append a clone of the value at `src`.
    ///
    /// # Safety
    /// `src` must point at a live value of the described type. It may be an
    /// element of this buffer, since growing never moves existing chunks.
    pub unsafe fn push_clone(&mut self, src: *const u8) {
        let staging = Chunk::allocate(self.descriptor.size(), self.descriptor.align(), 1);
        unsafe {
            self.descriptor.clone_to(src, staging.as_ptr());
            self.push_raw(staging.as_ptr());
        }
    }

    /// Remove the element at `index`, filling the hole with the last element.
    ///
    /// Returns the former index of the element that moved, if one did.
    pub fn swap_remove(&mut self, index: usize) -> Option<usize> {
        self.remove_at(index, true)
    }

    /// Like [`swap_remove`](Self::swap_remove) but without dropping the
    /// removed value, whose ownership has already been moved out.
    pub fn swap_remove_forget(&mut self, index: usize) -> Option<usize> {
        self.remove_at(index, false)
    }

    fn remove_at(&mut self, index: usize, destroy: bool) -> Option<usize> {
        self.check_index(index);
        let last = self.len - 1;
        let hole = self.slot(index);
        // SAFETY: both slots are live; after the move `last` is dead.
        unsafe {
            if destroy {
                self.descriptor.drop_in_place(hole);
            }
            if index != last {
                self.descriptor.move_to(self.slot(last), hole);
            }
        }
        self.len = last;
        self.release_unused_chunks();
        (index != last).then_some(last)
    }

    /// Drop trailing empty chunks beyond the configured allowance.
    fn release_unused_chunks(&mut self) {
        let keep = self.len.div_ceil(self.rows_per_chunk) + self.max_unused_chunks;
        if self.chunks.len() > keep {
            self.chunks.truncate(keep);
        }
    }

    pub fn get<T: 'static>(&self, index: usize) -> &T {
        self.check_type::<T>();
        self.check_index(index);
        // SAFETY: live slot of type T.
        unsafe { &*self.slot(index).cast::<T>() }
    }

    pub fn get_mut<T: 'static>(&mut self, index: usize) -> &mut T {
        self.check_type::<T>();
        self.check_index(index);
        // SAFETY: live slot of type T, uniquely borrowed through &mut self.
        unsafe { &mut *self.slot(index).cast::<T>() }
    }

    pub fn get_raw(&self, index: usize) -> *const u8 {
        self.check_index(index);
        self.slot(index)
    }

    pub fn get_raw_mut(&mut self, index: usize) -> *mut u8 {
        self.check_index(index);
        self.slot(index)
    }

    /// Overwrite the element at `index`, returning the old value.
    pub fn replace<T: 'static>(&mut self, index: usize, value: T) -> T {
        mem::replace(self.get_mut::<T>(index), value)
    }

    /// Copy-assign the value at `src` into the live slot at `index`.
    ///
    /// # Safety
    /// `src` must point at a live value of the described type. It may not
    /// alias the slot being assigned.
    pub unsafe fn clone_into_slot(&mut self, index: usize, src: *const u8) {
        self.check_index(index);
        let dst = self.slot(index);
        if self.descriptor.is_trivially_copyable() {
            unsafe { ptr::copy_nonoverlapping(src, dst, self.descriptor.size()) };
            return;
        }
        // Clone first so a panicking clone leaves the old value intact.
        let staging = Chunk::allocate(self.descriptor.size(), self.descriptor.align(), 1);
        unsafe {
            self.descriptor.clone_to(src, staging.as_ptr());
            self.descriptor.drop_in_place(dst);
            self.descriptor.move_to(staging.as_ptr(), dst);
        }
    }

    /// Base address of one whole chunk.
    pub fn chunk_ptr(&self, chunk: usize) -> *mut u8 {
        assert!(
            chunk < self.chunks.len(),
            "chunk {chunk} out of bounds ({} allocated)",
            self.chunks.len()
        );
        self.chunks[chunk].as_ptr()
    }

    /// Live elements of one chunk as a typed slice.
    pub fn chunk_slice<T: 'static>(&self, chunk: usize) -> &[T] {
        self.check_type::<T>();
        let ptr = self.chunk_ptr(chunk).cast::<T>();
        // SAFETY: the first chunk_len slots of the chunk are live values of T.
        unsafe { slice::from_raw_parts(ptr, self.chunk_len(chunk)) }
    }

    pub fn chunk_slice_mut<T: 'static>(&mut self, chunk: usize) -> &mut [T] {
        self.check_type::<T>();
        let ptr = self.chunk_ptr(chunk).cast::<T>();
        // SAFETY: as above, uniquely borrowed.
        unsafe { slice::from_raw_parts_mut(ptr, self.chunk_len(chunk)) }
    }

    pub fn iter<T: 'static>(&self) -> impl Iterator<Item = &T> + '_ {
        self.check_type::<T>();
        (0..self.len).map(move |i| {
            // SAFETY: i < len and the type was checked above.
            unsafe { &*self.slot(i).cast::<T>() }
        })
    }

    /// Drop every element. Chunks beyond the unused allowance are released.
    pub fn clear(&mut self) {
        self.drop_live();
        self.len = 0;
        self.release_unused_chunks();
    }

    fn drop_live(&mut self) {
        if self.descriptor.is_trivially_destructible() {
            return;
        }
        for i in 0..self.len {
            // SAFETY: every slot below len is live.
            unsafe { self.descriptor.drop_in_place(self.slot(i)) };
        }
    }
}

impl Clone for ChunkedBuffer {
    /// Chunk `i` of the copy holds the same rows as chunk `i` of `self`.
    /// Spare chunks are not copied.
    fn clone(&self) -> Self {
        let mut copy = Self::new(self.descriptor.clone(), self.rows_per_chunk, self.max_unused_chunks);
        for chunk in 0..self.len.div_ceil(self.rows_per_chunk) {
            let rows = self.chunk_len(chunk);
            let dst = Chunk::allocate(self.descriptor.size(), self.descriptor.align(), self.rows_per_chunk);
            // SAFETY: the first `rows` slots of the source chunk are live and
            // the fresh chunk has room for all of them.
            unsafe {
                self.descriptor
                    .clone_many_to(self.chunks[chunk].as_ptr(), dst.as_ptr(), rows)
            };
            copy.chunks.push(dst);
            copy.len += rows;
        }
        copy
    }
}

impl Drop for ChunkedBuffer {
    fn drop(&mut self) {
        self.drop_live();
    }
}

impl fmt::Debug for ChunkedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedBuffer")
            .field("type", &self.descriptor.name())
            .field("len", &self.len)
            .field("chunks", &self.chunks.len())
            .field("rows_per_chunk", &self.rows_per_chunk)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u32_buffer(rows: usize, unused: usize) -> ChunkedBuffer {
        ChunkedBuffer::new(
            Arc::new(TypeDescriptor::typed::<u32>(1, "u32", true)),
            rows,
            unused,
        )
    }

    #[test]
    fn chunks_allocated_on_boundary() {
        let mut buf = u32_buffer(4, 0);
        assert_eq!(buf.chunk_count(), 0);
        buf.push(0u32);
        assert_eq!(buf.chunk_count(), 1);
        for i in 1..4u32 {
            buf.push(i);
        }
        assert_eq!(buf.chunk_count(), 1);
        buf.push(4u32);
        assert_eq!(buf.chunk_count(), 2);
        assert_eq!(buf.chunk_len(0), 4);
        assert_eq!(buf.chunk_len(1), 1);
        assert_eq!(*buf.get::<u32>(4), 4);
        assert_eq!(buf.chunk_slice::<u32>(0), &[0, 1, 2, 3]);
    }

    #[test]
    fn swap_remove_moves_last_into_hole() {
        let mut buf = u32_buffer(4, 4);
        for i in 0..6u32 {
            buf.push(i);
        }
        assert_eq!(buf.swap_remove(1), Some(5));
        assert_eq!(buf.len(), 5);
        assert_eq!(*buf.get::<u32>(1), 5);

        // Removing the last element only shrinks.
        assert_eq!(buf.swap_remove(4), None);
        assert_eq!(buf.iter::<u32>().copied().collect::<Vec<_>>(), vec![0, 5, 2, 3]);
    }

    #[test]
    fn releases_chunks_beyond_allowance() {
        let mut buf = u32_buffer(2, 1);
        for i in 0..8u32 {
            buf.push(i);
        }
        assert_eq!(buf.chunk_count(), 4);
        while buf.len() > 1 {
            buf.swap_remove(buf.len() - 1);
        }
        // One chunk in use plus one spare.
        assert_eq!(buf.chunk_count(), 2);
        buf.clear();
        assert_eq!(buf.chunk_count(), 1);
    }

    #[test]
    fn drops_live_elements() {
        let marker = Arc::new(());
        let descriptor = Arc::new(TypeDescriptor::typed::<Arc<()>>(2, "Arc", false));
        let mut buf = ChunkedBuffer::new(descriptor, 4, 0);
        for _ in 0..5 {
            buf.push(marker.clone());
        }
        assert_eq!(Arc::strong_count(&marker), 6);
        buf.swap_remove(0);
        assert_eq!(Arc::strong_count(&marker), 5);

        let taken = buf.replace(0, Arc::new(()));
        drop(taken);
        assert_eq!(Arc::strong_count(&marker), 4);

        drop(buf);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn forget_leaves_value_to_caller() {
        let marker = Arc::new(());
        let descriptor = Arc::new(TypeDescriptor::typed::<Arc<()>>(2, "Arc", false));
        let mut buf = ChunkedBuffer::new(descriptor, 4, 0);
        buf.push(marker.clone());
        let moved: Arc<()> = unsafe { ptr::read(buf.get_raw(0).cast()) };
        buf.swap_remove_forget(0);
        assert_eq!(Arc::strong_count(&marker), 2);
        drop(moved);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn clone_into_slot_uses_clone() {
        let descriptor = Arc::new(TypeDescriptor::typed::<String>(3, "String", false));
        let mut buf = ChunkedBuffer::new(descriptor, 4, 0);
        buf.push(String::from("old"));
        let src = String::from("new");
        unsafe { buf.clone_into_slot(0, &src as *const String as *const u8) };
        assert_eq!(buf.get::<String>(0), "new");
        assert_eq!(src, "new");
    }

    #[test]
    fn push_clone_copies_an_existing_element() {
        let descriptor = Arc::new(TypeDescriptor::typed::<String>(3, "String", false));
        let mut buf = ChunkedBuffer::new(descriptor, 2, 0);
        buf.push(String::from("a"));
        buf.push(String::from("b"));
        // The source lives in the last slot of a full chunk.
        let src = buf.get_raw(1);
        unsafe { buf.push_clone(src) };
        assert_eq!(buf.chunk_count(), 2);
        assert_eq!(buf.iter::<String>().cloned().collect::<Vec<_>>(), vec!["a", "b", "b"]);
    }

    #[test]
    fn clone_keeps_chunk_layout_and_owns_its_values() {
        let marker = Arc::new(());
        let descriptor = Arc::new(TypeDescriptor::typed::<Arc<()>>(2, "Arc", false));
        let mut buf = ChunkedBuffer::new(descriptor, 4, 2);
        for _ in 0..6 {
            buf.push(marker.clone());
        }
        let copy = buf.clone();
        assert_eq!(copy.len(), 6);
        assert_eq!(copy.chunk_count(), 2);
        assert_eq!(copy.chunk_len(1), 2);
        assert_eq!(Arc::strong_count(&marker), 13);

        buf.clear();
        assert_eq!(Arc::strong_count(&marker), 7);
        drop(copy);
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn clone_of_trivial_column_is_bytewise() {
        let mut buf = u32_buffer(4, 0);
        for i in 0..9u32 {
            buf.push(i);
        }
        let mut copy = buf.clone();
        *copy.get_mut::<u32>(0) = 100;
        assert_eq!(*buf.get::<u32>(0), 0);
        assert_eq!(copy.chunk_slice::<u32>(2), &[8]);
        assert_eq!(copy.iter::<u32>().skip(1).copied().collect::<Vec<_>>(), (1..9).collect::<Vec<_>>());
    }

    #[test]
    fn zero_sized_elements() {
        #[derive(Clone, Copy)]
        struct Tag;
        let descriptor = Arc::new(TypeDescriptor::typed::<Tag>(4, "Tag", true));
        let mut buf = ChunkedBuffer::new(descriptor, 2, 0);
        for _ in 0..5 {
            buf.push(Tag);
        }
        assert_eq!(buf.len(), 5);
        assert_eq!(buf.swap_remove(0), Some(4));
        assert_eq!(buf.len(), 4);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn get_past_end_panics() {
        let mut buf = u32_buffer(4, 0);
        buf.push(1u32);
        let _ = buf.get::<u32>(1);
    }

    #[test]
    #[should_panic(expected = "column holds")]
    fn wrong_type_panics() {
        let mut buf = u32_buffer(4, 0);
        buf.push(1u64);
    }
}
