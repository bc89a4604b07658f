// chunk.rs - One fixed-capacity, cache-line aligned allocation
//
// A chunk knows nothing about the values it holds. The owning buffer tracks
// which slots are live and drops them.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Minimum base alignment of every chunk.
pub const CHUNK_ALIGNMENT: usize = 64;

pub(crate) struct Chunk {
    ptr: NonNull<u8>,
    // None for zero-sized storage, which owns no memory.
    layout: Option<Layout>,
}

impl Chunk {
    /// Allocate room for `rows` elements of the given size and alignment.
    pub(crate) fn allocate(elem_size: usize, elem_align: usize, rows: usize) -> Self {
        let align = elem_align.max(CHUNK_ALIGNMENT);
        let bytes = elem_size
            .checked_mul(rows)
            .expect("chunk size overflows usize");

        if bytes == 0 {
            // Aligned, non-null and never dereferenced for more than zero bytes.
            let dangling = align as *mut u8;
            return Self {
                ptr: NonNull::new(dangling).unwrap_or(NonNull::dangling()),
                layout: None,
            };
        }

        let layout = Layout::from_size_align(bytes, align).expect("invalid chunk layout");
        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        Self {
            ptr,
            layout: Some(layout),
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            // SAFETY: allocated in `allocate` with this exact layout.
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

// Chunks are plain memory; the buffer enforces what may live in them.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}
