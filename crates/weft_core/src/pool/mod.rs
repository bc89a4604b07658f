//! Type-erased chunked storage.
//!
//! Every archetype column is a [`ChunkedBuffer`]: fixed-size, 64-byte aligned
//! chunks that act like one array. Chunks are the unit handed to parallel
//! tasks, so their base addresses stay put while the column grows.

mod chunk;
mod chunked_buffer;
mod erased;

pub use chunk::CHUNK_ALIGNMENT;
pub use chunked_buffer::ChunkedBuffer;
pub use erased::ErasedValue;
