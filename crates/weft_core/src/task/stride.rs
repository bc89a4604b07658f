// stride.rs - Splitting iteration spaces into job-sized ranges

use std::ops::Range;

/// A run of rows inside one chunk, in chunk-local indices.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StrideRange {
    pub chunk: usize,
    pub start: usize,
    pub end: usize,
}

impl StrideRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Split `len` rows stored in chunks of `chunk_size` into strides of at most
/// `per_stride` rows. Strides never cross a chunk boundary. A `per_stride`
/// of zero makes each chunk a single stride.
pub fn stride_ranges(len: usize, chunk_size: usize, per_stride: usize) -> Vec<StrideRange> {
    assert!(chunk_size > 0, "chunk size must be positive");
    let mut ranges = Vec::new();
    for chunk in 0..len.div_ceil(chunk_size) {
        let rows = (len - chunk * chunk_size).min(chunk_size);
        let step = if per_stride == 0 { rows } else { per_stride };
        let mut start = 0;
        while start < rows {
            let end = (start + step).min(rows);
            ranges.push(StrideRange { chunk, start, end });
            start = end;
        }
    }
    ranges
}

/// Split `[0, iterations)` into `splits` equal ranges plus a trailing range
/// holding the remainder. Empty ranges are omitted.
pub fn custom_ranges(iterations: usize, splits: usize) -> Vec<Range<usize>> {
    assert!(splits > 0, "split count must be positive");
    let stride = iterations / splits;
    let mut ranges = Vec::with_capacity(splits + 1);
    if stride > 0 {
        ranges.extend((0..splits).map(|i| i * stride..(i + 1) * stride));
    }
    let covered = stride * splits;
    if covered < iterations {
        ranges.push(covered..iterations);
    }
    ranges
}
