use crate::utils::{WORD_SIZE, checked_align_word};

/// Default upper bound of the heap, the same 20 MiB the classic `memlib`
/// driver reserves.
pub const DEFAULT_MAX_HEAP_SIZE: usize = 20 * (1 << 20);

/// Default over-allocation threshold. When the heap has to grow, it grows by
/// at least this many bytes so the next small requests don't have to.
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Tunables of a [`crate::Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    max_heap_size: usize,
    chunk_size: usize,
}

impl HeapConfig {
    pub const fn new() -> Self {
        Self {
            max_heap_size: DEFAULT_MAX_HEAP_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_max_heap_size(mut self, max_heap_size: usize) -> Self {
        self.max_heap_size = max_heap_size;
        self
    }

    /// Sets the growth threshold, rounded up to the word size. Values too
    /// close to `usize::MAX` to round up are rounded down instead.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = checked_align_word(chunk_size).unwrap_or(chunk_size & !(WORD_SIZE - 1));
        self
    }

    /// Bytes reserved up front by [`crate::Heap::new`]. The heap can never
    /// grow beyond this.
    pub fn max_heap_size(&self) -> usize {
        self.max_heap_size
    }

    /// Minimum amount the heap grows by when no free block fits. Always a
    /// multiple of [`WORD_SIZE`].
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}
