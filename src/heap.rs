use std::ptr::NonNull;

use crate::{
    block::{Block, FreeBlock, HEADER_SIZE, Header, Payload, SENTINEL_SIZE},
    config::HeapConfig,
    error::HeapError,
    region::{HeapSource, MappedRegion},
    utils::WORD_SIZE,
};

/// An explicit free list heap living inside a [`HeapSource`].
///
/// The heap is a sequence of blocks bounded by two sentinels that are
/// always allocated, so walking to a neighbour never needs a bounds check:
///
/// ```text
/// +-----------+---------+---------+---------+-----+-----------+
/// | prologue  | block   | block   | block   | ... | epilogue  |
/// | (2 words) |         |         |         |     | (2 words) |
/// +-----------+---------+---------+---------+-----+-----------+
/// ^                                                           ^
/// 0                                                 source.len()
/// ```
///
/// Blocks are referenced by their byte offset into the source, and every
/// word is read and written through a bounds checked slice. Free blocks are
/// additionally linked into a circular doubly linked list, see
/// [`Heap::insert_free_block`].
///
/// The heap is single threaded: every mutating operation takes `&mut self`.
pub struct Heap<S: HeapSource = MappedRegion> {
    source: S,
    config: HeapConfig,
    prologue: Block,
    epilogue: Block,
    /// Any member of the free list, `None` when there are no free blocks.
    pub(crate) free_head: Option<FreeBlock>,
}

impl Heap<MappedRegion> {
    /// Reserves [`HeapConfig::max_heap_size`] bytes from the platform and lays out
    /// an empty heap in them.
    pub fn new(config: HeapConfig) -> Result<Self, HeapError> {
        let region = MappedRegion::reserve(config.max_heap_size())?;

        Self::init(region, config)
    }
}

impl<S: HeapSource> Heap<S> {
    /// Writes the prologue and epilogue into a fresh `source`. The free list
    /// starts out empty; the first allocation grows the heap.
    pub fn init(mut source: S, config: HeapConfig) -> Result<Self, HeapError> {
        let start = source.extend(2 * SENTINEL_SIZE)?;
        debug_assert_eq!(start % WORD_SIZE, 0, "heap source must start word aligned");

        let prologue = Block::at(start);
        let epilogue = Block::at(start + SENTINEL_SIZE);

        let mut heap = Self {
            source,
            config,
            prologue,
            epilogue,
            free_head: None,
        };

        let tag = Header::new(SENTINEL_SIZE, true, true);
        heap.write_header(prologue, tag);
        heap.write_word(prologue.offset() + WORD_SIZE, tag.word());
        heap.write_epilogue(epilogue, true);

        log::debug!("heap initialised, prologue at {start}, epilogue at {}", epilogue.offset());

        Ok(heap)
    }

    /// The configuration the heap was created with.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Total bytes taken from the source, sentinels included.
    pub fn heap_size(&self) -> usize {
        self.source.len()
    }

    /// The source the heap grows into, e.g. to ask a [`MappedRegion`] how
    /// much room is left.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Bytes the caller may use at `payload`. At least what was requested,
    /// possibly more.
    pub fn usable_size(&self, payload: Payload) -> usize {
        self.block_size(payload.block()) - HEADER_SIZE
    }

    pub fn payload(&self, payload: Payload) -> &[u8] {
        let len = self.usable_size(payload);

        &self.source.bytes()[payload.offset()..payload.offset() + len]
    }

    pub fn payload_mut(&mut self, payload: Payload) -> &mut [u8] {
        let len = self.usable_size(payload);

        &mut self.source.bytes_mut()[payload.offset()..payload.offset() + len]
    }

    /// Raw pointer to the payload. It stays valid until the allocation is
    /// freed or moved, as long as the source never relocates its bytes
    /// (true for [`MappedRegion`]).
    pub fn payload_ptr(&mut self, payload: Payload) -> NonNull<u8> {
        NonNull::from(self.payload_mut(payload)).cast::<u8>()
    }

    #[inline]
    pub(crate) fn prologue(&self) -> Block {
        self.prologue
    }

    #[inline]
    pub(crate) fn epilogue(&self) -> Block {
        self.epilogue
    }

    #[inline]
    pub(crate) fn read_word(&self, offset: usize) -> usize {
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(&self.source.bytes()[offset..offset + WORD_SIZE]);

        usize::from_ne_bytes(word)
    }

    #[inline]
    pub(crate) fn write_word(&mut self, offset: usize, value: usize) {
        self.source.bytes_mut()[offset..offset + WORD_SIZE]
            .copy_from_slice(&value.to_ne_bytes());
    }

    /// Moves `len` bytes from `src` to `dst`. The ranges may overlap.
    pub(crate) fn copy_within(&mut self, src: usize, dst: usize, len: usize) {
        self.source.bytes_mut().copy_within(src..src + len, dst);
    }

    #[inline]
    pub(crate) fn header(&self, block: Block) -> Header {
        Header::from_word(self.read_word(block.offset()))
    }

    #[inline]
    fn write_header(&mut self, block: Block, header: Header) {
        self.write_word(block.offset(), header.word());
    }

    /// Footer of a free block, the last word of the block.
    #[inline]
    pub(crate) fn footer(&self, block: FreeBlock) -> Header {
        let size = self.header(block.block()).size();

        Header::from_word(self.read_word(block.offset() + size - WORD_SIZE))
    }

    #[inline]
    pub(crate) fn block_size(&self, block: Block) -> usize {
        self.header(block).size()
    }

    #[inline]
    pub(crate) fn is_allocated(&self, block: Block) -> bool {
        self.header(block).is_allocated()
    }

    /// Physically next block. Never called on the epilogue.
    #[inline]
    pub(crate) fn next(&self, block: Block) -> Block {
        Block::at(block.offset() + self.block_size(block))
    }

    /// Physically previous block, if it is free. An allocated predecessor
    /// has no footer, so there is nothing to navigate with.
    #[inline]
    pub(crate) fn prev_free(&self, block: Block) -> Option<FreeBlock> {
        if self.header(block).prev_allocated() {
            return None;
        }

        let footer = Header::from_word(self.read_word(block.offset() - WORD_SIZE));

        Some(FreeBlock::new_unchecked(Block::at(block.offset() - footer.size())))
    }

    #[inline]
    pub(crate) fn as_free(&self, block: Block) -> Option<FreeBlock> {
        if self.is_allocated(block) {
            None
        } else {
            Some(FreeBlock::new_unchecked(block))
        }
    }

    /// Rewrites the metadata of `block`.
    ///
    /// The header keeps its cached `prev_allocated` bit, free blocks get a
    /// matching footer, and the next block learns our new allocated state.
    /// The word at `block + size` is always a header after this call, which
    /// is what makes splitting work: writing the first half primes the
    /// header of the second half.
    pub(crate) fn set_size_and_allocated(&mut self, block: Block, size: usize, allocated: bool) {
        let header = Header::new(size, allocated, self.header(block).prev_allocated());
        self.write_header(block, header);

        if !allocated {
            self.write_word(block.offset() + size - WORD_SIZE, header.word());
        }

        let next = Block::at(block.offset() + size);
        let next_header = self.header(next).with_prev_allocated(allocated);
        self.write_header(next, next_header);
    }

    /// Marks `block` as a free block of `size` bytes. It is not linked yet.
    pub(crate) fn mark_free(&mut self, block: Block, size: usize) -> FreeBlock {
        self.set_size_and_allocated(block, size, false);

        FreeBlock::new_unchecked(block)
    }

    pub(crate) fn set_size(&mut self, block: Block, size: usize) {
        let allocated = self.is_allocated(block);
        self.set_size_and_allocated(block, size, allocated);
    }

    fn write_epilogue(&mut self, epilogue: Block, prev_allocated: bool) {
        let tag = Header::new(SENTINEL_SIZE, true, prev_allocated);
        self.write_header(epilogue, tag);
        self.write_word(epilogue.offset() + WORD_SIZE, tag.word());
    }

    /// Grows the heap by `delta` bytes. The new space turns into one
    /// allocated block where the epilogue used to be, and the epilogue moves
    /// to the new end. Nothing is touched if the source refuses.
    pub(crate) fn grow(&mut self, delta: usize) -> Result<Block, HeapError> {
        let size = self.source.len();
        self.source.extend(delta).inspect_err(|err| {
            log::warn!("cannot grow heap of {size} bytes by {delta}: {err}");
        })?;

        let block = self.epilogue;
        let epilogue = Block::at(block.offset() + delta);

        self.write_epilogue(epilogue, true);
        self.set_size_and_allocated(block, delta, true);
        self.epilogue = epilogue;

        log::debug!("grew heap by {delta} bytes, epilogue now at {}", epilogue.offset());

        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{MIN_BLOCK_SIZE, TAGS_SIZE};

    fn heap() -> Heap {
        Heap::new(HeapConfig::new().with_max_heap_size(4096)).unwrap()
    }

    #[test]
    fn init_writes_sentinels() {
        let heap = heap();

        assert_eq!(heap.heap_size(), 2 * SENTINEL_SIZE);
        assert_eq!(heap.prologue().offset(), 0);
        assert_eq!(heap.epilogue().offset(), SENTINEL_SIZE);

        for sentinel in [heap.prologue(), heap.epilogue()] {
            let header = heap.header(sentinel);
            assert_eq!(header.size(), SENTINEL_SIZE);
            assert_eq!(header.size(), TAGS_SIZE);
            assert!(header.is_allocated());
            assert!(header.prev_allocated());
        }

        assert_eq!(heap.next(heap.prologue()), heap.epilogue());
        assert!(heap.free_head.is_none());
    }

    #[test]
    fn accessors_expose_config_and_source() {
        let mut heap = heap();

        assert_eq!(heap.config().max_heap_size(), 4096);
        assert_eq!(heap.source().capacity(), 4096);
        assert_eq!(heap.source().remaining(), 4096 - 2 * SENTINEL_SIZE);

        heap.grow(MIN_BLOCK_SIZE).unwrap();

        assert_eq!(heap.source().len(), heap.heap_size());
        assert_eq!(heap.source().remaining(), 4096 - heap.heap_size());
    }

    #[test]
    fn init_fails_on_a_tiny_source() {
        let region = MappedRegion::reserve(SENTINEL_SIZE).unwrap();

        assert!(matches!(
            Heap::init(region, HeapConfig::new()),
            Err(HeapError::HeapExhausted { .. })
        ));
    }

    #[test]
    fn grow_replaces_the_epilogue() {
        let mut heap = heap();
        let old_epilogue = heap.epilogue();

        let block = heap.grow(MIN_BLOCK_SIZE * 2).unwrap();

        assert_eq!(block, old_epilogue);
        assert_eq!(heap.block_size(block), MIN_BLOCK_SIZE * 2);
        assert!(heap.is_allocated(block));
        assert!(heap.header(block).prev_allocated());
        assert_eq!(heap.next(block), heap.epilogue());
        assert_eq!(heap.heap_size(), 2 * SENTINEL_SIZE + MIN_BLOCK_SIZE * 2);
    }

    #[test]
    fn grow_failure_changes_nothing() {
        let mut heap = heap();
        let epilogue = heap.epilogue();

        assert!(matches!(heap.grow(1 << 20), Err(HeapError::HeapExhausted { .. })));
        assert_eq!(heap.epilogue(), epilogue);
        assert_eq!(heap.heap_size(), 2 * SENTINEL_SIZE);
    }

    #[test]
    fn free_blocks_carry_a_footer_and_update_their_neighbour() {
        let mut heap = heap();
        let block = heap.grow(MIN_BLOCK_SIZE).unwrap();

        let free = heap.mark_free(block, MIN_BLOCK_SIZE);

        assert_eq!(heap.footer(free), heap.header(block));
        assert!(!heap.header(heap.epilogue()).prev_allocated());
        assert_eq!(heap.prev_free(heap.epilogue()), Some(free));

        heap.set_size_and_allocated(block, MIN_BLOCK_SIZE, true);

        assert!(heap.header(heap.epilogue()).prev_allocated());
        assert_eq!(heap.prev_free(heap.epilogue()), None);
        assert_eq!(heap.as_free(block), None);
    }

    #[test]
    fn splitting_primes_the_second_header() {
        let mut heap = heap();
        let block = heap.grow(MIN_BLOCK_SIZE * 2).unwrap();

        heap.set_size_and_allocated(block, MIN_BLOCK_SIZE, true);
        let rest = heap.mark_free(heap.next(block), MIN_BLOCK_SIZE);

        assert!(heap.header(rest.block()).prev_allocated());
        assert_eq!(heap.next(rest.block()), heap.epilogue());
        assert_eq!(heap.prev_free(heap.epilogue()), Some(rest));
    }

    #[test]
    fn payload_access() {
        let mut heap = heap();
        let block = heap.grow(MIN_BLOCK_SIZE).unwrap();
        let payload = block.payload();

        assert_eq!(heap.usable_size(payload), MIN_BLOCK_SIZE - HEADER_SIZE);
        assert_eq!(payload.offset() % WORD_SIZE, 0);

        heap.payload_mut(payload).fill(0xAB);

        assert!(heap.payload(payload).iter().all(|byte| *byte == 0xAB));
        assert_eq!(heap.payload_ptr(payload).as_ptr() as usize % WORD_SIZE, 0);
        // The epilogue survives a full payload write.
        assert_eq!(heap.block_size(heap.epilogue()), SENTINEL_SIZE);
    }
}
