use crate::utils::WORD_SIZE;

/// Bytes of metadata an allocated block carries: just its header.
pub(crate) const HEADER_SIZE: usize = WORD_SIZE;

/// Header plus footer, what a free block spends on boundary tags.
pub(crate) const TAGS_SIZE: usize = 2 * WORD_SIZE;

/// Smallest block that can be freed in place: header, forward link,
/// backward link and footer.
pub(crate) const MIN_BLOCK_SIZE: usize = TAGS_SIZE + 2 * WORD_SIZE;

/// The prologue and epilogue are bare boundary tags.
pub(crate) const SENTINEL_SIZE: usize = TAGS_SIZE;

const ALLOCATED: usize = 0b01;
const PREV_ALLOCATED: usize = 0b10;
const FLAGS: usize = ALLOCATED | PREV_ALLOCATED;

/// A decoded header (or footer) word.
///
/// Sizes are always multiples of [`WORD_SIZE`], which leaves at least the
/// two low bits of the word free:
///
/// ```text
///  word - 1                                    2       1       0
/// +---------------------------------------------+-------+-------+
/// |              size (bytes, incl. tags)       | prev  | alloc |
/// +---------------------------------------------+-------+-------+
/// ```
///
/// `alloc` is the state of the block itself, `prev` caches the state of the
/// physically preceding block. Only free blocks carry a footer, so the
/// `prev` bit is what tells us whether there is a footer right before our
/// header that we can read to find the previous block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header(usize);

impl Header {
    #[inline]
    pub fn new(size: usize, allocated: bool, prev_allocated: bool) -> Self {
        debug_assert_eq!(size & FLAGS, 0, "block size {size} is not word aligned");

        let mut word = size;
        if allocated {
            word |= ALLOCATED;
        }
        if prev_allocated {
            word |= PREV_ALLOCATED;
        }

        Self(word)
    }

    #[inline]
    pub fn from_word(word: usize) -> Self {
        Self(word)
    }

    #[inline]
    pub fn word(self) -> usize {
        self.0
    }

    #[inline]
    pub fn size(self) -> usize {
        self.0 & !FLAGS
    }

    #[inline]
    pub fn is_allocated(self) -> bool {
        self.0 & ALLOCATED != 0
    }

    #[inline]
    pub fn prev_allocated(self) -> bool {
        self.0 & PREV_ALLOCATED != 0
    }

    #[inline]
    pub fn with_prev_allocated(self, prev_allocated: bool) -> Self {
        Self::new(self.size(), self.is_allocated(), prev_allocated)
    }
}

/// Any block of the heap, identified by the offset of its header.
///
/// ```text
/// +----------------+ <- offset
/// |     header     |
/// +----------------+ <- payload
/// |                |
/// |    payload     |
/// |                |
/// +----------------+ <- offset + size
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Block(usize);

impl Block {
    #[inline]
    pub fn at(offset: usize) -> Self {
        Self(offset)
    }

    #[inline]
    pub fn offset(self) -> usize {
        self.0
    }

    #[inline]
    pub fn payload(self) -> Payload {
        Payload(self.0 + HEADER_SIZE)
    }
}

/// A block whose allocated bit is clear. The only way to get one is from
/// [`crate::Heap`], which checks the bit, so the free list links are never
/// read out of a live allocation.
///
/// A free block reuses the start of its payload for the links and mirrors
/// its header at the end:
///
/// ```text
/// +----------------+ <- offset
/// |     header     |
/// +----------------+
/// |  forward link  |
/// +----------------+
/// |  backward link |
/// +----------------+
/// |      ...       |
/// +----------------+
/// |     footer     |
/// +----------------+ <- offset + size
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct FreeBlock(usize);

impl FreeBlock {
    /// Caller guarantees the allocated bit of the block is clear.
    #[inline]
    pub(crate) fn new_unchecked(block: Block) -> Self {
        Self(block.0)
    }

    #[inline]
    pub fn block(self) -> Block {
        Block(self.0)
    }

    #[inline]
    pub fn offset(self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) fn flink_offset(self) -> usize {
        self.0 + HEADER_SIZE
    }

    #[inline]
    pub(crate) fn blink_offset(self) -> usize {
        self.0 + HEADER_SIZE + WORD_SIZE
    }
}

/// Handle to an allocation, as returned by [`crate::Heap::allocate`].
///
/// This is the byte offset of the payload inside the heap. Payloads are
/// always word aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(usize);

impl Payload {
    /// Offset of the first payload byte from the start of the heap.
    #[inline]
    pub fn offset(self) -> usize {
        self.0
    }

    #[inline]
    pub(crate) fn block(self) -> Block {
        Block(self.0 - HEADER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_packs_size_and_flags() {
        let header = Header::new(64, true, false);

        assert_eq!(header.word(), 64 | ALLOCATED);
        assert_eq!(header.size(), 64);
        assert!(header.is_allocated());
        assert!(!header.prev_allocated());

        let header = Header::new(64, false, true);

        assert_eq!(header.word(), 64 | PREV_ALLOCATED);
        assert_eq!(header.size(), 64);
        assert!(!header.is_allocated());
        assert!(header.prev_allocated());
    }

    #[test]
    fn header_round_trips_through_word() {
        let header = Header::new(MIN_BLOCK_SIZE * 3, true, true);

        assert_eq!(Header::from_word(header.word()), header);
    }

    #[test]
    fn with_prev_allocated_keeps_the_rest() {
        let header = Header::new(48, false, false).with_prev_allocated(true);

        assert_eq!(header.size(), 48);
        assert!(!header.is_allocated());
        assert!(header.prev_allocated());
    }

    #[test]
    fn payload_and_block_convert() {
        let block = Block::at(SENTINEL_SIZE);

        assert_eq!(block.payload().offset(), SENTINEL_SIZE + HEADER_SIZE);
        assert_eq!(block.payload().block(), block);
    }

    #[test]
    fn free_block_links_live_in_the_payload() {
        let block = FreeBlock::new_unchecked(Block::at(32));

        assert_eq!(block.flink_offset(), block.block().payload().offset());
        assert_eq!(block.blink_offset(), block.flink_offset() + WORD_SIZE);
        assert!(block.blink_offset() + WORD_SIZE <= 32 + MIN_BLOCK_SIZE - WORD_SIZE);
    }
}
