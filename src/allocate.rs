use crate::{
    block::{Block, HEADER_SIZE, MIN_BLOCK_SIZE, Payload},
    error::HeapError,
    heap::Heap,
    region::HeapSource,
    utils::checked_align_word,
};

/// Total block size needed to hand out `size` payload bytes: the word
/// aligned payload plus the header, and never less than a block that can be
/// freed in place.
pub(crate) fn needed_size(size: usize) -> Result<usize, HeapError> {
    checked_align_word(size)
        .and_then(|aligned| aligned.checked_add(HEADER_SIZE))
        .map(|needed| needed.max(MIN_BLOCK_SIZE))
        .ok_or(HeapError::HeapExhausted {
            requested: size,
            available: 0,
        })
}

impl<S: HeapSource> Heap<S> {
    /// Allocates at least `size` bytes and returns a handle to the payload.
    ///
    /// The search goes like this:
    ///
    /// 1. First fit over the free list. A block that is larger than needed
    ///    by at least [`MIN_BLOCK_SIZE`] is split and the rest goes back to
    ///    the free list, otherwise the whole block is handed out.
    /// 2. If nothing fits but the last block before the epilogue is free,
    ///    the heap grows by just what that block is missing.
    /// 3. Otherwise the heap grows by at least [`HeapConfig::chunk_size`]
    ///    bytes and whatever is not needed now becomes a free block.
    ///
    /// A failed allocation leaves the heap exactly as it was.
    ///
    /// [`HeapConfig::chunk_size`]: crate::HeapConfig::chunk_size()
    pub fn allocate(&mut self, size: usize) -> Result<Payload, HeapError> {
        if size == 0 {
            log::trace!("allocate(0) rejected");
            return Err(HeapError::ZeroSizeRequest);
        }

        let needed = needed_size(size)?;

        if let Some(block) = self.find_free_block(needed) {
            self.remove_free_block(block);

            let payload = self.place(block.block(), needed);
            log::trace!("allocate({size}) -> {payload:?} from the free list");

            return Ok(payload);
        }

        if let Some(trailing) = self.prev_free(self.epilogue()) {
            let missing = needed - self.block_size(trailing.block());

            // Grow first, so a refusal leaves the trailing block listed.
            self.grow(missing)?;
            self.remove_free_block(trailing);
            self.set_size_and_allocated(trailing.block(), needed, true);

            let payload = trailing.block().payload();
            log::trace!("allocate({size}) -> {payload:?} by extending the trailing free block");

            return Ok(payload);
        }

        let chunk = needed.max(self.config().chunk_size());
        let delta = if chunk - needed >= MIN_BLOCK_SIZE { chunk } else { needed };

        let block = self.grow(delta)?;
        let payload = self.place(block, needed);
        log::trace!("allocate({size}) -> {payload:?} after growing the heap by {delta}");

        Ok(payload)
    }

    /// Turns `block`, which is not on the free list, into an allocation of
    /// `needed` bytes. The tail is split off and freed when it can hold a
    /// block of its own, otherwise it stays inside the allocation.
    pub(crate) fn place(&mut self, block: Block, needed: usize) -> Payload {
        let size = self.block_size(block);

        if size - needed >= MIN_BLOCK_SIZE {
            self.set_size_and_allocated(block, needed, true);
            self.release_tail(self.next(block), size - needed);
        } else {
            self.set_size_and_allocated(block, size, true);
        }

        block.payload()
    }

    /// Frees `size` bytes starting at `block` and merges them with whatever
    /// free space follows.
    pub(crate) fn release_tail(&mut self, block: Block, size: usize) {
        let rest = self.mark_free(block, size);
        self.insert_free_block(rest);
        self.coalesce(rest);
    }
}
