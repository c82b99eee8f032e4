use crate::{
    allocate::needed_size,
    block::{Block, HEADER_SIZE, MIN_BLOCK_SIZE, Payload},
    error::HeapError,
    heap::Heap,
    region::HeapSource,
};

impl<S: HeapSource> Heap<S> {
    /// Resizes the allocation at `payload` to at least `size` bytes.
    ///
    /// - `None` behaves like [`Heap::allocate`].
    /// - A `size` of 0 frees the allocation and returns `Ok(None)`.
    /// - Shrinking gives the surplus to a free neighbour when there is one,
    ///   splits it off when it is large enough to be a block, and otherwise
    ///   keeps the block as it is.
    /// - Growing absorbs the next block when it is free and large enough,
    ///   otherwise the contents move to a fresh allocation.
    ///
    /// The first `min(old, new)` payload bytes are preserved whenever the
    /// allocation moves. On error the original allocation is untouched.
    pub fn reallocate(
        &mut self,
        payload: Option<Payload>,
        size: usize,
    ) -> Result<Option<Payload>, HeapError> {
        let Some(payload) = payload else {
            return self.allocate(size).map(Some);
        };

        if size == 0 {
            log::trace!("reallocate({payload:?}, 0) frees the block");
            self.free(Some(payload));
            return Ok(None);
        }

        let needed = needed_size(size)?;
        let current = self.block_size(payload.block());

        let result = if needed < current {
            self.shrink(payload.block(), current, needed)
        } else if needed > current {
            self.enlarge(payload, current, needed, size)?
        } else {
            payload
        };

        log::trace!("reallocate({payload:?}, {size}) -> {result:?}");

        Ok(Some(result))
    }

    fn shrink(&mut self, block: Block, current: usize, needed: usize) -> Payload {
        let next = self.next(block);

        if let Some(next) = self.as_free(next) {
            // Hand the surplus to the free block that follows us.
            let combined = current + self.block_size(next.block());
            self.remove_free_block(next);
            self.set_size_and_allocated(block, needed, true);
            self.release_tail(self.next(block), combined - needed);

            return block.payload();
        }

        if let Some(prev) = self.prev_free(block) {
            // Slide to the high end of the merged region so the surplus
            // joins the free block in front of us.
            let combined = self.block_size(prev.block()) + current;
            let free_size = combined - needed;
            let moved = Block::at(prev.offset() + free_size);

            self.remove_free_block(prev);
            self.copy_within(
                block.payload().offset(),
                moved.payload().offset(),
                needed - HEADER_SIZE,
            );

            let prev = self.mark_free(prev.block(), free_size);
            self.set_size_and_allocated(moved, needed, true);
            self.insert_free_block(prev);
            self.coalesce(prev);

            return moved.payload();
        }

        if current - needed >= MIN_BLOCK_SIZE {
            self.set_size_and_allocated(block, needed, true);
            self.release_tail(self.next(block), current - needed);
        }

        block.payload()
    }

    fn enlarge(
        &mut self,
        payload: Payload,
        current: usize,
        needed: usize,
        size: usize,
    ) -> Result<Payload, HeapError> {
        let block = payload.block();
        let next = self.next(block);

        if let Some(next) = self.as_free(next) {
            let combined = current + self.block_size(next.block());

            if combined >= needed {
                self.remove_free_block(next);

                if combined - needed >= MIN_BLOCK_SIZE {
                    self.set_size_and_allocated(block, needed, true);
                    self.release_tail(self.next(block), combined - needed);
                } else {
                    self.set_size_and_allocated(block, combined, true);
                }

                return Ok(payload);
            }
        }

        let moved = self.allocate(size)?;
        self.copy_within(payload.offset(), moved.offset(), current - HEADER_SIZE);
        self.free(Some(payload));

        Ok(moved)
    }
}
