use crate::{block::Payload, heap::Heap, region::HeapSource};

impl<S: HeapSource> Heap<S> {
    /// Gives the allocation at `payload` back to the heap. `None` is a
    /// no-op.
    ///
    /// The heap does not check that `payload` is a live allocation of this
    /// heap. Freeing anything else corrupts the heap.
    pub fn free(&mut self, payload: Option<Payload>) {
        let Some(payload) = payload else {
            return;
        };

        let block = payload.block();
        let size = self.block_size(block);
        debug_assert!(self.is_allocated(block), "double free of {payload:?}");

        let free = self.mark_free(block, size);
        self.insert_free_block(free);
        let survivor = self.coalesce(free);

        log::trace!(
            "free({payload:?}) -> free block at {} of {} bytes",
            survivor.offset(),
            self.block_size(survivor.block())
        );
    }
}
