use crate::{block::FreeBlock, heap::Heap, region::HeapSource};

impl<S: HeapSource> Heap<S> {
    /// Merges `block`, which must already be on the free list, with its free
    /// physical neighbours and returns the block that survives.
    ///
    /// ```text
    /// +------+-------+------+        +---------------------+
    /// | free | block | free |  --->  |        free         |
    /// +------+-------+------+        +---------------------+
    ///   prev           next            prev (survivor)
    /// ```
    ///
    /// The next block is absorbed first, then the previous block absorbs
    /// us. Both checks always run, so whatever the order blocks were freed
    /// in, a free run ends up as a single block starting at its lowest
    /// address.
    pub(crate) fn coalesce(&mut self, block: FreeBlock) -> FreeBlock {
        let next = self.next(block.block());

        if let Some(next) = self.as_free(next) {
            self.remove_free_block(next);

            let size = self.block_size(block.block()) + self.block_size(next.block());
            self.set_size(block.block(), size);
        }

        let Some(prev) = self.prev_free(block.block()) else {
            return block;
        };

        self.remove_free_block(block);

        let size = self.block_size(prev.block()) + self.block_size(block.block());
        self.set_size(prev.block(), size);

        prev
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        block::{Block, FreeBlock, MIN_BLOCK_SIZE},
        config::HeapConfig,
        heap::Heap,
    };

    /// Three adjacent allocated blocks of the minimum size, followed by an
    /// allocated fence so nothing ever merges into the epilogue area.
    fn three_blocks() -> (Heap, [Block; 3]) {
        let mut heap = Heap::new(HeapConfig::new().with_max_heap_size(4096)).unwrap();
        let blocks = [
            heap.grow(MIN_BLOCK_SIZE).unwrap(),
            heap.grow(MIN_BLOCK_SIZE).unwrap(),
            heap.grow(MIN_BLOCK_SIZE).unwrap(),
        ];
        heap.grow(MIN_BLOCK_SIZE).unwrap();

        (heap, blocks)
    }

    fn release(heap: &mut Heap, block: Block) -> FreeBlock {
        let size = heap.block_size(block);
        let free = heap.mark_free(block, size);
        heap.insert_free_block(free);

        heap.coalesce(free)
    }

    #[test]
    fn lone_block_stays_put() {
        let (mut heap, blocks) = three_blocks();

        let survivor = release(&mut heap, blocks[1]);

        assert_eq!(survivor.block(), blocks[1]);
        assert_eq!(heap.block_size(blocks[1]), MIN_BLOCK_SIZE);
        assert_eq!(heap.free_list().count(), 1);
    }

    #[test]
    fn merges_with_next() {
        let (mut heap, blocks) = three_blocks();

        release(&mut heap, blocks[2]);
        let survivor = release(&mut heap, blocks[1]);

        assert_eq!(survivor.block(), blocks[1]);
        assert_eq!(heap.block_size(blocks[1]), MIN_BLOCK_SIZE * 2);
        assert_eq!(heap.footer(survivor), heap.header(blocks[1]));
        assert_eq!(heap.free_list().collect::<Vec<_>>(), vec![survivor]);
    }

    #[test]
    fn merges_with_prev() {
        let (mut heap, blocks) = three_blocks();

        release(&mut heap, blocks[0]);
        let survivor = release(&mut heap, blocks[1]);

        assert_eq!(survivor.block(), blocks[0]);
        assert_eq!(heap.block_size(blocks[0]), MIN_BLOCK_SIZE * 2);
        assert_eq!(heap.footer(survivor), heap.header(blocks[0]));
        assert_eq!(heap.free_list().collect::<Vec<_>>(), vec![survivor]);
    }

    #[test]
    fn merges_both_sides_into_the_lowest_block() {
        let (mut heap, blocks) = three_blocks();

        release(&mut heap, blocks[0]);
        release(&mut heap, blocks[2]);
        let survivor = release(&mut heap, blocks[1]);

        assert_eq!(survivor.block(), blocks[0]);
        assert_eq!(heap.block_size(blocks[0]), MIN_BLOCK_SIZE * 3);
        assert_eq!(heap.free_list().collect::<Vec<_>>(), vec![survivor]);
        // The fence learns that its predecessor is free now.
        assert_eq!(heap.prev_free(heap.next(blocks[0])), Some(survivor));
    }
}
