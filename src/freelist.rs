use crate::{
    block::{Block, FreeBlock},
    heap::Heap,
    region::HeapSource,
};

/// Circular doubly linked list of free blocks.
///
/// The list does not own any storage: the links live in the payload of the
/// free blocks themselves, which nobody uses while the block is free. The
/// heap only remembers one member, the head.
///
/// ```text
///            +-------------------------------------------+
///            v                                           |
///       +--------+   flink   +--------+   flink   +--------+
/// head  |  Free  | --------> |  Free  | --------> |  Free  |
/// ----> | block  | <-------- | block  | <-------- | block  |
///       +--------+   blink   +--------+   blink   +--------+
///            |                                           ^
///            +-------------------------------------------+
/// ```
///
/// Blocks are neither sorted by address nor by size. A freshly inserted
/// block becomes the head, so the first-fit search looks at the most
/// recently freed blocks first.
impl<S: HeapSource> Heap<S> {
    #[inline]
    pub(crate) fn flink(&self, block: FreeBlock) -> FreeBlock {
        self.link(block.flink_offset())
    }

    #[inline]
    pub(crate) fn blink(&self, block: FreeBlock) -> FreeBlock {
        self.link(block.blink_offset())
    }

    #[inline]
    pub(crate) fn set_flink(&mut self, block: FreeBlock, flink: FreeBlock) {
        self.write_word(block.flink_offset(), flink.offset());
    }

    #[inline]
    pub(crate) fn set_blink(&mut self, block: FreeBlock, blink: FreeBlock) {
        self.write_word(block.blink_offset(), blink.offset());
    }

    #[inline]
    fn link(&self, offset: usize) -> FreeBlock {
        FreeBlock::new_unchecked(Block::at(self.read_word(offset)))
    }

    /// Links `block` right before the current head and makes it the new
    /// head. An empty list becomes a list of one block pointing at itself.
    pub(crate) fn insert_free_block(&mut self, block: FreeBlock) {
        match self.free_head {
            None => {
                self.set_flink(block, block);
                self.set_blink(block, block);
            }
            Some(head) => {
                let last = self.blink(head);

                self.set_flink(block, head);
                self.set_blink(block, last);
                self.set_flink(last, block);
                self.set_blink(head, block);
            }
        }

        self.free_head = Some(block);
    }

    /// Unlinks `block` from the list. If it was the head, the head moves to
    /// its forward neighbour, or the list becomes empty if `block` was the
    /// only member.
    pub(crate) fn remove_free_block(&mut self, block: FreeBlock) {
        let next = self.flink(block);

        if next == block {
            self.free_head = None;
            return;
        }

        let prev = self.blink(block);
        self.set_flink(prev, next);
        self.set_blink(next, prev);

        if self.free_head == Some(block) {
            self.free_head = Some(next);
        }
    }

    /// First fit: walks the list once starting at the head and returns the
    /// first block of at least `size` bytes.
    pub(crate) fn find_free_block(&self, size: usize) -> Option<FreeBlock> {
        self.free_list().find(|block| self.block_size(block.block()) >= size)
    }

    /// Iterates the free list once in forward order, starting at the head.
    pub(crate) fn free_list(&self) -> FreeListIter<'_, S> {
        FreeListIter {
            heap: self,
            current: self.free_head,
        }
    }
}

pub(crate) struct FreeListIter<'a, S: HeapSource> {
    heap: &'a Heap<S>,
    current: Option<FreeBlock>,
}

impl<S: HeapSource> Iterator for FreeListIter<'_, S> {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<Self::Item> {
        let block = self.current?;
        let next = self.heap.flink(block);

        // Stop once we are back at the head.
        self.current = if Some(next) == self.heap.free_head {
            None
        } else {
            Some(next)
        };

        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        block::{FreeBlock, MIN_BLOCK_SIZE},
        config::HeapConfig,
        heap::Heap,
    };

    /// Carves the heap into free blocks of the given sizes without linking
    /// them. Allocated spacers keep them from being adjacent.
    fn carve(heap: &mut Heap, sizes: &[usize]) -> Vec<FreeBlock> {
        sizes
            .iter()
            .map(|size| {
                let block = heap.grow(*size).unwrap();
                heap.grow(MIN_BLOCK_SIZE).unwrap();

                heap.mark_free(block, *size)
            })
            .collect()
    }

    fn heap() -> Heap {
        Heap::new(HeapConfig::new().with_max_heap_size(4096)).unwrap()
    }

    fn forward(heap: &Heap) -> Vec<FreeBlock> {
        heap.free_list().collect()
    }

    #[test]
    fn set_links() {
        let mut heap = heap();
        let blocks = carve(&mut heap, &[32, 64]);

        heap.set_flink(blocks[0], blocks[1]);
        heap.set_blink(blocks[0], blocks[1]);

        assert_eq!(heap.flink(blocks[0]), blocks[1]);
        assert_eq!(heap.blink(blocks[0]), blocks[1]);
        // Links don't clobber the boundary tags.
        assert_eq!(heap.block_size(blocks[0].block()), 32);
        assert_eq!(heap.block_size(blocks[1].block()), 64);
        assert!(!heap.is_allocated(blocks[0].block()));
        assert_eq!(heap.footer(blocks[0]), heap.header(blocks[0].block()));
    }

    #[test]
    fn insert_into_empty_list_self_links() {
        let mut heap = heap();
        let blocks = carve(&mut heap, &[32]);

        heap.insert_free_block(blocks[0]);

        assert_eq!(heap.free_head, Some(blocks[0]));
        assert_eq!(heap.flink(blocks[0]), blocks[0]);
        assert_eq!(heap.blink(blocks[0]), blocks[0]);
    }

    #[test]
    fn insert_makes_block_the_head() {
        let mut heap = heap();
        let b = carve(&mut heap, &[32, 64, 48]);

        heap.insert_free_block(b[2]);
        heap.insert_free_block(b[1]);
        heap.insert_free_block(b[0]);

        assert_eq!(heap.free_head, Some(b[0]));
        assert_eq!(forward(&heap), vec![b[0], b[1], b[2]]);
        assert_eq!(heap.blink(b[0]), b[2]);
        assert_eq!(heap.flink(b[2]), b[0]);
    }

    #[test]
    fn remove_free_block_relinks_neighbours() {
        let mut heap = heap();
        let b = carve(&mut heap, &[32, 64, 48]);

        heap.insert_free_block(b[2]);
        heap.insert_free_block(b[1]);
        heap.insert_free_block(b[0]);

        heap.remove_free_block(b[1]);
        assert_eq!(heap.flink(b[0]), b[2]);
        assert_eq!(heap.blink(b[0]), b[2]);
        assert_eq!(heap.flink(b[2]), b[0]);
        assert_eq!(heap.blink(b[2]), b[0]);
        assert_eq!(heap.free_head, Some(b[0]));

        heap.remove_free_block(b[2]);
        assert_eq!(heap.flink(b[0]), b[0]);
        assert_eq!(heap.blink(b[0]), b[0]);
        assert_eq!(heap.free_head, Some(b[0]));

        heap.remove_free_block(b[0]);
        assert_eq!(heap.free_head, None);
        assert_eq!(forward(&heap), vec![]);
    }

    #[test]
    fn removing_the_head_advances_it() {
        let mut heap = heap();
        let b = carve(&mut heap, &[32, 64, 48, 96]);

        heap.insert_free_block(b[3]);
        heap.insert_free_block(b[2]);
        heap.insert_free_block(b[1]);
        heap.insert_free_block(b[0]);

        heap.remove_free_block(b[0]);
        assert_eq!(heap.flink(b[1]), b[2]);
        assert_eq!(heap.blink(b[1]), b[3]);
        assert_eq!(heap.flink(b[3]), b[1]);
        assert_eq!(heap.blink(b[3]), b[2]);
        assert_eq!(heap.free_head, Some(b[1]));

        heap.remove_free_block(b[1]);
        assert_eq!(heap.flink(b[2]), b[3]);
        assert_eq!(heap.blink(b[2]), b[3]);
        assert_eq!(heap.flink(b[3]), b[2]);
        assert_eq!(heap.blink(b[3]), b[2]);
        assert_eq!(heap.free_head, Some(b[2]));

        heap.remove_free_block(b[2]);
        assert_eq!(heap.flink(b[3]), b[3]);
        assert_eq!(heap.blink(b[3]), b[3]);
        assert_eq!(heap.free_head, Some(b[3]));

        heap.remove_free_block(b[3]);
        assert_eq!(heap.free_head, None);
    }

    #[test]
    fn find_free_block_is_first_fit_in_list_order() {
        let mut heap = heap();
        let b = carve(&mut heap, &[32, 96, 64]);

        heap.insert_free_block(b[2]);
        heap.insert_free_block(b[1]);
        heap.insert_free_block(b[0]);

        assert_eq!(heap.find_free_block(32), Some(b[0]));
        // 96 comes before 64 in list order even though 64 fits better.
        assert_eq!(heap.find_free_block(40), Some(b[1]));
        assert_eq!(heap.find_free_block(128), None);
        assert_eq!(heap.find_free_block(8), Some(b[0]));
    }

    #[test]
    fn empty_list_finds_nothing() {
        let heap = heap();

        assert_eq!(heap.find_free_block(MIN_BLOCK_SIZE), None);
        assert_eq!(heap.free_list().count(), 0);
    }
}
