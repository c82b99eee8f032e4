//! Heap consistency checking and introspection.

use std::collections::HashSet;

use crate::{
    block::{Block, FreeBlock, MIN_BLOCK_SIZE, SENTINEL_SIZE},
    error::CheckError,
    heap::Heap,
    region::HeapSource,
    utils::WORD_SIZE,
};

/// A block as seen from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Offset of the header from the start of the heap.
    pub offset: usize,
    /// Total size, metadata included.
    pub size: usize,
    pub allocated: bool,
}

/// Summary of the heap, see [`Heap::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes taken from the source, sentinels included.
    pub heap_size: usize,
    pub allocated_bytes: usize,
    pub allocated_blocks: usize,
    pub free_bytes: usize,
    pub free_blocks: usize,
}

/// Walks the blocks between the prologue and the epilogue in address
/// order.
pub struct Blocks<'a, S: HeapSource> {
    heap: &'a Heap<S>,
    current: Block,
}

impl<S: HeapSource> Iterator for Blocks<'_, S> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.offset() >= self.heap.epilogue().offset() {
            return None;
        }

        let header = self.heap.header(self.current);
        let info = BlockInfo {
            offset: self.current.offset(),
            size: header.size(),
            allocated: header.is_allocated(),
        };

        // A zero sized block would keep us here forever.
        self.current = if header.size() == 0 {
            self.heap.epilogue()
        } else {
            Block::at(self.current.offset() + header.size())
        };

        Some(info)
    }
}

impl<S: HeapSource> Heap<S> {
    /// Every block of the heap in address order, sentinels excluded.
    pub fn blocks(&self) -> Blocks<'_, S> {
        Blocks {
            heap: self,
            current: self.next(self.prologue()),
        }
    }

    /// The free list in list order, starting at the head. The first entry
    /// is where the next allocation starts searching.
    pub fn free_blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        self.free_list().map(|block| BlockInfo {
            offset: block.offset(),
            size: self.block_size(block.block()),
            allocated: false,
        })
    }

    pub fn stats(&self) -> HeapStats {
        self.blocks().fold(
            HeapStats {
                heap_size: self.heap_size(),
                ..HeapStats::default()
            },
            |mut stats, block| {
                if block.allocated {
                    stats.allocated_bytes += block.size;
                    stats.allocated_blocks += 1;
                } else {
                    stats.free_bytes += block.size;
                    stats.free_blocks += 1;
                }
                stats
            },
        )
    }

    /// Verifies every invariant the heap relies on and reports the first
    /// violation:
    ///
    /// - sentinels are intact and the blocks between them tile the heap,
    /// - block sizes are word multiples of at least [`MIN_BLOCK_SIZE`],
    /// - free blocks have a footer equal to their header,
    /// - every header caches the allocated state of its predecessor,
    /// - no two free blocks are adjacent,
    /// - the free list is a well formed circular list holding exactly the
    ///   free blocks.
    pub fn check(&self) -> Result<(), CheckError> {
        self.check_sentinel(self.prologue())?;
        let prologue_footer = self.read_word(self.prologue().offset() + WORD_SIZE);
        if prologue_footer != self.header(self.prologue()).word() {
            return Err(CheckError::Sentinel {
                offset: self.prologue().offset(),
            });
        }

        let epilogue = self.epilogue();
        let mut free = HashSet::new();
        let mut prev = self.prologue();
        let mut prev_allocated = true;
        let mut block = self.next(prev);

        while block != epilogue {
            let header = self.header(block);
            let offset = block.offset();
            let size = header.size();

            if size % WORD_SIZE != 0 {
                return Err(CheckError::Misaligned { offset, size });
            }
            if size < MIN_BLOCK_SIZE {
                return Err(CheckError::TooSmall { offset, size });
            }
            if offset + size > epilogue.offset() {
                return Err(CheckError::Overrun {
                    offset,
                    epilogue: epilogue.offset(),
                });
            }
            if header.prev_allocated() != prev_allocated {
                return Err(CheckError::PrevAllocated { offset });
            }

            if let Some(free_block) = self.as_free(block) {
                let footer = self.footer(free_block);
                if footer != header {
                    return Err(CheckError::FooterMismatch {
                        offset,
                        header: header.word(),
                        footer: footer.word(),
                    });
                }
                if !prev_allocated {
                    return Err(CheckError::Uncoalesced {
                        first: prev.offset(),
                        second: offset,
                    });
                }

                free.insert(free_block);
            }

            prev = block;
            prev_allocated = header.is_allocated();
            block = Block::at(offset + size);
        }

        self.check_sentinel(epilogue)?;
        if self.header(epilogue).prev_allocated() != prev_allocated
            || epilogue.offset() + SENTINEL_SIZE != self.heap_size()
        {
            return Err(CheckError::Sentinel {
                offset: epilogue.offset(),
            });
        }

        self.check_free_list(&free)
    }

    fn check_sentinel(&self, sentinel: Block) -> Result<(), CheckError> {
        let header = self.header(sentinel);

        if header.size() != SENTINEL_SIZE || !header.is_allocated() {
            return Err(CheckError::Sentinel {
                offset: sentinel.offset(),
            });
        }

        Ok(())
    }

    fn check_free_list(&self, free: &HashSet<FreeBlock>) -> Result<(), CheckError> {
        let Some(head) = self.free_head else {
            return match free.len() {
                0 => Ok(()),
                n => Err(CheckError::FreeListMismatch { listed: 0, free: n }),
            };
        };

        let mut visited = HashSet::new();
        let mut current = head;

        loop {
            if !free.contains(&current) || !visited.insert(current) {
                return Err(CheckError::BrokenLink {
                    offset: current.offset(),
                });
            }

            let next = self.flink(current);
            if !free.contains(&next) || self.blink(next) != current {
                return Err(CheckError::BrokenLink {
                    offset: current.offset(),
                });
            }

            if next == head {
                break;
            }
            current = next;
        }

        if visited.len() != free.len() {
            return Err(CheckError::FreeListMismatch {
                listed: visited.len(),
                free: free.len(),
            });
        }

        Ok(())
    }
}
