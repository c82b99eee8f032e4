use thiserror::Error;

/// Errors reported by the heap to the immediate caller.
///
/// Handing a foreign or already freed [`crate::Payload`] to the heap is not
/// an error the heap can detect; it is undefined behaviour of the allocator.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// Someone asked for 0 bytes.
    #[error("requested an allocation of zero bytes")]
    ZeroSizeRequest,

    /// The heap source cannot grow by `requested` bytes. `available` is what
    /// it could still hand out.
    #[error("heap exhausted: cannot grow by {requested} bytes, {available} bytes left")]
    HeapExhausted { requested: usize, available: usize },

    /// The platform refused to map the backing region.
    #[error("platform refused to map {len} bytes")]
    MapFailed { len: usize },
}

/// First invariant violation found by [`crate::Heap::check`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("block at {offset} has a size of {size} which is not a multiple of the word size")]
    Misaligned { offset: usize, size: usize },

    #[error("block at {offset} is {size} bytes, below the minimum block size")]
    TooSmall { offset: usize, size: usize },

    #[error("block at {offset} runs past the epilogue at {epilogue}")]
    Overrun { offset: usize, epilogue: usize },

    #[error("corrupted sentinel at {offset}")]
    Sentinel { offset: usize },

    #[error("free block at {offset} has header {header:#x} but footer {footer:#x}")]
    FooterMismatch { offset: usize, header: usize, footer: usize },

    #[error("block at {offset} caches the wrong allocated state of its predecessor")]
    PrevAllocated { offset: usize },

    #[error("free blocks at {first} and {second} are adjacent")]
    Uncoalesced { first: usize, second: usize },

    #[error("free list link of {offset} is broken")]
    BrokenLink { offset: usize },

    #[error("free list holds {listed} blocks but the heap has {free} free blocks")]
    FreeListMismatch { listed: usize, free: usize },
}
