//! # mmheap
//!
//! An explicit free list heap allocator with boundary tags.
//!
//! The heap lives in a single contiguous region that only grows at its high
//! end, like memory obtained with `sbrk`. Blocks are laid out back to back
//! between two sentinels:
//!
//! ```text
//!  prologue   allocated      free                allocated  epilogue
//! +--------+-----------+----------------------+-----------+--------+
//! | hdr|ftr| hdr| data | hdr|flink|blink|..|ftr| hdr| data | hdr|   |
//! +--------+-----------+----------------------+-----------+--------+
//! ```
//!
//! - Every block starts with a header word holding its size, whether it is
//!   allocated and whether the block before it is allocated.
//! - Free blocks repeat the header in a footer and thread a circular doubly
//!   linked list through their payload.
//! - Allocation is first fit over that list. Oversized blocks are split;
//!   when nothing fits, the heap grows.
//! - Freed blocks are merged with free neighbours right away, so there are
//!   never two free blocks next to each other.
//!
//! ## Usage
//!
//! ```rust
//! use mmheap::{Heap, HeapConfig};
//!
//! let mut heap = Heap::new(HeapConfig::default())?;
//!
//! let payload = heap.allocate(16)?;
//! heap.payload_mut(payload)[..5].copy_from_slice(b"hello");
//!
//! let payload = heap.reallocate(Some(payload), 256)?.unwrap();
//! assert_eq!(&heap.payload(payload)[..5], b"hello");
//!
//! heap.free(Some(payload));
//! heap.check()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Allocations are handed out as [`Payload`] handles, offsets into the heap,
//! rather than raw pointers. [`Heap::payload_ptr`] converts one into a
//! pointer when needed.
//!
//! The heap is single threaded. Share it between threads by wrapping it in a
//! lock.

mod allocate;
mod block;
mod check;
mod coalesce;
mod config;
mod deallocate;
mod error;
mod freelist;
mod heap;
mod kernel;
mod reallocate;
mod region;
pub mod utils;


pub use block::Payload;
pub use check::{BlockInfo, Blocks, HeapStats};
pub use config::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_HEAP_SIZE, HeapConfig};
pub use error::{CheckError, HeapError};
pub use heap::Heap;
pub use region::{HeapSource, MappedRegion};
