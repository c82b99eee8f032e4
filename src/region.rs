use std::{ptr::NonNull, slice};

use crate::{
    error::HeapError,
    kernel::{page_size, request_memory, return_memory},
    utils::checked_align,
};

/// The heap-growth primitive. A source behaves like `sbrk`: it owns a
/// contiguous byte range that only ever grows at its high end.
///
/// Offsets handed out by [`HeapSource::extend`] stay valid for the lifetime
/// of the source, even if the bytes themselves move.
pub trait HeapSource {
    /// Appends `delta` bytes to the end of the source and returns the offset
    /// of the first new byte, which is always the previous [`len`].
    ///
    /// On failure nothing changes.
    ///
    /// [`len`]: HeapSource::len
    fn extend(&mut self, delta: usize) -> Result<usize, HeapError>;

    /// Bytes handed out so far.
    fn bytes(&self) -> &[u8];

    fn bytes_mut(&mut self) -> &mut [u8];

    fn len(&self) -> usize {
        self.bytes().len()
    }
}

/// A fixed reservation obtained from the platform in one go. The break
/// starts at 0 and moves up on every [`HeapSource::extend`] until the
/// reservation is used up.
///
/// ```text
/// base                      base + brk            base + capacity
/// +--------------------------+-----------------------+
/// |    handed out (heap)     |       reserved        |
/// +--------------------------+-----------------------+
/// ```
///
/// Reserving everything up front keeps the heap at a fixed address, so
/// pointers obtained through [`crate::Heap::payload_ptr`] stay valid while
/// the heap grows.
pub struct MappedRegion {
    /// Start of the mapping returned by the platform.
    base: NonNull<u8>,
    /// Length of the mapping, a multiple of the page size.
    mapped: usize,
    /// Bytes that may be handed out, at most `mapped`.
    capacity: usize,
    /// Current break.
    brk: usize,
}

// The region exclusively owns its mapping.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Reserves `capacity` bytes. The mapping is rounded up to the page size
    /// but never more than `capacity` bytes are handed out.
    ///
    /// Fails with [`HeapError::MapFailed`] when the platform refuses or
    /// `capacity` cannot be rounded up to whole pages.
    pub fn reserve(capacity: usize) -> Result<Self, HeapError> {
        let mapped = checked_align(capacity.max(1), page_size())
            .ok_or(HeapError::MapFailed { len: capacity })?;

        // SAFETY: the mapping is released exactly once, in `Drop`.
        let base = unsafe { request_memory(mapped) }
            .ok_or(HeapError::MapFailed { len: mapped })?;

        log::debug!("reserved {mapped} bytes at {base:p} for a heap of {capacity} bytes");

        Ok(Self {
            base,
            mapped,
            capacity,
            brk: 0,
        })
    }

    /// Total bytes this region can hand out.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes still available to [`HeapSource::extend`].
    pub fn remaining(&self) -> usize {
        self.capacity - self.brk
    }
}

impl HeapSource for MappedRegion {
    fn extend(&mut self, delta: usize) -> Result<usize, HeapError> {
        if delta > self.remaining() {
            return Err(HeapError::HeapExhausted {
                requested: delta,
                available: self.remaining(),
            });
        }

        let old_brk = self.brk;
        self.brk += delta;

        Ok(old_brk)
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: `[base, base + brk)` lies inside our mapping, which the
        // platform zero-filled, and is borrowed through `&self`.
        unsafe { slice::from_raw_parts(self.base.as_ptr(), self.brk) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: same as `bytes`, and `&mut self` makes the borrow unique.
        unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.brk) }
    }

    fn len(&self) -> usize {
        self.brk
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: every borrow of the mapping is tied to `self`.
        unsafe { return_memory(self.base, self.mapped) }
    }
}
