//! Helper functions for the heap that don't belong to any concrete module.

use std::mem;

/// Size of a machine word. Block sizes, headers, footers and free list
/// links are all measured in words.
pub const WORD_SIZE: usize = mem::size_of::<usize>();

/// It aligns `to_be_aligned` using `aligment`, which must be a power of two.
/// Returns `None` instead of overflowing when `to_be_aligned` is close to
/// `usize::MAX`.
///
/// Used to round reservations up to the page size and request sizes up to
/// [`WORD_SIZE`].
pub fn checked_align(to_be_aligned: usize, aligment: usize) -> Option<usize> {
    to_be_aligned
        .checked_add(aligment - 1)
        .map(|size| size & !(aligment - 1))
}

/// [`checked_align`] to [`WORD_SIZE`].
pub fn checked_align_word(size: usize) -> Option<usize> {
    checked_align(size, WORD_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_pointer_size() {
        let aligments = vec![(1..8, 8), (9..16, 16), (17..24, 24), (25..32, 32)];

        for (sizes, expected) in aligments {
            for size in sizes {
                assert_eq!(Some(expected), checked_align(size, 8));
            }
        }
    }

    #[test]
    fn align_page_size() {
        // For testing purposes we are assuming the page size is 4096
        let aligments = vec![(1..4096, 4096), (4097..8192, 8192)];

        for (sizes, expected) in aligments {
            for size in sizes {
                assert_eq!(Some(expected), checked_align(size, 4096))
            }
        }
    }

    #[test]
    fn word_alignment_matches_generic_alignment() {
        for size in 0..(WORD_SIZE * 10) {
            assert_eq!(checked_align(size, WORD_SIZE), checked_align_word(size));
        }
    }

    #[test]
    fn checked_align_overflow() {
        assert_eq!(None, checked_align_word(usize::MAX));
        assert_eq!(None, checked_align_word(usize::MAX - WORD_SIZE + 2));
        assert_eq!(None, checked_align(usize::MAX - 4094, 4096));
        assert_eq!(Some(usize::MAX - 4095), checked_align(usize::MAX - 4095, 4096));
    }
}
