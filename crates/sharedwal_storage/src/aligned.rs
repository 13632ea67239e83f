//! Alignment-padded byte buffers.

use crate::error::{StorageError, StorageResult};

/// Rounds `len` up to the next multiple of `align`.
///
/// An alignment of 0 or 1 leaves `len` unchanged.
#[must_use]
pub const fn align_up(len: usize, align: usize) -> usize {
    if align <= 1 {
        return len;
    }
    len.div_ceil(align) * align
}

/// A zero-filled byte buffer whose usable view starts on an alignment boundary.
///
/// The backing allocation is over-sized by `align` bytes and the view is
/// placed at the first aligned address inside it. The heap allocation is
/// never resized, so the view stays aligned for the buffer's lifetime and
/// is released when the buffer is dropped.
///
/// # Example
///
/// ```rust
/// use sharedwal_storage::AlignedBuf;
///
/// let buf = AlignedBuf::new(65536, 512).unwrap();
/// assert_eq!(buf.len(), 65536);
/// assert!(buf.is_aligned());
/// ```
pub struct AlignedBuf {
    backing: Vec<u8>,
    offset: usize,
    len: usize,
    align: usize,
}

impl AlignedBuf {
    /// Allocates `len` usable bytes aligned to `align`.
    ///
    /// An alignment of 0 or 1 means no alignment requirement.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidAlignment`] if `align` is not zero
    /// and not a power of two.
    pub fn new(len: usize, align: usize) -> StorageResult<Self> {
        if align > 1 && !align.is_power_of_two() {
            return Err(StorageError::InvalidAlignment(align));
        }

        let backing = vec![0u8; len + align];
        let offset = if align <= 1 {
            0
        } else {
            backing.as_ptr().align_offset(align)
        };

        if offset > align {
            return Err(StorageError::InvalidAlignment(align));
        }

        Ok(Self {
            backing,
            offset,
            len,
            align,
        })
    }

    /// Returns the usable length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the usable view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the requested alignment.
    #[must_use]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Returns `true` if the usable view starts on the requested boundary.
    #[must_use]
    pub fn is_aligned(&self) -> bool {
        self.align <= 1 || (self.as_slice().as_ptr() as usize) % self.align == 0
    }

    /// Returns the usable view.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.backing[self.offset..self.offset + self.len]
    }

    /// Returns the usable view mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.backing[self.offset..self.offset + self.len]
    }
}

impl std::fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuf")
            .field("len", &self.len)
            .field("align", &self.align)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn align_up_rounds() {
        assert_eq!(align_up(20, 32), 32);
        assert_eq!(align_up(32, 32), 32);
        assert_eq!(align_up(33, 32), 64);
        assert_eq!(align_up(0, 32), 0);
        assert_eq!(align_up(7, 0), 7);
        assert_eq!(align_up(7, 1), 7);
    }

    #[test]
    fn buffer_is_zeroed_and_aligned() {
        let buf = AlignedBuf::new(4096, 512).unwrap();
        assert!(buf.is_aligned());
        assert_eq!(buf.len(), 4096);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_alignment_means_unaligned() {
        let buf = AlignedBuf::new(100, 0).unwrap();
        assert_eq!(buf.len(), 100);
        assert!(buf.is_aligned());
    }

    #[test]
    fn non_power_of_two_rejected() {
        let result = AlignedBuf::new(64, 24);
        assert!(matches!(result, Err(StorageError::InvalidAlignment(24))));
    }

    #[test]
    fn writes_are_visible() {
        let mut buf = AlignedBuf::new(16, 8).unwrap();
        buf.as_mut_slice().copy_from_slice(&[0xAB; 16]);
        assert_eq!(buf.as_slice(), &[0xAB; 16]);
    }

    proptest! {
        #[test]
        fn view_always_aligned(len in 0usize..8192, shift in 0u32..13) {
            let align = 1usize << shift;
            let buf = AlignedBuf::new(len, align).unwrap();
            prop_assert!(buf.is_aligned());
            prop_assert_eq!(buf.as_slice().len(), len);
        }
    }
}
