//! Heap segment abstraction
//!
//! The allocator is agnostic to where its memory comes from. The only way
//! it can obtain bytes is through [`HeapSegment::extend`], a monotonic
//! grow-by-n primitive in the style of `sbrk`: every extension yields a
//! region immediately following all previously granted bytes, and the
//! segment never shrinks.

use crate::error::AllocError;

/// A single contiguous, growable byte region.
///
/// Implementations must guarantee that `extend` appends zeroed-or-arbitrary
/// bytes at the current end and that previously granted offsets stay valid
/// forever. Failure to extend must leave the segment untouched.
pub trait HeapSegment {
    /// Grow the segment by exactly `bytes` bytes.
    ///
    /// # Returns
    /// The offset of the first newly granted byte (the old length), or
    /// [`AllocError::OutOfMemory`] if the backing store refuses to grow.
    fn extend(&mut self, bytes: usize) -> Result<usize, AllocError>;

    /// Current segment length in bytes.
    fn len(&self) -> usize;

    /// Whether the segment has been extended at all yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The segment contents.
    fn bytes(&self) -> &[u8];

    /// The segment contents, mutably.
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// [`HeapSegment`] backed by a `Vec<u8>`, with an optional hard byte limit.
///
/// The limit models a finite memory source: an extension that would cross
/// it fails with [`AllocError::OutOfMemory`] and leaves the segment
/// unchanged, which is how tests exercise the allocator's failure paths.
#[derive(Debug, Default)]
pub struct VecSegment {
    bytes: Vec<u8>,
    limit: Option<usize>,
}

impl VecSegment {
    /// Create an unlimited segment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a segment that will never grow beyond `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit: Some(limit),
        }
    }
}

impl HeapSegment for VecSegment {
    fn extend(&mut self, bytes: usize) -> Result<usize, AllocError> {
        let base = self.bytes.len();
        let new_len = base.checked_add(bytes).ok_or(AllocError::OutOfMemory)?;

        if let Some(limit) = self.limit {
            if new_len > limit {
                return Err(AllocError::OutOfMemory);
            }
        }

        self.bytes.resize(new_len, 0);
        Ok(base)
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
