//! Error types for the allocator

use thiserror::Error;

/// Errors that can occur during allocation operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The heap growth primitive refused to extend the segment.
    #[error("out of memory")]
    OutOfMemory,
    /// The adjusted request size overflows or exceeds the class table.
    #[error("requested size too large")]
    RequestTooLarge,
    /// The heap was initialised over a segment that is not empty.
    #[error("segment is not empty")]
    InvalidConfig,
}

/// A single inconsistency found by the heap checker.
///
/// The checker is diagnostic only: the hot paths never produce these, but
/// caller misuse (double free, stale offsets) can be surfaced here after
/// the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CheckViolation {
    /// A block reachable from a free list has its allocated bit set.
    #[error("block at {block:#x} is allocated but sits in a free list")]
    AllocatedInFreeList { block: usize },
    /// A listed block's size does not fall in the range of its list's class.
    #[error("block at {block:#x} of size {size} is listed under class {class}")]
    WrongClass {
        block: usize,
        size: usize,
        class: usize,
    },
    /// Header and footer of a block disagree.
    #[error("header/footer mismatch at block {block:#x}")]
    HeaderFooterMismatch { block: usize },
    /// Two physically adjacent blocks are both free.
    #[error("uncoalesced free neighbours at block {block:#x}")]
    AdjacentFree { block: usize },
    /// A block header carries an impossible size (below the minimum or
    /// running past the end of the heap).
    #[error("corrupt size {size} at block {block:#x}")]
    BadSize { block: usize, size: usize },
    /// A free block in the physical chain is missing from its class list.
    #[error("free block at {block:#x} is not in its class list")]
    FreeBlockNotListed { block: usize },
    /// A list walk did not terminate within the number of physical blocks,
    /// which means the links form a cycle.
    #[error("free list for class {class} contains a cycle")]
    ListCycle { class: usize },
}
