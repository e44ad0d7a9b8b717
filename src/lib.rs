//! Segregated free-list heap allocator
//!
//! A dynamic-memory allocator over one contiguous, growable heap segment,
//! addressed entirely by byte offsets rather than raw pointers.
//!
//! # Design
//!
//! - **Boundary tags**: Every block carries its size and allocated bit in a
//!   header, mirrored in a footer, so physical neighbours can be reached in
//!   both directions for coalescing
//! - **Segregated free lists**: Free blocks are threaded onto one of 26
//!   doubly-linked lists by size class, with a near-O(1) head-probe fit
//!   search instead of a list walk
//! - **Eager coalescing**: Freed blocks merge with free physical
//!   neighbours immediately, so no two free blocks are ever adjacent
//! - **Chunked growth**: The segment is extended on demand in chunks
//!   through the [`HeapSegment`] trait, reusing a free tail block where
//!   one exists
//!
//! All state lives in the segment bytes and the [`Heap`] context object;
//! there are no globals, so independent heaps coexist freely.
//!
//! # Usage
//!
//! ```
//! use segalloc::{Heap, VecSegment};
//!
//! let mut heap = Heap::init(VecSegment::new())?;
//! let a = heap.allocate(64)?.unwrap();
//! heap.payload_mut(a).fill(0x2A);
//!
//! let a = heap.resize(Some(a), 256)?.unwrap();
//! assert_eq!(heap.payload(a)[0], 0x2A);
//!
//! heap.release(a);
//! # Ok::<(), segalloc::AllocError>(())
//! ```

#![deny(unsafe_code)]

pub mod allocator;
pub mod block;
pub mod check;
pub mod config;
pub mod error;
pub mod freelist;
pub mod segment;
pub mod size_class;
pub mod stats;

pub use allocator::Heap;
pub use block::BlockWord;
pub use error::{AllocError, CheckViolation};
pub use segment::{HeapSegment, VecSegment};
pub use stats::HeapStats;
