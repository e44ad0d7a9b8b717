//! Heap consistency checking
//!
//! A diagnostic sweep over both views of the heap: the segregated lists
//! and the physical block chain. The hot paths maintain the invariants
//! without checking them; this module re-derives them from the raw bytes
//! so tests and debugging sessions can catch corruption or caller misuse
//! after the fact.

use std::fmt::Write as _;

use crate::block::{header, next_link, read_link, read_word, BlockWord};
use crate::config::{FIRST_BLOCK_OFFSET, MIN_BLOCK_SIZE, NUM_SIZE_CLASSES, WORD};
use crate::error::CheckViolation;
use crate::freelist;
use crate::segment::HeapSegment;
use crate::size_class::class_of;
use crate::Heap;

impl<S: HeapSegment> Heap<S> {
    /// Walk the physical block chain from the first block to the epilogue.
    ///
    /// Yields `(offset, header)` pairs. The walk stops early if it runs
    /// into a header whose size could not have been written by the
    /// allocator, since stepping by a corrupt size would leave the chain.
    pub fn physical_blocks(&self) -> impl Iterator<Item = (usize, BlockWord)> + '_ {
        let heap = self.heap_bytes();
        let end = self.epilogue();
        let mut offset = FIRST_BLOCK_OFFSET;
        std::iter::from_fn(move || {
            if offset >= end {
                return None;
            }
            let word = header(heap, offset);
            if !plausible_size(word.size, offset, end) {
                return None;
            }
            let item = (offset, word);
            offset += word.size;
            Some(item)
        })
    }

    /// Verify every structural invariant the allocator relies on.
    ///
    /// Checks each free list (every listed block is free, sized for its
    /// class, and consistent between header and footer, with terminating
    /// links) and the physical chain (plausible sizes, matching footers,
    /// no adjacent free blocks, every free block reachable from its class
    /// list). Collects all violations rather than stopping at the first.
    pub fn check(&self) -> Result<(), Vec<CheckViolation>> {
        let heap = self.heap_bytes();
        let end = self.epilogue();
        let mut violations = Vec::new();

        // A list longer than the heap could physically hold must cycle.
        let max_blocks = self.heap_size() / MIN_BLOCK_SIZE + 1;
        let mut listed = Vec::new();

        for class in 0..NUM_SIZE_CLASSES {
            let mut cursor = freelist::head(heap, class);
            let mut steps = 0;
            while let Some(block) = cursor {
                if steps > max_blocks {
                    violations.push(CheckViolation::ListCycle { class });
                    break;
                }
                steps += 1;

                let word = header(heap, block);
                if word.allocated {
                    violations.push(CheckViolation::AllocatedInFreeList { block });
                }
                if !plausible_size(word.size, block, end) {
                    // The footer and class checks would read out of bounds.
                    violations.push(CheckViolation::BadSize {
                        block,
                        size: word.size,
                    });
                    break;
                }
                if class_of(word.size) != class {
                    violations.push(CheckViolation::WrongClass {
                        block,
                        size: word.size,
                        class,
                    });
                }
                if footer(heap, block, word.size) != word {
                    violations.push(CheckViolation::HeaderFooterMismatch { block });
                }

                listed.push(block);
                cursor = read_link(heap, next_link(block));
            }
        }

        // Physical chain. Walked by hand rather than through
        // `physical_blocks` so a corrupt size is reported, not swallowed.
        let mut offset = FIRST_BLOCK_OFFSET;
        let mut prev_free = false;
        while offset < end {
            let word = header(heap, offset);
            if !plausible_size(word.size, offset, end) {
                violations.push(CheckViolation::BadSize {
                    block: offset,
                    size: word.size,
                });
                break;
            }
            if footer(heap, offset, word.size) != word {
                violations.push(CheckViolation::HeaderFooterMismatch { block: offset });
            }
            if !word.allocated {
                if prev_free {
                    violations.push(CheckViolation::AdjacentFree { block: offset });
                }
                if !listed.contains(&offset) {
                    violations.push(CheckViolation::FreeBlockNotListed { block: offset });
                }
            }
            prev_free = !word.allocated;
            offset += word.size;
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Render every non-empty free list, one block per line, for debugging.
    pub fn dump_free_lists(&self) -> String {
        let heap = self.heap_bytes();
        let mut out = String::new();
        for class in 0..NUM_SIZE_CLASSES {
            let mut cursor = freelist::head(heap, class);
            if cursor.is_none() {
                continue;
            }
            let _ = writeln!(out, "class {class}:");
            while let Some(block) = cursor {
                let word = header(heap, block);
                let _ = writeln!(
                    out,
                    "  block {:#x} size {} {}",
                    block,
                    word.size,
                    if word.allocated { "allocated" } else { "free" },
                );
                cursor = read_link(heap, next_link(block));
            }
        }
        out
    }
}

/// Whether `size` could be a real block size for a block at `offset` in a
/// heap whose epilogue sits at `end`. Alignment needs no check here: the
/// word decoding already masks sizes to the alignment unit.
fn plausible_size(size: usize, offset: usize, end: usize) -> bool {
    size >= MIN_BLOCK_SIZE && offset + size <= end
}

/// The footer word of the block at `block` with header size `size`.
fn footer(heap: &[u8], block: usize, size: usize) -> BlockWord {
    BlockWord::decode(read_word(heap, block + size - WORD))
}
