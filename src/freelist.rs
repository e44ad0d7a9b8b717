//! Segregated free lists
//!
//! One intrusive doubly-linked list per size class, threaded through the
//! link words of free blocks. The list heads live in a fixed table at the
//! very base of the heap, one word per class, written at init and never
//! moved. Insert and remove are O(1) given a block offset.
//!
//! Preconditions are the caller's responsibility: a block passed to
//! [`push`] must be free with a valid header/footer, and a block passed to
//! [`unlink`] must currently be a member of the list for its class. The
//! hot path does not detect violations; the checker in `crate::check` can.

use crate::block::{header, next_link, prev_link, read_link, write_link};
use crate::config::WORD;
use crate::size_class::class_of;

/// Offset of the head-table slot for `class`.
fn head_slot(class: usize) -> usize {
    class * WORD
}

/// Head of the free list for `class`, if any.
pub fn head(heap: &[u8], class: usize) -> Option<usize> {
    read_link(heap, head_slot(class))
}

/// Push `block` at the head of the list for its size class.
pub fn push(heap: &mut [u8], block: usize) {
    let word = header(heap, block);
    debug_assert!(!word.allocated);

    let slot = head_slot(class_of(word.size));
    let old_head = read_link(heap, slot);

    write_link(heap, prev_link(block), None);
    write_link(heap, next_link(block), old_head);
    if let Some(old_head) = old_head {
        write_link(heap, prev_link(old_head), Some(block));
    }
    write_link(heap, slot, Some(block));
}

/// Unlink `block` from the list it sits in, wherever it sits.
pub fn unlink(heap: &mut [u8], block: usize) {
    let word = header(heap, block);
    let prev = read_link(heap, prev_link(block));
    let next = read_link(heap, next_link(block));

    match prev {
        // Head of its list: the table slot takes over.
        None => write_link(heap, head_slot(class_of(word.size)), next),
        Some(prev) => write_link(heap, next_link(prev), next),
    }
    if let Some(next) = next {
        write_link(heap, prev_link(next), prev);
    }

    write_link(heap, prev_link(block), None);
    write_link(heap, next_link(block), None);
}
