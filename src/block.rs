//! In-arena block encoding
//!
//! Every block, free or allocated, is laid out as
//!
//! ```text
//! +-----------------------------+
//! | header word: size | alloc   |
//! +-----------------------------+
//! | prev free link (word)       |  meaningful only while free
//! +-----------------------------+
//! | next free link (word)       |  meaningful only while free
//! +-----------------------------+
//! |          payload            |
//! |            ...              |
//! +-----------------------------+
//! | footer word: copy of header |
//! +-----------------------------+
//! ```
//!
//! where block addresses are byte offsets of the header word from the base
//! of the heap segment. Sizes are multiples of [`DOUBLE_WORD`], so the low
//! bit of a header word is free to carry the allocated flag. All packing
//! and unpacking goes through the single [`BlockWord`] encode/decode pair.
//!
//! The two link words are reserved even while the block is allocated, so a
//! freed block can always rejoin a free list in place. The footer mirrors
//! the header so the previous physical block can be reached by reading one
//! word backwards.

use crate::config::{BLOCK_OVERHEAD, DOUBLE_WORD, MIN_BLOCK_SIZE, WORD};

/// Link word value meaning "no block". Offset 0 lies inside the free-list
/// head table, so no block header can ever live there.
pub const NIL: u64 = 0;

/// Decoded header/footer word: total block size plus the allocated flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWord {
    /// Total block size in bytes, including header, links and footer.
    pub size: usize,
    /// Whether the block is currently handed out to a caller.
    pub allocated: bool,
}

impl BlockWord {
    /// Pack the size and allocated flag into one word.
    pub fn encode(self) -> u64 {
        debug_assert_eq!(self.size % DOUBLE_WORD, 0);
        self.size as u64 | self.allocated as u64
    }

    /// Unpack a header/footer word.
    pub fn decode(word: u64) -> Self {
        Self {
            size: (word & !(DOUBLE_WORD as u64 - 1)) as usize,
            allocated: word & 1 == 1,
        }
    }
}

/// Read the word stored at `offset`.
pub fn read_word(heap: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; WORD];
    bytes.copy_from_slice(&heap[offset..offset + WORD]);
    u64::from_ne_bytes(bytes)
}

/// Store `value` at `offset`.
pub fn write_word(heap: &mut [u8], offset: usize, value: u64) {
    heap[offset..offset + WORD].copy_from_slice(&value.to_ne_bytes());
}

/// Decode the header of the block at `block`.
pub fn header(heap: &[u8], block: usize) -> BlockWord {
    BlockWord::decode(read_word(heap, block))
}

/// Decode the footer word sitting one word before `block`, i.e. the footer
/// of its previous physical block.
pub fn footer_before(heap: &[u8], block: usize) -> BlockWord {
    BlockWord::decode(read_word(heap, block - WORD))
}

/// Write matching header and footer for a block.
pub fn write_block(heap: &mut [u8], block: usize, word: BlockWord) {
    let encoded = word.encode();
    write_word(heap, block, encoded);
    write_word(heap, block + word.size - WORD, encoded);
}

/// Offset of the next physical block's header.
pub fn next_block(heap: &[u8], block: usize) -> usize {
    block + header(heap, block).size
}

/// Offset of the previous physical block's header, reached through its
/// footer.
pub fn prev_block(heap: &[u8], block: usize) -> usize {
    block - footer_before(heap, block).size
}

/// Payload offset handed to callers: past header and both link words.
pub fn payload_offset(block: usize) -> usize {
    block + 3 * WORD
}

/// Recover a block header offset from a caller-held payload offset.
pub fn block_of_payload(payload: usize) -> usize {
    payload - 3 * WORD
}

/// Usable payload bytes of a block of total size `size`.
pub fn payload_size(size: usize) -> usize {
    size - BLOCK_OVERHEAD
}

/// Read a free-list link word, mapping the nil sentinel to `None`.
pub fn read_link(heap: &[u8], offset: usize) -> Option<usize> {
    match read_word(heap, offset) {
        NIL => None,
        word => Some(word as usize),
    }
}

/// Write a free-list link word.
pub fn write_link(heap: &mut [u8], offset: usize, target: Option<usize>) {
    write_word(heap, offset, target.map_or(NIL, |block| block as u64));
}

/// Offset of a free block's backward link word.
pub fn prev_link(block: usize) -> usize {
    block + WORD
}

/// Offset of a free block's forward link word.
pub fn next_link(block: usize) -> usize {
    block + 2 * WORD
}

/// Round `n` up to a multiple of `align` (a power of two).
pub fn align_up(n: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (n + align - 1) & !(align - 1)
}

/// Total block size needed to serve a request of `request` payload bytes:
/// the request rounded to the alignment unit plus the fixed overhead.
///
/// Returns `None` if the adjusted size is not representable.
pub fn adjusted_size(request: usize) -> Option<usize> {
    let aligned = request
        .checked_add(DOUBLE_WORD - 1)?
        .checked_add(BLOCK_OVERHEAD)?
        & !(DOUBLE_WORD - 1);
    Some(aligned.max(MIN_BLOCK_SIZE))
}
