//! Allocator configuration and size class definitions

/// Word size in bytes. Headers, footers, free-list links and the head table
/// entries are all one word each.
pub const WORD: usize = 8;

/// Double word size in bytes, the alignment unit. Every block size is a
/// multiple of this.
pub const DOUBLE_WORD: usize = 2 * WORD;

/// Fixed per-block overhead in bytes: header, two reserved link words and
/// footer. The link words stay reserved while the block is allocated so a
/// freed block can always rejoin a list without growing.
pub const BLOCK_OVERHEAD: usize = 4 * WORD;

/// Smallest legal block: header + links + footer with no payload.
pub const MIN_BLOCK_SIZE: usize = BLOCK_OVERHEAD;

/// Minimum extra bytes a split remainder must carry beyond [`MIN_BLOCK_SIZE`]
/// to be worth splitting off. Keeps tiny unusable fragments out of the lists.
pub const SPLIT_SLACK: usize = 2 * DOUBLE_WORD;

/// Minimum heap growth increment in bytes, amortising calls into the
/// growth primitive. Requests larger than this extend by the request itself.
pub const CHUNK_SIZE: usize = 4096;

/// Upper size bound of each class, ascending. Class `i` holds free blocks
/// whose total size is above `CLASS_BOUNDS[i - 1]` and at most
/// `CLASS_BOUNDS[i]`. The final entry is unbounded so every representable
/// size maps to some class.
pub const CLASS_BOUNDS: [usize; NUM_SIZE_CLASSES] = [
    16,
    32,
    48,
    64,
    96,
    128,
    144,
    160,
    256,
    512,
    1024,
    2048,
    4096,
    8192,
    1 << 14,
    1 << 15,
    1 << 16,
    1 << 17,
    1 << 18,
    1 << 19,
    1 << 20,
    1 << 21,
    1 << 22,
    1 << 23,
    1 << 24,
    usize::MAX,
];

/// Number of size classes.
pub const NUM_SIZE_CLASSES: usize = 26;

/// Bytes occupied by the free-list head table at the base of the heap,
/// one word per class. Written once at init and never moved.
pub const FREE_TABLE_BYTES: usize = NUM_SIZE_CLASSES * WORD;

/// Offset of the prologue sentinel header.
pub const PROLOGUE_OFFSET: usize = FREE_TABLE_BYTES;

/// Offset of the first real block header, immediately after the prologue
/// sentinel (header + footer).
pub const FIRST_BLOCK_OFFSET: usize = PROLOGUE_OFFSET + 2 * WORD;

/// Bytes the heap occupies before any block exists: head table, prologue
/// header/footer and the initial epilogue header.
pub const BASE_LAYOUT_BYTES: usize = FIRST_BLOCK_OFFSET + WORD;
