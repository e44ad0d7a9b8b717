//! Core allocator implementation
//!
//! The main heap context and the allocate/release/resize logic: fit
//! finding over the segregated lists, block splitting, eager four-case
//! coalescing and on-demand heap extension.

use crate::block::{
    adjusted_size, align_up, block_of_payload, footer_before, header, payload_offset,
    payload_size, write_block, write_word, BlockWord, NIL,
};
use crate::config::{
    BASE_LAYOUT_BYTES, CHUNK_SIZE, DOUBLE_WORD, MIN_BLOCK_SIZE, NUM_SIZE_CLASSES,
    PROLOGUE_OFFSET, SPLIT_SLACK, WORD,
};
use crate::error::AllocError;
use crate::freelist;
use crate::segment::HeapSegment;
use crate::size_class::class_of;
use crate::stats::HeapStats;

/// A heap managed over one growable segment.
///
/// All state lives either in the segment itself (block headers, footers,
/// links, the free-list head table) or in this context object; there are
/// no globals, so independent heaps can coexist and tests stay
/// deterministic. Operations are single-threaded by construction: every
/// method takes `&mut self` and completes all metadata writes before
/// returning.
///
/// Callers hold allocations as payload byte offsets into the segment and
/// reach their bytes through [`Heap::payload`] / [`Heap::payload_mut`].
pub struct Heap<S: HeapSegment> {
    segment: S,
    stats: HeapStats,
}

impl<S: HeapSegment> Heap<S> {
    /// Initialise a heap over an empty segment.
    ///
    /// Lays down the free-list head table, the prologue sentinel and the
    /// epilogue sentinel. The sentinels are permanently allocated zero-
    /// payload markers bounding the traversable block chain, so coalescing
    /// never has to special-case the heap edges.
    ///
    /// # Returns
    /// [`AllocError::InvalidConfig`] if the segment already holds bytes,
    /// or [`AllocError::OutOfMemory`] if it cannot hold the base layout.
    pub fn init(mut segment: S) -> Result<Self, AllocError> {
        if !segment.is_empty() {
            return Err(AllocError::InvalidConfig);
        }
        segment.extend(BASE_LAYOUT_BYTES)?;

        let heap = segment.bytes_mut();
        for class in 0..NUM_SIZE_CLASSES {
            write_word(heap, class * WORD, NIL);
        }
        write_block(
            heap,
            PROLOGUE_OFFSET,
            BlockWord {
                size: 2 * WORD,
                allocated: true,
            },
        );
        write_epilogue(heap, BASE_LAYOUT_BYTES - WORD);

        log::debug!("heap initialised, base layout {BASE_LAYOUT_BYTES} bytes");
        Ok(Self {
            segment,
            stats: HeapStats::new(),
        })
    }

    /// Allocate `size` payload bytes.
    ///
    /// # Returns
    /// `Ok(None)` for a zero-size request (no heap mutation), otherwise
    /// the payload offset of the new allocation.
    pub fn allocate(&mut self, size: usize) -> Result<Option<usize>, AllocError> {
        if size == 0 {
            return Ok(None);
        }
        let asize = adjusted_size(size).ok_or(AllocError::RequestTooLarge)?;
        let block = self.allocate_block(asize)?;
        let payload = payload_offset(block);
        log::trace!("allocate({size}) -> {payload:#x}");
        Ok(Some(payload))
    }

    /// Release the allocation at `payload`.
    ///
    /// The block is merged with any free physical neighbour before being
    /// re-listed, so no two free blocks are ever left adjacent. Passing an
    /// offset that is not a live allocation from this heap corrupts the
    /// heap; the hot path does not check (see [`Heap::check`]).
    pub fn release(&mut self, payload: usize) {
        let block = block_of_payload(payload);
        let heap = self.segment.bytes_mut();
        let word = header(heap, block);
        debug_assert!(word.allocated);

        write_block(
            heap,
            block,
            BlockWord {
                size: word.size,
                allocated: false,
            },
        );
        self.coalesce(block);

        self.stats.live_bytes = self.stats.live_bytes.saturating_sub(word.size);
        self.stats.total_frees += 1;
        log::trace!("release({payload:#x}), block size {}", word.size);
    }

    /// Resize the allocation at `payload` to `new_size` payload bytes.
    ///
    /// `None` behaves as [`Heap::allocate`]; `new_size == 0` behaves as
    /// [`Heap::release`] and yields `None`. Shrinking is an in-place no-op
    /// (the freed tail is deliberately not split off). Growth first tries
    /// to absorb a free right neighbour, then to extend the heap in place
    /// when the block is the final one, and only then relocates, copying
    /// `min(old payload, new_size)` bytes. On failure the old allocation
    /// is left untouched.
    pub fn resize(
        &mut self,
        payload: Option<usize>,
        new_size: usize,
    ) -> Result<Option<usize>, AllocError> {
        let Some(payload) = payload else {
            return self.allocate(new_size);
        };
        if new_size == 0 {
            self.release(payload);
            return Ok(None);
        }

        let asize = adjusted_size(new_size).ok_or(AllocError::RequestTooLarge)?;
        let block = block_of_payload(payload);
        let old_size = header(self.segment.bytes(), block).size;

        if asize <= old_size {
            log::trace!("resize({payload:#x}, {new_size}) shrink in place");
            return Ok(Some(payload));
        }

        if self.grow_into_next(block, old_size, asize) {
            log::trace!("resize({payload:#x}, {new_size}) absorbed right neighbour");
            return Ok(Some(payload));
        }

        if block + old_size == self.epilogue() {
            self.grow_at_tail(block, old_size, asize)?;
            log::trace!("resize({payload:#x}, {new_size}) extended at heap tail");
            return Ok(Some(payload));
        }

        // Relocate. The old block stays valid until the new one exists.
        let new_block = self.allocate_block(asize)?;
        let new_payload = payload_offset(new_block);
        let copy = payload_size(old_size).min(new_size);
        self.segment
            .bytes_mut()
            .copy_within(payload..payload + copy, new_payload);
        self.release(payload);
        log::trace!("resize({payload:#x}, {new_size}) relocated to {new_payload:#x}");
        Ok(Some(new_payload))
    }

    /// The bytes of the allocation at `payload`.
    pub fn payload(&self, payload: usize) -> &[u8] {
        let heap = self.segment.bytes();
        let block = block_of_payload(payload);
        let word = header(heap, block);
        debug_assert!(word.allocated);
        &heap[payload..block + word.size - WORD]
    }

    /// The bytes of the allocation at `payload`, mutably.
    pub fn payload_mut(&mut self, payload: usize) -> &mut [u8] {
        let block = block_of_payload(payload);
        let word = header(self.segment.bytes(), block);
        debug_assert!(word.allocated);
        &mut self.segment.bytes_mut()[payload..block + word.size - WORD]
    }

    /// Allocation counters.
    pub fn stats(&self) -> &HeapStats {
        &self.stats
    }

    /// Current heap size in bytes, including all metadata.
    pub fn heap_size(&self) -> usize {
        self.segment.len()
    }

    pub(crate) fn heap_bytes(&self) -> &[u8] {
        self.segment.bytes()
    }

    #[cfg(test)]
    pub(crate) fn heap_bytes_mut(&mut self) -> &mut [u8] {
        self.segment.bytes_mut()
    }

    /// Offset of the epilogue sentinel header, the last word of the heap.
    pub(crate) fn epilogue(&self) -> usize {
        self.segment.len() - WORD
    }

    /// Find or create a free block of at least `asize` bytes and place the
    /// request into it. Updates the allocation counters.
    fn allocate_block(&mut self, asize: usize) -> Result<usize, AllocError> {
        let block = match self.find_fit(asize) {
            Some(block) => block,
            None => self.extend_heap(asize.max(CHUNK_SIZE))?,
        };
        let block = self.place(block, asize);

        let size = header(self.segment.bytes(), block).size;
        self.stats.live_bytes += size;
        self.stats.total_allocs += 1;
        self.stats.update_peak();
        Ok(block)
    }

    /// Two-phase near-O(1) fit search over the segregated lists.
    ///
    /// Phase one probes the head of the first non-empty list at or above
    /// the request's own class; a class covers a size range, so that head
    /// may still be too small. Phase two then restarts the scan from the
    /// class bounded at twice the request, whose members are effectively
    /// always sufficient; the head's size is still verified with one read
    /// because the table's spacing is not uniformly within 2x. Neither
    /// phase walks a list, trading best-fit tightness for constant-time
    /// behaviour.
    fn find_fit(&self, asize: usize) -> Option<usize> {
        let heap = self.segment.bytes();

        for class in class_of(asize)..NUM_SIZE_CLASSES {
            if let Some(block) = freelist::head(heap, class) {
                if header(heap, block).size >= asize {
                    return Some(block);
                }
                break;
            }
        }

        let doubled = asize.saturating_mul(2);
        for class in class_of(doubled)..NUM_SIZE_CLASSES {
            if let Some(block) = freelist::head(heap, class) {
                if header(heap, block).size >= asize {
                    return Some(block);
                }
            }
        }

        None
    }

    /// Convert the free block at `block` (currently listed) into an
    /// allocated block of `asize` bytes, splitting off the remainder as a
    /// new free block when it is big enough to be useful.
    fn place(&mut self, block: usize, asize: usize) -> usize {
        let heap = self.segment.bytes_mut();
        let size = header(heap, block).size;
        debug_assert!(size >= asize);

        freelist::unlink(heap, block);

        if size - asize >= MIN_BLOCK_SIZE + SPLIT_SLACK {
            write_block(
                heap,
                block,
                BlockWord {
                    size: asize,
                    allocated: true,
                },
            );
            let remainder = block + asize;
            write_block(
                heap,
                remainder,
                BlockWord {
                    size: size - asize,
                    allocated: false,
                },
            );
            freelist::push(heap, remainder);
        } else {
            // The remainder would be an unusable fragment; hand the whole
            // block out instead.
            write_block(
                heap,
                block,
                BlockWord {
                    size,
                    allocated: true,
                },
            );
        }
        block
    }

    /// Merge the free block at `block` with any free physical neighbour
    /// and insert the surviving block into its free list.
    ///
    /// Neighbours are reached through the boundary words, not through list
    /// membership: the next header sits at the block's end, the previous
    /// footer one word before its start. The sentinels bound both walks.
    /// Returns the offset of the surviving block, which moves left when
    /// the previous block is absorbed.
    fn coalesce(&mut self, block: usize) -> usize {
        let heap = self.segment.bytes_mut();
        let mut start = block;
        let mut size = header(heap, block).size;

        let next = block + size;
        let next_word = header(heap, next);
        if !next_word.allocated {
            freelist::unlink(heap, next);
            size += next_word.size;
        }

        let prev_footer = footer_before(heap, block);
        if !prev_footer.allocated {
            start = block - prev_footer.size;
            freelist::unlink(heap, start);
            size += prev_footer.size;
        }

        write_block(
            heap,
            start,
            BlockWord {
                size,
                allocated: false,
            },
        );
        freelist::push(heap, start);
        start
    }

    /// Grow the heap so that a free block of at least `min_bytes` exists
    /// at its end, and return that block (still listed).
    ///
    /// If the final block is already free it is reused outright when large
    /// enough, and otherwise discounted from the amount requested from the
    /// growth primitive. The epilogue is rewritten at the new end and the
    /// fresh block coalesced with the free tail it extends.
    fn extend_heap(&mut self, min_bytes: usize) -> Result<usize, AllocError> {
        let mut request = align_up(min_bytes, DOUBLE_WORD);
        let old_epilogue = self.epilogue();

        {
            let heap = self.segment.bytes();
            let tail_footer = footer_before(heap, old_epilogue);
            if !tail_footer.allocated {
                if tail_footer.size >= request {
                    return Ok(old_epilogue - tail_footer.size);
                }
                request -= tail_footer.size;
            }
        }

        self.segment.extend(request)?;
        self.stats.heap_extensions += 1;
        log::debug!(
            "heap extended by {request} bytes to {}",
            self.segment.len()
        );

        let heap = self.segment.bytes_mut();
        write_block(
            heap,
            old_epilogue,
            BlockWord {
                size: request,
                allocated: false,
            },
        );
        write_epilogue(heap, old_epilogue + request);

        Ok(self.coalesce(old_epilogue))
    }

    /// Absorb a free right neighbour into `block` if that satisfies
    /// `asize`. Returns whether the block was grown.
    fn grow_into_next(&mut self, block: usize, old_size: usize, asize: usize) -> bool {
        let heap = self.segment.bytes_mut();
        let next = block + old_size;
        let next_word = header(heap, next);
        if next_word.allocated || old_size + next_word.size < asize {
            return false;
        }

        freelist::unlink(heap, next);
        write_block(
            heap,
            block,
            BlockWord {
                size: old_size + next_word.size,
                allocated: true,
            },
        );
        self.stats.live_bytes += next_word.size;
        self.stats.update_peak();
        true
    }

    /// Extend the heap by exactly the shortfall and grow the final block
    /// `block` in place over the new bytes.
    fn grow_at_tail(&mut self, block: usize, old_size: usize, asize: usize) -> Result<(), AllocError> {
        let shortfall = align_up(asize - old_size, DOUBLE_WORD);
        self.segment.extend(shortfall)?;
        self.stats.heap_extensions += 1;

        let heap = self.segment.bytes_mut();
        write_block(
            heap,
            block,
            BlockWord {
                size: old_size + shortfall,
                allocated: true,
            },
        );
        write_epilogue(heap, block + old_size + shortfall);

        self.stats.live_bytes += shortfall;
        self.stats.update_peak();
        Ok(())
    }
}

/// Write the epilogue sentinel header at `offset`.
fn write_epilogue(heap: &mut [u8], offset: usize) {
    write_word(
        heap,
        offset,
        BlockWord {
            size: 0,
            allocated: true,
        }
        .encode(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FIRST_BLOCK_OFFSET;
    use crate::segment::VecSegment;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn new_heap() -> Heap<VecSegment> {
        Heap::init(VecSegment::new()).unwrap()
    }

    /// Payload ranges of all live allocations, for overlap checks.
    fn overlaps(ranges: &[(usize, usize)]) -> bool {
        let mut sorted = ranges.to_vec();
        sorted.sort_unstable();
        sorted
            .windows(2)
            .any(|pair| pair[0].0 + pair[0].1 > pair[1].0)
    }

    #[test]
    fn test_init_rejects_used_segment() {
        let mut segment = VecSegment::new();
        segment.extend(8).unwrap();
        assert!(matches!(
            Heap::init(segment),
            Err(AllocError::InvalidConfig)
        ));
    }

    #[test]
    fn test_init_too_small_segment_is_oom() {
        let segment = VecSegment::with_limit(64);
        assert!(matches!(Heap::init(segment), Err(AllocError::OutOfMemory)));
    }

    #[test]
    fn test_zero_size_allocate_is_noop() {
        let mut heap = new_heap();
        let before = heap.heap_size();
        assert_eq!(heap.allocate(0).unwrap(), None);
        assert_eq!(heap.heap_size(), before);
        assert_eq!(heap.stats().total_allocs, 0);
    }

    #[test]
    fn test_allocate_reuses_freed_block() {
        // A freed block is reused instead of growing the heap.
        let mut heap = new_heap();
        let a = heap.allocate(100).unwrap().unwrap();
        let _b = heap.allocate(100).unwrap().unwrap();
        heap.release(a);

        let len_before = heap.heap_size();
        let c = heap.allocate(100).unwrap().unwrap();
        assert_eq!(c, a);
        assert_eq!(heap.heap_size(), len_before);
        heap.check().unwrap();
    }

    #[test]
    fn test_adjacent_frees_coalesce() {
        // Freeing two adjacent blocks leaves one free span.
        let mut heap = new_heap();
        let a = heap.allocate(64).unwrap().unwrap();
        let b = heap.allocate(64).unwrap().unwrap();
        heap.release(a);
        heap.release(b);

        heap.check().unwrap();
        let free: Vec<_> = heap
            .physical_blocks()
            .filter(|&(_, word)| !word.allocated)
            .collect();
        assert_eq!(free.len(), 1);
        // The single free block starts where `a`'s block started and
        // covers both original regions.
        let (start, word) = free[0];
        assert_eq!(start, block_of_payload(a));
        assert!(start + word.size > block_of_payload(b));
    }

    #[test]
    fn test_resize_shrink_is_noop() {
        let mut heap = new_heap();
        let a = heap.allocate(16).unwrap().unwrap();
        assert_eq!(heap.resize(Some(a), 16).unwrap(), Some(a));
        assert_eq!(heap.resize(Some(a), 1).unwrap(), Some(a));
        heap.check().unwrap();
    }

    #[test]
    fn test_resize_relocation_preserves_prefix() {
        // Growing far past the current block moves it and
        // keeps the old bytes.
        let mut heap = new_heap();
        let a = heap.allocate(16).unwrap().unwrap();
        for (i, byte) in heap.payload_mut(a)[..16].iter_mut().enumerate() {
            *byte = i as u8 + 1;
        }

        let grown = heap.resize(Some(a), 10_000).unwrap().unwrap();
        assert_ne!(grown, a);
        for (i, &byte) in heap.payload(grown)[..16].iter().enumerate() {
            assert_eq!(byte, i as u8 + 1);
        }
        heap.check().unwrap();
    }

    #[test]
    fn test_resize_none_allocates_and_zero_releases() {
        let mut heap = new_heap();
        let a = heap.resize(None, 40).unwrap().unwrap();
        assert_eq!(heap.stats().total_allocs, 1);
        assert_eq!(heap.resize(Some(a), 0).unwrap(), None);
        assert_eq!(heap.stats().total_frees, 1);
        heap.check().unwrap();
    }

    #[test]
    fn test_resize_absorbs_free_right_neighbour() {
        let mut heap = new_heap();
        let a = heap.allocate(32).unwrap().unwrap();
        let b = heap.allocate(32).unwrap().unwrap();
        heap.payload_mut(a)[..32].fill(0xAB);
        heap.release(b);

        // `b` merged with the chunk remainder, so `a` has a large free
        // right neighbour and can grow without moving.
        let grown = heap.resize(Some(a), 200).unwrap().unwrap();
        assert_eq!(grown, a);
        assert!(heap.payload(a)[..32].iter().all(|&byte| byte == 0xAB));
        heap.check().unwrap();
    }

    #[test]
    fn test_resize_extends_at_heap_tail() {
        let mut heap = new_heap();
        let _a = heap.allocate(100).unwrap().unwrap();

        // Consume the rest of the first chunk exactly, so `b` becomes the
        // final block before the epilogue.
        let remaining = heap
            .physical_blocks()
            .find(|&(_, word)| !word.allocated)
            .map(|(_, word)| word.size)
            .unwrap();
        let b = heap.allocate(payload_size(remaining)).unwrap().unwrap();
        assert_eq!(block_of_payload(b) + remaining, heap.epilogue());
        heap.payload_mut(b)[..8].fill(0xCD);

        let grown = heap.resize(Some(b), payload_size(remaining) + 5_000).unwrap().unwrap();
        assert_eq!(grown, b, "tail block must grow in place");
        assert!(heap.payload(b)[..8].iter().all(|&byte| byte == 0xCD));
        heap.check().unwrap();
    }

    #[test]
    fn test_oom_propagates_and_leaves_heap_valid() {
        let mut heap = Heap::init(VecSegment::with_limit(BASE_LAYOUT_BYTES + 4096)).unwrap();
        let a = heap.allocate(100).unwrap().unwrap();
        heap.payload_mut(a).fill(0x5A);

        assert_eq!(heap.allocate(100_000), Err(AllocError::OutOfMemory));
        assert!(heap.payload(a).iter().all(|&byte| byte == 0x5A));
        heap.check().unwrap();

        // Resize relocation failure leaves the old allocation untouched.
        assert_eq!(heap.resize(Some(a), 100_000), Err(AllocError::OutOfMemory));
        assert!(heap.payload(a).iter().all(|&byte| byte == 0x5A));
        heap.check().unwrap();
    }

    #[test]
    fn test_request_too_large() {
        let mut heap = new_heap();
        assert_eq!(heap.allocate(usize::MAX), Err(AllocError::RequestTooLarge));
        heap.check().unwrap();
    }

    #[test]
    fn test_stats_track_live_bytes() {
        let mut heap = new_heap();
        let a = heap.allocate(100).unwrap().unwrap();
        let live_after_alloc = heap.stats().live_bytes;
        assert!(live_after_alloc >= 100);

        heap.release(a);
        assert_eq!(heap.stats().live_bytes, 0);
        assert_eq!(heap.stats().peak_live_bytes, live_after_alloc);
        assert_eq!(heap.stats().total_allocs, 1);
        assert_eq!(heap.stats().total_frees, 1);
        assert_eq!(heap.stats().heap_extensions, 1);
    }

    #[test]
    fn test_first_allocation_extends_once() {
        let mut heap = new_heap();
        assert_eq!(heap.heap_size(), BASE_LAYOUT_BYTES);
        heap.allocate(16).unwrap().unwrap();
        assert_eq!(heap.heap_size(), BASE_LAYOUT_BYTES + CHUNK_SIZE);
        assert_eq!(
            heap.physical_blocks().next().map(|(offset, _)| offset),
            Some(FIRST_BLOCK_OFFSET)
        );
    }

    #[test]
    fn test_randomised_stress_holds_invariants() {
        // Random allocate/release/resize traffic; after every operation
        // the heap must check out and live payloads must not overlap or
        // lose their fill patterns. Run with RUST_LOG=trace to see the
        // operation sequence on failure.
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng = StdRng::seed_from_u64(0x5E6_A110C);
        let mut heap = new_heap();
        let mut live: Vec<(usize, usize, u8)> = Vec::new();

        for round in 0..600 {
            let action = rng.gen_range(0..10);
            if action < 5 || live.is_empty() {
                let size = rng.gen_range(1..=2048);
                let payload = heap.allocate(size).unwrap().unwrap();
                let fill = (round % 251) as u8;
                heap.payload_mut(payload)[..size].fill(fill);
                live.push((payload, size, fill));
            } else if action < 8 {
                let index = rng.gen_range(0..live.len());
                let (payload, _, _) = live.swap_remove(index);
                heap.release(payload);
            } else {
                let index = rng.gen_range(0..live.len());
                let (payload, size, fill) = live[index];
                let new_size = rng.gen_range(1..=4096);
                let moved = heap.resize(Some(payload), new_size).unwrap().unwrap();
                let kept = size.min(new_size);
                assert!(heap.payload(moved)[..kept].iter().all(|&byte| byte == fill));
                heap.payload_mut(moved)[..new_size].fill(fill);
                live[index] = (moved, new_size, fill);
            }

            heap.check().unwrap();
            let ranges: Vec<_> = live.iter().map(|&(payload, size, _)| (payload, size)).collect();
            assert!(!overlaps(&ranges), "live payloads overlap at round {round}");
            for &(payload, size, fill) in &live {
                assert!(heap.payload(payload)[..size].iter().all(|&byte| byte == fill));
            }
        }
    }

    proptest! {
        /// Freeing every allocation, in any order, must re-form a single
        /// free block: coalescing never leaves permanent fragmentation.
        #[test]
        fn check_full_coalescing(sizes in proptest::collection::vec(1usize..1500, 1..40),
                                 seed in any::<u64>()) {
            let mut heap = new_heap();
            let mut live = Vec::new();
            for &size in &sizes {
                live.push(heap.allocate(size).unwrap().unwrap());
            }

            let mut rng = StdRng::seed_from_u64(seed);
            while !live.is_empty() {
                let index = rng.gen_range(0..live.len());
                heap.release(live.swap_remove(index));
                heap.check().unwrap();
            }

            let free: Vec<_> = heap
                .physical_blocks()
                .filter(|&(_, word)| !word.allocated)
                .collect();
            prop_assert_eq!(free.len(), 1);
            let (start, word) = free[0];
            prop_assert_eq!(start, FIRST_BLOCK_OFFSET);
            prop_assert_eq!(start + word.size, heap.epilogue());
        }
    }
}
