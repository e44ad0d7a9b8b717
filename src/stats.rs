//! Statistics collection for the heap.

/// Heap statistics.
#[derive(Debug, Clone, Default)]
pub struct HeapStats {
    /// Total bytes currently allocated (live), including per-block overhead.
    pub live_bytes: usize,
    /// Peak live bytes.
    pub peak_live_bytes: usize,
    /// Total allocations since initialisation.
    pub total_allocs: u64,
    /// Total frees since initialisation.
    pub total_frees: u64,
    /// Number of times the underlying segment was extended.
    pub heap_extensions: u64,
}

impl HeapStats {
    /// Create new empty statistics.
    pub const fn new() -> Self {
        Self {
            live_bytes: 0,
            peak_live_bytes: 0,
            total_allocs: 0,
            total_frees: 0,
            heap_extensions: 0,
        }
    }

    /// Update peak if current live bytes exceed it.
    pub fn update_peak(&mut self) {
        if self.live_bytes > self.peak_live_bytes {
            self.peak_live_bytes = self.live_bytes;
        }
    }
}
