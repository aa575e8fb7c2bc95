//! Allocator statistics

/// Snapshot of allocator counters, see [`SegAllocator::stats`](crate::SegAllocator::stats).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes obtained from the heap source, sentinels included.
  pub heap_bytes: usize,
  /// Successful heap extensions, the initial chunk included.
  pub extensions: usize,
  /// Blocks handed out and not yet freed.
  pub live_allocations: usize,
  /// Blocks currently on the free lists.
  pub free_blocks: usize,
}
