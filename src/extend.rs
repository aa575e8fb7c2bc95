use log::{debug, warn};

use crate::{
  align::checked_align, allocator::SegAllocator, block::Block, error::AllocError,
  heap::HeapSource,
};

impl<H: HeapSource> SegAllocator<H> {
  /// Grows the heap by at least `min_bytes` (and at least one chunk),
  /// installs the new space as a free block under a fresh epilogue, and
  /// coalesces it with a free tail.
  ///
  /// Nothing is written unless the heap source succeeds.
  pub(crate) fn extend_heap(
    &mut self,
    min_bytes: usize,
  ) -> Result<Block, AllocError> {
    let size = checked_align(min_bytes)
      .ok_or(AllocError::TooLarge {
        requested: min_bytes,
      })?
      .max(self.config.chunk_size);

    let region = self.heap.grow(size).map_err(|source| {
      warn!("heap extension by {size} bytes failed: {source}");
      AllocError::OutOfMemory {
        requested: size,
        source,
      }
    })?;

    // SAFETY: the word below the new region is the old epilogue, which
    // becomes the header of the new block. Its prev-allocated bit already
    // describes the old tail.
    let block = unsafe { Block::from_payload(region) };
    block.write_free(size, block.is_prev_alloc());
    block.next().write_epilogue(false);

    self.tail = Some(block);
    self.extensions += 1;
    debug!(
      "extended heap by {size} bytes at {:#x} ({} bytes total)",
      block.addr(),
      self.heap.len()
    );

    Ok(self.coalesce(block))
  }
}
