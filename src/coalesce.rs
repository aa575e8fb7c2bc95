//! Boundary-tag coalescing.
//!
//! ```text
//!   case 1: [alloc][FREE][alloc]  ->  [alloc][ FREE ][alloc]
//!   case 2: [alloc][FREE][free ]  ->  [alloc][   FREE   ]
//!   case 3: [free ][FREE][alloc]  ->  [   FREE   ][alloc]
//!   case 4: [free ][FREE][free ]  ->  [      FREE      ]
//! ```

use crate::{allocator::SegAllocator, block::Block, heap::HeapSource};

impl<H: HeapSource> SegAllocator<H> {
  /// Merges a freshly freed block with any free physical neighbours and
  /// files the result in the free lists.
  ///
  /// `block` must already carry free boundary tags and must not be on a
  /// free list. Returns the merged block, which starts at `block` or at its
  /// predecessor.
  pub(crate) fn coalesce(
    &mut self,
    block: Block,
  ) -> Block {
    let next = block.next();
    let prev_alloc = block.is_prev_alloc();
    let next_alloc = next.is_alloc();
    let mut size = block.size();

    let merged = match (prev_alloc, next_alloc) {
      (true, true) => block,

      (true, false) => {
        self.free_lists.remove(next);
        size += next.size();
        if self.tail == Some(next) {
          self.tail = Some(block);
        }
        block.write_free(size, true);
        block
      }

      (false, true) => {
        let prev = block.prev();
        self.free_lists.remove(prev);
        size += prev.size();
        if self.tail == Some(block) {
          self.tail = Some(prev);
        }
        prev.write_free(size, prev.is_prev_alloc());
        prev
      }

      (false, false) => {
        let prev = block.prev();
        self.free_lists.remove(prev);
        self.free_lists.remove(next);
        size += prev.size() + next.size();
        if self.tail == Some(next) {
          self.tail = Some(prev);
        }
        prev.write_free(size, prev.is_prev_alloc());
        prev
      }
    };

    merged.next().set_prev_alloc(false);
    self.free_lists.insert(merged);
    merged
  }
}
