//! Segregated free lists.
//!
//! One doubly-linked list per size class. The links live inside the free
//! blocks themselves; the store only keeps a head and a tail per class.
//! Blocks are appended at the tail, so each class is served FIFO.

use crate::{
  block::Block,
  size_class::{NUM_CLASSES, class_of},
};

pub(crate) struct FreeListStore {
  heads: [Option<Block>; NUM_CLASSES],
  tails: [Option<Block>; NUM_CLASSES],
  len: usize,
}

impl FreeListStore {
  pub(crate) const fn new() -> Self {
    Self {
      heads: [None; NUM_CLASSES],
      tails: [None; NUM_CLASSES],
      len: 0,
    }
  }

  /// Number of free blocks across all classes.
  pub(crate) fn len(&self) -> usize {
    self.len
  }

  pub(crate) fn head(
    &self,
    class: usize,
  ) -> Option<Block> {
    self.heads[class]
  }

  pub(crate) fn tail(
    &self,
    class: usize,
  ) -> Option<Block> {
    self.tails[class]
  }

  /// Appends a free block to the tail of its class. Both boundary tags must
  /// already be written.
  pub(crate) fn insert(
    &mut self,
    block: Block,
  ) {
    debug_assert!(!block.is_alloc());
    let class = class_of(block.size());

    block.set_list_prev(self.tails[class]);
    block.set_list_next(None);

    match self.tails[class] {
      Some(tail) => tail.set_list_next(Some(block)),
      None => self.heads[class] = Some(block),
    }
    self.tails[class] = Some(block);
    self.len += 1;
  }

  /// Unlinks a block. Its size must not have changed since it was inserted,
  /// since the bucket is recomputed from it.
  pub(crate) fn remove(
    &mut self,
    block: Block,
  ) {
    debug_assert!(!block.is_alloc());
    let class = class_of(block.size());
    let prev = block.list_prev();
    let next = block.list_next();

    match prev {
      Some(prev) => prev.set_list_next(next),
      None => self.heads[class] = next,
    }
    match next {
      Some(next) => next.set_list_prev(prev),
      None => self.tails[class] = prev,
    }
    self.len -= 1;
  }

  /// First fit over ascending classes, starting at the class of `asize`.
  pub(crate) fn find_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    for class in class_of(asize)..NUM_CLASSES {
      let mut current = self.heads[class];

      while let Some(block) = current {
        if block.size() >= asize {
          return Some(block);
        }
        current = block.list_next();
      }
    }

    None
  }
}
