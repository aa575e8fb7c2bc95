//! Heap consistency checker.
//!
//! Walks every block from the prologue to the epilogue and then every free
//! list, cross-checking the two views. Meant for tests and debugging; the
//! allocation paths never call it unless
//! [`AllocatorConfig::check_heap`](crate::AllocatorConfig::check_heap) is set
//! in a debug build.
//!
//! The walk itself never allocates, so it is safe to run on the heap that
//! backs the global allocator. Only [`HeapReport`] needs memory.

use std::fmt;

use log::error;

use crate::{
  ALIGNMENT,
  allocator::SegAllocator,
  block::{Block, MIN_BLOCK_SIZE, WSIZE},
  error::{AllocError, Corruption},
  heap::HeapSource,
  size_class::{NUM_CLASSES, class_lower_bound, class_of},
};

/// One block as seen by the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub addr: usize,
  pub size: usize,
  pub allocated: bool,
  pub prev_allocated: bool,
}

/// Result of a successful heap walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapReport {
  /// Every block between the sentinels, in address order.
  pub blocks: Vec<BlockInfo>,
  /// Size of the whole heap region, sentinels included.
  pub heap_bytes: usize,
  /// Free blocks per size class.
  pub class_counts: [usize; NUM_CLASSES],
}

impl HeapReport {
  pub fn free_blocks(&self) -> usize {
    self.blocks.iter().filter(|block| !block.allocated).count()
  }

  pub fn allocated_blocks(&self) -> usize {
    self.blocks.len() - self.free_blocks()
  }

  pub fn free_bytes(&self) -> usize {
    self
      .blocks
      .iter()
      .filter(|block| !block.allocated)
      .map(|block| block.size)
      .sum()
  }
}

impl fmt::Display for HeapReport {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(
      f,
      "heap: {} bytes, {} blocks ({} free, {} free bytes)",
      self.heap_bytes,
      self.blocks.len(),
      self.free_blocks(),
      self.free_bytes()
    )?;

    for block in &self.blocks {
      writeln!(
        f,
        "  {:#014x}  size {:>8}  {}  prev {}",
        block.addr,
        block.size,
        if block.allocated { "alloc" } else { "free " },
        if block.prev_allocated { "alloc" } else { "free" },
      )?;
    }

    for (class, &count) in self.class_counts.iter().enumerate() {
      if count > 0 {
        writeln!(f, "  class {class:>2} [{}..): {count} free", class_lower_bound(class))?;
      }
    }

    Ok(())
  }
}

impl<H: HeapSource> SegAllocator<H> {
  /// Validates every structural invariant of the heap and describes it.
  ///
  /// An uninitialised allocator yields an empty report. Building the report
  /// allocates; on an instance serving as the global allocator use
  /// [`validate_heap`](Self::validate_heap) instead.
  pub fn check_heap(&self) -> Result<HeapReport, AllocError> {
    let summary = self.audit().map_err(|corruption| {
      error!("heap check failed: {corruption}");
      AllocError::HeapCorruption(corruption)
    })?;

    let mut report = HeapReport {
      blocks: Vec::new(),
      heap_bytes: summary.heap_bytes,
      class_counts: summary.class_counts,
    };
    let Some(start) = self.heap_start else {
      return Ok(report);
    };

    let mut prev_allocated = true;
    let mut block = start;
    while block.size() != 0 {
      let allocated = block.is_alloc();
      report.blocks.push(BlockInfo {
        addr: block.addr(),
        size: block.size(),
        allocated,
        prev_allocated,
      });
      prev_allocated = allocated;
      block = block.next();
    }

    Ok(report)
  }

  /// Same checks as [`check_heap`](Self::check_heap) without building a
  /// report. Never allocates.
  pub fn validate_heap(&self) -> Result<(), Corruption> {
    self.audit().map(|_| ())
  }

  fn audit(&self) -> Result<Summary, Corruption> {
    let Some(start) = self.heap_start else {
      return Ok(Summary::default());
    };

    let low = self.heap.low() as usize;
    let high = self.heap.high() as usize;
    let epilogue = high - WSIZE;

    let mut summary = Summary {
      heap_bytes: high - low,
      ..Summary::default()
    };
    let mut free = 0;

    // the prologue counts as allocated
    let mut prev_alloc = true;
    let mut last = None;
    let mut block = start;

    loop {
      let addr = block.addr();
      if addr < low + WSIZE || addr > epilogue {
        return Err(Corruption::OutOfBounds { addr });
      }

      let size = block.size();
      if addr == epilogue {
        if size != 0 || !block.is_alloc() {
          return Err(Corruption::MissingEpilogue { addr });
        }
        if block.is_prev_alloc() != prev_alloc {
          return Err(Corruption::PrevAllocMismatch { addr });
        }
        break;
      }

      if size == 0 {
        return Err(Corruption::MissingEpilogue { addr: epilogue });
      }
      if !size.is_multiple_of(ALIGNMENT) || size < MIN_BLOCK_SIZE {
        return Err(Corruption::BadSize { addr, size });
      }
      if addr + size > epilogue {
        return Err(Corruption::OutOfBounds { addr });
      }
      if !(block.payload().as_ptr() as usize).is_multiple_of(ALIGNMENT) {
        return Err(Corruption::Misaligned { addr });
      }
      if block.is_prev_alloc() != prev_alloc {
        return Err(Corruption::PrevAllocMismatch { addr });
      }

      let allocated = block.is_alloc();
      if !allocated {
        if !prev_alloc {
          return Err(Corruption::AdjacentFree { addr });
        }
        if block.footer() != block.header() {
          return Err(Corruption::FooterMismatch {
            addr,
            header: block.header(),
            footer: block.footer(),
          });
        }
        free += 1;
      }

      prev_alloc = allocated;
      last = Some(block);
      block = block.next();
    }

    if self.tail != last {
      return Err(Corruption::StaleTail {
        expected: last.map(Block::addr),
        found: self.tail.map(Block::addr),
      });
    }

    let mut listed = 0;

    for class in 0..NUM_CLASSES {
      let mut prev: Option<Block> = None;
      let mut cursor = self.free_lists.head(class);

      while let Some(block) = cursor {
        let addr = block.addr();

        // links are only followed once the entry looks like a free block of
        // this heap
        if !is_free_block(block, low, epilogue) {
          return Err(Corruption::ForeignListEntry { addr, class });
        }
        // doubly-linked lists cannot revisit an entry without breaking a
        // back link, so this also catches cycles and duplicates
        if block.list_prev() != prev {
          return Err(Corruption::BrokenLink { addr, class });
        }

        let expected = class_of(block.size());
        if expected != class {
          return Err(Corruption::WrongClass {
            addr,
            class,
            expected,
          });
        }

        listed += 1;
        if listed > free {
          return Err(Corruption::ListCountMismatch { listed, free });
        }

        summary.class_counts[class] += 1;
        prev = Some(block);
        cursor = block.list_next();
      }

      if self.free_lists.tail(class) != prev {
        let addr = prev.map_or(0, Block::addr);
        return Err(Corruption::BrokenLink { addr, class });
      }
    }

    if listed != free || self.free_lists.len() != free {
      return Err(Corruption::ListCountMismatch { listed, free });
    }

    Ok(summary)
  }
}

/// Counters gathered by the allocation-free walk.
#[derive(Default)]
struct Summary {
  heap_bytes: usize,
  class_counts: [usize; NUM_CLASSES],
}

/// Whether `block` sits inside the heap and carries the tags of a free
/// block. Bounds are checked before any word is read.
fn is_free_block(
  block: Block,
  low: usize,
  epilogue: usize,
) -> bool {
  let addr = block.addr();
  if addr < low + WSIZE || addr >= epilogue || !(addr + WSIZE).is_multiple_of(ALIGNMENT) {
    return false;
  }

  let size = block.size();
  !block.is_alloc()
    && size >= MIN_BLOCK_SIZE
    && size.is_multiple_of(ALIGNMENT)
    && addr + size <= epilogue
    && block.footer() == block.header()
}
