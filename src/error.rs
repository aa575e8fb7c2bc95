//! Error types for the allocator

use thiserror::Error;

/// Failure reported by a [`HeapSource`](crate::HeapSource) when it cannot
/// extend the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
  #[error("heap exhausted: requested {requested} bytes, {available} available")]
  Exhausted { requested: usize, available: usize },
  #[error("request of {requested} bytes exceeds the addressable heap")]
  TooLarge { requested: usize },
  #[error("heap extension is not contiguous: expected {expected:#x}, got {found:#x}")]
  NonContiguous { expected: usize, found: usize },
  #[error("heap growth failed with errno {errno}")]
  Os { errno: i32 },
}

/// Errors surfaced by the fallible allocation entry points.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
  /// The heap source refused to grow.
  #[error("out of memory while extending the heap by {requested} bytes")]
  OutOfMemory {
    requested: usize,
    #[source]
    source: HeapError,
  },
  /// The adjusted block size does not fit in `usize`.
  #[error("allocation of {requested} bytes is too large")]
  TooLarge { requested: usize },
  /// `malloc(0)` and friends. Not a failure for the raw entry points.
  #[error("zero-size allocation")]
  ZeroSize,
  /// `calloc` element count times element size overflowed.
  #[error("calloc overflow: {count} x {size} does not fit in usize")]
  ArithmeticOverflow { count: usize, size: usize },
  /// The consistency checker found a broken invariant.
  #[error("heap corruption: {0}")]
  HeapCorruption(#[from] Corruption),
}

/// An invariant violation found by the heap checker. Addresses are block
/// header addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Corruption {
  #[error("block {addr:#x} lies outside the heap")]
  OutOfBounds { addr: usize },
  #[error("block {addr:#x} has a misaligned payload")]
  Misaligned { addr: usize },
  #[error("block {addr:#x} has invalid size {size}")]
  BadSize { addr: usize, size: usize },
  #[error("block {addr:#x}: footer {footer:#x} does not match header {header:#x}")]
  FooterMismatch { addr: usize, header: u64, footer: u64 },
  #[error("block {addr:#x}: prev-allocated bit disagrees with its predecessor")]
  PrevAllocMismatch { addr: usize },
  #[error("block {addr:#x} and its predecessor are both free")]
  AdjacentFree { addr: usize },
  #[error("expected the epilogue at {addr:#x}")]
  MissingEpilogue { addr: usize },
  #[error("tail marker {found:?} does not name the last block {expected:?}")]
  StaleTail {
    expected: Option<usize>,
    found: Option<usize>,
  },
  #[error("free list {class} holds {addr:#x}, which is not a free heap block")]
  ForeignListEntry { addr: usize, class: usize },
  #[error("free list {class} holds {addr:#x}, which belongs in class {expected}")]
  WrongClass {
    addr: usize,
    class: usize,
    expected: usize,
  },
  #[error("free list {class} has a broken link at {addr:#x}")]
  BrokenLink { addr: usize, class: usize },
  #[error("{listed} blocks are listed but the heap holds {free} free blocks")]
  ListCountMismatch { listed: usize, free: usize },
}

/// Rejected [`AllocatorConfig`](crate::AllocatorConfig) values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
  #[error("chunk size {0} must be a non-zero multiple of 16")]
  InvalidChunkSize(usize),
}

#[cfg(test)]
mod tests {
  use std::error::Error as _;

  use super::*;

  #[test]
  fn test_out_of_memory_keeps_source() {
    let err = AllocError::OutOfMemory {
      requested: 4096,
      source: HeapError::Exhausted {
        requested: 4096,
        available: 16,
      },
    };

    assert_eq!(err.to_string(), "out of memory while extending the heap by 4096 bytes");
    assert_eq!(
      err.source().map(ToString::to_string),
      Some("heap exhausted: requested 4096 bytes, 16 available".to_string())
    );
  }

  #[test]
  fn test_corruption_converts() {
    let err: AllocError = Corruption::AdjacentFree { addr: 0x40 }.into();

    assert_eq!(err.to_string(), "heap corruption: block 0x40 and its predecessor are both free");
  }
}
