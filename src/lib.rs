//! # segalloc - A Segregated-Fit Memory Allocator Library
//!
//! This crate provides a **boundary-tag allocator with segregated free lists**
//! offering `malloc`/`free`/`realloc`/`calloc` over one contiguous heap that
//! only ever grows.
//!
//! ## Overview
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         HEAP MEMORY                                  │
//!   │                                                                      │
//!   │  ┌────┬───────┬──────────┬─────┬─────────────┬──────────────────┬──┐ │
//!   │  │ PF │  A1   │   free   │ A2  │     A3      │       free       │EH│ │
//!   │  └────┴───────┴──────────┴─────┴─────────────┴──────────────────┴──┘ │
//!   │   ▲                                                 ▲             ▲  │
//!   │   │                                                 │             │  │
//!   │ Prologue                                      Tail marker   Epilogue │
//!   │ (size 0, allocated)                         (last block)  (size 0)   │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Free blocks are never adjacent: freeing merges with free neighbours.
//! ```
//!
//! Free blocks are filed by size into 19 power-of-two classes:
//!
//! ```text
//!   class:   0        1         2               17                 18
//!          [32,64) [64,128) [128,256)  ...  [4Mi,8Mi)          [8Mi, ∞)
//!            │        │         │                 │                  │
//!            ▼        ▼         ▼                 ▼                  ▼
//!          head ⇄ .. head     head              head ⇄ ...         head
//! ```
//!
//! Allocation searches the request's class first-fit, then every larger
//! class. When nothing fits, the heap grows by at least one chunk.
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align       - Alignment macros (align!, align_to!)
//!   ├── block       - Boundary tags and the Block handle (internal)
//!   ├── size_class  - Size class index
//!   ├── free_list   - Segregated FIFO free lists (internal)
//!   ├── coalesce    - Merging of free neighbours (internal)
//!   ├── extend      - Heap growth (internal)
//!   ├── allocator   - SegAllocator: malloc/free/realloc/calloc
//!   ├── check       - Heap consistency checker
//!   ├── heap        - HeapSource trait, ArenaHeap, SbrkHeap
//!   ├── global      - LockedAllocator (GlobalAlloc)
//!   ├── config      - AllocatorConfig
//!   ├── stats       - HeapStats
//!   └── error       - AllocError, HeapError, Corruption
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use segalloc::{ArenaHeap, SegAllocator};
//!
//! let heap = ArenaHeap::with_capacity(1 << 20).unwrap();
//! let mut allocator = SegAllocator::new(heap);
//!
//! let ptr = allocator.malloc(40) as *mut u64;
//! assert!(!ptr.is_null());
//! assert_eq!(ptr as usize % 16, 0);
//!
//! unsafe {
//!     *ptr = 42;
//!     assert_eq!(*ptr, 42);
//!     allocator.free(ptr as *mut u8);
//! }
//!
//! assert!(allocator.check_heap().is_ok());
//! ```
//!
//! ## How It Works
//!
//! Each block starts with an 8-byte header. Sizes are multiples of 16, so the
//! low bits hold the block's own allocation flag and a copy of its
//! predecessor's:
//!
//! ```text
//!   Header word:
//!   ┌───────────────────────────────────────────┬───┬───┬───┬───┐
//!   │                 size                      │ 0 │ 0 │ p │ a │
//!   └───────────────────────────────────────────┴───┴───┴───┴───┘
//!                                                         │   └── allocated
//!                                                         └────── prev allocated
//! ```
//!
//! Free blocks repeat the header as a footer and keep their list links in
//! the first payload bytes. Allocated blocks need no footer: the successor's
//! prev-allocated bit says all there is to know.
//!
//! ## Limitations
//!
//! - **Single-threaded core**: [`SegAllocator`] has no internal locking; use
//!   [`LockedAllocator`] to share one heap
//! - **Never shrinks**: memory is reused but not returned to the heap source
//! - **16-byte alignment**: larger alignments are refused by the
//!   `GlobalAlloc` adapter
//!
//! ## Safety
//!
//! Freeing and reallocating take raw pointers and are `unsafe`: passing a
//! pointer the allocator did not hand out corrupts the heap.

pub mod align;
mod allocator;
mod block;
mod check;
mod coalesce;
pub mod config;
mod error;
mod extend;
mod free_list;
mod global;
mod heap;
pub mod size_class;
mod stats;

pub use align::ALIGNMENT;
pub use allocator::SegAllocator;
pub use block::{MIN_BLOCK_SIZE, PAYLOAD_OFFSET};
pub use check::{BlockInfo, HeapReport};
pub use config::AllocatorConfig;
pub use error::{AllocError, ConfigError, Corruption, HeapError};
pub use global::LockedAllocator;
pub use heap::{ArenaHeap, HeapSource};
#[cfg(unix)]
pub use heap::SbrkHeap;
pub use stats::HeapStats;
