//! `GlobalAlloc` adapter.
//!
//! The allocator itself is single-threaded. `LockedAllocator` serialises
//! every call through a mutex so one heap can back `#[global_allocator]`:
//!
//! ```rust,ignore
//! use segalloc::{LockedAllocator, SbrkHeap};
//!
//! #[global_allocator]
//! static ALLOCATOR: LockedAllocator<SbrkHeap> = LockedAllocator::new(SbrkHeap::new());
//! ```
//!
//! Installed as the global allocator, a `log` backend that allocates while
//! recording would re-enter the lock; keep logging disabled or non-allocating
//! in that setup.

use std::alloc::{GlobalAlloc, Layout};

use parking_lot::{Mutex, MutexGuard, const_mutex};

use crate::{ALIGNMENT, allocator::SegAllocator, heap::HeapSource};

pub struct LockedAllocator<H: HeapSource> {
  inner: Mutex<SegAllocator<H>>,
}

// SAFETY: the heap is only reachable through the mutex, and the heap source
// itself may move between threads.
unsafe impl<H: HeapSource + Send> Send for LockedAllocator<H> {}
unsafe impl<H: HeapSource + Send> Sync for LockedAllocator<H> {}

impl<H: HeapSource> LockedAllocator<H> {
  pub const fn new(heap: H) -> Self {
    Self::from_allocator(SegAllocator::new(heap))
  }

  pub const fn from_allocator(allocator: SegAllocator<H>) -> Self {
    Self {
      inner: const_mutex(allocator),
    }
  }

  /// Exclusive access to the underlying allocator, e.g. for
  /// [`validate_heap`](SegAllocator::validate_heap) or
  /// [`stats`](SegAllocator::stats).
  ///
  /// Nothing done through the guard may allocate when this instance is the
  /// `#[global_allocator]`: the allocation would need the lock already held.
  /// [`check_heap`](SegAllocator::check_heap) builds a report and therefore
  /// must not be called there.
  pub fn lock(&self) -> MutexGuard<'_, SegAllocator<H>> {
    self.inner.lock()
  }
}

unsafe impl<H: HeapSource + Send> GlobalAlloc for LockedAllocator<H> {
  unsafe fn alloc(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return std::ptr::null_mut();
    }
    self.lock().malloc(layout.size().max(1))
  }

  unsafe fn dealloc(
    &self,
    ptr: *mut u8,
    _layout: Layout,
  ) {
    unsafe { self.lock().free(ptr) }
  }

  unsafe fn alloc_zeroed(
    &self,
    layout: Layout,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return std::ptr::null_mut();
    }
    self.lock().calloc(1, layout.size().max(1))
  }

  unsafe fn realloc(
    &self,
    ptr: *mut u8,
    layout: Layout,
    new_size: usize,
  ) -> *mut u8 {
    if layout.align() > ALIGNMENT {
      return std::ptr::null_mut();
    }
    unsafe { self.lock().realloc(ptr, new_size.max(1)) }
  }
}
