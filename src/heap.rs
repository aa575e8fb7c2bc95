//! Heap growth primitives.
//!
//! The allocator never maps memory itself. It asks a [`HeapSource`] for more
//! bytes, and the source must hand back a region that starts exactly where
//! the previous one ended:
//!
//! ```text
//!   low                                                        high
//!    ┌──────────┬──────────────────┬──────────────────┬─────────┐
//!    │ grow(16) │    grow(4096)    │    grow(4096)    │  ...    │
//!    └──────────┴──────────────────┴──────────────────┴─────────┘
//! ```

use std::{
  alloc::{self, Layout},
  ptr::NonNull,
};

use crate::{ALIGNMENT, align::checked_align, error::HeapError};

/// The external heap-extend primitive, analogous to `sbrk`.
pub trait HeapSource {
  /// Extends the heap by `bytes` and returns the start of the new region.
  ///
  /// The first region must be 16-byte aligned and every later region must
  /// begin at the previous [`high`](HeapSource::high). On failure the heap
  /// is left unchanged.
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, HeapError>;

  /// First byte of the heap, or null before the first `grow`.
  fn low(&self) -> *const u8;

  /// One past the last byte of the heap, or null before the first `grow`.
  fn high(&self) -> *const u8;

  /// Bytes handed out so far.
  fn len(&self) -> usize {
    self.high() as usize - self.low() as usize
  }

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A fixed-capacity heap carved out of a single buffer, like a simulated
/// `sbrk` with a hard limit.
///
/// Each instance owns its buffer, so independent allocators never share
/// memory.
pub struct ArenaHeap {
  base: NonNull<u8>,
  layout: Layout,
  brk: usize,
}

// SAFETY: the buffer is exclusively owned by the arena.
unsafe impl Send for ArenaHeap {}

impl ArenaHeap {
  pub fn with_capacity(capacity: usize) -> Result<Self, HeapError> {
    let too_large = HeapError::TooLarge {
      requested: capacity,
    };
    let size = checked_align(capacity.max(ALIGNMENT)).ok_or(too_large)?;
    let layout = Layout::from_size_align(size, ALIGNMENT).map_err(|_| too_large)?;

    // SAFETY: the layout has a non-zero size.
    let raw = unsafe { alloc::alloc_zeroed(layout) };
    let base = NonNull::new(raw).ok_or(HeapError::Exhausted {
      requested: size,
      available: 0,
    })?;

    Ok(Self { base, layout, brk: 0 })
  }

  pub fn capacity(&self) -> usize {
    self.layout.size()
  }

  pub fn remaining(&self) -> usize {
    self.capacity() - self.brk
  }
}

impl HeapSource for ArenaHeap {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, HeapError> {
    if bytes > self.remaining() {
      return Err(HeapError::Exhausted {
        requested: bytes,
        available: self.remaining(),
      });
    }

    // SAFETY: brk + bytes stays within the buffer.
    let region = unsafe { self.base.add(self.brk) };
    self.brk += bytes;

    Ok(region)
  }

  fn low(&self) -> *const u8 {
    self.base.as_ptr()
  }

  fn high(&self) -> *const u8 {
    // SAFETY: brk never exceeds the capacity.
    unsafe { self.base.as_ptr().add(self.brk) }
  }
}

impl Drop for ArenaHeap {
  fn drop(&mut self) {
    // SAFETY: allocated in `with_capacity` with the same layout.
    unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
  }
}

#[cfg(unix)]
pub use self::sbrk::SbrkHeap;

#[cfg(unix)]
mod sbrk {
  use std::{io, ptr, ptr::NonNull};

  use libc::{c_void, intptr_t, sbrk};
  use log::debug;

  use super::HeapSource;
  use crate::{ALIGNMENT, error::HeapError};

  /// Grows the process data segment with `sbrk(2)`.
  ///
  /// Assumes nothing else moves the program break while the allocator is in
  /// use; a foreign `sbrk` between two extensions is reported as
  /// [`HeapError::NonContiguous`]. The bytes obtained by the failed call are
  /// handed back, so the break is left where the other party put it. Growth
  /// keeps failing until that foreign region is released again, since the
  /// heap cannot skip over it.
  pub struct SbrkHeap {
    start: *mut u8,
    end: *mut u8,
  }

  // SAFETY: the program break is process-wide; the heap only records
  // addresses.
  unsafe impl Send for SbrkHeap {}

  impl SbrkHeap {
    pub const fn new() -> Self {
      Self {
        start: ptr::null_mut(),
        end: ptr::null_mut(),
      }
    }

    fn raw_sbrk(increment: usize) -> Result<*mut u8, HeapError> {
      let delta = intptr_t::try_from(increment).map_err(|_| HeapError::TooLarge {
        requested: increment,
      })?;

      let address = unsafe { sbrk(delta) };

      if address == usize::MAX as *mut c_void {
        let errno = io::Error::last_os_error().raw_os_error().unwrap_or(0);
        return Err(HeapError::Os { errno });
      }

      Ok(address as *mut u8)
    }

    /// Returns a region obtained from `raw_sbrk` if the break still ends
    /// right after it.
    fn give_back(
      address: *mut u8,
      increment: usize,
    ) {
      let Ok(delta) = intptr_t::try_from(increment) else {
        return;
      };

      let current = unsafe { sbrk(0) } as usize;
      if current == address as usize + increment {
        unsafe { sbrk(-delta) };
      }
    }
  }

  impl Default for SbrkHeap {
    fn default() -> Self {
      Self::new()
    }
  }

  impl HeapSource for SbrkHeap {
    fn grow(
      &mut self,
      bytes: usize,
    ) -> Result<NonNull<u8>, HeapError> {
      if self.start.is_null() {
        let current = Self::raw_sbrk(0)? as usize;
        let padding = crate::align_to!(current, ALIGNMENT) - current;
        let total = bytes.checked_add(padding).ok_or(HeapError::TooLarge {
          requested: bytes,
        })?;

        let address = Self::raw_sbrk(total)?;
        if address as usize != current {
          Self::give_back(address, total);
          return Err(HeapError::NonContiguous {
            expected: current,
            found: address as usize,
          });
        }

        // SAFETY: `total` bytes starting at `address` now belong to us.
        self.start = unsafe { address.add(padding) };
        self.end = unsafe { self.start.add(bytes) };
        debug!("sbrk heap starts at {:p} ({padding} bytes of padding)", self.start);

        return NonNull::new(self.start).ok_or(HeapError::Os { errno: 0 });
      }

      let address = Self::raw_sbrk(bytes)?;
      if address != self.end {
        Self::give_back(address, bytes);
        return Err(HeapError::NonContiguous {
          expected: self.end as usize,
          found: address as usize,
        });
      }

      // SAFETY: `bytes` bytes starting at `address` now belong to us.
      self.end = unsafe { address.add(bytes) };
      NonNull::new(address).ok_or(HeapError::Os { errno: 0 })
    }

    fn low(&self) -> *const u8 {
      self.start
    }

    fn high(&self) -> *const u8 {
      self.end
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_arena_grows_contiguously() {
    let mut heap = ArenaHeap::with_capacity(1024).unwrap();

    assert!(heap.is_empty());

    let first = heap.grow(16).unwrap();
    let second = heap.grow(64).unwrap();

    assert_eq!(first.as_ptr() as usize % ALIGNMENT, 0);
    assert_eq!(first.as_ptr() as *const u8, heap.low());
    assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 16);
    assert_eq!(heap.len(), 80);
    assert_eq!(heap.high() as usize, heap.low() as usize + 80);
  }

  #[test]
  fn test_arena_exhaustion_leaves_heap_untouched() {
    let mut heap = ArenaHeap::with_capacity(100).unwrap();

    assert_eq!(heap.capacity(), 112);
    heap.grow(96).unwrap();

    assert_eq!(
      heap.grow(32),
      Err(HeapError::Exhausted {
        requested: 32,
        available: 16,
      })
    );
    assert_eq!(heap.len(), 96);
    assert!(heap.grow(16).is_ok());
  }

  #[test]
  fn test_arena_rejects_absurd_capacity() {
    assert!(matches!(
      ArenaHeap::with_capacity(usize::MAX),
      Err(HeapError::TooLarge { .. })
    ));
  }

  #[cfg(unix)]
  #[test]
  fn test_sbrk_first_region_is_aligned() {
    let mut heap = SbrkHeap::new();

    assert!(heap.low().is_null());

    // Other threads of the test harness may move the break concurrently; a
    // reported race is acceptable, a misaligned region is not.
    match heap.grow(64) {
      Ok(region) => {
        assert_eq!(region.as_ptr() as usize % ALIGNMENT, 0);
        assert_eq!(heap.len(), 64);
      }
      Err(err) => assert!(matches!(err, HeapError::NonContiguous { .. })),
    }
  }
}
