use std::ptr::{self, NonNull};

use log::{debug, trace, warn};

use crate::{
  align::checked_align,
  block::{self, Block, MIN_BLOCK_SIZE, PAYLOAD_OFFSET, WSIZE},
  config::AllocatorConfig,
  error::{AllocError, ConfigError},
  free_list::FreeListStore,
  heap::HeapSource,
  stats::HeapStats,
};

/// Segregated-fit allocator over a single growable heap.
///
/// Not thread-safe: wrap it in a [`LockedAllocator`](crate::LockedAllocator)
/// or keep one instance per thread.
pub struct SegAllocator<H: HeapSource> {
  pub(crate) heap: H,
  pub(crate) config: AllocatorConfig,
  pub(crate) free_lists: FreeListStore,
  /// Header of the first block (the word after the prologue). `None` until
  /// the heap is initialised.
  pub(crate) heap_start: Option<Block>,
  /// Physically last block below the epilogue.
  pub(crate) tail: Option<Block>,
  pub(crate) extensions: usize,
  pub(crate) live: usize,
}

impl<H: HeapSource> SegAllocator<H> {
  /// Creates an allocator with the default configuration. The heap source
  /// is not touched until the first allocation.
  pub const fn new(heap: H) -> Self {
    Self {
      heap,
      config: AllocatorConfig::DEFAULT,
      free_lists: FreeListStore::new(),
      heap_start: None,
      tail: None,
      extensions: 0,
      live: 0,
    }
  }

  pub fn with_config(
    heap: H,
    config: AllocatorConfig,
  ) -> Result<Self, ConfigError> {
    config.validate()?;
    let mut allocator = Self::new(heap);
    allocator.config = config;
    Ok(allocator)
  }

  pub fn config(&self) -> &AllocatorConfig {
    &self.config
  }

  pub fn heap(&self) -> &H {
    &self.heap
  }

  pub fn stats(&self) -> HeapStats {
    HeapStats {
      heap_bytes: self.heap.len(),
      extensions: self.extensions,
      live_allocations: self.live,
      free_blocks: self.free_lists.len(),
    }
  }

  /// Writes the prologue and epilogue, then extends by one chunk.
  fn init(&mut self) -> Result<(), AllocError> {
    if self.heap_start.is_some() {
      return Ok(());
    }

    let base = self
      .heap
      .grow(2 * WSIZE)
      .map_err(|source| AllocError::OutOfMemory {
        requested: 2 * WSIZE,
        source,
      })?;

    // SAFETY: the heap source just handed us 16 fresh, aligned bytes.
    self.heap_start = Some(unsafe { block::install_sentinels(base) });
    debug!("heap initialised at {:p}", base);

    self.extend_heap(self.config.chunk_size)?;
    Ok(())
  }

  /// Allocates at least `size` bytes, 16-byte aligned.
  pub fn try_malloc(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    let asize = adjusted_size(size).ok_or(AllocError::TooLarge { requested: size })?;
    self.init()?;

    let block = match self.free_lists.find_fit(asize) {
      Some(block) => block,
      None => self.extend_heap(asize.max(self.config.chunk_size))?,
    };

    self.place(block, asize);
    self.live += 1;

    let payload = block.payload();
    trace!("malloc({size}) -> {:p} (block size {})", payload, block.size());
    self.verify("malloc");

    Ok(payload)
  }

  /// Returns null when `size` is zero or the heap cannot grow.
  pub fn malloc(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    match self.try_malloc(size) {
      Ok(payload) => payload.as_ptr(),
      Err(err) => {
        report(&err, "malloc");
        ptr::null_mut()
      }
    }
  }

  /// Allocates `count * size` zeroed bytes.
  pub fn try_calloc(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let total = count
      .checked_mul(size)
      .ok_or(AllocError::ArithmeticOverflow { count, size })?;

    let payload = self.try_malloc(total)?;
    // SAFETY: the block holds at least `total` payload bytes.
    unsafe { ptr::write_bytes(payload.as_ptr(), 0, total) };

    Ok(payload)
  }

  pub fn calloc(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    match self.try_calloc(count, size) {
      Ok(payload) => payload.as_ptr(),
      Err(err) => {
        report(&err, "calloc");
        ptr::null_mut()
      }
    }
  }

  /// Releases a block. Null is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn free(
    &mut self,
    ptr: *mut u8,
  ) {
    let Some(payload) = NonNull::new(ptr) else {
      return;
    };

    // SAFETY: caller guarantees `payload` came from us.
    let block = unsafe { Block::from_payload(payload) };
    debug_assert!(block.is_alloc(), "double free of {:p}", ptr);

    let size = block.size();
    block.write_free(size, block.is_prev_alloc());
    self.coalesce(block);
    self.live -= 1;

    trace!("free({:p}) released {size} bytes", ptr);
    self.verify("free");
  }

  /// Moves an allocation into a block of `size` bytes, preserving the first
  /// `min(size, old payload)` bytes. On error the original is untouched.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live pointer returned by this allocator.
  pub unsafe fn try_realloc(
    &mut self,
    ptr: NonNull<u8>,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }

    // SAFETY: caller guarantees `ptr` came from us.
    let old_payload = unsafe { Block::from_payload(ptr) }.payload_size();
    let new = self.try_malloc(size)?;

    unsafe {
      ptr::copy_nonoverlapping(ptr.as_ptr(), new.as_ptr(), size.min(old_payload));
      self.free(ptr.as_ptr());
    }

    trace!("realloc({:p}, {size}) -> {:p}", ptr, new);
    Ok(new)
  }

  /// C `realloc`: null `ptr` allocates, zero `size` frees and returns null.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn realloc(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> *mut u8 {
    let Some(old) = NonNull::new(ptr) else {
      return self.malloc(size);
    };

    if size == 0 {
      unsafe { self.free(ptr) };
      return ptr::null_mut();
    }

    match unsafe { self.try_realloc(old, size) } {
      Ok(new) => new.as_ptr(),
      Err(err) => {
        report(&err, "realloc");
        ptr::null_mut()
      }
    }
  }

  /// Payload bytes usable through `ptr`; zero for null.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer returned by this allocator.
  pub unsafe fn usable_size(
    &self,
    ptr: *const u8,
  ) -> usize {
    match NonNull::new(ptr.cast_mut()) {
      Some(payload) => unsafe { Block::from_payload(payload) }.payload_size(),
      None => 0,
    }
  }

  /// Carves an `asize` allocation out of a free block, returning any
  /// worthwhile remainder to the free lists.
  fn place(
    &mut self,
    block: Block,
    asize: usize,
  ) {
    let csize = block.size();
    let prev_alloc = block.is_prev_alloc();
    self.free_lists.remove(block);

    if csize - asize >= MIN_BLOCK_SIZE {
      block.write_header(asize, prev_alloc, true);

      let remainder = block.next();
      remainder.write_free(csize - asize, true);
      remainder.next().set_prev_alloc(false);
      if self.tail == Some(block) {
        self.tail = Some(remainder);
      }
      self.free_lists.insert(remainder);
    } else {
      block.write_header(csize, prev_alloc, true);
      block.next().set_prev_alloc(true);
    }
  }

  /// Runs the consistency checker after a mutating call when enabled.
  /// Folds away entirely in release builds. Uses the allocation-free walk so
  /// it also works under [`LockedAllocator`](crate::LockedAllocator).
  #[inline]
  fn verify(
    &self,
    operation: &'static str,
  ) {
    if cfg!(debug_assertions) && self.config.check_heap {
      if let Err(err) = self.validate_heap() {
        panic!("heap check failed after {operation}: {err}");
      }
    }
  }
}

/// Block size for a `size`-byte request: header plus payload, rounded to the
/// alignment and clamped to the minimum block.
fn adjusted_size(size: usize) -> Option<usize> {
  let asize = checked_align(size.checked_add(PAYLOAD_OFFSET)?)?;
  Some(asize.max(MIN_BLOCK_SIZE))
}

fn report(
  err: &AllocError,
  operation: &str,
) {
  match err {
    AllocError::ZeroSize => {}
    err => warn!("{operation} failed: {err}"),
  }
}
