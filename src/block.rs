//! Block layout and boundary-tag encoding.
//!
//! ```text
//!   Allocated block:                     Free block:
//!   ┌──────────────────────────┐         ┌──────────────────────────┐
//!   │ header: size | p | a     │ 8 B     │ header: size | p | a     │ 8 B
//!   ├──────────────────────────┤ ◄─ ptr  ├──────────────────────────┤
//!   │                          │         │ list_prev                │ 8 B
//!   │   payload (opaque)       │         │ list_next                │ 8 B
//!   │                          │         │ ...                      │
//!   │                          │         ├──────────────────────────┤
//!   │                          │         │ footer == header         │ 8 B
//!   └──────────────────────────┘         └──────────────────────────┘
//! ```
//!
//! The payload always begins [`PAYLOAD_OFFSET`] bytes after the header.
//! Sizes are multiples of 16, which leaves the low four bits of every tag
//! free: bit 0 is the allocated flag, bit 1 mirrors the allocated flag of the
//! physically preceding block.
//!
//! This module is the only place in the crate that dereferences heap
//! addresses. Everything else goes through [`Block`].

use std::{fmt, mem, ptr, ptr::NonNull};

/// A boundary tag.
pub type Word = u64;

/// Size of a header or footer.
pub const WSIZE: usize = mem::size_of::<Word>();

/// Distance from a block's header to its payload.
pub const PAYLOAD_OFFSET: usize = WSIZE;

/// Header, two list links and a footer.
pub const MIN_BLOCK_SIZE: usize = 4 * WSIZE;

const ALLOC_MASK: Word = 0x1;
const PREV_ALLOC_MASK: Word = 0x2;
const SIZE_MASK: Word = !0xF;

const LIST_PREV_OFFSET: usize = PAYLOAD_OFFSET;
const LIST_NEXT_OFFSET: usize = PAYLOAD_OFFSET + WSIZE;

/// Packs a block size and its two status bits into a tag.
pub const fn pack(
  size: usize,
  prev_alloc: bool,
  alloc: bool,
) -> Word {
  (size as Word & SIZE_MASK) | ((prev_alloc as Word) << 1) | alloc as Word
}

pub const fn extract_size(word: Word) -> usize {
  (word & SIZE_MASK) as usize
}

pub const fn extract_alloc(word: Word) -> bool {
  word & ALLOC_MASK != 0
}

pub const fn extract_prev_alloc(word: Word) -> bool {
  word & PREV_ALLOC_MASK != 0
}

/// Handle to a block header inside a live heap.
///
/// A `Block` is just an address. Constructing one is `unsafe`: the caller
/// promises the address is the header of a block (or the epilogue) of a heap
/// whose boundary tags are consistent. Under that promise every accessor is
/// safe to call, because each one only touches words the tags say belong to
/// this block or its immediate neighbours.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block(NonNull<u8>);

impl Block {
  /// # Safety
  ///
  /// `header` must point at a block header or the epilogue of a heap managed
  /// by this crate, and stay valid for as long as the handle is used.
  pub(crate) unsafe fn from_header(header: NonNull<u8>) -> Self {
    Self(header)
  }

  /// Recovers the block owning a payload pointer.
  ///
  /// # Safety
  ///
  /// `payload` must have been returned by the allocator that owns the heap,
  /// or be the start of a fresh heap extension (whose header word is the old
  /// epilogue).
  pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> Self {
    Self(unsafe { payload.sub(PAYLOAD_OFFSET) })
  }

  pub(crate) fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  fn read_word(
    self,
    offset: usize,
  ) -> Word {
    // SAFETY: the constructor contract guarantees every offset we compute
    // from the block's own size lands inside the heap.
    unsafe { self.0.add(offset).cast::<Word>().read() }
  }

  fn write_word(
    self,
    offset: usize,
    word: Word,
  ) {
    // SAFETY: see `read_word`.
    unsafe { self.0.add(offset).cast::<Word>().write(word) }
  }

  pub(crate) fn header(self) -> Word {
    self.read_word(0)
  }

  pub(crate) fn size(self) -> usize {
    extract_size(self.header())
  }

  pub(crate) fn is_alloc(self) -> bool {
    extract_alloc(self.header())
  }

  pub(crate) fn is_prev_alloc(self) -> bool {
    extract_prev_alloc(self.header())
  }

  /// Footer of a free block.
  pub(crate) fn footer(self) -> Word {
    debug_assert!(!self.is_alloc(), "allocated blocks carry no footer");
    self.read_word(self.size() - WSIZE)
  }

  pub(crate) fn write_header(
    self,
    size: usize,
    prev_alloc: bool,
    alloc: bool,
  ) {
    self.write_word(0, pack(size, prev_alloc, alloc));
  }

  /// Writes matching header and footer for a free block of `size` bytes.
  pub(crate) fn write_free(
    self,
    size: usize,
    prev_alloc: bool,
  ) {
    debug_assert!(size >= MIN_BLOCK_SIZE);
    let tag = pack(size, prev_alloc, false);
    self.write_word(0, tag);
    self.write_word(size - WSIZE, tag);
  }

  /// Turns this word into the zero-size terminating sentinel.
  pub(crate) fn write_epilogue(
    self,
    prev_alloc: bool,
  ) {
    self.write_word(0, pack(0, prev_alloc, true));
  }

  /// Updates the mirrored allocation bit of the preceding block, keeping a
  /// free block's footer in sync with its header.
  pub(crate) fn set_prev_alloc(
    self,
    prev_alloc: bool,
  ) {
    let header = self.header();
    let tag = (header & !PREV_ALLOC_MASK) | ((prev_alloc as Word) << 1);
    self.write_word(0, tag);

    let size = extract_size(header);
    if size != 0 && !extract_alloc(header) {
      self.write_word(size - WSIZE, tag);
    }
  }

  pub(crate) fn payload(self) -> NonNull<u8> {
    // SAFETY: every block, including the epilogue, is followed by at least
    // one more word of heap.
    unsafe { self.0.add(PAYLOAD_OFFSET) }
  }

  pub(crate) fn payload_size(self) -> usize {
    self.size() - PAYLOAD_OFFSET
  }

  /// The physically following block.
  pub(crate) fn next(self) -> Block {
    debug_assert!(self.size() != 0, "the epilogue has no successor");
    Self(unsafe { self.0.add(self.size()) })
  }

  /// The physically preceding block, located through its footer.
  pub(crate) fn prev(self) -> Block {
    debug_assert!(!self.is_prev_alloc(), "only free predecessors carry a footer");
    // SAFETY: the predecessor is free, so the word before our header is its
    // footer and its size walks back to its header.
    unsafe {
      let footer = self.0.sub(WSIZE).cast::<Word>().read();
      Self(self.0.sub(extract_size(footer)))
    }
  }

  fn read_link(
    self,
    offset: usize,
  ) -> Option<Block> {
    debug_assert!(!self.is_alloc(), "list links of an allocated block are user data");
    // SAFETY: a free block is at least MIN_BLOCK_SIZE long, so both link
    // slots are inside it.
    let raw = unsafe { self.0.add(offset).cast::<*mut u8>().read() };
    NonNull::new(raw).map(Self)
  }

  fn write_link(
    self,
    offset: usize,
    target: Option<Block>,
  ) {
    debug_assert!(!self.is_alloc(), "list links of an allocated block are user data");
    let raw = target.map_or(ptr::null_mut(), |block| block.0.as_ptr());
    // SAFETY: see `read_link`.
    unsafe { self.0.add(offset).cast::<*mut u8>().write(raw) }
  }

  pub(crate) fn list_prev(self) -> Option<Block> {
    self.read_link(LIST_PREV_OFFSET)
  }

  pub(crate) fn list_next(self) -> Option<Block> {
    self.read_link(LIST_NEXT_OFFSET)
  }

  pub(crate) fn set_list_prev(
    self,
    target: Option<Block>,
  ) {
    self.write_link(LIST_PREV_OFFSET, target);
  }

  pub(crate) fn set_list_next(
    self,
    target: Option<Block>,
  ) {
    self.write_link(LIST_NEXT_OFFSET, target);
  }
}

impl fmt::Debug for Block {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "Block({:#x})", self.addr())
  }
}

/// Writes the prologue footer and the first epilogue header into the first
/// two words of a fresh heap. Returns the epilogue, which the first heap
/// extension turns into the first real block.
///
/// # Safety
///
/// `base` must point at `2 * WSIZE` writable bytes, 16-byte aligned.
pub(crate) unsafe fn install_sentinels(base: NonNull<u8>) -> Block {
  unsafe {
    base.cast::<Word>().write(pack(0, true, true));
    let epilogue = Block::from_header(base.add(WSIZE));
    epilogue.write_epilogue(true);
    epilogue
  }
}
