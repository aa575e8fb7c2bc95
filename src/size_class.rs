//! Size class selection
//!
//! Free blocks are bucketed by powers of two: class `k` holds sizes in
//! `[2^(5+k), 2^(6+k))`, and the last class holds everything from 8 MiB up.

/// Number of segregated free lists.
pub const NUM_CLASSES: usize = 19;

/// log2 of the smallest block size, which opens class 0.
const MIN_CLASS_SHIFT: u32 = 5;

/// Maps a block size to its free-list bucket.
///
/// Total and monotonic: sizes below the minimum block size land in class 0
/// and anything past the last boundary is clamped into the last class.
pub const fn class_of(size: usize) -> usize {
  if size >> (MIN_CLASS_SHIFT + 1) == 0 {
    return 0;
  }

  let log2 = usize::BITS - 1 - size.leading_zeros();
  let class = (log2 - MIN_CLASS_SHIFT) as usize;

  if class >= NUM_CLASSES { NUM_CLASSES - 1 } else { class }
}

/// Smallest size that belongs to `class`.
pub const fn class_lower_bound(class: usize) -> usize {
  1 << (MIN_CLASS_SHIFT as usize + class)
}
