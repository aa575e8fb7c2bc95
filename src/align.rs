/// Alignment of every payload handed out by the allocator, and granularity
/// of every block size.
pub const ALIGNMENT: usize = 16;

/// Rounds a value up to the heap alignment (16 bytes).
///
/// # Examples
///
/// ```rust
/// use segalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(32), 32);
/// assert_eq!(align!(33), 48);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::ALIGNMENT)
  };
}

/// Rounds a value up to the next multiple of a power of two.
///
/// ```rust
/// use segalloc::align_to;
///
/// assert_eq!(align_to!(13, 8), 16);
/// assert_eq!(align_to!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

/// Overflow-aware variant of [`align!`] for sizes coming from callers.
pub const fn checked_align(value: usize) -> Option<usize> {
  match value.checked_add(ALIGNMENT - 1) {
    Some(bumped) => Some(bumped & !(ALIGNMENT - 1)),
    None => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ALIGNMENT * i + 1)..=(ALIGNMENT * (i + 1));

      let expected_alignment = ALIGNMENT * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_align_to() {
    assert_eq!(align_to!(0usize, 4096), 0);
    assert_eq!(align_to!(1usize, 4096), 4096);
    assert_eq!(align_to!(24usize, 8), 24);
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - 20), Some(usize::MAX - 15));
  }
}
