//! Property-based tests for the allocator.
//!
//! Uses proptest to drive random malloc/free/realloc/calloc workloads and
//! verify the heap invariants hold after every step.

use proptest::prelude::*;
use segalloc::{
  ArenaHeap, SegAllocator,
  size_class::{NUM_CLASSES, class_lower_bound, class_of},
};

#[derive(Debug, Clone)]
enum Op {
  Malloc(usize),
  Calloc(usize, usize),
  Free(usize),
  Realloc(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
  prop_oneof![
    4 => (1usize..3000).prop_map(Op::Malloc),
    1 => (0usize..64, 0usize..64).prop_map(|(count, size)| Op::Calloc(count, size)),
    3 => any::<usize>().prop_map(Op::Free),
    2 => (any::<usize>(), 1usize..6000).prop_map(|(index, size)| Op::Realloc(index, size)),
  ]
}

/// A live allocation and the byte it was filled with.
struct Live {
  ptr: *mut u8,
  size: usize,
  fill: u8,
}

fn assert_intact(live: &[Live]) -> Result<(), TestCaseError> {
  for entry in live {
    let bytes = unsafe { std::slice::from_raw_parts(entry.ptr, entry.size) };
    prop_assert!(bytes.iter().all(|&byte| byte == entry.fill));
  }

  let mut ranges: Vec<_> = live
    .iter()
    .map(|entry| (entry.ptr as usize, entry.ptr as usize + entry.size))
    .collect();
  ranges.sort_unstable();
  for pair in ranges.windows(2) {
    prop_assert!(pair[0].1 <= pair[1].0);
  }

  Ok(())
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  /// Random workloads keep payloads aligned, disjoint and intact, and the
  /// heap consistent
  #[test]
  fn random_workload_keeps_heap_consistent(ops in prop::collection::vec(op(), 1..150)) {
    let heap = ArenaHeap::with_capacity(8 << 20).unwrap();
    let mut allocator = SegAllocator::new(heap);
    let mut live: Vec<Live> = Vec::new();
    let mut fill = 0u8;

    for op in ops {
      fill = fill.wrapping_add(1);

      match op {
        Op::Malloc(size) => {
          let ptr = allocator.malloc(size);
          if !ptr.is_null() {
            prop_assert_eq!(ptr as usize % 16, 0);
            unsafe { ptr.write_bytes(fill, size) };
            live.push(Live { ptr, size, fill });
          }
        }
        Op::Calloc(count, size) => {
          let ptr = allocator.calloc(count, size);
          let total = count * size;
          if total == 0 {
            prop_assert!(ptr.is_null());
          } else if !ptr.is_null() {
            let bytes = unsafe { std::slice::from_raw_parts(ptr, total) };
            prop_assert!(bytes.iter().all(|&byte| byte == 0));
            live.push(Live { ptr, size: total, fill: 0 });
          }
        }
        Op::Free(index) => {
          if !live.is_empty() {
            let entry = live.swap_remove(index % live.len());
            unsafe { allocator.free(entry.ptr) };
          }
        }
        Op::Realloc(index, size) => {
          if !live.is_empty() {
            let slot = index % live.len();
            let entry = &mut live[slot];
            let ptr = unsafe { allocator.realloc(entry.ptr, size) };
            if !ptr.is_null() {
              let kept = entry.size.min(size);
              let bytes = unsafe { std::slice::from_raw_parts(ptr, kept) };
              prop_assert!(bytes.iter().all(|&byte| byte == entry.fill));

              unsafe { ptr.write_bytes(entry.fill, size) };
              entry.ptr = ptr;
              entry.size = size;
            }
          }
        }
      }

      assert_intact(&live)?;
      let report = allocator.check_heap();
      prop_assert!(report.is_ok(), "{:?}", report);
      prop_assert_eq!(allocator.stats().live_allocations, live.len());
    }

    for entry in live.drain(..) {
      unsafe { allocator.free(entry.ptr) };
    }
    let stats = allocator.stats();
    prop_assert_eq!(stats.live_allocations, 0);
    // everything merges back into one block once the heap exists
    let expected = if stats.heap_bytes > 0 { 1 } else { 0 };
    prop_assert_eq!(stats.free_blocks, expected);
  }

  /// Class lookup is total, in range and monotonic
  #[test]
  fn class_of_is_monotonic(a in 0usize..(1 << 26), b in 0usize..(1 << 26)) {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    prop_assert!(class_of(low) <= class_of(high));
    prop_assert!(class_of(high) < NUM_CLASSES);
  }

  /// Every size at or above 32 sits in the class whose range contains it
  #[test]
  fn class_of_matches_ranges(size in 32usize..(1 << 25)) {
    let class = class_of(size);
    prop_assert!(class_lower_bound(class) <= size);
    if class + 1 < NUM_CLASSES {
      prop_assert!(size < class_lower_bound(class + 1));
    }
  }
}
