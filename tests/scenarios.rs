//! End-to-end allocation scenarios over a private arena.

use std::collections::HashSet;

use segalloc::{AllocatorConfig, ArenaHeap, SegAllocator};

fn allocator(capacity: usize) -> SegAllocator<ArenaHeap> {
  let heap = ArenaHeap::with_capacity(capacity).unwrap();
  SegAllocator::with_config(heap, AllocatorConfig::new().with_check_heap(true)).unwrap()
}

#[test]
fn reuse_after_free_does_not_grow_heap() {
  let mut allocator = allocator(1 << 20);

  let first = allocator.malloc(40);
  let second = allocator.malloc(40);
  assert!(!first.is_null() && !second.is_null());
  let heap_bytes = allocator.stats().heap_bytes;

  unsafe { allocator.free(first) };
  let third = allocator.malloc(40);

  assert_eq!(third, first);
  assert_eq!(allocator.stats().heap_bytes, heap_bytes);
}

#[cfg(target_pointer_width = "64")]
#[test]
fn overflowing_calloc_returns_null_without_growth() {
  let mut allocator = allocator(1 << 20);

  assert!(allocator.calloc(0x1_0000_0000, 0x1_0000_0000).is_null());
  assert_eq!(allocator.stats().heap_bytes, 0);
  assert_eq!(allocator.stats().extensions, 0);
}

#[test]
fn reverse_free_coalesces_back_to_extensions() {
  let mut allocator = allocator(1 << 20);
  let mut live = Vec::new();

  while allocator.stats().extensions < 3 {
    let ptr = allocator.malloc(1000);
    assert!(!ptr.is_null());
    live.push(ptr);
  }

  for ptr in live.into_iter().rev() {
    unsafe { allocator.free(ptr) };
  }

  let stats = allocator.stats();
  assert_eq!(stats.live_allocations, 0);
  assert!(stats.free_blocks <= stats.extensions);
  // contiguous extensions leave a single free block spanning the heap
  assert_eq!(stats.free_blocks, 1);

  let report = allocator.check_heap().unwrap();
  assert_eq!(report.blocks.len(), 1);
  assert_eq!(report.blocks[0].size, stats.heap_bytes - 16);
}

#[test]
fn payloads_are_aligned_and_disjoint() {
  let mut allocator = allocator(1 << 20);
  let sizes = [1, 7, 16, 24, 25, 100, 255, 256, 1000, 4000, 5000, 9000];
  let mut ranges = Vec::new();

  for &size in sizes.iter().cycle().take(60) {
    let ptr = allocator.malloc(size);
    assert!(!ptr.is_null());
    assert_eq!(ptr as usize % 16, 0);
    ranges.push((ptr as usize, ptr as usize + size));
  }

  ranges.sort_unstable();
  for pair in ranges.windows(2) {
    assert!(pair[0].1 <= pair[1].0, "{:x?} overlaps {:x?}", pair[0], pair[1]);
  }

  let unique: HashSet<_> = ranges.iter().map(|range| range.0).collect();
  assert_eq!(unique.len(), ranges.len());
}

#[test]
fn patterns_survive_unrelated_traffic() {
  let mut allocator = allocator(1 << 20);

  let keep = allocator.malloc(300);
  unsafe { keep.write_bytes(0xC3, 300) };

  let mut scratch = Vec::new();
  for round in 0..50 {
    scratch.push(allocator.malloc(16 + round * 37));
    if round % 3 == 0 {
      let victim = scratch.swap_remove(round % scratch.len());
      unsafe { allocator.free(victim) };
    }
  }
  for ptr in scratch {
    unsafe { allocator.free(ptr) };
  }

  let bytes = unsafe { std::slice::from_raw_parts(keep, 300) };
  assert!(bytes.iter().all(|&byte| byte == 0xC3));
}

#[test]
fn realloc_preserves_prefix() {
  let mut allocator = allocator(1 << 20);

  unsafe {
    let ptr = allocator.malloc(100);
    for i in 0..100 {
      *ptr.add(i) = i as u8;
    }

    let grown = allocator.realloc(ptr, 10_000);
    for i in 0..100 {
      assert_eq!(*grown.add(i), i as u8);
    }

    let shrunk = allocator.realloc(grown, 33);
    for i in 0..33 {
      assert_eq!(*shrunk.add(i), i as u8);
    }

    allocator.free(shrunk);
  }

  assert_eq!(allocator.stats().live_allocations, 0);
}

#[test]
fn calloc_after_dirty_free_is_zeroed() {
  let mut allocator = allocator(1 << 20);

  let dirty = allocator.malloc(2048);
  unsafe {
    dirty.write_bytes(0xFF, 2048);
    allocator.free(dirty);
  }

  let zeroed = allocator.calloc(512, 4);
  let bytes = unsafe { std::slice::from_raw_parts(zeroed, 2048) };
  assert!(bytes.iter().all(|&byte| byte == 0));
}

#[test]
fn exhausted_heap_recovers_after_free() {
  let mut allocator = allocator(16 + 3 * 4096);
  let mut live = Vec::new();

  loop {
    let ptr = allocator.malloc(512);
    if ptr.is_null() {
      break;
    }
    live.push(ptr);
  }
  assert!(!live.is_empty());
  assert!(allocator.check_heap().is_ok());

  let victim = live.pop().unwrap();
  unsafe { allocator.free(victim) };

  assert_eq!(allocator.malloc(512), victim);
}

#[test]
fn independent_instances_do_not_share_state() {
  let mut left = allocator(1 << 16);
  let mut right = allocator(1 << 16);

  let a = left.malloc(64);
  let b = right.malloc(64);

  assert_ne!(a, b);
  assert_eq!(left.stats().live_allocations, 1);
  assert_eq!(right.stats().live_allocations, 1);

  unsafe { left.free(a) };
  assert_eq!(right.stats().live_allocations, 1);
}
