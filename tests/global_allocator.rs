//! Runs with a `LockedAllocator` installed as the process allocator.
//!
//! Built without the test harness: the whole binary, runtime included,
//! allocates through the heap under test.

#[cfg(unix)]
mod installed {
  use segalloc::{LockedAllocator, SbrkHeap};

  #[global_allocator]
  static ALLOCATOR: LockedAllocator<SbrkHeap> = LockedAllocator::new(SbrkHeap::new());

  pub fn run() {
    let numbers: Vec<u64> = (0..32).collect();
    let text = format!("{numbers:?}");

    // nothing inside this scope may allocate
    let (checked, stats) = {
      let allocator = ALLOCATOR.lock();
      (allocator.validate_heap(), allocator.stats())
    };

    assert_eq!(checked, Ok(()));
    assert!(stats.live_allocations >= 2);
    assert!(stats.heap_bytes > 0);
    assert!(text.starts_with("[0, 1, 2"));

    drop(text);
    drop(numbers);

    let after = ALLOCATOR.lock().validate_heap();
    assert_eq!(after, Ok(()));
    println!("heap validated under the global allocator");
  }
}

fn main() {
  #[cfg(unix)]
  installed::run();
}
