//! Runs in its own process so that nothing else in the test binary moves the
//! program break between growth calls. The tests here share the break, so
//! they take `BREAK` for their whole run.

use std::sync::Mutex;

use btalloc::{Heap, HeapConfig, MemoryProvider, Sbrk};

static BREAK: Mutex<()> = Mutex::new(());

#[test]
fn test_heap_on_program_break() {
  let _break = BREAK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
  let mut heap = Heap::init(Sbrk::new(), HeapConfig::default()).unwrap();

  let lo = heap.provider().heap_lo();
  assert_eq!(lo as usize % 8, 0);
  assert!(Sbrk::program_break() >= heap.provider().heap_hi());

  let small = heap.allocate(24) as *mut u64;
  assert!(!small.is_null());
  unsafe {
    for i in 0..3 {
      small.add(i).write(i as u64);
    }
  }

  let big = heap.allocate(16 * 1024);
  assert!(!big.is_null());
  unsafe { big.write_bytes(0x5A, 16 * 1024) };

  unsafe {
    for i in 0..3 {
      assert_eq!(small.add(i).read(), i as u64);
    }
    heap.release(big);
    heap.release(small as *mut u8);
  }

  assert!(heap.check(line!()));
  assert_eq!(heap.blocks().count(), 1);
}

#[test]
fn test_growth_refused_after_foreign_sbrk() {
  let _break = BREAK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
  let mut sbrk = Sbrk::new();

  let first = sbrk.grow(64).unwrap();
  assert_eq!(first.as_ptr(), sbrk.heap_lo());
  let hi = sbrk.heap_hi();
  assert_eq!(hi as usize, first.as_ptr() as usize + 64);

  // Someone else moves the break: the next region would leave a gap.
  let foreign = unsafe { libc::sbrk(4096) };
  assert_ne!(foreign, usize::MAX as *mut libc::c_void);

  assert!(sbrk.grow(64).is_none());
  assert_eq!(sbrk.heap_hi(), hi);
  assert_eq!(sbrk.heap_size(), 64);
}
