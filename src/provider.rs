//! Sources of heap memory.
//!
//! The heap never touches the operating system directly. It asks a
//! [`MemoryProvider`] to move a break pointer forward and expects every new
//! region to start exactly where the previous one ended.

use std::{mem, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};
use log::{debug, warn};

use crate::{align, block::DSIZE};

/// Contract of a growable, contiguous memory region.
pub trait MemoryProvider {
  /// Extends the region by `increment` bytes and returns the start of the
  /// new bytes, or `None` when the region cannot grow.
  ///
  /// The returned pointer must equal the previous [`heap_hi`](Self::heap_hi).
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>>;

  /// First byte of the region.
  fn heap_lo(&self) -> *mut u8;

  /// One past the last byte of the region.
  fn heap_hi(&self) -> *mut u8;

  fn heap_size(&self) -> usize {
    self.heap_hi() as usize - self.heap_lo() as usize
  }
}

/// The process data segment, grown with `sbrk(2)`.
///
/// Only one `Sbrk` may be alive per process, and nothing else may move the
/// program break between two growth calls: a foreign `sbrk` leaves a gap
/// and the growth is refused.
pub struct Sbrk {
  lo: *mut u8,
  hi: *mut u8,
}

impl Sbrk {
  pub fn new() -> Self {
    Self {
      lo: std::ptr::null_mut(),
      hi: std::ptr::null_mut(),
    }
  }

  /// Current program break.
  pub fn program_break() -> *mut u8 {
    unsafe { sbrk(0) as *mut u8 }
  }

  fn failed(address: *mut c_void) -> bool {
    address == usize::MAX as *mut c_void
  }

  unsafe fn start(&mut self) -> bool {
    unsafe {
      let current = sbrk(0) as usize;
      let pad = align!(current) - current;

      if pad != 0 && Self::failed(sbrk(pad as intptr_t)) {
        return false;
      }

      self.lo = (current + pad) as *mut u8;
      self.hi = self.lo;
      debug!("sbrk heap starts at {:?}", self.lo);
      true
    }
  }
}

impl Default for Sbrk {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryProvider for Sbrk {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    let delta = intptr_t::try_from(increment).ok()?;

    unsafe {
      if self.lo.is_null() && !self.start() {
        return None;
      }

      let address = sbrk(delta);

      if Self::failed(address) {
        return None;
      }

      if address as *mut u8 != self.hi {
        warn!(
          "program break moved behind our back: expected {:?}, got {:?}",
          self.hi, address
        );
        return None;
      }

      self.hi = self.hi.add(increment);
      NonNull::new(address as *mut u8)
    }
  }

  fn heap_lo(&self) -> *mut u8 {
    self.lo
  }

  fn heap_hi(&self) -> *mut u8 {
    self.hi
  }
}

/// A fixed-capacity region carved out of the process heap once, with its own
/// break pointer.
///
/// Useful for embedding the allocator next to another one, and for tests.
pub struct Arena {
  base: NonNull<u64>,
  words: usize,
  brk: usize,
}

impl Arena {
  /// Capacity used by [`Arena::default`]: 20 MiB.
  pub const DEFAULT_CAPACITY: usize = 20 * (1 << 20);

  /// Reserves `capacity` bytes, rounded up to `DSIZE`.
  pub fn new(capacity: usize) -> Self {
    let words = align!(capacity) / mem::size_of::<u64>();
    let region: Box<[u64]> = vec![0u64; words].into_boxed_slice();
    let base = NonNull::from(Box::leak(region)).cast::<u64>();

    debug!("arena of {} bytes at {:?}", words * DSIZE, base);

    Self { base, words, brk: 0 }
  }

  pub fn capacity(&self) -> usize {
    self.words * mem::size_of::<u64>()
  }

  fn bytes(&self) -> *mut u8 {
    self.base.as_ptr().cast()
  }
}

impl Default for Arena {
  fn default() -> Self {
    Self::new(Self::DEFAULT_CAPACITY)
  }
}

impl MemoryProvider for Arena {
  fn grow(
    &mut self,
    increment: usize,
  ) -> Option<NonNull<u8>> {
    if increment > self.capacity() - self.brk {
      return None;
    }

    let address = unsafe { self.bytes().add(self.brk) };
    self.brk += increment;
    NonNull::new(address)
  }

  fn heap_lo(&self) -> *mut u8 {
    self.bytes()
  }

  fn heap_hi(&self) -> *mut u8 {
    unsafe { self.bytes().add(self.brk) }
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let slice = std::ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.words);
    drop(unsafe { Box::from_raw(slice) });
  }
}
