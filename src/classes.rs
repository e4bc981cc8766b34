//! Segregated free lists.
//!
//! The list heads live in the first `CLASS_COUNT` words of the heap, ahead of
//! the prologue. Heads and links store payload offsets relative to the heap
//! start; offset `0` is never a payload, so it doubles as the empty marker.

use std::ptr::NonNull;

use log::trace;

use crate::{
  block::{BlockPtr, WSIZE},
  config::{CLASS_COUNT, size_class},
};

pub(crate) struct SizeClasses {
  base: NonNull<u8>,
}

impl SizeClasses {
  /// Takes over the head slots at `base` and empties every class.
  pub unsafe fn init(base: NonNull<u8>) -> Self {
    let classes = Self { base };
    for class in 0..CLASS_COUNT {
      unsafe { classes.set_head(class, 0) };
    }
    classes
  }

  /// Bytes reserved for the head slots.
  pub const fn footprint() -> usize {
    CLASS_COUNT * WSIZE
  }

  fn slot(
    &self,
    class: usize,
  ) -> *mut u32 {
    debug_assert!(class < CLASS_COUNT);
    self.base.as_ptr().wrapping_add(class * WSIZE).cast()
  }

  fn offset_of(
    &self,
    block: BlockPtr,
  ) -> u32 {
    (block.addr() - self.base.as_ptr() as usize) as u32
  }

  pub fn block_at(
    &self,
    offset: u32,
  ) -> Option<BlockPtr> {
    if offset == 0 {
      return None;
    }
    let payload = self.base.as_ptr().wrapping_add(offset as usize);
    BlockPtr::from_raw(payload)
  }

  pub unsafe fn head(
    &self,
    class: usize,
  ) -> Option<BlockPtr> {
    unsafe { self.block_at(self.slot(class).read()) }
  }

  pub unsafe fn head_offset(
    &self,
    class: usize,
  ) -> u32 {
    unsafe { self.slot(class).read() }
  }

  unsafe fn set_head(
    &self,
    class: usize,
    offset: u32,
  ) {
    unsafe { self.slot(class).write(offset) }
  }

  /// Prepends a free block to the list of its size class.
  pub unsafe fn insert(
    &mut self,
    block: BlockPtr,
  ) {
    unsafe {
      let class = size_class(block.size());
      let offset = self.offset_of(block);
      let head = self.head_offset(class);

      block.set_pred_link(0);
      block.set_succ_link(head);
      if let Some(old) = self.block_at(head) {
        old.set_pred_link(offset);
      }
      self.set_head(class, offset);

      trace!("link {:?} ({} bytes) into class {}", block.as_ptr(), block.size(), class);
    }
  }

  /// Unlinks a free block. Its size must still be the one it was inserted with.
  pub unsafe fn remove(
    &mut self,
    block: BlockPtr,
  ) {
    unsafe {
      let class = size_class(block.size());
      let pred = block.pred_link();
      let succ = block.succ_link();

      match self.block_at(pred) {
        Some(prev) => prev.set_succ_link(succ),
        None => self.set_head(class, succ),
      }
      if let Some(next) = self.block_at(succ) {
        next.set_pred_link(pred);
      }

      trace!("unlink {:?} ({} bytes) from class {}", block.as_ptr(), block.size(), class);
    }
  }

  /// Iterates one class list from its head.
  pub unsafe fn iter(
    &self,
    class: usize,
  ) -> ClassIter<'_> {
    ClassIter {
      classes: self,
      next: unsafe { self.head(class) },
    }
  }
}

pub(crate) struct ClassIter<'a> {
  classes: &'a SizeClasses,
  next: Option<BlockPtr>,
}

impl Iterator for ClassIter<'_> {
  type Item = BlockPtr;

  fn next(&mut self) -> Option<BlockPtr> {
    let current = self.next?;
    self.next = unsafe { self.classes.block_at(current.succ_link()) };
    Some(current)
  }
}
