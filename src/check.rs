//! Heap consistency checking and introspection.

use std::{marker::PhantomData, ptr::NonNull};

use log::{debug, error};

use crate::{
  block::{BlockPtr, DSIZE, MIN_BLOCK, Tag},
  config::{CLASS_COUNT, FitPolicy, size_class},
  error::CheckError,
  heap::Heap,
  provider::MemoryProvider,
};

/// Summary of a consistent heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapStats {
  /// Bytes obtained from the provider.
  pub heap_bytes: usize,
  pub free_bytes: usize,
  pub free_blocks: usize,
  pub used_blocks: usize,
  pub largest_free: usize,
}

/// One block of the chain, as reported by [`Heap::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: NonNull<u8>,
  /// Total block size, header and footer included.
  pub size: usize,
  pub allocated: bool,
}

/// Address-ordered walk over the blocks between prologue and epilogue.
pub struct Blocks<'a> {
  next: BlockPtr,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    unsafe {
      let tag = self.next.tag();
      if tag.size() == 0 {
        return None;
      }

      let info = BlockInfo {
        payload: self.next.as_non_null(),
        size: tag.size(),
        allocated: tag.is_allocated(),
      };
      self.next = self.next.next();
      Some(info)
    }
  }
}

impl<P: MemoryProvider> Heap<P> {
  /// Runs the consistency checker. `lineno` identifies the call site in the
  /// log when a violation is found.
  pub fn check(
    &self,
    lineno: u32,
  ) -> bool {
    match self.validate() {
      Ok(_) => true,
      Err(err) => {
        error!("heap check failed (line {}): {}", lineno, err);
        false
      }
    }
  }

  /// Walks every block and every size-class list, verifying the boundary-tag
  /// invariants.
  pub fn validate(&self) -> Result<HeapStats, CheckError> {
    let lo = self.provider().heap_lo() as usize;
    let hi = self.provider().heap_hi() as usize;

    let mut stats = HeapStats {
      heap_bytes: hi - lo,
      ..HeapStats::default()
    };

    unsafe {
      let prologue = self.prologue;
      let expected = Tag::pack(MIN_BLOCK, true);
      if prologue.tag() != expected || prologue.footer_tag() != expected {
        return Err(CheckError::BadPrologue { at: prologue.addr() });
      }

      let mut block = prologue.next();
      let mut prev_free = false;

      loop {
        let at = block.addr();

        if at <= lo || at > hi {
          return Err(CheckError::OutOfBounds { at });
        }
        if at % DSIZE != 0 {
          return Err(CheckError::Misaligned { at });
        }

        let tag = block.tag();
        if tag.size() == 0 {
          if !tag.is_allocated() || at != hi {
            return Err(CheckError::BadEpilogue { at });
          }
          break;
        }

        if tag.size() < MIN_BLOCK {
          return Err(CheckError::TooSmall { at, size: tag.size() });
        }
        if tag.size() > hi - at {
          return Err(CheckError::OutOfBounds { at });
        }
        if block.footer_tag() != tag {
          return Err(CheckError::TagMismatch { at });
        }

        if tag.is_allocated() {
          stats.used_blocks += 1;
          prev_free = false;
        } else {
          if prev_free {
            return Err(CheckError::Uncoalesced { at });
          }
          stats.free_blocks += 1;
          stats.free_bytes += tag.size();
          stats.largest_free = stats.largest_free.max(tag.size());
          prev_free = true;
        }

        block = block.next();
      }

      self.validate_classes(lo, hi, stats.free_blocks)?;
    }

    Ok(stats)
  }

  unsafe fn validate_classes(
    &self,
    lo: usize,
    hi: usize,
    chain_free: usize,
  ) -> Result<(), CheckError> {
    let mut listed = 0;

    for class in 0..CLASS_COUNT {
      let mut pred = 0;
      let mut offset = unsafe { self.classes.head_offset(class) };

      while let Some(block) = self.classes.block_at(offset) {
        let at = block.addr();
        let fail = |reason: &'static str| Err(CheckError::FreeList { class, at, reason });

        if self.config.fit != FitPolicy::Segregated {
          return fail("list is populated under first fit");
        }
        if at <= lo || at >= hi || at % DSIZE != 0 {
          return fail("link points outside the heap");
        }

        listed += 1;
        if listed > chain_free {
          return fail("more list nodes than free blocks");
        }

        unsafe {
          if block.is_allocated() {
            return fail("allocated block in a free list");
          }
          if size_class(block.size()) != class {
            return fail("block filed under the wrong class");
          }
          if block.pred_link() != pred {
            return fail("predecessor link disagrees with list order");
          }

          pred = offset;
          offset = block.succ_link();
        }
      }
    }

    if self.config.fit == FitPolicy::Segregated && listed != chain_free {
      return Err(CheckError::FreeCountMismatch {
        chain: chain_free,
        lists: listed,
      });
    }

    Ok(())
  }

  /// Blocks between the prologue and the epilogue, in address order.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      next: unsafe { self.prologue.next() },
      _heap: PhantomData,
    }
  }

  /// Logs every block at debug level.
  pub fn dump(&self) {
    debug!(
      "heap {:?}..{:?} ({} bytes)",
      self.provider().heap_lo(),
      self.provider().heap_hi(),
      self.provider().heap_size()
    );
    for block in self.blocks() {
      debug!(
        "  {:?} {:>8} bytes {}",
        block.payload,
        block.size,
        if block.allocated { "used" } else { "free" }
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{block::WSIZE, config::HeapConfig, provider::Arena};

  fn heap(fit: FitPolicy) -> Heap<Arena> {
    Heap::init(Arena::default(), HeapConfig::default().with_fit(fit)).unwrap()
  }

  fn tag_word(
    payload: *mut u8,
    offset: isize,
  ) -> *mut u32 {
    payload.wrapping_offset(offset).cast()
  }

  #[test]
  fn test_stats_of_fresh_heap() {
    let heap = heap(FitPolicy::FirstFit);
    let stats = heap.validate().unwrap();

    assert_eq!(stats.heap_bytes, 104 + 4096);
    assert_eq!(stats.free_bytes, 4096);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.used_blocks, 0);
    assert_eq!(stats.largest_free, 4096);
  }

  #[test]
  fn test_stats_track_allocations() {
    for fit in [FitPolicy::FirstFit, FitPolicy::Segregated] {
      let mut heap = heap(fit);
      let a = heap.allocate(100);
      let _b = heap.allocate(100);
      unsafe { heap.release(a) };

      let stats = heap.validate().unwrap();
      assert_eq!(stats.used_blocks, 1);
      assert_eq!(stats.free_blocks, 2);
      assert_eq!(stats.free_bytes, 4096 - 112);
      assert_eq!(stats.largest_free, 4096 - 224);
    }
  }

  #[test]
  fn test_blocks_walk_in_address_order() {
    let mut heap = heap(FitPolicy::FirstFit);
    let a = heap.allocate(10);
    let b = heap.allocate(100);

    let blocks: Vec<BlockInfo> = heap.blocks().collect();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0].payload.as_ptr(), a);
    assert_eq!(blocks[0].size, 24);
    assert_eq!(blocks[1].payload.as_ptr(), b);
    assert!(blocks[1].allocated);
    assert!(!blocks[2].allocated);

    heap.dump();
  }

  #[test]
  fn test_detects_footer_mismatch() {
    let mut heap = heap(FitPolicy::FirstFit);
    let p = heap.allocate(32);

    unsafe { tag_word(p, 32).write(Tag::pack(48, true).bits()) };

    assert!(matches!(heap.validate(), Err(CheckError::TagMismatch { .. })));
    assert!(!heap.check(line!()));
  }

  #[test]
  fn test_detects_uncoalesced_neighbours() {
    let mut heap = heap(FitPolicy::FirstFit);
    let a = heap.allocate(32);
    let _b = heap.allocate(32);

    // Mark `a` and `b` free by hand, bypassing coalescing.
    unsafe {
      let free = Tag::pack(40, false).bits();
      tag_word(a, -(WSIZE as isize)).write(free);
      tag_word(a, 32).write(free);
      tag_word(a, 40 - WSIZE as isize).write(free);
      tag_word(a, 72).write(free);
    }

    assert!(matches!(heap.validate(), Err(CheckError::Uncoalesced { .. })));
  }

  #[test]
  fn test_detects_small_block() {
    let mut heap = heap(FitPolicy::FirstFit);
    let p = heap.allocate(32);

    unsafe { tag_word(p, -(WSIZE as isize)).write(Tag::pack(8, true).bits()) };

    assert!(matches!(
      heap.validate(),
      Err(CheckError::TooSmall { size: 8, .. })
    ));
  }

  #[test]
  fn test_detects_damaged_prologue() {
    let heap = heap(FitPolicy::FirstFit);

    let prologue = heap.prologue.as_ptr();
    unsafe { tag_word(prologue, -(WSIZE as isize)).write(Tag::pack(16, false).bits()) };

    assert!(matches!(heap.validate(), Err(CheckError::BadPrologue { .. })));
  }

  #[test]
  fn test_detects_damaged_epilogue() {
    let heap = heap(FitPolicy::FirstFit);

    let epilogue = heap.provider().heap_hi();
    unsafe { tag_word(epilogue, -(WSIZE as isize)).write(Tag::pack(0, false).bits()) };

    assert!(matches!(heap.validate(), Err(CheckError::BadEpilogue { .. })));
  }

  #[test]
  fn test_detects_unlisted_free_block() {
    let mut heap = heap(FitPolicy::Segregated);
    let a = heap.allocate(32);
    let _b = heap.allocate(32);

    // Mark `a` free by hand, bypassing the size classes.
    unsafe {
      let free = Tag::pack(40, false).bits();
      tag_word(a, -(WSIZE as isize)).write(free);
      tag_word(a, 32).write(free);
    }

    assert!(matches!(
      heap.validate(),
      Err(CheckError::FreeCountMismatch { chain: 2, lists: 1 })
    ));
  }

  #[test]
  fn test_detects_misfiled_free_block() {
    let mut heap = heap(FitPolicy::Segregated);
    let _a = heap.allocate(32);

    // Mark the listed tail block allocated behind the lists' back.
    let tail = heap.blocks().last().unwrap();
    assert_eq!(tail.size, 4096 - 40);
    unsafe {
      let tag = Tag::pack(tail.size, true).bits();
      tag_word(tail.payload.as_ptr(), -(WSIZE as isize)).write(tag);
      tag_word(tail.payload.as_ptr(), tail.size as isize - 8).write(tag);
    }

    assert!(matches!(heap.validate(), Err(CheckError::FreeList { .. })));
  }
}
