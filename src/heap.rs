use std::{cmp, ptr, ptr::NonNull};

use log::{debug, trace, warn};

use crate::{
  block::{BlockPtr, DSIZE, MIN_BLOCK, Tag, WSIZE},
  classes::SizeClasses,
  config::{CLASS_COUNT, FitPolicy, HeapConfig, size_class},
  error::HeapError,
  provider::MemoryProvider,
};

/// Largest heap the free-list offsets can address.
const MAX_HEAP: usize = u32::MAX as usize;

/// Boundary-tag heap over one contiguous region supplied by a
/// [`MemoryProvider`].
///
/// ```text
///   ┌────────────┬─────┬──────────┬─────────┬─────────┬─────┬──────────┐
///   │ class heads│ pad │ prologue │ block 1 │ block 2 │ ... │ epilogue │
///   └────────────┴─────┴──────────┴─────────┴─────────┴─────┴──────────┘
///   ▲                                                                  ▲
///   heap_lo                                                      heap_hi
/// ```
pub struct Heap<P: MemoryProvider> {
  provider: P,
  pub(crate) classes: SizeClasses,
  pub(crate) prologue: BlockPtr,
  pub(crate) config: HeapConfig,
}

impl<P: MemoryProvider> Heap<P> {
  /// Lays out the prologue and epilogue on a fresh provider and performs the
  /// first growth of `config.chunk_size` bytes. The config is
  /// [normalized](HeapConfig::normalized) first.
  pub fn init(
    mut provider: P,
    config: HeapConfig,
  ) -> Result<Self, HeapError> {
    let config = config.normalized();
    let initial = SizeClasses::footprint() + WSIZE + MIN_BLOCK + WSIZE;
    let base = provider
      .grow(initial)
      .ok_or(HeapError::OutOfMemory { requested: initial })?;
    debug_assert_eq!(base.as_ptr() as usize % DSIZE, 0);

    let (classes, prologue) = unsafe {
      let classes = SizeClasses::init(base);
      // Skip the head slots and the alignment pad.
      let prologue = BlockPtr::new(base.add(SizeClasses::footprint() + DSIZE));
      prologue.write_tags(MIN_BLOCK, true);
      prologue.next().set_header(Tag::pack(0, true));
      (classes, prologue)
    };

    let mut heap = Self {
      provider,
      classes,
      prologue,
      config,
    };

    debug!(
      "heap initialised at {:?} with {:?} fit, growing by {} bytes",
      heap.provider.heap_lo(),
      heap.config.fit,
      heap.config.chunk_size
    );

    heap.extend(heap.config.chunk_size / WSIZE)?;
    Ok(heap)
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  /// Grows the heap by `words` words, rounded up to an even count, turns the
  /// new bytes into a free block and merges it with a free tail block.
  fn extend(
    &mut self,
    words: usize,
  ) -> Result<BlockPtr, HeapError> {
    let size = words
      .checked_add(words % 2)
      .and_then(|words| words.checked_mul(WSIZE))
      .ok_or(HeapError::SizeOverflow)?;

    if size > MAX_HEAP - self.provider.heap_size() {
      return Err(HeapError::OutOfMemory { requested: size });
    }

    let region = self
      .provider
      .grow(size)
      .ok_or(HeapError::OutOfMemory { requested: size })?;

    debug!(
      "heap grew by {} bytes at {:?}, now {} bytes",
      size,
      region,
      self.provider.heap_size()
    );

    unsafe {
      // The old epilogue header becomes the header of the new block.
      let block = BlockPtr::new(region);
      block.write_tags(size, false);
      block.next().set_header(Tag::pack(0, true));
      Ok(self.coalesce(block))
    }
  }

  fn link(
    &mut self,
    block: BlockPtr,
  ) {
    if self.config.fit == FitPolicy::Segregated {
      unsafe { self.classes.insert(block) };
    }
  }

  fn unlink(
    &mut self,
    block: BlockPtr,
  ) {
    if self.config.fit == FitPolicy::Segregated {
      unsafe { self.classes.remove(block) };
    }
  }

  /// Merges a free, unlinked block with its free neighbours and links the
  /// result.
  unsafe fn coalesce(
    &mut self,
    block: BlockPtr,
  ) -> BlockPtr {
    unsafe {
      let prev_alloc = block.prev_tag().is_allocated();
      let next = block.next();
      let next_alloc = next.is_allocated();
      let mut size = block.size();

      let merged = match (prev_alloc, next_alloc) {
        (true, true) => block,
        (true, false) => {
          self.unlink(next);
          size += next.size();
          block.write_tags(size, false);
          trace!("coalesce {:?} with next", block.as_ptr());
          block
        }
        (false, true) => {
          let prev = block.prev();
          self.unlink(prev);
          size += prev.size();
          prev.write_tags(size, false);
          trace!("coalesce {:?} with previous", block.as_ptr());
          prev
        }
        (false, false) => {
          let prev = block.prev();
          self.unlink(prev);
          self.unlink(next);
          size += prev.size() + next.size();
          prev.write_tags(size, false);
          trace!("coalesce {:?} with both neighbours", block.as_ptr());
          prev
        }
      };

      self.link(merged);
      merged
    }
  }

  /// Finds a free block of at least `asize` bytes according to the fit policy.
  fn find_fit(
    &self,
    asize: usize,
  ) -> Option<BlockPtr> {
    unsafe {
      match self.config.fit {
        FitPolicy::FirstFit => {
          let mut block = self.prologue.next();
          while block.size() > 0 {
            if !block.is_allocated() && block.size() >= asize {
              return Some(block);
            }
            block = block.next();
          }
          None
        }
        FitPolicy::Segregated => (size_class(asize)..CLASS_COUNT)
          .find_map(|class| self.classes.iter(class).find(|block| block.size() >= asize)),
      }
    }
  }

  /// Marks the first `asize` bytes of a `total`-byte region starting at
  /// `block` allocated and returns the remainder to the free pool when it can
  /// form a block of its own.
  unsafe fn carve(
    &mut self,
    block: BlockPtr,
    total: usize,
    asize: usize,
  ) {
    unsafe {
      if total - asize >= MIN_BLOCK {
        block.write_tags(asize, true);
        let rest = block.next();
        rest.write_tags(total - asize, false);
        trace!("split {:?}: {} used, {} free", block.as_ptr(), asize, total - asize);
        self.coalesce(rest);
      } else {
        block.write_tags(total, true);
      }
    }
  }

  /// Commits a free block to an allocation of `asize` bytes.
  unsafe fn place(
    &mut self,
    block: BlockPtr,
    asize: usize,
  ) {
    unsafe {
      self.unlink(block);
      self.carve(block, block.size(), asize);
    }
  }

  fn allocate_block(
    &mut self,
    asize: usize,
  ) -> Result<BlockPtr, HeapError> {
    let block = match self.find_fit(asize) {
      Some(block) => block,
      None => self.extend(cmp::max(asize, self.config.chunk_size) / WSIZE)?,
    };

    unsafe { self.place(block, asize) };
    trace!("allocate {} bytes at {:?}", asize, block.as_ptr());
    Ok(block)
  }

  /// Allocates at least `size` payload bytes. A zero-size request yields
  /// `Ok(None)` and leaves the heap untouched.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, HeapError> {
    if size == 0 {
      return Ok(None);
    }

    let asize = self.config.adjusted_size(size)?;
    Ok(Some(self.allocate_block(asize)?.as_non_null()))
  }

  /// Allocates at least `size` payload bytes, `DSIZE` aligned. Returns null for
  /// a zero-size request or when the heap cannot grow.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    surface("allocate", size, self.try_allocate(size))
  }

  /// Returns a block to the heap. Null is ignored.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer obtained from this heap.
  pub unsafe fn release(
    &mut self,
    ptr: *mut u8,
  ) {
    let Some(block) = BlockPtr::from_raw(ptr) else {
      return;
    };

    unsafe {
      trace!("release {} bytes at {:?}", block.size(), ptr);
      block.write_tags(block.size(), false);
      self.coalesce(block);
    }
  }

  /// Resizes a block, in place when possible.
  ///
  /// A zero `size` releases `ptr` and yields `Ok(None)`; a null `ptr` behaves
  /// as [`try_allocate`](Self::try_allocate). On error the original block is
  /// left untouched.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer obtained from this heap.
  pub unsafe fn try_resize(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, HeapError> {
    if size == 0 {
      unsafe { self.release(ptr) };
      return Ok(None);
    }

    let Some(block) = BlockPtr::from_raw(ptr) else {
      return self.try_allocate(size);
    };

    let asize = self.config.adjusted_size(size)?;

    unsafe {
      let old_size = block.size();

      if old_size >= asize {
        self.carve(block, old_size, asize);
        return Ok(Some(block.as_non_null()));
      }

      let next = block.next();
      if !next.is_allocated() && old_size + next.size() >= asize {
        let total = old_size + next.size();
        self.unlink(next);
        self.carve(block, total, asize);
        trace!("resize {:?} grew in place to {} bytes", ptr, asize);
        return Ok(Some(block.as_non_null()));
      }

      let moved = self.allocate_block(asize)?;
      let count = cmp::min(block.usable_size(), moved.usable_size());
      ptr::copy_nonoverlapping(block.as_ptr(), moved.as_ptr(), count);
      self.release(block.as_ptr());
      trace!("resize moved {:?} to {:?}", ptr, moved.as_ptr());
      Ok(Some(moved.as_non_null()))
    }
  }

  /// Resizes a block, preserving its contents up to the smaller of the old
  /// and new sizes. Returns null when `size` is zero or the heap cannot grow;
  /// in the latter case `ptr` stays valid.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live pointer obtained from this heap.
  pub unsafe fn resize(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> *mut u8 {
    surface("resize", size, unsafe { self.try_resize(ptr, size) })
  }

  /// Allocates `count * size` zeroed bytes, rejecting products that overflow.
  pub fn try_zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, HeapError> {
    let bytes = count.checked_mul(size).ok_or(HeapError::SizeOverflow)?;
    let payload = self.try_allocate(bytes)?;

    if let Some(payload) = payload {
      unsafe { ptr::write_bytes(payload.as_ptr(), 0, bytes) };
    }
    Ok(payload)
  }

  pub fn zero_allocate(
    &mut self,
    count: usize,
    size: usize,
  ) -> *mut u8 {
    let bytes = count.saturating_mul(size);
    surface("zero_allocate", bytes, self.try_zero_allocate(count, size))
  }

  /// Payload bytes available behind a live pointer.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live pointer obtained from this heap.
  pub unsafe fn usable_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { BlockPtr::new(ptr).usable_size() }
  }
}

/// Turns an operation result into the pointer-or-null surface.
fn surface(
  operation: &str,
  size: usize,
  result: Result<Option<NonNull<u8>>, HeapError>,
) -> *mut u8 {
  match result {
    Ok(Some(payload)) => payload.as_ptr(),
    Ok(None) => ptr::null_mut(),
    Err(err) => {
      warn!("{}({}) failed: {}", operation, size, err);
      ptr::null_mut()
    }
  }
}
