//! Boundary-tag encoding.
//!
//! Every block is framed by a header and a footer word holding the same
//! [`Tag`]. Blocks are addressed through their payload pointer, wrapped in a
//! [`BlockPtr`]; all neighbour arithmetic goes through it.

use std::ptr::NonNull;

/// Word size: one header or footer.
pub const WSIZE: usize = 4;

/// Double word: the alignment granularity of payloads and block sizes.
pub const DSIZE: usize = 8;

/// Smallest legal block: header, two free-list links and footer.
pub const MIN_BLOCK: usize = 2 * DSIZE;

/// Largest block size a header word can encode.
pub const MAX_BLOCK: usize = u32::MAX as usize & !(DSIZE - 1);

const ALLOC_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// A packed `(size, allocated)` pair as stored in a header or footer word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(transparent)]
pub struct Tag(u32);

impl Tag {
  /// Packs a `DSIZE`-aligned size and an allocation flag into one word.
  pub const fn pack(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert!(size <= MAX_BLOCK && size % DSIZE == 0);
    Self(size as u32 | allocated as u32)
  }

  pub const fn from_bits(bits: u32) -> Self {
    Self(bits)
  }

  pub const fn bits(self) -> u32 {
    self.0
  }

  pub const fn size(self) -> usize {
    (self.0 & SIZE_MASK) as usize
  }

  pub const fn is_allocated(self) -> bool {
    self.0 & ALLOC_BIT != 0
  }
}

/// Typed view over a block, addressed by its payload pointer.
///
/// ```text
///   ┌────────┬──────────────────────────────────────┬────────┐
///   │ header │ payload (free: pred, succ links)     │ footer │
///   └────────┴──────────────────────────────────────┴────────┘
///            ▲
///            └── BlockPtr
/// ```
///
/// All accessors are `unsafe`: the pointer must address a block of a live,
/// uncorrupted heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct BlockPtr(NonNull<u8>);

impl BlockPtr {
  pub const fn new(payload: NonNull<u8>) -> Self {
    Self(payload)
  }

  /// Returns `None` for a null pointer.
  pub fn from_raw(payload: *mut u8) -> Option<Self> {
    NonNull::new(payload).map(Self)
  }

  pub const fn as_non_null(self) -> NonNull<u8> {
    self.0
  }

  pub const fn as_ptr(self) -> *mut u8 {
    self.0.as_ptr()
  }

  pub fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  fn header(self) -> *mut u32 {
    self.0.as_ptr().wrapping_sub(WSIZE).cast()
  }

  unsafe fn footer(self) -> *mut u32 {
    unsafe { self.0.as_ptr().add(self.size()).sub(DSIZE).cast() }
  }

  pub unsafe fn tag(self) -> Tag {
    unsafe { Tag(self.header().read()) }
  }

  pub unsafe fn footer_tag(self) -> Tag {
    unsafe { Tag(self.footer().read()) }
  }

  pub unsafe fn size(self) -> usize {
    unsafe { self.tag().size() }
  }

  pub unsafe fn is_allocated(self) -> bool {
    unsafe { self.tag().is_allocated() }
  }

  /// Payload bytes available to the client.
  pub unsafe fn usable_size(self) -> usize {
    unsafe { self.size() - DSIZE }
  }

  pub unsafe fn set_header(
    self,
    tag: Tag,
  ) {
    unsafe { self.header().write(tag.bits()) }
  }

  /// Writes the header, then the footer at the position the new size implies.
  pub unsafe fn write_tags(
    self,
    size: usize,
    allocated: bool,
  ) {
    let tag = Tag::pack(size, allocated);
    unsafe {
      self.set_header(tag);
      self.footer().write(tag.bits());
    }
  }

  /// Physically following block.
  pub unsafe fn next(self) -> BlockPtr {
    unsafe { Self(self.0.add(self.size())) }
  }

  /// Tag of the physically preceding block, read from its footer.
  pub unsafe fn prev_tag(self) -> Tag {
    unsafe { Tag(self.0.as_ptr().sub(DSIZE).cast::<u32>().read()) }
  }

  /// Physically preceding block.
  pub unsafe fn prev(self) -> BlockPtr {
    unsafe { Self(self.0.sub(self.prev_tag().size())) }
  }

  fn link_slot(
    self,
    index: usize,
  ) -> *mut u32 {
    self.0.as_ptr().wrapping_add(index * WSIZE).cast()
  }

  /// Heap-relative offset of the previous free block in this block's class.
  pub unsafe fn pred_link(self) -> u32 {
    unsafe { self.link_slot(0).read() }
  }

  /// Heap-relative offset of the next free block in this block's class.
  pub unsafe fn succ_link(self) -> u32 {
    unsafe { self.link_slot(1).read() }
  }

  pub unsafe fn set_pred_link(
    self,
    offset: u32,
  ) {
    unsafe { self.link_slot(0).write(offset) }
  }

  pub unsafe fn set_succ_link(
    self,
    offset: u32,
  ) {
    unsafe { self.link_slot(1).write(offset) }
  }
}
