//! Tunables of a [`Heap`](crate::Heap).

use crate::{
  align::checked_align,
  block::{DSIZE, MAX_BLOCK, MIN_BLOCK, WSIZE},
  error::HeapError,
};

/// Default amount the heap grows by when no free block fits: 4 KiB.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Number of power-of-two size classes used by [`FitPolicy::Segregated`].
pub const CLASS_COUNT: usize = 20;

/// How the allocator searches for a free block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FitPolicy {
  /// Walk every block in address order and take the first free one that is
  /// large enough.
  #[default]
  FirstFit,

  /// Keep every free block in an explicit list per power-of-two size class
  /// and take the first fit, starting at the request's class and moving to
  /// larger classes.
  Segregated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapConfig {
  /// Minimum growth, in bytes, when the heap must be extended.
  pub chunk_size: usize,

  pub fit: FitPolicy,

  /// When `Some(d)`, a request less than `p / d` bytes below the next power of
  /// two `p` is served as a request for `p` bytes. `Some(16)` turns requests of
  /// 121 to 127 bytes into 128-byte requests.
  pub pow2_snap: Option<u32>,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      chunk_size: CHUNK_SIZE,
      fit: FitPolicy::FirstFit,
      pow2_snap: None,
    }
  }
}

impl HeapConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the growth chunk, rounded up to `DSIZE` and to at least one
  /// minimum block.
  pub fn with_chunk_size(
    mut self,
    chunk_size: usize,
  ) -> Self {
    let chunk = checked_align(chunk_size).unwrap_or(MAX_BLOCK);
    self.chunk_size = chunk.clamp(MIN_BLOCK, MAX_BLOCK);
    self
  }

  pub fn with_fit(
    mut self,
    fit: FitPolicy,
  ) -> Self {
    self.fit = fit;
    self
  }

  /// A divisor of `0` disables snapping.
  pub fn with_pow2_snap(
    mut self,
    divisor: u32,
  ) -> Self {
    self.pow2_snap = (divisor != 0).then_some(divisor);
    self
  }

  /// Brings fields set without the builders into range: the chunk is rounded
  /// as by [`with_chunk_size`](Self::with_chunk_size) and a zero snapping
  /// divisor disables snapping.
  pub fn normalized(self) -> Self {
    let pow2_snap = self.pow2_snap.unwrap_or(0);
    self.with_chunk_size(self.chunk_size).with_pow2_snap(pow2_snap)
  }

  /// Applies the power-of-two snapping policy to a raw request.
  fn snap(
    &self,
    size: usize,
  ) -> usize {
    let Some(divisor) = self.pow2_snap.filter(|d| *d != 0) else {
      return size;
    };

    match size.checked_next_power_of_two() {
      Some(pow2) if pow2 - size < pow2 / divisor as usize => pow2,
      _ => size,
    }
  }

  /// Block size needed to serve a request of `size` payload bytes: payload plus
  /// header and footer, rounded to `DSIZE`, and never below [`MIN_BLOCK`].
  pub fn adjusted_size(
    &self,
    size: usize,
  ) -> Result<usize, HeapError> {
    let size = self.snap(size);

    if size <= DSIZE {
      return Ok(MIN_BLOCK);
    }

    let asize = size
      .checked_add(2 * WSIZE)
      .and_then(checked_align)
      .ok_or(HeapError::SizeOverflow)?;

    if asize > MAX_BLOCK {
      return Err(HeapError::SizeOverflow);
    }

    Ok(asize)
  }
}

/// Size class of a block: class `i` holds sizes in `[16 << i, 16 << (i + 1))`,
/// the last class is unbounded.
pub fn size_class(size: usize) -> usize {
  let units = (size / MIN_BLOCK).max(1);
  let class = (usize::BITS - 1 - units.leading_zeros()) as usize;
  class.min(CLASS_COUNT - 1)
}
