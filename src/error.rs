use thiserror::Error;

/// Recoverable failures of the public operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
  #[error("memory provider cannot grow the heap by {requested} bytes")]
  OutOfMemory { requested: usize },

  #[error("requested size does not fit in a block")]
  SizeOverflow,
}

/// A heap invariant that the consistency checker found broken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CheckError {
  #[error("prologue block at {at:#x} is damaged")]
  BadPrologue { at: usize },

  #[error("epilogue at {at:#x} is not a zero-size allocated header at the heap end")]
  BadEpilogue { at: usize },

  #[error("payload at {at:#x} is not double-word aligned")]
  Misaligned { at: usize },

  #[error("block at {at:#x} lies outside the heap")]
  OutOfBounds { at: usize },

  #[error("block at {at:#x} has size {size}, below the minimum block size")]
  TooSmall { at: usize, size: usize },

  #[error("block at {at:#x} has a footer that disagrees with its header")]
  TagMismatch { at: usize },

  #[error("free blocks at {at:#x} and its predecessor were not coalesced")]
  Uncoalesced { at: usize },

  #[error("size class {class} is corrupt at {at:#x}: {reason}")]
  FreeList {
    class: usize,
    at: usize,
    reason: &'static str,
  },

  #[error("block chain holds {chain} free blocks but the size classes hold {lists}")]
  FreeCountMismatch { chain: usize, lists: usize },
}
