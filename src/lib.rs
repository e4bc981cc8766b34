//! # btalloc - A Boundary-Tag Heap Allocator
//!
//! This crate provides a `malloc`-style allocator that manages **one growable,
//! contiguous heap region** with in-place block metadata. It is meant for
//! programs that cannot use the platform allocator, e.g. instrumented or
//! embedded runtimes.
//!
//! ## Overview
//!
//! Every block carries a header and a footer word (its *boundary tags*)
//! encoding the block size and an allocated bit:
//!
//! ```text
//!   Heap Layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                              HEAP                                    │
//!   │                                                                      │
//!   │  ┌───────┬───┬──────┬───────────┬─────────────────┬──────────┬───┐   │
//!   │  │ class │pad│ pro- │  A (used) │    B (free)     │ C (used) │epi│   │
//!   │  │ heads │   │logue │           │                 │          │log│   │
//!   │  └───────┴───┴──────┴───────────┴─────────────────┴──────────┴───┘   │
//!   │  ▲                                                               ▲   │
//!   │  │                                                               │   │
//!   │  heap_lo                                                   heap_hi   │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Prologue and epilogue are permanently allocated sentinels, so walking to
//!   a neighbour never leaves the heap.
//! ```
//!
//! Because the footer duplicates the header, the block *before* any block is
//! found in O(1), which lets a released block merge with free neighbours on
//! both sides immediately:
//!
//! ```text
//!   Single Block:
//!   ┌────────┬───────────────────────────────────────────┬────────┐
//!   │ header │                payload                    │ footer │
//!   │ size|a │  free: pred offset, succ offset, unused   │ size|a │
//!   │ 4 B    │  used: client bytes                       │ 4 B    │
//!   └────────┴───────────────────────────────────────────┴────────┘
//!            ▲
//!            └── Pointer returned to user (8-byte aligned)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   btalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Boundary tags and the BlockPtr view
//!   ├── classes    - Segregated free lists (internal)
//!   ├── config     - HeapConfig, FitPolicy, size classes
//!   ├── provider   - MemoryProvider, Sbrk and Arena
//!   ├── heap       - Heap: allocate, release, resize, zero_allocate
//!   ├── check      - Consistency checker and heap statistics
//!   └── error      - HeapError, CheckError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use btalloc::{Arena, Heap, HeapConfig};
//!
//! let mut heap = Heap::init(Arena::default(), HeapConfig::default()).unwrap();
//!
//! let ptr = heap.allocate(8) as *mut u64;
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     *ptr = 42;
//!     assert_eq!(*ptr, 42);
//!
//!     let ptr = heap.resize(ptr as *mut u8, 64);
//!     assert_eq!(*(ptr as *mut u64), 42);
//!
//!     heap.release(ptr);
//! }
//!
//! assert!(heap.check(line!()));
//! ```
//!
//! ## Fit Policies
//!
//! - [`FitPolicy::FirstFit`] walks the whole block chain in address order.
//! - [`FitPolicy::Segregated`] keeps free blocks in power-of-two size classes
//!   and searches only classes that can hold the request. Allocation order
//!   differs from first fit.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: a `Heap` has one owner and no locking
//! - **Never shrinks**: memory is not returned to the provider
//! - **Neighbour coalescing only**: no compaction or defragmentation
//! - **4 GiB heap**: tags and list links are 32-bit
//!
//! ## Safety
//!
//! Releasing or resizing a pointer that did not come from the same heap, or
//! writing past a block's usable size, corrupts the heap. [`Heap::check`]
//! detects most such damage after the fact.

pub mod align;
pub mod block;
mod check;
mod classes;
pub mod config;
mod error;
mod heap;
pub mod provider;

pub use check::{BlockInfo, Blocks, HeapStats};
pub use config::{FitPolicy, HeapConfig};
pub use error::{CheckError, HeapError};
pub use heap::Heap;
pub use provider::{Arena, MemoryProvider, Sbrk};
