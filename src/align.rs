/// Rounds a size up to the heap's double-word granularity (`DSIZE`).
///
/// # Examples
///
/// ```rust
/// use btalloc::align;
///
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// assert_eq!(align!(17), 24);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::block::DSIZE)
  };
}

/// Rounds a size up to a multiple of `align`, which must be a power of two.
///
/// # Examples
///
/// ```rust
/// use btalloc::align_to;
///
/// assert_eq!(align_to!(13, 4), 16);
/// assert_eq!(align_to!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    (($value) + ($align) - 1) & !(($align) - 1)
  };
}

/// Like [`align!`], but returns `None` instead of wrapping when the rounded
/// value does not fit in a `usize`.
pub fn checked_align(value: usize) -> Option<usize> {
  let mask = crate::block::DSIZE - 1;
  value.checked_add(mask).map(|v| v & !mask)
}
