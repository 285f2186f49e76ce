use core::ptr::NonNull;

use crate::{
  block::{Block, HEADER_SIZE, can_split, split},
  checked_align_up,
  error::AllocError,
  lock::SpinLock,
  platform::Platform,
};

/// Requests above this many payload bytes are mapped instead of carved from
/// the shared heap.
pub const LARGE_THRESHOLD: usize = 4096;

/// Granularity of mapped regions.
pub const PAGE_SIZE: usize = 4096;

/// Where the memory of a freshly grown block came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// Appended to the shared heap.
  Heap,
  /// Its own anonymous mapping.
  Mapped,
}

/// Obtains fresh memory for a `size`-byte request, formats it as an allocated
/// block and appends it after `tail`, if any.
///
/// # Safety
/// `tail`, when given, must be the last block of an arena list the caller
/// holds the lock of.
pub unsafe fn grow<P: Platform>(
  platform: &P,
  growth_lock: &SpinLock<()>,
  tail: Option<NonNull<Block>>,
  size: usize,
) -> Result<(NonNull<Block>, Source), AllocError> {
  let grown = if size <= LARGE_THRESHOLD {
    (grow_small(platform, growth_lock, size)?, Source::Heap)
  } else {
    (grow_large(platform, size)?, Source::Mapped)
  };

  if let Some(tail) = tail {
    unsafe { (*tail.as_ptr()).set_next(Some(grown.0)) };
  }

  Ok(grown)
}

/// Moves the shared growth cursor by exactly one header plus `size`.
fn grow_small<P: Platform>(
  platform: &P,
  growth_lock: &SpinLock<()>,
  size: usize,
) -> Result<NonNull<Block>, AllocError> {
  let bytes = size.checked_add(HEADER_SIZE).ok_or(AllocError::OutOfMemory)?;

  let base = {
    let _cursor = growth_lock.lock();
    platform.grow_heap(bytes)
  }
  .ok_or(AllocError::OutOfMemory)?;

  Ok(unsafe { Block::init(base, size, false) })
}

/// Maps whole pages; whatever the request leaves over becomes a free block
/// right behind it.
fn grow_large<P: Platform>(platform: &P, size: usize) -> Result<NonNull<Block>, AllocError> {
  let bytes = size
    .checked_add(HEADER_SIZE)
    .and_then(|total| checked_align_up(total, PAGE_SIZE))
    .ok_or(AllocError::OutOfMemory)?;

  let base = platform.map_pages(bytes).ok_or(AllocError::OutOfMemory)?;
  let usable = bytes - HEADER_SIZE;
  let block = unsafe { Block::init(base, usable, false) };

  if can_split(usable, size) {
    unsafe { split(block, size) };
  }

  Ok(block)
}
