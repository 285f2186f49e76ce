//! # cpuheap
//!
//! A general-purpose heap with one arena per processor.
//!
//! Every request is routed to the arena of the processor the calling thread
//! runs on, so threads on different cores rarely touch the same lock. Each
//! arena keeps one append-order list of blocks, allocated and free alike, and
//! reuses freed blocks by best fit:
//!
//! ```text
//!   arena[cpu] ──► ┌────────┬──────────┐   ┌────────┬──────┐   ┌────────┬────────────┐
//!                  │ header │ payload  │──►│ header │ ...  │──►│ header │  payload   │──► null
//!                  │ 64 used│          │   │ 32 free│      │   │ 80 free│            │
//!                  └────────┴──────────┘   └────────┴──────┘   └────────┴────────────┘
//! ```
//!
//! When nothing fits, fresh memory is appended to the list:
//!
//! - requests up to 4096 bytes extend the program break (`sbrk`), serialized
//!   by one process-wide growth lock;
//! - larger requests map their own pages (`mmap`); whatever the rounding to
//!   whole pages leaves over becomes a free block right behind them.
//!
//! Freed blocks are never merged with their neighbours, never unmapped and
//! never returned to the system.
//!
//! ## Usage
//!
//! ```rust,ignore
//! #[global_allocator]
//! static GLOBAL: cpuheap::Allocator = cpuheap::Allocator;
//! ```
//!
//! or directly:
//!
//! ```rust,ignore
//! let ptr = cpuheap::allocate(64)?;
//! unsafe { cpuheap::free(ptr.as_ptr()) };
//! ```
//!
//! With the `c_api` feature the crate also exports `malloc`, `free`,
//! `calloc`, `realloc`, `malloc_usable_size` and `posix_memalign`.

#![allow(clippy::missing_safety_doc)]

use core::{
  alloc::{GlobalAlloc, Layout},
  ptr::{self, NonNull, null_mut},
};

mod block;
mod error;
#[cfg(feature = "c_api")]
mod ffi;
mod fit;
mod growth;
mod heap;
mod lock;
mod platform;
mod registry;
#[cfg(test)]
mod sim;
mod trace;

pub use block::{HEADER_SIZE, HEAP_ALIGN};
pub use error::AllocError;
pub use growth::{LARGE_THRESHOLD, PAGE_SIZE};
pub use heap::{BlockInfo, Heap};
pub use platform::{Os, Platform};
pub use registry::MAX_ARENAS;

// =============================================================================
// Process heap
// =============================================================================

static HEAP: Heap<Os> = Heap::new(Os);

/// The heap behind the free functions and [`Allocator`].
#[inline]
pub fn heap() -> &'static Heap<Os> {
  &HEAP
}

/// Allocates `size` bytes from the calling processor's arena.
#[inline]
pub fn allocate(size: usize) -> Result<NonNull<u8>, AllocError> {
  HEAP.allocate(size)
}

/// Returns a block to the calling processor's arena for reuse.
#[inline]
pub unsafe fn free(ptr: *mut u8) {
  unsafe { HEAP.free(ptr) }
}

/// Allocates `count * size` zeroed bytes. The product is not overflow-checked.
#[inline]
pub fn zero_allocate(count: usize, size: usize) -> Result<NonNull<u8>, AllocError> {
  HEAP.zero_allocate(count, size)
}

#[inline]
pub unsafe fn usable_size(ptr: *mut u8) -> usize {
  unsafe { HEAP.usable_size(ptr) }
}

// =============================================================================
// GlobalAlloc
// =============================================================================

/// [`GlobalAlloc`] over the process heap.
///
/// Alignments above [`HEAP_ALIGN`] cannot be honoured and fail.
pub struct Allocator;

unsafe impl GlobalAlloc for Allocator {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    if layout.align() > HEAP_ALIGN {
      return null_mut();
    }
    allocate(layout.size()).map_or(null_mut(), NonNull::as_ptr)
  }

  unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
    unsafe { free(ptr) }
  }

  unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
    if ptr.is_null() {
      return unsafe {
        self.alloc(Layout::from_size_align_unchecked(
          new_size,
          layout.align(),
        ))
      };
    }

    // The block already has room.
    if new_size <= unsafe { usable_size(ptr) } {
      return ptr;
    }

    let new_ptr =
      unsafe { self.alloc(Layout::from_size_align_unchecked(new_size, layout.align())) };

    if !new_ptr.is_null() {
      unsafe { ptr::copy_nonoverlapping(ptr, new_ptr, layout.size().min(new_size)) };
      unsafe { free(ptr) };
    }

    new_ptr
  }

  unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
    if layout.align() > HEAP_ALIGN {
      return null_mut();
    }
    zero_allocate(1, layout.size()).map_or(null_mut(), NonNull::as_ptr)
  }
}

// =============================================================================
// Utils
// =============================================================================

/// Rounds `x` up to the next multiple of alignment `align`. Alignment must be a power of 2.
#[inline(always)]
pub(crate) const fn align_up(x: usize, align: usize) -> usize {
  let mask = align - 1;
  (x + mask) & !mask
}

/// [`align_up`] that reports overflow instead of wrapping.
#[inline(always)]
pub(crate) const fn checked_align_up(x: usize, align: usize) -> Option<usize> {
  let mask = align - 1;
  match x.checked_add(mask) {
    Some(sum) => Some(sum & !mask),
    None => None,
  }
}
