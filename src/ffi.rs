//! C allocation symbols over the process heap.

use core::ptr::{self, NonNull, null_mut};

#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc(size: usize) -> *mut u8 {
  crate::allocate(size).map_or(null_mut(), NonNull::as_ptr)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn free(ptr: *mut u8) {
  unsafe { crate::free(ptr) }
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn calloc(nmemb: usize, size: usize) -> *mut u8 {
  crate::zero_allocate(nmemb, size).map_or(null_mut(), NonNull::as_ptr)
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
  if ptr.is_null() {
    return unsafe { malloc(size) };
  }

  if size == 0 {
    unsafe { crate::free(ptr) };
    return null_mut();
  }

  let old_size = unsafe { crate::usable_size(ptr) };
  if size <= old_size {
    return ptr;
  }

  let new_ptr = unsafe { malloc(size) };
  if !new_ptr.is_null() {
    unsafe { ptr::copy_nonoverlapping(ptr, new_ptr, old_size) };
    unsafe { crate::free(ptr) };
  }

  new_ptr
}

#[unsafe(no_mangle)]
pub unsafe extern "C" fn malloc_usable_size(ptr: *mut u8) -> usize {
  unsafe { crate::usable_size(ptr) }
}

/// Only alignments up to `HEAP_ALIGN` can be served; larger ones report
/// `ENOMEM`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn posix_memalign(memptr: *mut *mut u8, alignment: usize, size: usize) -> i32 {
  if !alignment.is_power_of_two() || alignment < core::mem::size_of::<*mut u8>() {
    return libc::EINVAL;
  }
  if alignment > crate::HEAP_ALIGN {
    return libc::ENOMEM;
  }

  match crate::allocate(size) {
    Ok(ptr) => {
      unsafe { *memptr = ptr.as_ptr() };
      0
    }
    Err(_) => libc::ENOMEM,
  }
}
