use core::ptr::{NonNull, null_mut};

use crate::{align_up, block::HEAP_ALIGN, registry::MAX_ARENAS};

/// The three operating-system capabilities the heap is built on.
///
/// # Safety
/// Memory returned by `grow_heap` and `map_pages` must be handed over for
/// good: writable for the requested byte count, aligned to `HEAP_ALIGN`,
/// and never returned twice. `map_pages` memory must be zero-filled.
pub unsafe trait Platform: Sync {
  /// Arena slot of the processor the caller runs on. Ids at or above
  /// `MAX_ARENAS` are treated as unresolvable.
  fn current_processor_id(&self) -> Option<usize>;

  /// Extends the shared heap by `bytes`. The heap serializes these calls.
  fn grow_heap(&self, bytes: usize) -> Option<NonNull<u8>>;

  /// Maps a fresh zero-filled region of `bytes`.
  fn map_pages(&self, bytes: usize) -> Option<NonNull<u8>>;
}

/// The running process: `sched_getcpu`, `sbrk` and anonymous `mmap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Os;

unsafe impl Platform for Os {
  #[inline]
  fn current_processor_id(&self) -> Option<usize> {
    cpu_id().map(|cpu| cpu % MAX_ARENAS)
  }

  fn grow_heap(&self, bytes: usize) -> Option<NonNull<u8>> {
    unsafe { os_sbrk(bytes) }
  }

  fn map_pages(&self, bytes: usize) -> Option<NonNull<u8>> {
    unsafe { os_mmap(bytes) }
  }
}

// =============================================================================
// Processor id
// =============================================================================

// Only supported in the latest x86 CPUs. Seems to be the fastest way to access CPU ID
#[cfg(all(target_arch = "x86_64", target_os = "linux", feature = "rdpid"))]
fn cpu_id() -> Option<usize> {
  let cpu: u64;
  unsafe {
    std::arch::asm!("rdpid {}", out(reg) cpu, options(nomem, nostack, preserves_flags));
  }
  Some((cpu & 0xFFF) as usize)
}

#[cfg(all(target_os = "linux", not(all(target_arch = "x86_64", feature = "rdpid"))))]
fn cpu_id() -> Option<usize> {
  let cpu = unsafe { libc::sched_getcpu() };
  usize::try_from(cpu).ok()
}

// No processor query available: spread threads instead.
#[cfg(not(target_os = "linux"))]
fn cpu_id() -> Option<usize> {
  use core::sync::atomic::{AtomicUsize, Ordering};

  thread_local! {
    static TID: usize = {
      static CTR: AtomicUsize = AtomicUsize::new(0);
      CTR.fetch_add(1, Ordering::Relaxed)
    };
  }
  TID.try_with(|&id| id).ok()
}

// =============================================================================
// Memory primitives
// =============================================================================

// sbrk reports failure as `(void *) -1`.
const SBRK_FAILED: usize = usize::MAX;

unsafe fn sbrk(increment: usize) -> Option<*mut u8> {
  let increment = libc::intptr_t::try_from(increment).ok()?;
  let ptr = unsafe { libc::sbrk(increment) };
  if ptr as usize == SBRK_FAILED {
    None
  } else {
    Some(ptr.cast())
  }
}

/// Extends the program break by `bytes`, returning a `HEAP_ALIGN`-aligned base.
///
/// Our own requests are multiples of `HEAP_ALIGN`, so the break only drifts
/// out of alignment when someone else moves it; the drift is padded away.
unsafe fn os_sbrk(bytes: usize) -> Option<NonNull<u8>> {
  let brk = unsafe { sbrk(0) }? as usize;
  let pad = align_up(brk, HEAP_ALIGN) - brk;
  let start = unsafe { sbrk(bytes.checked_add(pad)?) }? as usize;
  let base = align_up(start, HEAP_ALIGN);

  // The break moved between both calls and our padding fell short.
  let shortfall = (base - start).saturating_sub(pad);
  if shortfall > 0 {
    unsafe { sbrk(shortfall) }?;
  }

  NonNull::new(base as *mut u8)
}

unsafe fn os_mmap(size: usize) -> Option<NonNull<u8>> {
  let ptr = unsafe {
    libc::mmap(
      null_mut(),
      size,
      libc::PROT_READ | libc::PROT_WRITE,
      libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
      -1,
      0,
    )
  };

  if ptr == libc::MAP_FAILED {
    None
  } else {
    NonNull::new(ptr.cast())
  }
}
