//! Simulated environment for unit tests: a fixed heap buffer, zeroed
//! page-aligned mappings from the system allocator and a processor id the
//! test picks.

use std::{
  alloc::{self, Layout},
  cell::Cell,
  hint,
  ptr::NonNull,
  sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use crate::{growth::PAGE_SIZE, platform::Platform};

const HEAP_BYTES: usize = 1 << 20;
const NO_CPU: usize = usize::MAX;

thread_local! {
  static PINNED: Cell<Option<usize>> = const { Cell::new(None) };
}

pub struct SimPlatform {
  heap: usize,
  /// Deliberately not read-modify-write: the heap must serialize growth.
  cursor: AtomicUsize,
  growing: AtomicBool,
  overlaps: AtomicUsize,
  maps: Mutex<Vec<(usize, Layout)>>,
  cpu: AtomicUsize,
  fail: AtomicBool,
  grow_calls: AtomicUsize,
  map_calls: AtomicUsize,
  last_map_len: AtomicUsize,
}

impl SimPlatform {
  pub fn new() -> Self {
    let layout = Self::heap_layout();
    let heap = unsafe { alloc::alloc(layout) };
    assert!(!heap.is_null());
    Self {
      heap: heap as usize,
      cursor: AtomicUsize::new(0),
      growing: AtomicBool::new(false),
      overlaps: AtomicUsize::new(0),
      maps: Mutex::new(Vec::new()),
      cpu: AtomicUsize::new(0),
      fail: AtomicBool::new(false),
      grow_calls: AtomicUsize::new(0),
      map_calls: AtomicUsize::new(0),
      last_map_len: AtomicUsize::new(0),
    }
  }

  fn heap_layout() -> Layout {
    Layout::from_size_align(HEAP_BYTES, PAGE_SIZE).unwrap()
  }

  /// Routes the calling thread to `cpu`, overriding [`SimPlatform::set_cpu`].
  pub fn pin_thread(cpu: usize) {
    PINNED.with(|pinned| pinned.set(Some(cpu)));
  }

  pub fn set_cpu(&self, cpu: Option<usize>) {
    self.cpu.store(cpu.unwrap_or(NO_CPU), Ordering::Relaxed);
  }

  pub fn fail_growth(&self, fail: bool) {
    self.fail.store(fail, Ordering::Relaxed);
  }

  pub fn heap_used(&self) -> usize {
    self.cursor.load(Ordering::Relaxed)
  }

  /// `grow_heap` calls that started while another one was still running.
  pub fn growth_overlaps(&self) -> usize {
    self.overlaps.load(Ordering::Relaxed)
  }

  pub fn grow_calls(&self) -> usize {
    self.grow_calls.load(Ordering::Relaxed)
  }

  pub fn map_calls(&self) -> usize {
    self.map_calls.load(Ordering::Relaxed)
  }

  pub fn last_map_len(&self) -> usize {
    self.last_map_len.load(Ordering::Relaxed)
  }
}

unsafe impl Platform for SimPlatform {
  fn current_processor_id(&self) -> Option<usize> {
    if let Some(cpu) = PINNED.with(Cell::get) {
      return Some(cpu);
    }
    match self.cpu.load(Ordering::Relaxed) {
      NO_CPU => None,
      cpu => Some(cpu),
    }
  }

  fn grow_heap(&self, bytes: usize) -> Option<NonNull<u8>> {
    self.grow_calls.fetch_add(1, Ordering::Relaxed);
    if self.fail.load(Ordering::Relaxed) {
      return None;
    }

    if self.growing.swap(true, Ordering::Acquire) {
      self.overlaps.fetch_add(1, Ordering::Relaxed);
    }

    let cursor = self.cursor.load(Ordering::Relaxed);
    // Widen the window for an unserialized caller to slip in.
    for _ in 0..256 {
      hint::spin_loop();
    }
    let grown = if HEAP_BYTES - cursor < bytes {
      None
    } else {
      self.cursor.store(cursor + bytes, Ordering::Relaxed);
      NonNull::new((self.heap + cursor) as *mut u8)
    };

    self.growing.store(false, Ordering::Release);
    grown
  }

  fn map_pages(&self, bytes: usize) -> Option<NonNull<u8>> {
    self.map_calls.fetch_add(1, Ordering::Relaxed);
    self.last_map_len.store(bytes, Ordering::Relaxed);
    if self.fail.load(Ordering::Relaxed) {
      return None;
    }

    let layout = Layout::from_size_align(bytes, PAGE_SIZE).ok()?;
    let ptr = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })?;
    self.maps.lock().unwrap().push((ptr.as_ptr() as usize, layout));
    Some(ptr)
  }
}

impl Drop for SimPlatform {
  fn drop(&mut self) {
    for &(addr, layout) in self.maps.get_mut().unwrap().iter() {
      unsafe { alloc::dealloc(addr as *mut u8, layout) };
    }
    unsafe { alloc::dealloc(self.heap as *mut u8, Self::heap_layout()) };
  }
}
