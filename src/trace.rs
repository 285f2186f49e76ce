//! Allocation events on the `log` facade.
//!
//! Loggers allocate, and their allocations land back here. Events are only
//! emitted with every heap lock released, and a per-thread flag drops the
//! nested events a logger's own allocations would produce.

use core::cell::Cell;

use log::Level;

use crate::{error::AllocError, growth::Source};

thread_local! {
  static IN_LOG: Cell<bool> = const { Cell::new(false) };
}

#[inline]
fn emit(level: Level, f: impl FnOnce()) {
  if !log::log_enabled!(level) {
    return;
  }

  // TLS may already be torn down on thread exit.
  let entered = IN_LOG.try_with(|flag| !flag.replace(true)).unwrap_or(false);
  if !entered {
    return;
  }

  f();

  let _ = IN_LOG.try_with(|flag| flag.set(false));
}

pub fn malloc(size: usize) {
  emit(Level::Trace, || log::trace!("malloc {size} bytes"));
}

pub fn grown(size: usize, source: Source) {
  emit(Level::Debug, || match source {
    Source::Heap => log::debug!("heap grown for {size} bytes"),
    Source::Mapped => log::debug!("pages mapped for {size} bytes"),
  });
}

pub fn failed(size: usize, err: AllocError) {
  emit(Level::Debug, || log::debug!("malloc {size} bytes failed: {err}"));
}

pub fn free(size: usize) {
  emit(Level::Trace, || log::trace!("freed {size} bytes"));
}

pub fn calloc(total: usize) {
  emit(Level::Trace, || log::trace!("calloc {total} bytes"));
}
