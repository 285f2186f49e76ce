use core::ptr::NonNull;

use crate::{block::Block, error::AllocError, lock::SpinLock};

/// Arena slots, one per processor id.
pub const MAX_ARENAS: usize = 100;

/// Head of one arena's block list. Empty until the first allocation routed
/// to the slot; never emptied again.
pub struct ArenaList {
  head: Option<NonNull<Block>>,
}

// Only reachable through the owning `SpinLock`.
unsafe impl Send for ArenaList {}

impl ArenaList {
  const EMPTY: Self = Self { head: None };

  #[inline]
  pub fn head(&self) -> Option<NonNull<Block>> {
    self.head
  }

  #[inline]
  pub fn set_head(&mut self, head: NonNull<Block>) {
    debug_assert!(self.head.is_none());
    self.head = Some(head);
  }
}

pub type Arena = SpinLock<ArenaList>;

/// Fixed table of per-processor arenas.
pub struct Registry {
  arenas: [Arena; MAX_ARENAS],
}

impl Registry {
  pub const fn new() -> Self {
    Self {
      arenas: [const { SpinLock::new(ArenaList::EMPTY) }; MAX_ARENAS],
    }
  }

  #[inline]
  pub fn arena(&self, processor: usize) -> Result<&Arena, AllocError> {
    self.arenas.get(processor).ok_or(AllocError::NoProcessor)
  }
}

impl Default for Registry {
  fn default() -> Self {
    Self::new()
  }
}
