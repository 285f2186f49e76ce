use core::ptr::NonNull;

use crate::{
  block::{Block, HEAP_ALIGN},
  checked_align_up,
  error::AllocError,
  fit::{Fit, find_best_fit},
  growth::{Source, grow},
  lock::SpinLock,
  platform::Platform,
  registry::Registry,
  trace,
};

/// How an allocation was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
  Reused,
  Grown(Source),
}

/// One block as seen by [`Heap::walk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  /// Payload address.
  pub addr: usize,
  /// Payload bytes.
  pub size: usize,
  pub free: bool,
}

/// Per-processor arena heap over a [`Platform`].
///
/// Each processor slot owns an append-order list of blocks behind its own
/// lock. Small requests extend the shared heap under one global growth lock,
/// always taken after the arena lock; large requests map their own pages.
pub struct Heap<P: Platform> {
  platform: P,
  registry: Registry,
  growth: SpinLock<()>,
}

impl<P: Platform> Heap<P> {
  pub const fn new(platform: P) -> Self {
    Self {
      platform,
      registry: Registry::new(),
      growth: SpinLock::new(()),
    }
  }

  pub fn platform(&self) -> &P {
    &self.platform
  }

  /// Hands out at least `size` bytes aligned to 16.
  ///
  /// Contents are unspecified unless the block was freshly mapped.
  pub fn allocate(&self, size: usize) -> Result<NonNull<u8>, AllocError> {
    match self.place(size) {
      Ok((block, placement)) => {
        if let Placement::Grown(source) = placement {
          trace::grown(size, source);
        }
        trace::malloc(size);
        Ok(Block::payload(block))
      }
      Err(err) => {
        trace::failed(size, err);
        Err(err)
      }
    }
  }

  fn place(&self, size: usize) -> Result<(NonNull<Block>, Placement), AllocError> {
    if size == 0 {
      return Err(AllocError::ZeroSize);
    }
    let size = checked_align_up(size, HEAP_ALIGN).ok_or(AllocError::OutOfMemory)?;
    let processor = self
      .platform
      .current_processor_id()
      .ok_or(AllocError::NoProcessor)?;

    let mut arena = self.registry.arena(processor)?.lock();

    let Some(head) = arena.head() else {
      let (block, source) = unsafe { grow(&self.platform, &self.growth, None, size) }?;
      arena.set_head(block);
      return Ok((block, Placement::Grown(source)));
    };

    match unsafe { find_best_fit(head, size) } {
      Fit::Found(block) => {
        unsafe { block.as_ref() }.set_free(false);
        Ok((block, Placement::Reused))
      }
      Fit::Miss { tail } => {
        let (block, source) = unsafe { grow(&self.platform, &self.growth, Some(tail), size) }?;
        Ok((block, Placement::Grown(source)))
      }
    }
  }

  /// Marks the block behind `ptr` free for reuse. Null pointers and an
  /// unresolvable processor make this a no-op.
  ///
  /// The lock taken is the calling processor's, which need not be the arena
  /// the block was allocated from.
  ///
  /// # Safety
  /// `ptr` must be null or a live pointer returned by this heap.
  pub unsafe fn free(&self, ptr: *mut u8) {
    let Some(ptr) = NonNull::new(ptr) else {
      return;
    };
    let Some(processor) = self.platform.current_processor_id() else {
      return;
    };
    let Ok(arena) = self.registry.arena(processor) else {
      return;
    };

    let size = {
      let _arena = arena.lock();
      let block = unsafe { Block::from_payload(ptr).as_ref() };
      // Read first: once free, the owning arena may split it.
      let size = block.size();
      block.set_free(true);
      size
    };

    trace::free(size);
  }

  /// Allocates `count * size` zeroed bytes.
  ///
  /// The product is not checked for overflow: a wrapped product is what
  /// gets allocated.
  pub fn zero_allocate(&self, count: usize, size: usize) -> Result<NonNull<u8>, AllocError> {
    let total = count.wrapping_mul(size);
    let ptr = self.allocate(total)?;
    unsafe { ptr.as_ptr().write_bytes(0, total) };
    trace::calloc(total);
    Ok(ptr)
  }

  /// Payload bytes of the block behind `ptr`, 0 for null.
  ///
  /// # Safety
  /// `ptr` must be null or a pointer returned by this heap.
  pub unsafe fn usable_size(&self, ptr: *mut u8) -> usize {
    match NonNull::new(ptr) {
      Some(ptr) => unsafe { Block::from_payload(ptr).as_ref() }.size(),
      None => 0,
    }
  }

  /// Visits every block of one processor's arena in list order, under that
  /// arena's lock. `f` must not allocate from this heap.
  pub fn walk(&self, processor: usize, mut f: impl FnMut(BlockInfo)) -> Result<(), AllocError> {
    let arena = self.registry.arena(processor)?.lock();
    let mut current = arena.head();
    while let Some(block) = current {
      let header = unsafe { block.as_ref() };
      f(BlockInfo {
        addr: Block::payload(block).as_ptr() as usize,
        size: header.size(),
        free: header.is_free(),
      });
      current = header.next();
    }
    Ok(())
  }
}
