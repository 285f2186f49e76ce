use core::{
  mem::size_of,
  ptr::{NonNull, null_mut},
  sync::atomic::{AtomicBool, Ordering},
};

/// Alignment of every header and payload handed out.
pub const HEAP_ALIGN: usize = 16;

/// Size of the header that precedes every payload.
pub const HEADER_SIZE: usize = size_of::<Block>();

const _: () = assert!(HEAP_ALIGN.is_power_of_two());
const _: () = assert!(HEADER_SIZE % HEAP_ALIGN == 0);

/// Block metadata. Sits immediately before the payload it describes.
///
/// Blocks of one arena form a singly linked list in append order, holding
/// allocated and free blocks alike. Once linked, a block is never unlinked;
/// only its `free` flag changes.
#[repr(C, align(16))]
pub struct Block {
  /// Usable payload bytes, header excluded.
  size: usize,
  /// Next block in list order, null at the tail.
  next: *mut Block,
  /// Atomic because `free` may flip it from another processor's lock.
  free: AtomicBool,
}

impl Block {
  /// Writes a fresh header at `addr` and returns it as a block.
  ///
  /// # Safety
  /// `addr` must be `HEAP_ALIGN`-aligned and valid for `HEADER_SIZE` writes.
  #[inline]
  pub unsafe fn init(addr: NonNull<u8>, size: usize, free: bool) -> NonNull<Block> {
    let block = addr.cast::<Block>();
    unsafe {
      block.as_ptr().write(Block {
        size,
        next: null_mut(),
        free: AtomicBool::new(free),
      })
    };
    block
  }

  /// Recovers the header of a payload pointer handed out earlier.
  ///
  /// # Safety
  /// `ptr` must have come from [`Block::payload`].
  #[inline]
  pub unsafe fn from_payload(ptr: NonNull<u8>) -> NonNull<Block> {
    unsafe { ptr.sub(HEADER_SIZE).cast() }
  }

  #[inline]
  pub fn payload(block: NonNull<Block>) -> NonNull<u8> {
    unsafe { block.cast::<u8>().add(HEADER_SIZE) }
  }

  #[inline]
  pub fn size(&self) -> usize {
    self.size
  }

  #[inline]
  pub fn next(&self) -> Option<NonNull<Block>> {
    NonNull::new(self.next)
  }

  #[inline]
  pub fn set_next(&mut self, next: Option<NonNull<Block>>) {
    self.next = next.map_or(null_mut(), NonNull::as_ptr);
  }

  #[inline]
  pub fn is_free(&self) -> bool {
    self.free.load(Ordering::Acquire)
  }

  #[inline]
  pub fn set_free(&self, free: bool) {
    self.free.store(free, Ordering::Release);
  }
}

/// Whether a block of `block_size` can give up everything past `size` as a
/// separate block: the remainder must hold a header and at least one byte.
#[inline]
pub fn can_split(block_size: usize, size: usize) -> bool {
  block_size
    .checked_sub(size)
    .is_some_and(|rest| rest > HEADER_SIZE)
}

/// Carves a free block out of everything past the first `size` payload bytes
/// of `block`, inserted right after it in list order.
///
/// # Safety
/// `block` must be a live header whose list is exclusively held by the
/// caller, and `can_split((*block).size, size)` must hold.
pub unsafe fn split(block: NonNull<Block>, size: usize) -> NonNull<Block> {
  let head = block.as_ptr();
  let (old_size, old_next) = unsafe { ((*head).size, (*head).next) };
  debug_assert!(can_split(old_size, size));
  debug_assert!(size % HEAP_ALIGN == 0);

  let addr = unsafe { Block::payload(block).add(size) };
  let tail = unsafe { Block::init(addr, old_size - HEADER_SIZE - size, true) };
  unsafe {
    (*tail.as_ptr()).next = old_next;
    (*head).next = tail.as_ptr();
    (*head).size = size;
  }
  tail
}
