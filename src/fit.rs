use core::ptr::NonNull;

use crate::block::{Block, can_split, split};

/// Outcome of a best-fit scan over one arena list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
  /// Smallest free block that holds the request, already trimmed to it
  /// when the excess could stand as its own block. Still marked free.
  Found(NonNull<Block>),
  /// Nothing fits. `tail` is the last block of the list, where fresh
  /// memory gets appended.
  Miss { tail: NonNull<Block> },
}

/// Scans the whole list starting at `head` for the smallest free block of
/// at least `size` payload bytes. Equal sizes resolve to the earliest block.
///
/// # Safety
/// The caller must hold the lock of the arena owning `head`.
pub unsafe fn find_best_fit(head: NonNull<Block>, size: usize) -> Fit {
  let mut best: Option<NonNull<Block>> = None;
  let mut best_size = usize::MAX;
  let mut tail = head;
  let mut current = Some(head);

  while let Some(block) = current {
    let header = unsafe { block.as_ref() };
    let block_size = header.size();

    // Strict comparison: a later block of equal size never wins.
    if header.is_free() && block_size >= size && block_size < best_size {
      best = Some(block);
      best_size = block_size;
    }

    tail = block;
    current = header.next();
  }

  match best {
    Some(block) => {
      if can_split(best_size, size) {
        unsafe { split(block, size) };
      }
      Fit::Found(block)
    }
    None => Fit::Miss { tail },
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::HEADER_SIZE;

  #[repr(C, align(16))]
  struct Region([u8; 8192]);

  /// Lays out blocks back to back and links them in order.
  fn build(region: &mut Region, blocks: &[(usize, bool)]) -> Vec<NonNull<Block>> {
    let mut offset = 0;
    let mut built: Vec<NonNull<Block>> = Vec::new();
    for &(size, free) in blocks {
      let addr = NonNull::new(unsafe { region.0.as_mut_ptr().add(offset) }).unwrap();
      let block = unsafe { Block::init(addr, size, free) };
      if let Some(prev) = built.last() {
        unsafe { (*prev.as_ptr()).set_next(Some(block)) };
      }
      built.push(block);
      offset += HEADER_SIZE + size;
    }
    built
  }

  fn size_of(block: NonNull<Block>) -> usize {
    unsafe { block.as_ref().size() }
  }

  #[test]
  fn test_picks_smallest_sufficient() {
    let mut region = Region([0; 8192]);
    let blocks = build(&mut region, &[(512, true), (256, true), (1024, true)]);

    let fit = unsafe { find_best_fit(blocks[0], 320) };

    assert_eq!(fit, Fit::Found(blocks[0]));
    assert_eq!(size_of(blocks[0]), 320);
    let rest = unsafe { blocks[0].as_ref().next() }.unwrap();
    assert_eq!(size_of(rest), 512 - 320 - HEADER_SIZE);
    assert!(unsafe { rest.as_ref().is_free() });
    assert_eq!(unsafe { rest.as_ref().next() }, Some(blocks[1]));
  }

  #[test]
  fn test_no_split_without_header_room() {
    let mut region = Region([0; 8192]);
    let blocks = build(&mut region, &[(64, true), (32, true), (80, true)]);

    let fit = unsafe { find_best_fit(blocks[0], 48) };

    assert_eq!(fit, Fit::Found(blocks[0]));
    assert_eq!(size_of(blocks[0]), 64);
    assert_eq!(unsafe { blocks[0].as_ref().next() }, Some(blocks[1]));
  }

  #[test]
  fn test_equal_sizes_prefer_earlier() {
    let mut region = Region([0; 8192]);
    let blocks = build(&mut region, &[(32, false), (128, true), (128, true)]);

    let fit = unsafe { find_best_fit(blocks[0], 128) };

    assert_eq!(fit, Fit::Found(blocks[1]));
  }

  #[test]
  fn test_skips_allocated_blocks() {
    let mut region = Region([0; 8192]);
    let blocks = build(&mut region, &[(96, false), (256, true)]);

    let fit = unsafe { find_best_fit(blocks[0], 96) };

    assert_eq!(fit, Fit::Found(blocks[1]));
  }

  #[test]
  fn test_miss_reports_tail() {
    let mut region = Region([0; 8192]);
    let blocks = build(&mut region, &[(64, true), (128, false), (32, true)]);

    let fit = unsafe { find_best_fit(blocks[0], 256) };

    assert_eq!(fit, Fit::Miss { tail: blocks[2] });
    assert_eq!(size_of(blocks[0]), 64);
  }

  #[test]
  fn test_found_block_stays_free() {
    let mut region = Region([0; 8192]);
    let blocks = build(&mut region, &[(64, true)]);

    let fit = unsafe { find_best_fit(blocks[0], 64) };

    assert_eq!(fit, Fit::Found(blocks[0]));
    assert!(unsafe { blocks[0].as_ref().is_free() });
  }
}
