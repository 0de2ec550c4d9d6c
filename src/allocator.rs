use std::{collections::HashSet, fmt, ptr::NonNull};

use tracing::{debug, error, trace, warn};

use crate::{
  align_to,
  arena::{Arena, Backing, MmapBacking},
  block::{self, BlockInfo, HEADER_SIZE, OVERHEAD, State},
  config::Config,
  error::AllocError,
  free_list::FreeList,
};

/// Usage figures for one allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
  pub arena_size: usize,
  /// Payload bytes handed out, rounding included.
  pub allocated_bytes: usize,
  /// Payload bytes sitting in free blocks.
  pub free_bytes: usize,
  pub allocated_blocks: usize,
  pub free_blocks: usize,
  pub largest_free: usize,
}

/// The arena together with the index of its free blocks.
struct Heap {
  arena: Arena,
  free_list: FreeList,
}

enum HeapState {
  Unreserved,
  Ready(Heap),
  /// Reservation failed; the allocator can never hand out memory.
  Failed,
}

/// Boundary-tag allocator over one fixed-size arena.
///
/// The arena is reserved from `B` on the first call to
/// [`allocate`](Allocator::allocate) and given back when the allocator is
/// dropped. Instances are independent of each other and not thread safe.
pub struct Allocator<B: Backing = MmapBacking> {
  config: Config,
  backing: B,
  state: HeapState,
}

impl Allocator<MmapBacking> {
  pub fn new(config: Config) -> Result<Self, AllocError> {
    Self::with_backing(config, MmapBacking)
  }
}

impl Default for Allocator<MmapBacking> {
  fn default() -> Self {
    let config = Config::default();
    debug_assert!(config.validate().is_ok());

    Self::from_validated(config, MmapBacking)
  }
}

impl<B: Backing> Allocator<B> {
  pub fn with_backing(
    config: Config,
    backing: B,
  ) -> Result<Self, AllocError> {
    config.validate()?;

    Ok(Self::from_validated(config, backing))
  }

  fn from_validated(
    config: Config,
    backing: B,
  ) -> Self {
    Self {
      config,
      backing,
      state: HeapState::Unreserved,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Whether the arena has been reserved yet.
  pub fn is_reserved(&self) -> bool {
    matches!(self.state, HeapState::Ready(_))
  }

  fn reserve(&mut self) -> Result<(), AllocError> {
    let size = self.config.arena_size;

    let Some(base) = self.backing.reserve(size) else {
      error!(size, "arena reservation failed");
      self.state = HeapState::Failed;
      return Err(AllocError::ArenaReservationFailed { size });
    };

    let mut heap = Heap {
      arena: unsafe { Arena::from_raw(base, size) },
      free_list: FreeList::new(),
    };

    block::write(&mut heap.arena, 0, size - OVERHEAD, State::Free);
    heap.free_list.insert(&mut heap.arena, 0);

    debug!(size, base = ?base, "arena reserved");

    self.state = HeapState::Ready(heap);
    Ok(())
  }

  /// Hands out a payload of at least `size` bytes, rounded up to the
  /// configured alignment.
  ///
  /// The returned pointer stays valid until it is passed to
  /// [`release`](Allocator::release) or the allocator is dropped.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    let max = self.config.max_payload();

    if size == 0 || size > max {
      return Err(AllocError::InvalidSize {
        requested: size,
        max,
      });
    }

    if matches!(self.state, HeapState::Unreserved) {
      self.reserve()?;
    }

    let HeapState::Ready(heap) = &mut self.state else {
      return Err(AllocError::OutOfMemory { requested: size });
    };

    if heap.free_list.is_empty() {
      return Err(AllocError::OutOfMemory { requested: size });
    }

    let rounded = align_to!(size, self.config.alignment);
    let found = self
      .config
      .search_mode
      .find(heap.free_list.iter(&heap.arena), rounded);

    let Some(offset) = found else {
      trace!(size, rounded, free_blocks = heap.free_list.len(), "no free block fits");
      return Err(AllocError::OutOfMemory { requested: size });
    };

    let offset = heap.split(offset, rounded, self.config.min_free_block());

    Ok(heap.arena.address_of(block::payload_offset(offset)))
  }

  /// Returns a payload obtained from [`allocate`](Allocator::allocate),
  /// merging it with free neighbours.
  ///
  /// Null pointers, foreign pointers and repeated releases are reported as
  /// errors and leave the allocator untouched.
  pub fn release(
    &mut self,
    ptr: *mut u8,
  ) -> Result<(), AllocError> {
    if ptr.is_null() {
      warn!("release called with a null pointer");
      return Err(AllocError::NullHandle);
    }

    let HeapState::Ready(heap) = &mut self.state else {
      warn!(addr = ?ptr, "release before the arena was reserved");
      return Err(AllocError::InvalidHandle { addr: ptr as usize });
    };

    let offset = heap.locate(ptr, self.config.alignment)?;
    heap.coalesce(offset);

    Ok(())
  }

  /// Payload capacity of a live allocation.
  pub fn usable_size(
    &self,
    ptr: *const u8,
  ) -> Result<usize, AllocError> {
    let HeapState::Ready(heap) = &self.state else {
      return Err(AllocError::InvalidHandle { addr: ptr as usize });
    };

    let offset = heap.locate(ptr, self.config.alignment)?;

    Ok(block::header(&heap.arena, offset).size)
  }

  /// Every block in address order. Empty until the arena is reserved.
  pub fn dump_state(&self) -> Vec<BlockInfo> {
    match &self.state {
      HeapState::Ready(heap) => heap.blocks(),
      _ => Vec::new(),
    }
  }

  /// The free list in list order, most recently inserted first.
  pub fn free_blocks(&self) -> Vec<BlockInfo> {
    match &self.state {
      HeapState::Ready(heap) => heap.free_list.iter(&heap.arena).collect(),
      _ => Vec::new(),
    }
  }

  pub fn stats(&self) -> Stats {
    let mut stats = Stats {
      arena_size: self.config.arena_size,
      ..Stats::default()
    };

    for block in self.dump_state() {
      if block.free {
        stats.free_bytes += block.size;
        stats.free_blocks += 1;
        stats.largest_free = stats.largest_free.max(block.size);
      } else {
        stats.allocated_bytes += block.size;
        stats.allocated_blocks += 1;
      }
    }

    stats
  }

  /// Walks the whole arena and the free list, checking that the blocks tile
  /// the arena, headers match tags, sizes sit on the alignment grid, no two
  /// neighbours are both free, and the free list holds exactly the free
  /// blocks.
  pub fn verify(&self) -> Result<(), AllocError> {
    match &self.state {
      HeapState::Ready(heap) => heap.verify(self.config.alignment),
      _ => Ok(()),
    }
  }
}

impl Heap {
  /// Allocates `rounded` bytes out of the free block at `offset`, returning
  /// the allocated block's offset.
  fn split(
    &mut self,
    offset: usize,
    rounded: usize,
    min_free_block: usize,
  ) -> usize {
    let size = block::header(&self.arena, offset).size;
    self.free_list.remove(&mut self.arena, offset);

    // A smaller remainder could never be handed out again.
    if size < rounded + min_free_block {
      block::write(&mut self.arena, offset, size, State::Allocated);
      debug!(offset, size, requested = rounded, "allocated whole block");
      return offset;
    }

    block::write(&mut self.arena, offset, rounded, State::Allocated);

    let tail = block::end_offset(offset, rounded);
    let tail_size = size - rounded - OVERHEAD;
    block::write(&mut self.arena, tail, tail_size, State::Free);
    self.free_list.insert(&mut self.arena, tail);

    debug!(offset, size = rounded, tail, tail_size, "split block");
    offset
  }

  /// Maps a payload pointer back to the header offset of its live block.
  fn locate(
    &self,
    ptr: *const u8,
    alignment: usize,
  ) -> Result<usize, AllocError> {
    let invalid = AllocError::InvalidHandle { addr: ptr as usize };

    let offset = self
      .arena
      .offset_of(ptr)
      .and_then(|payload| payload.checked_sub(HEADER_SIZE))
      .ok_or(invalid)?;

    let info = block::header(&self.arena, offset);

    match info.state {
      Some(State::Allocated) => {}
      Some(State::Free | State::Absorbed) => {
        warn!(offset, "block is already free");
        return Err(AllocError::AlreadyFree { offset });
      }
      None => {
        warn!(addr = ?ptr, "release of a pointer that is not a block payload");
        return Err(invalid);
      }
    }

    // Real blocks start and end on the alignment grid and are never empty.
    if info.size == 0
      || info.size % alignment != 0
      || offset % alignment != 0
      || block::end_offset(offset, info.size) > self.arena.size()
      || block::tag(&self.arena, block::tag_offset(offset, info.size)) != info
    {
      warn!(addr = ?ptr, "release of a pointer that is not a block payload");
      return Err(invalid);
    }

    Ok(offset)
  }

  /// Frees the allocated block at `offset`, absorbing free neighbours on
  /// both sides, and puts the result on the free list.
  fn coalesce(
    &mut self,
    offset: usize,
  ) {
    let mut offset = offset;
    let mut size = block::header(&self.arena, offset).size;

    if let Some(next) = block::next_block_offset(&self.arena, offset) {
      let next_info = block::header(&self.arena, next);

      if next_info.is_free() {
        self.free_list.remove(&mut self.arena, next);
        block::stamp_absorbed_tag(&mut self.arena, block::tag_offset(offset, size));
        block::stamp_absorbed_header(&mut self.arena, next);
        size += next_info.size + OVERHEAD;

        debug!(offset, absorbed = next, size, "merged with next block");
      }
    }

    if let Some(prev) = block::previous_block_offset(&self.arena, offset) {
      let prev_info = block::header(&self.arena, prev);

      if prev_info.is_free() {
        self.free_list.remove(&mut self.arena, prev);
        block::stamp_absorbed_tag(&mut self.arena, block::tag_offset(prev, prev_info.size));
        block::stamp_absorbed_header(&mut self.arena, offset);
        size += prev_info.size + OVERHEAD;

        debug!(offset = prev, absorbed = offset, size, "merged with previous block");
        offset = prev;
      }
    }

    block::write(&mut self.arena, offset, size, State::Free);
    self.free_list.insert(&mut self.arena, offset);
  }

  fn blocks(&self) -> Vec<BlockInfo> {
    let mut blocks = Vec::new();
    let mut offset = 0;

    while offset + OVERHEAD <= self.arena.size() {
      let info = block::header(&self.arena, offset);
      let end = block::end_offset(offset, info.size);

      if end > self.arena.size() {
        break;
      }

      blocks.push(BlockInfo {
        offset,
        size: info.size,
        free: info.is_free(),
      });
      offset = end;
    }

    blocks
  }

  fn verify(
    &self,
    alignment: usize,
  ) -> Result<(), AllocError> {
    let corrupted = |offset: usize, reason: &'static str| -> Result<(), AllocError> {
      Err(AllocError::Corrupted { offset, reason })
    };

    let mut offset = 0;
    let mut previous_free = false;
    let mut free = HashSet::new();

    while offset < self.arena.size() {
      if offset + OVERHEAD > self.arena.size() {
        return corrupted(offset, "trailing bytes too small for a block");
      }

      let info = block::header(&self.arena, offset);
      let end = block::end_offset(offset, info.size);

      match info.state {
        Some(State::Allocated | State::Free) => {}
        _ => return corrupted(offset, "header has no valid state"),
      }
      if end > self.arena.size() {
        return corrupted(offset, "block overruns the arena");
      }
      if block::tag(&self.arena, block::tag_offset(offset, info.size)) != info {
        return corrupted(offset, "header and boundary tag disagree");
      }
      if info.size % alignment != 0 {
        return corrupted(offset, "payload size off the alignment grid");
      }
      if previous_free && info.is_free() {
        return corrupted(offset, "two adjacent free blocks");
      }

      if info.is_free() {
        free.insert(offset);
      }
      previous_free = info.is_free();
      offset = end;
    }

    let mut listed = HashSet::new();
    let mut prev = None;
    let mut current = self.free_list.head();

    while let Some(offset) = current {
      if !listed.insert(offset) {
        return corrupted(offset, "free list visits a block twice");
      }
      if !free.contains(&offset) {
        return corrupted(offset, "free list holds a block that is not free");
      }
      if block::prev_free(&self.arena, offset) != prev {
        return corrupted(offset, "free list back link is wrong");
      }

      prev = Some(offset);
      current = block::next_free(&self.arena, offset);
    }

    if listed.len() != free.len() || listed.len() != self.free_list.len() {
      return corrupted(0, "free list and free blocks differ");
    }

    Ok(())
  }
}

impl<B: Backing> Drop for Allocator<B> {
  fn drop(&mut self) {
    if let HeapState::Ready(heap) = &self.state {
      let (base, size) = (heap.arena.base(), heap.arena.size());
      unsafe { self.backing.unreserve(base, size) };
    }
  }
}

impl<B: Backing> fmt::Display for Allocator<B> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match &self.state {
      HeapState::Unreserved => writeln!(f, "arena not reserved"),
      HeapState::Failed => writeln!(f, "arena reservation failed"),
      HeapState::Ready(heap) => {
        writeln!(f, "Blocks ({} free listed):", heap.free_list.len())?;

        for block in heap.blocks() {
          writeln!(
            f,
            "  offset = {:>6}, size = {:>6}, {}",
            block.offset,
            block.size,
            if block.free { "free" } else { "allocated" },
          )?;
        }

        Ok(())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::SearchMode;

  /// Backing whose reservation always fails.
  struct Refusing;

  impl Backing for Refusing {
    fn reserve(
      &mut self,
      _size: usize,
    ) -> Option<NonNull<u8>> {
      None
    }

    unsafe fn unreserve(
      &mut self,
      _base: NonNull<u8>,
      _size: usize,
    ) {
      unreachable!("nothing was reserved");
    }
  }

  fn offset_of(
    allocator: &Allocator,
    ptr: NonNull<u8>,
  ) -> usize {
    let HeapState::Ready(heap) = &allocator.state else {
      panic!("arena not reserved");
    };
    heap.arena.offset_of(ptr.as_ptr()).unwrap() - HEADER_SIZE
  }

  #[test]
  fn test_lazy_reservation() {
    let mut allocator = Allocator::default();

    assert!(!allocator.is_reserved());
    assert!(allocator.dump_state().is_empty());

    allocator.allocate(8).unwrap();

    assert!(allocator.is_reserved());
  }

  #[test]
  fn test_first_block_spans_arena() {
    let mut allocator = Allocator::default();
    let ptr = allocator.allocate(992).unwrap();

    assert_eq!(offset_of(&allocator, ptr), 0);
    assert_eq!(allocator.dump_state(), vec![BlockInfo {
      offset: 0,
      size: 992,
      free: false,
    }]);
    assert!(allocator.free_blocks().is_empty());
  }

  #[test]
  fn test_split_leaves_tail_on_free_list() {
    let mut allocator = Allocator::default();
    allocator.allocate(600).unwrap();

    assert_eq!(allocator.dump_state(), vec![
      BlockInfo {
        offset: 0,
        size: 608,
        free: false,
      },
      BlockInfo {
        offset: 640,
        size: 352,
        free: true,
      },
    ]);
    assert_eq!(allocator.free_blocks().len(), 1);
    allocator.verify().unwrap();
  }

  #[test]
  fn test_small_remainder_is_not_split() {
    let mut allocator = Allocator::default();
    // 992 - 960 = 32 < 16 + 32, so the whole block goes out.
    let ptr = allocator.allocate(950).unwrap();

    assert_eq!(allocator.usable_size(ptr.as_ptr()), Ok(992));
    assert!(allocator.free_blocks().is_empty());
    allocator.verify().unwrap();
  }

  #[test]
  fn test_smallest_remainder_is_split() {
    let mut allocator = Allocator::default();
    // 992 - 944 = 48 == 16 + 32, exactly one aligned unit remains.
    allocator.allocate(944).unwrap();

    assert_eq!(allocator.free_blocks(), vec![BlockInfo {
      offset: 976,
      size: 16,
      free: true,
    }]);
  }

  #[test]
  fn test_reservation_failure_is_permanent() {
    let mut allocator = Allocator::with_backing(Config::default(), Refusing).unwrap();

    assert_eq!(
      allocator.allocate(16),
      Err(AllocError::ArenaReservationFailed { size: 1024 })
    );
    assert_eq!(
      allocator.allocate(16),
      Err(AllocError::OutOfMemory { requested: 16 })
    );
    assert!(allocator.dump_state().is_empty());
    assert_eq!(allocator.to_string(), "arena reservation failed\n");
  }

  #[test]
  fn test_invalid_size_does_not_reserve() {
    let mut allocator = Allocator::with_backing(Config::default(), Refusing).unwrap();

    assert_eq!(
      allocator.allocate(0),
      Err(AllocError::InvalidSize {
        requested: 0,
        max: 992,
      })
    );
    assert_eq!(
      allocator.allocate(993),
      Err(AllocError::InvalidSize {
        requested: 993,
        max: 992,
      })
    );
    assert!(!allocator.is_reserved());
  }

  #[test]
  fn test_absorbed_block_reports_already_free() {
    let mut allocator = Allocator::default();
    let a = allocator.allocate(32).unwrap();
    let b = allocator.allocate(32).unwrap();

    allocator.release(a.as_ptr()).unwrap();
    // b merges into a on its left and into the tail on its right.
    allocator.release(b.as_ptr()).unwrap();

    assert_eq!(
      allocator.release(b.as_ptr()),
      Err(AllocError::AlreadyFree { offset: 64 })
    );
    assert_eq!(
      allocator.release(a.as_ptr()),
      Err(AllocError::AlreadyFree { offset: 0 })
    );
    assert_eq!(allocator.free_blocks().len(), 1);
    allocator.verify().unwrap();
  }

  #[test]
  fn test_interior_pointer_into_zeroed_payload_is_rejected() {
    let mut allocator = Allocator::default();
    let a1 = allocator.allocate(600).unwrap();
    let blocks = allocator.dump_state();
    let free = allocator.free_blocks();

    // Fresh mmap memory is zeroed, so this reads as a size-0 allocated header.
    let interior = unsafe { a1.as_ptr().add(32) };

    assert_eq!(
      allocator.release(interior),
      Err(AllocError::InvalidHandle { addr: interior as usize })
    );
    assert_eq!(allocator.dump_state(), blocks);
    assert_eq!(allocator.free_blocks(), free);
    assert_eq!(allocator.verify(), Ok(()));
  }

  #[test]
  fn test_misaligned_interior_pointer_is_rejected() {
    let mut allocator = Allocator::default();
    let a1 = allocator.allocate(600).unwrap();
    let interior = unsafe { a1.as_ptr().add(40) };
    let header = offset_of(&allocator, a1) + 40;

    // Forge a consistent-looking 16-byte block off the alignment grid.
    let HeapState::Ready(heap) = &mut allocator.state else {
      unreachable!();
    };
    block::write(&mut heap.arena, header, 16, State::Allocated);

    assert!(matches!(
      allocator.release(interior),
      Err(AllocError::InvalidHandle { .. })
    ));
    assert_eq!(allocator.free_blocks().len(), 1);
  }

  #[test]
  fn test_default_matches_validated_config() {
    let allocator = Allocator::default();

    assert_eq!(allocator.config(), &Config::default());
    assert!(allocator.config().validate().is_ok());
  }

  #[test]
  fn test_release_before_reservation() {
    let mut allocator = Allocator::default();
    let mut byte = 0u8;

    assert!(matches!(
      allocator.release(&mut byte),
      Err(AllocError::InvalidHandle { .. })
    ));
  }

  #[test]
  fn test_verify_detects_tag_mismatch() {
    let mut allocator = Allocator::new(Config::new(SearchMode::BestFit)).unwrap();
    allocator.allocate(64).unwrap();

    let HeapState::Ready(heap) = &mut allocator.state else {
      unreachable!();
    };
    heap.arena.write_u32(block::tag_offset(0, 64), 48);

    assert_eq!(
      allocator.verify(),
      Err(AllocError::Corrupted {
        offset: 0,
        reason: "header and boundary tag disagree",
      })
    );
  }

  #[test]
  fn test_display() {
    let mut allocator = Allocator::default();
    assert_eq!(allocator.to_string(), "arena not reserved\n");

    allocator.allocate(600).unwrap();

    assert_eq!(
      allocator.to_string(),
      "Blocks (1 free listed):\n  offset =      0, size =    608, allocated\n  offset =    640, size =    352, free\n"
    );
  }

  #[test]
  fn test_stats() {
    let mut allocator = Allocator::default();
    allocator.allocate(600).unwrap();
    allocator.allocate(30).unwrap();

    assert_eq!(allocator.stats(), Stats {
      arena_size: 1024,
      allocated_bytes: 640,
      free_bytes: 288,
      allocated_blocks: 2,
      free_blocks: 1,
      largest_free: 288,
    });
  }
}
