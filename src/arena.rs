use std::{ptr::{self, NonNull}, slice};

/// Source of the arena's backing bytes.
///
/// The allocator calls [`reserve`](Backing::reserve) at most once, on its
/// first allocation, and hands the same range back to
/// [`unreserve`](Backing::unreserve) when it is dropped.
pub trait Backing {
  /// Reserves `size` readable and writable bytes, or `None` on failure.
  fn reserve(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>>;

  /// Returns a range obtained from [`reserve`](Backing::reserve).
  ///
  /// # Safety
  ///
  /// `base` and `size` must come from a single successful call to `reserve`
  /// on this backing, and the range must not be used afterwards.
  unsafe fn unreserve(
    &mut self,
    base: NonNull<u8>,
    size: usize,
  );
}

/// Anonymous private `mmap(2)` mapping, released with `munmap(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapBacking;

impl Backing for MmapBacking {
  fn reserve(
    &mut self,
    size: usize,
  ) -> Option<NonNull<u8>> {
    let address = unsafe {
      libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if address == libc::MAP_FAILED {
      return None;
    }

    NonNull::new(address.cast::<u8>())
  }

  unsafe fn unreserve(
    &mut self,
    base: NonNull<u8>,
    size: usize,
  ) {
    unsafe {
      libc::munmap(base.as_ptr().cast(), size);
    }
  }
}

/// The reserved byte range every block lives in.
///
/// Blocks are addressed by their offset from `base`; all reads and writes go
/// through bounds-checked slices so a bad offset panics instead of touching
/// memory outside the mapping.
#[derive(Debug)]
pub(crate) struct Arena {
  base: NonNull<u8>,
  size: usize,
}

impl Arena {
  /// # Safety
  ///
  /// `base` must point to `size` bytes that stay valid and unaliased by
  /// references for as long as the arena exists.
  pub(crate) unsafe fn from_raw(
    base: NonNull<u8>,
    size: usize,
  ) -> Self {
    Self { base, size }
  }

  pub(crate) fn base(&self) -> NonNull<u8> {
    self.base
  }

  pub(crate) fn size(&self) -> usize {
    self.size
  }

  fn bytes(&self) -> &[u8] {
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.size) }
  }

  fn bytes_mut(&mut self) -> &mut [u8] {
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.size) }
  }

  pub(crate) fn read_u32(
    &self,
    offset: usize,
  ) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&self.bytes()[offset..offset + 4]);
    u32::from_ne_bytes(word)
  }

  pub(crate) fn write_u32(
    &mut self,
    offset: usize,
    value: u32,
  ) {
    self.bytes_mut()[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
  }

  /// Address of the byte at `offset`.
  pub(crate) fn address_of(
    &self,
    offset: usize,
  ) -> NonNull<u8> {
    debug_assert!(offset < self.size);
    unsafe { self.base.add(offset) }
  }

  /// Offset of `address` from the base, if it lies inside the arena.
  pub(crate) fn offset_of(
    &self,
    address: *const u8,
  ) -> Option<usize> {
    let base = self.base.as_ptr() as usize;
    let address = address as usize;

    if address < base || address >= base + self.size {
      return None;
    }

    Some(address - base)
  }
}
