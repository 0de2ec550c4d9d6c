use crate::{
  block::OVERHEAD,
  error::AllocError,
  strategy::SearchMode,
};

/// Arena size used when none is configured.
pub const DEFAULT_ARENA_SIZE: usize = 1024;
/// Rounding granularity used when none is configured.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Construction-time settings of an [`Allocator`](crate::Allocator).
///
/// Fixed for the allocator's whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  pub search_mode: SearchMode,
  /// Bytes reserved for the arena, headers and tags included.
  pub arena_size: usize,
  /// Every payload size is rounded up to a multiple of this.
  pub alignment: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      search_mode: SearchMode::default(),
      arena_size: DEFAULT_ARENA_SIZE,
      alignment: DEFAULT_ALIGNMENT,
    }
  }
}

impl Config {
  pub fn new(search_mode: SearchMode) -> Self {
    Self {
      search_mode,
      ..Self::default()
    }
  }

  pub fn with_arena_size(
    mut self,
    arena_size: usize,
  ) -> Self {
    self.arena_size = arena_size;
    self
  }

  pub fn with_alignment(
    mut self,
    alignment: usize,
  ) -> Self {
    self.alignment = alignment;
    self
  }

  pub fn validate(&self) -> Result<(), AllocError> {
    if self.alignment == 0 || !self.alignment.is_power_of_two() {
      return Err(AllocError::InvalidConfig("alignment must be a non-zero power of two"));
    }

    // Block overhead must itself be aligned or free sizes drift off the grid.
    if OVERHEAD % self.alignment != 0 {
      return Err(AllocError::InvalidConfig("alignment larger than the block overhead"));
    }

    if self.arena_size % self.alignment != 0 {
      return Err(AllocError::InvalidConfig("arena size must be a multiple of the alignment"));
    }

    if self.arena_size < OVERHEAD + self.alignment {
      return Err(AllocError::InvalidConfig("arena cannot hold a single aligned block"));
    }

    // Sizes and links are stored as u32 words inside the arena.
    if self.arena_size > u32::MAX as usize {
      return Err(AllocError::InvalidConfig("arena larger than 4 GiB"));
    }

    Ok(())
  }

  /// Largest payload the arena could ever hand out.
  pub fn max_payload(&self) -> usize {
    self.arena_size - OVERHEAD
  }

  /// Smallest remainder worth splitting off as a free block of its own.
  pub(crate) fn min_free_block(&self) -> usize {
    self.alignment + OVERHEAD
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = Config::default();

    assert_eq!(config.search_mode, SearchMode::FirstFit);
    assert_eq!(config.max_payload(), 992);
    assert_eq!(config.min_free_block(), 48);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_builders() {
    let config = Config::new(SearchMode::WorstFit)
      .with_arena_size(4096)
      .with_alignment(32);

    assert_eq!(config.search_mode, SearchMode::WorstFit);
    assert_eq!(config.arena_size, 4096);
    assert_eq!(config.alignment, 32);
  }

  #[test]
  fn test_rejects_bad_alignment() {
    for alignment in [0, 3, 24, 64] {
      let config = Config::default().with_alignment(alignment);
      assert!(matches!(config.validate(), Err(AllocError::InvalidConfig(_))));
    }
  }

  #[test]
  fn test_rejects_tiny_arena() {
    let config = Config::default().with_arena_size(OVERHEAD);
    assert!(matches!(config.validate(), Err(AllocError::InvalidConfig(_))));

    let config = Config::default().with_arena_size(1000);
    assert!(matches!(config.validate(), Err(AllocError::InvalidConfig(_))));

    let config = Config::default().with_arena_size(OVERHEAD + 16);
    assert!(config.validate().is_ok());
  }
}
