use thiserror::Error;

/// Everything that can go wrong while allocating or releasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AllocError {
  /// Zero-sized request, or larger than the arena could ever hold.
  #[error("invalid allocation size {requested} (maximum payload is {max})")]
  InvalidSize { requested: usize, max: usize },

  /// No free block is large enough right now.
  #[error("out of memory: no free block can hold {requested} bytes")]
  OutOfMemory { requested: usize },

  /// The one-time reservation of the arena failed. Not retried.
  #[error("failed to reserve a {size}-byte arena")]
  ArenaReservationFailed { size: usize },

  /// `release` was handed a null pointer. Nothing was changed.
  #[error("release called with a null pointer")]
  NullHandle,

  /// The block was released before (possibly merged into a neighbour since).
  #[error("block at offset {offset} is already free")]
  AlreadyFree { offset: usize },

  /// The pointer does not point at the payload of a live block.
  #[error("pointer {addr:#x} does not reference a block of this arena")]
  InvalidHandle { addr: usize },

  #[error("invalid configuration: {0}")]
  InvalidConfig(&'static str),

  /// [`Allocator::verify`](crate::Allocator::verify) found a broken invariant.
  #[error("heap corrupted at offset {offset}: {reason}")]
  Corrupted { offset: usize, reason: &'static str },
}
