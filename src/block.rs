//! In-band block layout.
//!
//! ```text
//!   offset                 offset + 16                  offset + 16 + size
//!   ┌──────┬──────┬──────┬──────┬─────────────────────────┬──────┬──────┬──────┐
//!   │ size │state │ next │ prev │         payload         │ size │state │ pad  │
//!   └──────┴──────┴──────┴──────┴─────────────────────────┴──────┴──────┴──────┘
//!   └────────── header ─────────┘                         └──────── tag ───────┘
//! ```
//!
//! `next`/`prev` are free-list links and only mean something while the block
//! is free. The tag duplicates `size`/`state` so the block to the left of any
//! header can be found by reading the 16 bytes right before it. The tag is
//! padded so a block costs 32 bytes of overhead, which keeps every block
//! boundary on a multiple of the alignment.

use crate::arena::Arena;

pub(crate) const HEADER_SIZE: usize = 16;
pub(crate) const TAG_SIZE: usize = 16;
/// Bytes a block costs on top of its payload.
pub(crate) const OVERHEAD: usize = HEADER_SIZE + TAG_SIZE;

/// Absent free-list link.
pub(crate) const NIL: u32 = u32::MAX;

const SIZE_FIELD: usize = 0;
const STATE_FIELD: usize = 4;
const NEXT_FIELD: usize = 8;
const PREV_FIELD: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub(crate) enum State {
  Allocated = 0,
  Free = 1,
  /// Interior header or tag left behind when a neighbour swallowed it.
  Absorbed = 2,
}

impl State {
  fn from_raw(raw: u32) -> Option<Self> {
    match raw {
      0 => Some(Self::Allocated),
      1 => Some(Self::Free),
      2 => Some(Self::Absorbed),
      _ => None,
    }
  }
}

/// Size and state as recorded in a header or a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Info {
  pub size: usize,
  pub state: Option<State>,
}

impl Info {
  pub fn is_free(&self) -> bool {
    self.state == Some(State::Free)
  }
}

/// A block as reported to callers of [`Allocator::dump_state`].
///
/// [`Allocator::dump_state`]: crate::Allocator::dump_state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockInfo {
  /// Position of the header from the arena base.
  pub offset: usize,
  /// Payload capacity, excluding header and tag.
  pub size: usize,
  pub free: bool,
}

pub(crate) fn payload_offset(offset: usize) -> usize {
  offset + HEADER_SIZE
}

pub(crate) fn tag_offset(
  offset: usize,
  size: usize,
) -> usize {
  offset + HEADER_SIZE + size
}

/// One past the last byte of the block.
pub(crate) fn end_offset(
  offset: usize,
  size: usize,
) -> usize {
  offset + OVERHEAD + size
}

pub(crate) fn header(
  arena: &Arena,
  offset: usize,
) -> Info {
  Info {
    size: arena.read_u32(offset + SIZE_FIELD) as usize,
    state: State::from_raw(arena.read_u32(offset + STATE_FIELD)),
  }
}

pub(crate) fn tag(
  arena: &Arena,
  tag_offset: usize,
) -> Info {
  Info {
    size: arena.read_u32(tag_offset + SIZE_FIELD) as usize,
    state: State::from_raw(arena.read_u32(tag_offset + STATE_FIELD)),
  }
}

/// Writes `size`/`state` to both the header and the matching tag.
pub(crate) fn write(
  arena: &mut Arena,
  offset: usize,
  size: usize,
  state: State,
) {
  let tag = tag_offset(offset, size);

  arena.write_u32(offset + SIZE_FIELD, size as u32);
  arena.write_u32(offset + STATE_FIELD, state as u32);
  arena.write_u32(tag + SIZE_FIELD, size as u32);
  arena.write_u32(tag + STATE_FIELD, state as u32);
}

/// Marks the header at `offset` as swallowed by a neighbour.
pub(crate) fn stamp_absorbed_header(
  arena: &mut Arena,
  offset: usize,
) {
  arena.write_u32(offset + STATE_FIELD, State::Absorbed as u32);
}

/// Marks the tag at `tag_offset` as swallowed by a neighbour.
pub(crate) fn stamp_absorbed_tag(
  arena: &mut Arena,
  tag_offset: usize,
) {
  arena.write_u32(tag_offset + STATE_FIELD, State::Absorbed as u32);
}

/// Header offset of the block right after this one, `None` for the last.
pub(crate) fn next_block_offset(
  arena: &Arena,
  offset: usize,
) -> Option<usize> {
  let end = end_offset(offset, header(arena, offset).size);

  if end + OVERHEAD > arena.size() {
    return None;
  }

  Some(end)
}

/// Header offset of the block right before `offset`, found through the tag
/// that ends just before it. `None` for the first block or a tag that would
/// point before the arena base.
pub(crate) fn previous_block_offset(
  arena: &Arena,
  offset: usize,
) -> Option<usize> {
  if offset < OVERHEAD {
    return None;
  }

  let size = tag(arena, offset - TAG_SIZE).size;

  offset.checked_sub(OVERHEAD + size)
}

fn link(raw: u32) -> Option<usize> {
  (raw != NIL).then_some(raw as usize)
}

fn raw_link(link: Option<usize>) -> u32 {
  link.map_or(NIL, |offset| offset as u32)
}

pub(crate) fn next_free(
  arena: &Arena,
  offset: usize,
) -> Option<usize> {
  link(arena.read_u32(offset + NEXT_FIELD))
}

pub(crate) fn prev_free(
  arena: &Arena,
  offset: usize,
) -> Option<usize> {
  link(arena.read_u32(offset + PREV_FIELD))
}

pub(crate) fn set_next_free(
  arena: &mut Arena,
  offset: usize,
  next: Option<usize>,
) {
  arena.write_u32(offset + NEXT_FIELD, raw_link(next));
}

pub(crate) fn set_prev_free(
  arena: &mut Arena,
  offset: usize,
  prev: Option<usize>,
) {
  arena.write_u32(offset + PREV_FIELD, raw_link(prev));
}
