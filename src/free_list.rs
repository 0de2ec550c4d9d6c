use crate::{
  arena::Arena,
  block::{self, BlockInfo},
};

/// Intrusive doubly-linked list of the free blocks.
///
/// The links live in the free blocks' own headers; this struct only keeps the
/// head. Newest entries go first.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
  head: Option<usize>,
  len: usize,
}

impl FreeList {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn len(&self) -> usize {
    self.len
  }

  pub(crate) fn head(&self) -> Option<usize> {
    self.head
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  /// Pushes the block at `offset` to the front.
  pub(crate) fn insert(
    &mut self,
    arena: &mut Arena,
    offset: usize,
  ) {
    block::set_prev_free(arena, offset, None);
    block::set_next_free(arena, offset, self.head);

    if let Some(head) = self.head {
      block::set_prev_free(arena, head, Some(offset));
    }

    self.head = Some(offset);
    self.len += 1;
  }

  /// Splices the block at `offset` out. It must currently be on the list.
  pub(crate) fn remove(
    &mut self,
    arena: &mut Arena,
    offset: usize,
  ) {
    let prev = block::prev_free(arena, offset);
    let next = block::next_free(arena, offset);

    match (prev, next) {
      // sole element
      (None, None) => {
        debug_assert_eq!(self.head, Some(offset));
        self.head = None;
      }
      // head
      (None, Some(next)) => {
        debug_assert_eq!(self.head, Some(offset));
        block::set_prev_free(arena, next, None);
        self.head = Some(next);
      }
      // tail
      (Some(prev), None) => {
        block::set_next_free(arena, prev, None);
      }
      // interior
      (Some(prev), Some(next)) => {
        block::set_next_free(arena, prev, Some(next));
        block::set_prev_free(arena, next, Some(prev));
      }
    }

    block::set_prev_free(arena, offset, None);
    block::set_next_free(arena, offset, None);
    self.len -= 1;
  }

  pub(crate) fn iter<'a>(
    &self,
    arena: &'a Arena,
  ) -> Iter<'a> {
    Iter {
      arena,
      current: self.head,
      remaining: self.len,
    }
  }
}

/// Walks the free list in list order.
///
/// Stops after as many steps as the list claims to hold, so a corrupted
/// cycle cannot make it spin forever.
pub(crate) struct Iter<'a> {
  arena: &'a Arena,
  current: Option<usize>,
  remaining: usize,
}

impl Iterator for Iter<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<Self::Item> {
    if self.remaining == 0 {
      return None;
    }

    let offset = self.current?;
    let info = block::header(self.arena, offset);

    self.current = block::next_free(self.arena, offset);
    self.remaining -= 1;

    Some(BlockInfo {
      offset,
      size: info.size,
      free: info.is_free(),
    })
  }
}
