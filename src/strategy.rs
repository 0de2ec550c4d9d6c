use crate::block::BlockInfo;

/// Which free block an allocation is carved from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchMode {
  /// First block in free-list order (most recently freed first) that fits.
  #[default]
  FirstFit,
  /// Smallest block that fits; the earliest one wins a tie.
  BestFit,
  /// Largest block that fits; the earliest one wins a tie.
  WorstFit,
}

impl SearchMode {
  /// Picks a block of at least `size` payload bytes out of `candidates`,
  /// returning its header offset.
  pub(crate) fn find(
    self,
    candidates: impl Iterator<Item = BlockInfo>,
    size: usize,
  ) -> Option<usize> {
    let search = match self {
      Self::FirstFit => first_fit,
      Self::BestFit => best_fit,
      Self::WorstFit => worst_fit,
    };

    search(&mut candidates.filter(|block| block.size >= size))
  }
}

type Fitting<'a> = &'a mut dyn Iterator<Item = BlockInfo>;

fn first_fit(fitting: Fitting<'_>) -> Option<usize> {
  fitting.next().map(|block| block.offset)
}

fn best_fit(fitting: Fitting<'_>) -> Option<usize> {
  let mut best: Option<BlockInfo> = None;

  for block in fitting {
    if best.is_none_or(|current| block.size < current.size) {
      best = Some(block);
    }
  }

  best.map(|block| block.offset)
}

fn worst_fit(fitting: Fitting<'_>) -> Option<usize> {
  let mut worst: Option<BlockInfo> = None;

  for block in fitting {
    if worst.is_none_or(|current| block.size > current.size) {
      worst = Some(block);
    }
  }

  worst.map(|block| block.offset)
}
