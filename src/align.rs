/// Rounds `value` up to the next multiple of `align`.
///
/// `align` must be a non-zero power of two; [`Config::validate`] enforces this
/// for every allocator.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align_to;
///
/// assert_eq!(align_to!(600, 16), 608);
/// assert_eq!(align_to!(25, 16), 32);
/// assert_eq!(align_to!(32, 16), 32);
/// ```
///
/// [`Config::validate`]: crate::Config::validate
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

#[cfg(test)]
mod tests {
  #[test]
  fn test_align_to() {
    for align in [1usize, 8, 16, 64] {
      let mut alignments = Vec::new();

      for i in 0..10 {
        let sizes = (align * i + 1)..=(align * (i + 1));

        let expected_alignment = align * (i + 1);

        alignments.push((sizes, expected_alignment));
      }

      for (sizes, expected) in alignments {
        for size in sizes {
          assert_eq!(expected, align_to!(size, align));
        }
      }
    }
  }

  #[test]
  fn test_align_to_keeps_multiples() {
    assert_eq!(align_to!(0usize, 16), 0);
    assert_eq!(align_to!(608usize, 16), 608);
  }
}
