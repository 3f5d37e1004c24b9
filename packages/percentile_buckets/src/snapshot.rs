use std::cmp;
use std::fmt::{self, Display, Write};
use std::num::NonZero;

use new_zealand::nz;

use crate::{BUCKET_COUNT, Error, Magnitude, Result, bucket_bounds, buckets};

/// A point in time copy of the per-bucket counts of one or more recorders.
///
/// Snapshots taken from different recorders (e.g. the same metric with different tags, or
/// the same metric in different processes) can be combined via
/// [`merge_from()`][Self::merge_from] before estimating percentiles over the combined data.
///
/// For human-readable output, use the `Display` trait implementation, which renders the
/// populated buckets as a histogram.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BucketCounts {
    // Always BUCKET_COUNT entries.
    counts: Box<[u64]>,
}

impl BucketCounts {
    /// Creates a snapshot in which every bucket is empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counts: vec![0; BUCKET_COUNT].into_boxed_slice(),
        }
    }

    /// Creates a snapshot from counts obtained elsewhere, e.g. received from another process.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BucketCountMismatch`] if `counts` does not have
    /// [`BUCKET_COUNT`] entries.
    pub fn from_counts(counts: Vec<u64>) -> Result<Self> {
        if counts.len() != BUCKET_COUNT {
            return Err(Error::BucketCountMismatch {
                expected: BUCKET_COUNT,
                actual: counts.len(),
            });
        }

        Ok(Self {
            counts: counts.into_boxed_slice(),
        })
    }

    pub(crate) fn from_iter_exact(counts: impl Iterator<Item = u64>) -> Self {
        let counts = counts.collect::<Vec<_>>().into_boxed_slice();

        // Important type invariant - callers provide exactly one count per bucket.
        debug_assert_eq!(counts.len(), BUCKET_COUNT);

        Self { counts }
    }

    /// The count of each bucket, in bucket order.
    #[must_use]
    pub fn as_slice(&self) -> &[u64] {
        &self.counts
    }

    /// Total number of observations across all buckets.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts
            .iter()
            .fold(0_u64, |total, &count| total.wrapping_add(count))
    }

    /// Merges another snapshot into this one, combining their data set.
    ///
    /// Merging is element-wise addition, so the order in which snapshots are merged does
    /// not affect the result.
    pub fn merge_from(&mut self, other: &Self) {
        for (target, &other_count) in self.counts.iter_mut().zip(other.counts.iter()) {
            *target = target.wrapping_add(other_count);
        }
    }

    /// Estimates the value at the given percentile. See [`percentile()`][crate::percentile].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPercentile`] if `percentile` is NaN or outside `0.0..=100.0`.
    pub fn percentile(&self, percentile: f64) -> Result<f64> {
        buckets::percentile(&self.counts, percentile)
    }

    /// Estimates the values at several percentiles. See [`percentiles()`][crate::percentiles].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPercentile`] if any percentile is NaN or outside `0.0..=100.0`.
    pub fn percentiles(&self, percentiles: &[f64]) -> Result<Vec<f64>> {
        buckets::percentiles(&self.counts, percentiles)
    }

    /// Iterates over all buckets as `(upper_bound, count)` pairs, in ascending order.
    ///
    /// Each bucket counts the observations that are less than or equal to its upper bound
    /// and greater than the upper bound of the previous bucket.
    pub fn buckets(&self) -> impl Iterator<Item = (Magnitude, u64)> {
        bucket_bounds().iter().copied().zip(self.counts.iter().copied())
    }

    /// Iterates over the buckets that have at least one observation, as
    /// `(upper_bound, count)` pairs, in ascending order.
    pub fn non_empty_buckets(&self) -> impl Iterator<Item = (Magnitude, u64)> {
        self.buckets().filter(|&(_, count)| count != 0)
    }
}

impl Default for BucketCounts {
    fn default() -> Self {
        Self::new()
    }
}

/// We auto-scale histogram bars when rendering. This is the number of characters
/// that we use to represent the largest bucket.
///
/// Bars may be shorter because one character never represents less than one observation.
/// Due to aliasing (at least 1 observation per character) they may also be somewhat longer.
const HISTOGRAM_BAR_WIDTH_CHARS: u64 = 50;

/// Pre-allocated string of histogram bar characters to avoid allocation during rendering.
const HISTOGRAM_BAR_CHARS: &str =
    "∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎∎";

/// The '∎' character is U+220E which encodes to 3 bytes in UTF-8.
const BYTES_PER_HISTOGRAM_BAR_CHAR: NonZero<usize> = nz!(3);

impl Display for BucketCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets = self.non_empty_buckets().collect::<Vec<_>>();

        if buckets.is_empty() {
            return writeln!(f, "(no observations)");
        }

        let mut count_str = String::new();
        let mut upper_bound_str = String::new();

        // Widest strings decide the padding of every line.
        let mut widest_count = 0;
        let mut widest_upper_bound = 0;

        for &(upper_bound, count) in &buckets {
            count_str.clear();
            upper_bound_str.clear();
            write!(&mut count_str, "{count}")?;
            write!(&mut upper_bound_str, "{upper_bound}")?;

            widest_count = cmp::max(widest_count, count_str.len());
            widest_upper_bound = cmp::max(widest_upper_bound, upper_bound_str.len());
        }

        let scale = HistogramScale::new(buckets.iter().map(|&(_, count)| count));

        for (upper_bound, count) in buckets {
            write!(
                f,
                "value <= {upper_bound:>widest_upper_bound$} [ {count:>widest_count$} ]: "
            )?;
            scale.write_bar(count, f)?;
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Auto-scaling of the histogram bars, identifying the step size for rendering.
#[derive(Debug)]
struct HistogramScale {
    /// The number of observations that each character in the bar represents.
    count_per_char: NonZero<u64>,
}

impl HistogramScale {
    fn new(counts: impl Iterator<Item = u64>) -> Self {
        let max_count = counts.max().unwrap_or_default();

        #[expect(
            clippy::integer_division,
            reason = "we accept the loss of precision - the bar may under- or overshoot the desired width"
        )]
        let count_per_char = NonZero::new(cmp::max(max_count / HISTOGRAM_BAR_WIDTH_CHARS, 1))
            .unwrap_or(nz!(1));

        Self { count_per_char }
    }

    fn write_bar(&self, count: u64, f: &mut impl Write) -> fmt::Result {
        let chars = count
            .checked_div(self.count_per_char.get())
            .unwrap_or_default();
        let mut remaining = usize::try_from(chars).unwrap_or(usize::MAX);

        let chars_in_constant = HISTOGRAM_BAR_CHARS
            .len()
            .checked_div(BYTES_PER_HISTOGRAM_BAR_CHAR.get())
            .unwrap_or_default();

        while remaining > 0 {
            let chunk_chars = remaining.min(chars_in_constant);

            let byte_end = chunk_chars
                .checked_mul(BYTES_PER_HISTOGRAM_BAR_CHAR.get())
                .unwrap_or_default();

            f.write_str(HISTOGRAM_BAR_CHARS.get(..byte_end).unwrap_or_default())?;

            remaining = remaining.saturating_sub(chunk_chars);
        }

        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    #![allow(clippy::indexing_slicing, reason = "panic is fine in tests")]
    #![allow(clippy::float_cmp, reason = "exact comparisons are intended")]

    use std::iter;

    use static_assertions::assert_impl_all;

    use super::*;
    use crate::index_of;

    assert_impl_all!(BucketCounts: Send, Sync, Clone);

    fn snapshot_with(observations: &[(Magnitude, u64)]) -> BucketCounts {
        let mut counts = vec![0; BUCKET_COUNT];

        for &(value, count) in observations {
            counts[index_of(value)] += count;
        }

        BucketCounts::from_counts(counts).unwrap()
    }

    #[test]
    fn new_is_empty() {
        let snapshot = BucketCounts::new();

        assert_eq!(snapshot.as_slice().len(), BUCKET_COUNT);
        assert_eq!(snapshot.total(), 0);
        assert_eq!(snapshot.non_empty_buckets().count(), 0);
        assert_eq!(snapshot.percentile(50.0).unwrap(), 0.0);
        assert_eq!(snapshot, BucketCounts::default());
    }

    #[test]
    fn from_counts_validates_length() {
        assert!(matches!(
            BucketCounts::from_counts(vec![1, 2, 3]),
            Err(Error::BucketCountMismatch {
                expected: BUCKET_COUNT,
                actual: 3
            })
        ));

        BucketCounts::from_counts(vec![0; BUCKET_COUNT]).unwrap();
    }

    #[test]
    fn buckets_pair_bounds_with_counts() {
        let snapshot = snapshot_with(&[(0, 2), (9, 1), (100, 4)]);

        let buckets = snapshot.buckets().collect::<Vec<_>>();
        assert_eq!(buckets.len(), BUCKET_COUNT);
        assert_eq!(buckets[0], (0, 2));
        assert_eq!(buckets[index_of(9)], (9, 1));

        assert_eq!(
            snapshot.non_empty_buckets().collect::<Vec<_>>(),
            vec![(0, 2), (9, 1), (103, 4)]
        );
        assert_eq!(snapshot.total(), 7);
    }

    #[test]
    fn merge_is_element_wise_sum() {
        let mut first = snapshot_with(&[(1, 3), (1000, 2)]);
        let second = snapshot_with(&[(1000, 5), (1 << 20, 1)]);

        first.merge_from(&second);

        assert_eq!(first, snapshot_with(&[(1, 3), (1000, 7), (1 << 20, 1)]));
    }

    #[test]
    fn merge_is_commutative() {
        let a = snapshot_with(&[(5, 1), (70, 9)]);
        let b = snapshot_with(&[(70, 2), (123_456, 3)]);

        let mut ab = a.clone();
        ab.merge_from(&b);

        let mut ba = b.clone();
        ba.merge_from(&a);

        assert_eq!(ab, ba);

        for p in [0.0, 25.0, 50.0, 75.0, 100.0] {
            assert_eq!(ab.percentile(p).unwrap(), ba.percentile(p).unwrap());
        }
    }

    #[test]
    fn percentiles_delegate_to_bucket_scheme() {
        let snapshot = snapshot_with(&[(10, 50), (10_000, 50)]);

        assert_eq!(
            snapshot.percentile(90.0).unwrap(),
            crate::percentile(snapshot.as_slice(), 90.0).unwrap()
        );
        assert_eq!(
            snapshot.percentiles(&[10.0, 90.0]).unwrap(),
            crate::percentiles(snapshot.as_slice(), &[10.0, 90.0]).unwrap()
        );

        assert!(snapshot.percentile(-1.0).is_err());
    }

    #[test]
    fn display_lists_populated_buckets() {
        let snapshot = snapshot_with(&[(0, 666_666), (9, 5), (100, 2)]);

        let output = snapshot.to_string();
        println!("{output}");

        assert!(output.contains("value <=   0 [ 666666 ]: "));
        assert!(output.contains("value <=   9 [      5 ]: "));
        assert!(output.contains("value <= 103 [      2 ]: "));
        assert_eq!(output.lines().count(), 3);

        // Recall that String::len() counts bytes and each bar character is 3 bytes.
        #[expect(clippy::cast_possible_truncation, reason = "safe range, tiny values")]
        let max_acceptable_line_length = (HISTOGRAM_BAR_WIDTH_CHARS * 5) as usize;

        for line in output.lines() {
            assert!(
                line.len() < max_acceptable_line_length,
                "line is too long: {line}"
            );
        }
    }

    #[test]
    fn display_of_empty_snapshot() {
        assert_eq!(BucketCounts::new().to_string(), "(no observations)\n");
    }

    #[test]
    fn histogram_scale_small() {
        // Small counts do not reach the full bar width.
        let scale = HistogramScale::new([1, 2, 3].into_iter());

        let mut output = String::new();

        scale.write_bar(0, &mut output).unwrap();
        assert_eq!(output, "");
        output.clear();

        scale.write_bar(1, &mut output).unwrap();
        assert_eq!(output, "∎");
        output.clear();

        scale.write_bar(3, &mut output).unwrap();
        assert_eq!(output, "∎∎∎");
    }

    #[test]
    fn histogram_scale_large_exact() {
        let max = HISTOGRAM_BAR_WIDTH_CHARS * 1000;
        let scale = HistogramScale::new([max, max / 2].into_iter());

        let mut output = String::new();

        scale.write_bar(max, &mut output).unwrap();
        assert_eq!(output.chars().count(), 50);
        output.clear();

        scale.write_bar(max / 2, &mut output).unwrap();
        assert_eq!(output.chars().count(), 25);
    }

    #[test]
    fn histogram_scale_longer_than_constant() {
        // Aliasing can overshoot the bar constant, which must be written in chunks.
        let scale = HistogramScale::new(iter::once(1));

        let mut output = String::new();
        scale.write_bar(250, &mut output).unwrap();

        assert_eq!(output, "∎".repeat(250));
    }

    #[test]
    fn histogram_char_byte_count_is_correct() {
        assert_eq!("∎".len(), BYTES_PER_HISTOGRAM_BAR_CHAR.get());
    }
}
