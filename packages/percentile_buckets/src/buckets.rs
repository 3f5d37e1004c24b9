//! The fixed bucket layout shared by every recorder, plus the functions that map values
//! into it and bucket counts back out of it.
//!
//! The layout is log-linear. Values `0..=7` each get a bucket of their own. Above that, every
//! power-of-two band `[2^e, 2^(e+1))` is split into 8 equally wide buckets. This bounds the
//! width of any bucket to 1/8 of its lower edge, so the relative quantization error of an
//! estimate never exceeds 12.5%, while the whole non-negative `i64` range fits into
//! [`BUCKET_COUNT`] buckets.

use crate::{Error, Magnitude, Result};

/// Number of bits of a value (after its highest set bit) that select the linear sub-bucket.
const SUB_BUCKET_BITS: u32 = 3;

/// Number of linear sub-buckets per power-of-two band. Also the size of the exact region
/// at the bottom of the range, where every value has a bucket of its own.
const SUB_BUCKETS: usize = 1 << SUB_BUCKET_BITS;

/// Number of power-of-two bands above the exact region, up to and including the band that
/// contains `Magnitude::MAX`.
const BANDS: usize = (Magnitude::BITS - 1 - SUB_BUCKET_BITS) as usize;

/// Total number of buckets in the layout.
///
/// Every recorder keeps exactly this many counters and every counts array handed to
/// [`percentile()`] must have exactly this length.
pub const BUCKET_COUNT: usize = SUB_BUCKETS + BANDS * SUB_BUCKETS;

const LAST_INDEX: usize = BUCKET_COUNT - 1;

/// Inclusive upper bounds of all buckets, ascending. Computed at compile time.
static BUCKET_BOUNDS: [Magnitude; BUCKET_COUNT] = generate_bucket_bounds();

#[expect(
    clippy::indexing_slicing,
    reason = "loop is bounded by the array length"
)]
#[expect(
    clippy::arithmetic_side_effects,
    reason = "loop counter stays below BUCKET_COUNT"
)]
const fn generate_bucket_bounds() -> [Magnitude; BUCKET_COUNT] {
    let mut bounds = [0; BUCKET_COUNT];

    let mut index = 0;
    while index < BUCKET_COUNT {
        bounds[index] = upper_bound_of(index);
        index += 1;
    }

    bounds
}

#[expect(
    clippy::arithmetic_side_effects,
    reason = "index < BUCKET_COUNT keeps every intermediate value in range, the largest being 2^63"
)]
#[expect(
    clippy::integer_division,
    clippy::modulo_arithmetic,
    reason = "splitting an index into band and sub-bucket is exactly what we want"
)]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    reason = "all values fit - the largest bound is Magnitude::MAX"
)]
const fn upper_bound_of(index: usize) -> Magnitude {
    if index < SUB_BUCKETS {
        return index as Magnitude;
    }

    let band = (index - SUB_BUCKETS) / SUB_BUCKETS;
    let sub_bucket = (index - SUB_BUCKETS) % SUB_BUCKETS;

    // The next bucket starts at (SUB_BUCKETS + sub_bucket + 1) << band.
    let next_start = ((SUB_BUCKETS + sub_bucket + 1) as u64) << band;

    (next_start - 1) as Magnitude
}

/// The inclusive upper bounds of all buckets, in ascending order.
///
/// The first bound is 0 and the last is `Magnitude::MAX`.
#[must_use]
pub fn bucket_bounds() -> &'static [Magnitude] {
    &BUCKET_BOUNDS
}

/// The inclusive upper bound of the bucket at `index`, or `None` if there is no such bucket.
#[must_use]
pub fn bucket_bound(index: usize) -> Option<Magnitude> {
    BUCKET_BOUNDS.get(index).copied()
}

/// Identifies the bucket that a value is counted in.
///
/// Returns the smallest index `i` for which `value <= bucket_bound(i)`. The lookup takes
/// constant time: the position of the highest set bit selects the power-of-two band and the
/// following three bits select the sub-bucket within it.
///
/// Negative values are not valid observations. If one is passed anyway, it is clamped into the
/// first bucket.
///
/// # Example
///
/// ```
/// use percentile_buckets::{bucket_bound, index_of};
///
/// let index = index_of(1000);
/// assert!(1000 <= bucket_bound(index).unwrap());
/// assert!(1000 > bucket_bound(index - 1).unwrap());
/// ```
#[must_use]
#[inline]
#[expect(
    clippy::cast_possible_truncation,
    reason = "both casts to usize happen on values below 2 * SUB_BUCKETS"
)]
pub fn index_of(value: Magnitude) -> usize {
    let Ok(value) = u64::try_from(value) else {
        return 0;
    };

    if value < SUB_BUCKETS as u64 {
        return value as usize;
    }

    // value >= 8, so the highest set bit is at position 3..=62 and the shift is 0..=59.
    let highest_bit = (u64::BITS - 1).wrapping_sub(value.leading_zeros());
    let shift = highest_bit.wrapping_sub(SUB_BUCKET_BITS);

    // The top SUB_BUCKET_BITS + 1 bits of the value, i.e. 8..=15.
    let top_bits = (value >> shift) as usize;
    let sub_bucket = top_bits.wrapping_sub(SUB_BUCKETS);

    let index = SUB_BUCKETS
        .wrapping_add((shift as usize).wrapping_mul(SUB_BUCKETS))
        .wrapping_add(sub_bucket);

    // Cannot exceed the last bucket for an i64 input but we never index out of bounds.
    index.min(LAST_INDEX)
}

/// The inclusive upper bound of the bucket that a value is counted in.
///
/// This is the value a percentile estimate collapses to when nothing is known about how
/// observations are spread within the bucket.
#[must_use]
pub fn bucket_of(value: Magnitude) -> Magnitude {
    // index_of() is always in range.
    BUCKET_BOUNDS.get(index_of(value)).copied().unwrap_or(Magnitude::MAX)
}

/// Estimates the value at percentile `percentile` of the distribution described by `counts`.
///
/// `counts` holds one count per bucket, in bucket order, and must have exactly
/// [`BUCKET_COUNT`] entries. It may come from a single recorder or be the element-wise sum of
/// counts from several recorders (e.g. different tag dimensions or different processes).
///
/// The estimate is linearly interpolated between the bounds of the bucket that contains the
/// target rank. If there are no observations at all, the estimate is 0.
///
/// # Errors
///
/// Returns [`Error::InvalidPercentile`] if `percentile` is NaN or outside `0.0..=100.0`.
///
/// Returns [`Error::BucketCountMismatch`] if `counts` does not have [`BUCKET_COUNT`] entries.
///
/// # Example
///
/// ```
/// use percentile_buckets::{BUCKET_COUNT, index_of, percentile};
///
/// let mut counts = vec![0_u64; BUCKET_COUNT];
/// counts[index_of(100)] += 90;
/// counts[index_of(5000)] += 10;
///
/// let median = percentile(&counts, 50.0).unwrap();
/// assert!((96.0..=103.0).contains(&median));
/// ```
pub fn percentile(counts: &[u64], percentile: f64) -> Result<f64> {
    validate_counts(counts)?;
    validate_percentile(percentile)?;

    Ok(estimate(counts, total_of(counts), percentile))
}

/// Estimates several percentiles of the distribution described by `counts` at once.
///
/// The results are returned in the same order as `percentiles`. See [`percentile()`] for the
/// meaning of the inputs.
///
/// # Errors
///
/// Returns [`Error::InvalidPercentile`] if any of the percentiles is NaN or outside
/// `0.0..=100.0`. No results are returned in that case.
///
/// Returns [`Error::BucketCountMismatch`] if `counts` does not have [`BUCKET_COUNT`] entries.
pub fn percentiles(counts: &[u64], percentiles: &[f64]) -> Result<Vec<f64>> {
    validate_counts(counts)?;

    for &percentile in percentiles {
        validate_percentile(percentile)?;
    }

    let total = total_of(counts);

    Ok(percentiles
        .iter()
        .map(|&percentile| estimate(counts, total, percentile))
        .collect())
}

fn validate_counts(counts: &[u64]) -> Result<()> {
    if counts.len() == BUCKET_COUNT {
        Ok(())
    } else {
        Err(Error::BucketCountMismatch {
            expected: BUCKET_COUNT,
            actual: counts.len(),
        })
    }
}

fn validate_percentile(percentile: f64) -> Result<()> {
    if (0.0..=100.0).contains(&percentile) {
        Ok(())
    } else {
        Err(Error::InvalidPercentile { percentile })
    }
}

fn total_of(counts: &[u64]) -> u64 {
    counts.iter().fold(0_u64, |total, &count| total.wrapping_add(count))
}

#[expect(
    clippy::cast_precision_loss,
    reason = "estimates are approximate by definition, f64 is plenty"
)]
fn estimate(counts: &[u64], total: u64, percentile: f64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    let rank = percentile / 100.0 * total as f64;

    let mut cumulative = 0_u64;
    let mut lower = 0;
    let mut last_upper = 0;

    for (&count, &upper) in counts.iter().zip(BUCKET_BOUNDS.iter()) {
        if count != 0 {
            let next = cumulative.wrapping_add(count);

            if next as f64 >= rank {
                let fraction = ((rank - cumulative as f64) / count as f64).clamp(0.0, 1.0);
                let width = upper as f64 - lower as f64;

                return fraction.mul_add(width, lower as f64);
            }

            cumulative = next;
            last_upper = upper;
        }

        lower = upper;
    }

    // Only reachable if floating point rounding pushed the rank past the last populated bucket.
    last_upper as f64
}
