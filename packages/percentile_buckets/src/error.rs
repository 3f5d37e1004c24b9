use thiserror::Error;

/// Errors that can occur when estimating percentiles from bucket counts.
///
/// Recording observations never fails. Only queries can be rejected, and only when the caller
/// violates the query contract.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller asked for a percentile outside the `0.0..=100.0` range (or for NaN).
    #[error("invalid percentile {percentile}: must be in the range 0.0..=100.0")]
    InvalidPercentile {
        /// The rejected percentile, as provided by the caller.
        percentile: f64,
    },

    /// The caller provided a counts array that does not match the bucket layout.
    #[error("expected {expected} bucket counts but got {actual}")]
    BucketCountMismatch {
        /// The number of buckets in the layout.
        expected: usize,

        /// The number of counts the caller provided.
        actual: usize,
    },
}

/// A specialized `Result` type for percentile operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
