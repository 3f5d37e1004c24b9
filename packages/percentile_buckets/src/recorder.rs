use std::fmt::{self, Debug};
use std::num::NonZero;
use std::sync::Arc;

use crate::{
    AtomicCounter, AtomicSummary, BUCKET_COUNT, BucketCounts, Counter, DistributionSummary,
    Magnitude, MetricId, MetricName, Registry, Result, index_of,
};

/// Tag key used to tell apart the bucket counters of one recorder, unless configured otherwise.
pub const DEFAULT_TAG_KEY: &str = "percentile";

/// Records observations of one metric so that percentiles of their distribution can be
/// estimated later, without retaining individual observations.
///
/// Each recorder keeps an exact count and total of all observations (in a
/// [`DistributionSummary`]) plus one [`Counter`] per bucket of the shared bucket layout. Both
/// are obtained from a [`Registry`] when the recorder is built; the recorder only increments
/// and reads them and never publishes anything on its own.
///
/// Recording is lock-free and may happen on any number of threads at the same time. Queries
/// read the counters one by one, so a query racing with recording may see some of the
/// concurrent observations and not others.
///
/// # Example
///
/// ```
/// use percentile_buckets::{LocalRegistry, MetricId, PercentileRecorder};
///
/// let registry = LocalRegistry::new();
///
/// let response_size = PercentileRecorder::builder()
///     .id(MetricId::new("http_response_size_bytes"))
///     .build(&registry);
///
/// for size in [120, 450, 800, 1_200, 64_000] {
///     response_size.record(size);
/// }
///
/// assert_eq!(response_size.count(), 5);
/// assert_eq!(response_size.total_amount(), 66_570);
///
/// let median = response_size.percentile(50.0).unwrap();
/// assert!((767.0..=831.0).contains(&median));
/// ```
pub struct PercentileRecorder<C = Arc<AtomicCounter>, S = Arc<AtomicSummary>>
where
    C: Counter,
    S: DistributionSummary,
{
    id: MetricId,

    summary: S,

    // Type invariant: exactly BUCKET_COUNT counters, indexed by bucket index.
    counters: Box<[C]>,
}

impl PercentileRecorder {
    /// Creates a builder for a new recorder.
    ///
    /// The builder can create recorders backed by any [`Registry`], not only the default
    /// [`LocalRegistry`][crate::LocalRegistry] implied by the default type parameters.
    #[must_use]
    pub fn builder() -> PercentileRecorderBuilder {
        PercentileRecorderBuilder::new()
    }
}

impl<C, S> PercentileRecorder<C, S>
where
    C: Counter,
    S: DistributionSummary,
{
    /// Records one observation.
    ///
    /// Negative values are not valid observations and are silently ignored: they change
    /// neither the count, the total nor any bucket.
    #[inline]
    pub fn record(&self, value: Magnitude) {
        if value < 0 {
            return;
        }

        self.summary.record(value);

        // We do this unsafely because recording is the hot path and must stay minimal.
        //
        // SAFETY: Type invariant: there are always BUCKET_COUNT counters and index_of()
        // always returns an index below BUCKET_COUNT.
        unsafe { self.counters.get_unchecked(index_of(value)) }.increment();
    }

    /// Estimates the value at the given percentile of all recorded observations.
    ///
    /// Returns 0 if nothing has been recorded yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPercentile`][crate::Error::InvalidPercentile] if `percentile`
    /// is NaN or outside `0.0..=100.0`.
    pub fn percentile(&self, percentile: f64) -> Result<f64> {
        self.snapshot().percentile(percentile)
    }

    /// Estimates the values at several percentiles of all recorded observations, in the order
    /// the percentiles are given. All estimates are made from the same snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPercentile`][crate::Error::InvalidPercentile] if any of the
    /// percentiles is NaN or outside `0.0..=100.0`.
    pub fn percentiles(&self, percentiles: &[f64]) -> Result<Vec<f64>> {
        self.snapshot().percentiles(percentiles)
    }

    /// Takes a snapshot of the current bucket counts.
    ///
    /// No synchronization is performed - buckets are read one after another while recording
    /// may continue on other threads. Each count is a value that existed at some recent point
    /// in time.
    #[must_use]
    pub fn snapshot(&self) -> BucketCounts {
        BucketCounts::from_iter_exact(self.counters.iter().map(Counter::count))
    }

    /// Exact number of recorded observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.summary.count()
    }

    /// Exact sum of all recorded observations.
    #[must_use]
    pub fn total_amount(&self) -> Magnitude {
        self.summary.total_amount()
    }

    /// Mean of all recorded observations, rounded towards zero. Zero if there are none.
    #[must_use]
    #[expect(
        clippy::arithmetic_side_effects,
        reason = "NonZero protects against division by zero"
    )]
    #[expect(
        clippy::integer_division,
        reason = "we accept that we lose the remainder - 100% precision not required"
    )]
    pub fn mean(&self) -> Magnitude {
        Magnitude::try_from(self.count())
            .ok()
            .and_then(NonZero::new)
            .map_or(0, |count| self.total_amount() / count.get())
    }

    /// The identifier of the metric this recorder records.
    #[must_use]
    pub fn id(&self) -> &MetricId {
        &self.id
    }

    /// Whether the registry considers this metric unused and eligible for removal.
    #[must_use]
    pub fn has_expired(&self) -> bool {
        self.summary.has_expired()
    }
}

impl<C, S> Debug for PercentileRecorder<C, S>
where
    C: Counter,
    S: DistributionSummary,
{
    #[cfg_attr(test, mutants::skip)] // No API contract to test.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PercentileRecorder")
            .field("id", &self.id)
            .field("summary", &self.summary)
            .field("counters", &self.counters.len())
            .finish()
    }
}

/// Creates instances of [`PercentileRecorder`].
///
/// Required parameters:
/// * `id`
///
/// Use `PercentileRecorder::builder()` to create a new instance of this builder.
#[derive(Debug)]
pub struct PercentileRecorderBuilder {
    id: Option<MetricId>,

    /// Key of the tag that distinguishes the bucket counters of the recorder.
    tag_key: MetricName,
}

impl PercentileRecorderBuilder {
    pub(crate) fn new() -> Self {
        Self {
            id: None,
            tag_key: MetricName::Borrowed(DEFAULT_TAG_KEY),
        }
    }

    /// Sets the identifier of the metric. This is a required property.
    ///
    /// The summary holding the exact count and total uses this identifier as-is. Each bucket
    /// counter uses it with one additional tag identifying the bucket.
    #[must_use]
    pub fn id(self, id: MetricId) -> Self {
        Self {
            id: Some(id),
            ..self
        }
    }

    /// Sets the key of the tag that identifies the bucket of each bucket counter.
    ///
    /// The default is [`DEFAULT_TAG_KEY`]. The tag value is always the bucket index as
    /// four uppercase hexadecimal digits after a `D`, e.g. `D0000` or `D01E7`, so the
    /// bucket counters of one metric sort in bucket order.
    ///
    /// # Example
    ///
    /// ```
    /// use percentile_buckets::{LocalRegistry, MetricId, PercentileRecorder};
    ///
    /// let registry = LocalRegistry::new();
    ///
    /// let recorder = PercentileRecorder::builder()
    ///     .id(MetricId::new("queue_depth"))
    ///     .tag_key("bucket")
    ///     .build(&registry);
    /// recorder.record(3);
    ///
    /// let (id, count) = registry
    ///     .counters()
    ///     .into_iter()
    ///     .find(|(_, count)| *count != 0)
    ///     .unwrap();
    ///
    /// assert_eq!(id.tag("bucket"), Some("D0003"));
    /// assert_eq!(count, 1);
    /// ```
    #[must_use]
    pub fn tag_key(self, tag_key: impl Into<MetricName>) -> Self {
        Self {
            tag_key: tag_key.into(),
            ..self
        }
    }

    /// Creates the recorder, obtaining its summary and bucket counters from `registry`.
    ///
    /// # Panics
    ///
    /// Panics if the identifier has not been set or the tag key is empty.
    #[must_use]
    pub fn build<R>(self, registry: &R) -> PercentileRecorder<R::Counter, R::Summary>
    where
        R: Registry,
    {
        let id = self.id.expect("metric identifier must be set before building a recorder");
        assert!(!self.tag_key.is_empty(), "bucket tag key must not be empty");

        let summary = registry.distribution_summary(&id);

        let counters = (0..BUCKET_COUNT)
            .map(|index| {
                let bucket_id = id
                    .clone()
                    .with_tag(self.tag_key.clone(), bucket_tag_value(index));

                registry.counter(&bucket_id)
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();

        // Important type invariant used to ensure safety when recording.
        // We assert this just to make it super obvious.
        debug_assert_eq!(counters.len(), BUCKET_COUNT);

        tracing::debug!(
            metric = %id,
            tag_key = %self.tag_key,
            buckets = BUCKET_COUNT,
            "created percentile recorder"
        );

        PercentileRecorder {
            id,
            summary,
            counters,
        }
    }
}

/// The tag value identifying one bucket, e.g. `D002A` for bucket 42.
fn bucket_tag_value(index: usize) -> String {
    format!("D{index:04X}")
}
