use std::borrow::Cow;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;

use crate::Magnitude;

/// The name of a metric or of a tag key/value, used for display and keying purposes.
///
/// Typically these are `&'static str` but for cases when the exact set of metrics is not
/// known in advance, we also support owned strings via `Cow`.
pub type MetricName = Cow<'static, str>;

/// Identifies a metric in a [`Registry`]: a name plus a set of key/value tags.
///
/// Tags are kept sorted by key, so two identifiers built with the same tags in a different
/// order are equal and sort the same way.
///
/// # Example
///
/// ```
/// use percentile_buckets::MetricId;
///
/// let id = MetricId::new("http_response_size_bytes")
///     .with_tag("method", "GET")
///     .with_tag("status", "200");
///
/// assert_eq!(id.name(), "http_response_size_bytes");
/// assert_eq!(id.tag("status"), Some("200"));
/// ```
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct MetricId {
    name: MetricName,

    // Sorted by key, keys are unique.
    tags: Vec<(MetricName, MetricName)>,
}

impl MetricId {
    /// Creates an identifier with the given name and no tags.
    #[must_use]
    pub fn new(name: impl Into<MetricName>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
        }
    }

    /// Returns an identifier with the tag added. An existing tag with the same key is replaced.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<MetricName>, value: impl Into<MetricName>) -> Self {
        let key = key.into();
        let value = value.into();

        match self
            .tags
            .binary_search_by(|(existing, _)| existing.as_ref().cmp(key.as_ref()))
        {
            Ok(position) => {
                if let Some(tag) = self.tags.get_mut(position) {
                    tag.1 = value;
                }
            }
            Err(position) => self.tags.insert(position, (key, value)),
        }

        self
    }

    /// The name of the metric.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value of the tag with the given key, if present.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .binary_search_by(|(existing, _)| existing.as_ref().cmp(key))
            .ok()
            .and_then(|position| self.tags.get(position))
            .map(|(_, value)| value.as_ref())
    }

    /// Iterates over the tags as `(key, value)` pairs, sorted by key.
    pub fn tags(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .map(|(key, value)| (key.as_ref(), value.as_ref()))
    }
}

impl Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;

        for (key, value) in &self.tags {
            write!(f, ":{key}={value}")?;
        }

        Ok(())
    }
}

/// A monotonically increasing count, as provided by a [`Registry`].
///
/// Implementations must tolerate concurrent `increment()` calls from any number of threads
/// without locking. Reads may lag behind concurrent increments.
#[cfg_attr(test, mockall::automock)]
pub trait Counter: Debug + Send + Sync {
    /// Adds one to the count.
    fn increment(&self);

    /// The current count.
    fn count(&self) -> u64;
}

/// Tracks the exact number and sum of recorded amounts, as provided by a [`Registry`].
///
/// Implementations must tolerate concurrent `record()` calls from any number of threads
/// without locking. The count and the total may be observed out of step with each other.
#[cfg_attr(test, mockall::automock)]
pub trait DistributionSummary: Debug + Send + Sync {
    /// Records one observation of the given amount.
    fn record(&self, amount: Magnitude);

    /// Number of recorded observations.
    fn count(&self) -> u64;

    /// Sum of all recorded amounts.
    fn total_amount(&self) -> Magnitude;

    /// Whether the registry considers this metric unused and eligible for removal.
    fn has_expired(&self) -> bool;
}

/// Creates or looks up metrics by identifier.
///
/// Requesting the same identifier twice must return handles to the same underlying metric.
/// How metrics are stored, published or expired is up to the implementation.
#[cfg_attr(test, mockall::automock(
    type Counter = MockCounter;
    type Summary = MockDistributionSummary;
))]
pub trait Registry {
    /// Handle to a counter owned by this registry.
    type Counter: Counter;

    /// Handle to a distribution summary owned by this registry.
    type Summary: DistributionSummary;

    /// Gets the counter with the given identifier, creating it if it does not exist yet.
    fn counter(&self, id: &MetricId) -> Self::Counter;

    /// Gets the distribution summary with the given identifier, creating it if it does not
    /// exist yet.
    fn distribution_summary(&self, id: &MetricId) -> Self::Summary;
}

impl<T> Counter for Arc<T>
where
    T: Counter + ?Sized,
{
    #[cfg_attr(test, mutants::skip)] // Pure delegation.
    fn increment(&self) {
        T::increment(self);
    }

    #[cfg_attr(test, mutants::skip)] // Pure delegation.
    fn count(&self) -> u64 {
        T::count(self)
    }
}

impl<T> DistributionSummary for Arc<T>
where
    T: DistributionSummary + ?Sized,
{
    #[cfg_attr(test, mutants::skip)] // Pure delegation.
    fn record(&self, amount: Magnitude) {
        T::record(self, amount);
    }

    #[cfg_attr(test, mutants::skip)] // Pure delegation.
    fn count(&self) -> u64 {
        T::count(self)
    }

    #[cfg_attr(test, mutants::skip)] // Pure delegation.
    fn total_amount(&self) -> Magnitude {
        T::total_amount(self)
    }

    #[cfg_attr(test, mutants::skip)] // Pure delegation.
    fn has_expired(&self) -> bool {
        T::has_expired(self)
    }
}
