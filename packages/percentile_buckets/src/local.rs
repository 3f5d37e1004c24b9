use std::sync::atomic::{self, AtomicI64, AtomicU64};
use std::sync::{Arc, Mutex, PoisonError};

use foldhash::{HashMap, HashMapExt};

use crate::{Counter, DistributionSummary, Magnitude, MetricId, Registry};

/// We use `Relaxed` ordering for all atomic operations to allow recording to be as fast as
/// possible. Readers only need each individual value to be one that existed at some recent
/// point in time; no ordering between different counters is promised.
const ACCESS_ORDERING: atomic::Ordering = atomic::Ordering::Relaxed;

/// A [`Counter`] backed by a single atomic integer.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    count: AtomicU64,
}

impl AtomicCounter {
    /// Creates a counter starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Counter for AtomicCounter {
    fn increment(&self) {
        // Wraps on overflow.
        self.count.fetch_add(1, ACCESS_ORDERING);
    }

    fn count(&self) -> u64 {
        self.count.load(ACCESS_ORDERING)
    }
}

/// A [`DistributionSummary`] backed by a pair of atomic integers.
///
/// The count and the total are updated independently, so a reader racing with a writer
/// may see one of them updated and the other not yet.
///
/// Local summaries never expire - they live as long as the registry that created them.
#[derive(Debug, Default)]
pub struct AtomicSummary {
    count: AtomicU64,
    total: AtomicI64,
}

impl AtomicSummary {
    /// Creates a summary with no observations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DistributionSummary for AtomicSummary {
    fn record(&self, amount: Magnitude) {
        // Crate policy is to mangle rather than panic on overflow, which fetch_add does for us.
        self.count.fetch_add(1, ACCESS_ORDERING);
        self.total.fetch_add(amount, ACCESS_ORDERING);
    }

    fn count(&self) -> u64 {
        self.count.load(ACCESS_ORDERING)
    }

    fn total_amount(&self) -> Magnitude {
        self.total.load(ACCESS_ORDERING)
    }

    #[cfg_attr(test, mutants::skip)] // Constant by definition.
    fn has_expired(&self) -> bool {
        false
    }
}

/// An in-process [`Registry`] that keeps every metric it creates in memory.
///
/// Creating or looking up a metric takes a lock. The returned handles do not - recording into
/// them only touches atomics.
///
/// The registry is pull-based: use [`counters()`][Self::counters] and
/// [`summaries()`][Self::summaries] to inspect the current values, e.g. to publish them to an
/// external system.
///
/// # Example
///
/// ```
/// use percentile_buckets::{Counter, LocalRegistry, MetricId, Registry};
///
/// let registry = LocalRegistry::new();
/// let id = MetricId::new("cache_hits");
///
/// registry.counter(&id).increment();
/// registry.counter(&id).increment();
///
/// assert_eq!(registry.counters(), vec![(id, 2)]);
/// ```
#[derive(Debug, Default)]
pub struct LocalRegistry {
    counters: Mutex<HashMap<MetricId, Arc<AtomicCounter>>>,
    summaries: Mutex<HashMap<MetricId, Arc<AtomicSummary>>>,
}

impl LocalRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            summaries: Mutex::new(HashMap::new()),
        }
    }

    /// Current values of all counters, sorted by identifier.
    ///
    /// Bucket counters of a percentile recorder only differ in their fixed-width bucket tag,
    /// so they appear next to each other, in bucket order.
    #[must_use]
    pub fn counters(&self) -> Vec<(MetricId, u64)> {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, counter)| (id.clone(), counter.count()))
            .collect::<Vec<_>>();

        counters.sort_by(|a, b| a.0.cmp(&b.0));
        counters
    }

    /// Current count and total of all distribution summaries, sorted by identifier.
    #[must_use]
    pub fn summaries(&self) -> Vec<(MetricId, u64, Magnitude)> {
        let mut summaries = self
            .summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, summary)| (id.clone(), summary.count(), summary.total_amount()))
            .collect::<Vec<_>>();

        summaries.sort_by(|a, b| a.0.cmp(&b.0));
        summaries
    }
}

impl Registry for LocalRegistry {
    type Counter = Arc<AtomicCounter>;
    type Summary = Arc<AtomicSummary>;

    fn counter(&self, id: &MetricId) -> Self::Counter {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = counters.get(id) {
            tracing::trace!(metric = %id, "found existing counter");
            return Arc::clone(existing);
        }

        tracing::trace!(metric = %id, "creating counter");

        let counter = Arc::new(AtomicCounter::new());
        counters.insert(id.clone(), Arc::clone(&counter));
        counter
    }

    fn distribution_summary(&self, id: &MetricId) -> Self::Summary {
        let mut summaries = self
            .summaries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = summaries.get(id) {
            tracing::trace!(metric = %id, "found existing distribution summary");
            return Arc::clone(existing);
        }

        tracing::debug!(metric = %id, "creating distribution summary");

        let summary = Arc::new(AtomicSummary::new());
        summaries.insert(id.clone(), Arc::clone(&summary));
        summary
    }
}
