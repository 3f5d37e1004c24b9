#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Estimate percentiles of a stream of observations (latencies, sizes, queue depths) without
//! storing the observations themselves.
//!
//! Every observation is counted in one of a fixed set of [`BUCKET_COUNT`] buckets shared by
//! all recorders. Recording takes constant time, never allocates, never locks and never fails.
//! Percentiles are later estimated from the bucket counts, with a relative error bounded by
//! the width of the bucket the percentile falls into (at most 12.5% of the value).
//!
//! # Recording observations
//!
//! A [`PercentileRecorder`] obtains its counters from a [`Registry`]. The crate comes with
//! [`LocalRegistry`], which keeps all metrics in memory:
//!
//! ```
//! use percentile_buckets::{LocalRegistry, MetricId, PercentileRecorder};
//!
//! let registry = LocalRegistry::new();
//!
//! let connect_time = PercentileRecorder::builder()
//!     .id(MetricId::new("net_http_connect_time_ms").with_tag("pool", "default"))
//!     .build(&registry);
//!
//! connect_time.record(12);
//! connect_time.record(15);
//! connect_time.record(250);
//!
//! // Negative observations are not valid and are ignored.
//! connect_time.record(-1);
//!
//! assert_eq!(connect_time.count(), 3);
//! assert_eq!(connect_time.total_amount(), 277);
//! ```
//!
//! Recorders are `Send` and `Sync` as long as the registry's metrics are, so one recorder is
//! typically shared by all threads that observe the same metric.
//!
//! # Estimating percentiles
//!
//! ```
//! # use percentile_buckets::{LocalRegistry, MetricId, PercentileRecorder};
//! # let registry = LocalRegistry::new();
//! # let connect_time = PercentileRecorder::builder()
//! #     .id(MetricId::new("net_http_connect_time_ms"))
//! #     .build(&registry);
//! for value in 1..=1000 {
//!     connect_time.record(value);
//! }
//!
//! let p99 = connect_time.percentile(99.0).unwrap();
//! assert!((935.0..=1023.0).contains(&p99));
//!
//! let estimates = connect_time.percentiles(&[50.0, 90.0]).unwrap();
//! assert!(estimates[0] < estimates[1]);
//! ```
//!
//! Percentiles must be in the range `0.0..=100.0`; anything else is rejected with
//! [`Error::InvalidPercentile`]. Estimating a percentile without any observations yields 0.
//!
//! # Combining data from several recorders
//!
//! The bucket layout is the same everywhere, so bucket counts can simply be added up. Take a
//! [`BucketCounts`] snapshot of each recorder (or receive the counts from another process),
//! merge them and estimate percentiles over the combined data:
//!
//! ```
//! use percentile_buckets::{LocalRegistry, MetricId, PercentileRecorder};
//!
//! let registry = LocalRegistry::new();
//!
//! let west = PercentileRecorder::builder()
//!     .id(MetricId::new("request_size_bytes").with_tag("region", "west"))
//!     .build(&registry);
//! let east = PercentileRecorder::builder()
//!     .id(MetricId::new("request_size_bytes").with_tag("region", "east"))
//!     .build(&registry);
//!
//! west.record(100);
//! east.record(5000);
//!
//! let mut all = west.snapshot();
//! all.merge_from(&east.snapshot());
//!
//! println!("{all}");
//! let median = all.percentile(50.0).unwrap();
//! assert!((95.0..=103.0).contains(&median));
//! ```
//!
//! The free functions [`index_of()`] and [`percentile()`] expose the bucket layout directly,
//! for consumers that aggregate raw counts themselves.
//!
//! # Publishing
//!
//! Recorders never push data anywhere. All data lives in the counters and summaries of the
//! registry, which is responsible for publishing (and possibly expiring) them. Bucket counters
//! are identified by the recorder's [`MetricId`] plus one tag (default key
//! [`DEFAULT_TAG_KEY`]) whose value is the bucket index as a fixed-width hexadecimal number,
//! e.g. `D0000` to `D01E7`.
//!
//! # Panic policy
//!
//! This crate may panic when building a recorder if an invalid configuration is supplied.
//!
//! This crate will not panic for "mathematical" reasons when recording, such as overflow due
//! to excessively large counts or totals. Instead, such values wrap around.

mod buckets;
mod error;
mod local;
mod recorder;
mod registry;
mod snapshot;

pub use buckets::*;
pub use error::*;
pub use local::*;
pub use recorder::*;
pub use registry::*;
pub use snapshot::*;

/// Any value in this range is a valid magnitude of an observation, as far as the type system
/// is concerned. Only non-negative magnitudes are recorded.
///
/// We use integers because they are the fastest data type - floating point math is too slow
/// for high-frequency observations.
///
/// If you are measuring fractional data, scale it up to be representable as integers.
/// For example, instead of counting seconds, count milliseconds or nanoseconds.
pub type Magnitude = i64;
