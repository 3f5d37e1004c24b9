//! Integration test for recording into shared recorders from many threads at once.

#![allow(clippy::indexing_slicing, reason = "panic is fine in tests")]
#![allow(
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    reason = "small test values"
)]

use std::thread;

use percentile_buckets::{
    BUCKET_COUNT, DEFAULT_TAG_KEY, LocalRegistry, Magnitude, MetricId, PercentileRecorder,
    bucket_bounds, index_of,
};

const THREADS: usize = 8;
const OBSERVATIONS_PER_THREAD: Magnitude = 10_000;

#[test]
fn concurrent_recording_loses_nothing() {
    let registry = LocalRegistry::new();

    let recorder = PercentileRecorder::builder()
        .id(MetricId::new("integration_test_latency_us"))
        .build(&registry);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for value in 0..OBSERVATIONS_PER_THREAD {
                    recorder.record(value);
                }

                // Invalid observations are dropped no matter which thread makes them.
                recorder.record(-1);
            });
        }
    });

    let expected_count = THREADS as u64 * OBSERVATIONS_PER_THREAD as u64;
    let expected_total =
        THREADS as Magnitude * (OBSERVATIONS_PER_THREAD - 1) * OBSERVATIONS_PER_THREAD / 2;

    assert_eq!(recorder.count(), expected_count);
    assert_eq!(recorder.total_amount(), expected_total);
    assert_eq!(recorder.snapshot().total(), expected_count);

    // The registry sees the same data the recorder does.
    let summaries = registry.summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].1, expected_count);
    assert_eq!(summaries[0].2, expected_total);

    let counters = registry.counters();
    assert_eq!(counters.len(), BUCKET_COUNT);
    assert_eq!(
        counters.iter().map(|(_, count)| count).sum::<u64>(),
        expected_count
    );

    // Uniform values 0..10000: every percentile lands in the bucket of the true value.
    for p in [1.0, 10.0, 50.0, 90.0, 99.0] {
        let true_value = (p / 100.0 * OBSERVATIONS_PER_THREAD as f64) as Magnitude;
        let index = index_of(true_value);

        let lower = bucket_bounds()[index.saturating_sub(1)] as f64;
        let upper = bucket_bounds()[index] as f64;

        let estimate = recorder.percentile(p).unwrap();
        assert!(
            (lower..=upper).contains(&estimate),
            "p{p}: {estimate} not in {lower}..={upper}"
        );
    }
}

#[test]
fn recorders_per_tag_can_be_combined() {
    let registry = LocalRegistry::new();

    let recorders = ["a", "b", "c"].map(|shard| {
        PercentileRecorder::builder()
            .id(MetricId::new("integration_test_sizes").with_tag("shard", shard))
            .build(&registry)
    });

    let combined = PercentileRecorder::builder()
        .id(MetricId::new("integration_test_sizes_combined"))
        .build(&registry);

    thread::scope(|s| {
        for (shard, recorder) in recorders.iter().enumerate() {
            let combined = &combined;

            s.spawn(move || {
                for step in 0..1_000 {
                    let value = (shard as Magnitude + 1) * step;
                    recorder.record(value);
                    combined.record(value);
                }
            });
        }
    });

    let mut merged = recorders[0].snapshot();
    merged.merge_from(&recorders[1].snapshot());
    merged.merge_from(&recorders[2].snapshot());

    assert_eq!(merged, combined.snapshot());
    assert_eq!(
        merged.percentiles(&[0.0, 50.0, 95.0, 100.0]).unwrap(),
        combined.percentiles(&[0.0, 50.0, 95.0, 100.0]).unwrap()
    );

    // Each shard has its own set of bucket counters in the registry.
    let shard_counters = registry
        .counters()
        .into_iter()
        .filter(|(id, _)| id.name() == "integration_test_sizes")
        .collect::<Vec<_>>();
    assert_eq!(shard_counters.len(), 3 * BUCKET_COUNT);
    assert!(
        shard_counters
            .iter()
            .all(|(id, _)| id.tag(DEFAULT_TAG_KEY).is_some() && id.tag("shard").is_some())
    );
}
