//! Records simulated request latencies and prints percentile estimates alongside the
//! histogram of populated buckets.

use std::thread;

use percentile_buckets::{LocalRegistry, Magnitude, MetricId, PercentileRecorder};

/// Deterministic pseudo-random sequence so the output is the same on every run.
fn next_value(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1_442_695_040_888_963_407);
    *state >> 33
}

fn main() {
    let registry = LocalRegistry::new();

    let latency = PercentileRecorder::builder()
        .id(MetricId::new("http_request_latency_us").with_tag("route", "/api/items"))
        .build(&registry);

    thread::scope(|s| {
        for worker in 0..4_u64 {
            let latency = &latency;

            s.spawn(move || {
                let mut state = worker;

                for _ in 0..25_000 {
                    // Mostly fast requests with an occasional slow one.
                    let base = next_value(&mut state) % 2_000;
                    let slow = if next_value(&mut state) % 100 == 0 {
                        50_000
                    } else {
                        0
                    };

                    latency.record(Magnitude::try_from(base + slow).unwrap_or(Magnitude::MAX));
                }
            });
        }
    });

    println!("=== Percentile buckets demo ===");
    println!(
        "{}: count {}; total {}; mean {}",
        latency.id(),
        latency.count(),
        latency.total_amount(),
        latency.mean()
    );

    let ps = [50.0, 90.0, 99.0, 99.9];
    let estimates = latency
        .percentiles(&ps)
        .expect("all percentiles are within range");

    for (p, estimate) in ps.iter().zip(estimates) {
        println!("p{p}: {estimate:.0} us");
    }

    println!();
    println!("{}", latency.snapshot());
}
