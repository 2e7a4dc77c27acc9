//! Merge equivalence and count conservation.
//!
//! For any worker count, the coordinated parallel aggregation must equal a
//! single pass over the whole file, and the matrix total must equal the
//! number of rows whose slug and date are both registered.

use std::io::Write;

use proptest::prelude::*;

use tally_rs::{aggregate_range, merge, partition, DateIndex, PathRegistry, TransportPref};

/// Timestamp pool with its acceptance verdict: in-window valid dates count,
/// the rest are silently skipped.
const STAMPS: [(&str, bool); 6] = [
    ("2024-01-15T10:00:00+00:00", true),
    ("2020-02-29T00:00:00+00:00", true),
    ("2023-02-29T00:00:00+00:00", false), // 2023 is not a leap year
    ("2026-12-31T23:59:59+00:00", true),
    ("2019-06-01T00:00:00+00:00", false), // before the window
    ("2027-01-01T00:00:00+00:00", false), // after the window
];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn parallel_merge_matches_single_pass(
        rows in proptest::collection::vec((0usize..5, 0usize..STAMPS.len()), 0..300),
        workers in 2usize..5,
    ) {
        let mut data = Vec::new();
        let mut accepted = 0u64;
        for &(slug, stamp) in &rows {
            let (text, counts) = STAMPS[stamp];
            data.extend_from_slice(
                format!("https://stitcher.io/blog/s-{slug},{text}\n").as_bytes(),
            );
            if counts {
                accepted += 1;
            }
        }
        let mut input = tempfile::NamedTempFile::new().unwrap();
        input.write_all(&data).unwrap();

        let dates = DateIndex::build();
        let mut registry = PathRegistry::with_day_stride(dates.count());
        for slug in 0..5 {
            registry.insert(format!("s-{slug}").as_bytes());
        }

        let size = data.len() as u64;
        let single = aggregate_range(input.path(), 0..size, &registry, &dates, 1 << 16).unwrap();
        prop_assert_eq!(single.total(), accepted);

        let mut file = std::fs::File::open(input.path()).unwrap();
        let bounds = partition::split(&mut file, size, workers).unwrap();
        let outcome = merge::run(
            input.path(),
            &bounds,
            &registry,
            &dates,
            1 << 16,
            TransportPref::Auto,
        )
        .unwrap();

        prop_assert_eq!(outcome.matrix.as_slice(), single.as_slice());
    }
}
