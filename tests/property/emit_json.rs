//! Idempotent JSON: the emitted report, fed through a standard JSON
//! parser, must equal the in-memory accumulator projection (zero cells and
//! zero paths dropped, keys fully unescaped).

use proptest::prelude::*;
use serde_json::Value;

use tally_rs::dates::WINDOW_DAY_COUNT;
use tally_rs::{emit, DateIndex, PathRegistry};

const SLUGS: [&str; 4] = ["plain", "with/slash", "quote\"inside", "back\\slash"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn report_reparses_to_the_accumulator_projection(
        cells in proptest::collection::vec(
            (0usize..SLUGS.len(), 0u32..WINDOW_DAY_COUNT, 1u32..50),
            0..40,
        ),
    ) {
        let dates = DateIndex::build();
        let mut registry = PathRegistry::with_day_stride(dates.count());
        for slug in SLUGS {
            registry.insert(slug.as_bytes());
        }

        let day_count = dates.count() as usize;
        let mut matrix = vec![0u32; registry.cell_count()];
        for &(path, day, count) in &cells {
            matrix[path * day_count + day as usize] += count;
        }

        let mut rendered = Vec::new();
        emit::write_report(&mut rendered, &matrix, &registry, &dates).unwrap();
        let value: Value = serde_json::from_slice(&rendered).unwrap();

        let mut expected = serde_json::Map::new();
        for (path_id, slug) in SLUGS.iter().enumerate() {
            let mut days = serde_json::Map::new();
            for day in 0..day_count {
                let count = matrix[path_id * day_count + day];
                if count > 0 {
                    let label = std::str::from_utf8(dates.label(day as u32)).unwrap();
                    days.insert(label.to_owned(), Value::from(count));
                }
            }
            if !days.is_empty() {
                expected.insert(format!("/blog/{slug}"), Value::Object(days));
            }
        }
        prop_assert_eq!(value, Value::Object(expected));
    }
}
