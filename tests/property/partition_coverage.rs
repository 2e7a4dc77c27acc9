//! Coverage invariants for the range partitioner.
//!
//! For any worker count the ranges must tile `[0, file_size)` exactly and
//! every interior boundary must sit immediately after a newline.

use std::io::Write;

use proptest::prelude::*;

use tally_rs::partition;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn boundaries_cover_and_align(
        line_lens in proptest::collection::vec(0usize..120, 0..60),
        unterminated_tail in any::<bool>(),
        workers in 1usize..9,
    ) {
        let mut data = Vec::new();
        for (i, len) in line_lens.iter().enumerate() {
            data.extend(std::iter::repeat(b'a' + (i % 26) as u8).take(*len));
            data.push(b'\n');
        }
        if unterminated_tail {
            data.extend_from_slice(b"no-trailing-newline");
        }

        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&data).unwrap();
        let bounds = partition::split(&mut file, data.len() as u64, workers).unwrap();

        prop_assert_eq!(bounds.len(), workers + 1);
        prop_assert_eq!(bounds[0], 0);
        prop_assert_eq!(*bounds.last().unwrap(), data.len() as u64);
        for pair in bounds.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        for &bound in &bounds[1..bounds.len() - 1] {
            let bound = bound as usize;
            prop_assert!(
                bound == 0 || bound == data.len() || data[bound - 1] == b'\n',
                "boundary {} not newline-aligned", bound
            );
        }
    }
}
