//! Transport equivalence: the same input must produce identical bytes over
//! threads, shared memory, and temp files.
//!
//! The fork transports run real child processes, so everything lives in a
//! single sequential test.

#![cfg(unix)]

use std::fs;
use std::io::Write;

use tally_rs::{parse, ParseConfig, Transport, TransportPref};

fn synthetic_input(lines: usize) -> Vec<u8> {
    const STAMPS: [&str; 4] = [
        "2020-02-29T00:00:00+00:00",
        "2022-03-14T09:26:53+00:00",
        "2024-02-29T06:00:00+00:00",
        "2026-12-31T18:45:10+00:00",
    ];
    let mut data = Vec::new();
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    for i in 0..lines {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let slug = format!("entry-{:02}", if i < 10 { i } else { state as usize % 10 });
        let stamp = STAMPS[(state >> 32) as usize % STAMPS.len()];
        data.extend_from_slice(
            format!("https://stitcher.io/blog/{slug},{stamp}\n").as_bytes(),
        );
    }
    data
}

#[test]
fn transports_produce_identical_output() {
    let data = synthetic_input(4_000);
    let mut input = tempfile::NamedTempFile::new().unwrap();
    input.write_all(&data).unwrap();

    let mut outputs = Vec::new();
    for transport in [
        Transport::Threads,
        Transport::SharedMemory,
        Transport::TempFile,
    ] {
        let config = ParseConfig {
            workers: Some(3),
            transport: TransportPref::Force(transport),
            ..ParseConfig::default()
        };
        let output = tempfile::NamedTempFile::new().unwrap();
        let stats = parse(input.path(), output.path(), &config).unwrap();
        assert_eq!(stats.visits, 4_000, "{} transport", transport.as_str());
        assert_eq!(stats.workers, 3);
        outputs.push(fs::read(output.path()).unwrap());
    }

    assert_eq!(outputs[0], outputs[1], "threads vs shm");
    assert_eq!(outputs[0], outputs[2], "threads vs spill");
    assert!(!outputs[0].is_empty());
}
