//! Newline-aligned byte-range boundaries, one range per worker.
//!
//! Each boundary except the two endpoints sits immediately after a `\n`, so
//! every range starts at a line start and no line is split across workers.
//! Ranges are half-open `[bounds[i], bounds[i + 1])` and their union covers
//! `[0, file_size)` exactly. Two consecutive boundaries may coincide (a
//! file with fewer lines than workers); that range is empty and its worker
//! returns a zero partial.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use memchr::memchr;

/// Probe buffer for boundary alignment. Boundary seeks land mid-line, so a
/// small buffer nearly always finds the next newline in one read.
const PROBE_LEN: usize = 4096;

/// Splits `[0, file_size)` into `workers` newline-aligned ranges.
///
/// Returns `workers + 1` non-decreasing offsets. For each interior index
/// the file is seeked to `floor(file_size * i / workers)` and scanned
/// forward to just past the next `\n`; a scan that hits EOF first pins the
/// boundary to `file_size`.
pub fn split(file: &mut File, file_size: u64, workers: usize) -> io::Result<Vec<u64>> {
    assert!(workers >= 1, "at least one range is required");
    let mut bounds = Vec::with_capacity(workers + 1);
    bounds.push(0u64);

    let mut probe = [0u8; PROBE_LEN];
    for i in 1..workers as u64 {
        let target = file_size * i / workers as u64;
        file.seek(SeekFrom::Start(target))?;

        let mut cursor = target;
        let mut boundary = file_size;
        loop {
            let got = file.read(&mut probe)?;
            if got == 0 {
                break;
            }
            if let Some(pos) = memchr(b'\n', &probe[..got]) {
                boundary = cursor + pos as u64 + 1;
                break;
            }
            cursor += got as u64;
        }

        // Ranges whose target landed inside the same line collapse to empty.
        let prev = bounds[bounds.len() - 1];
        bounds.push(boundary.max(prev));
    }

    bounds.push(file_size);
    Ok(bounds)
}
