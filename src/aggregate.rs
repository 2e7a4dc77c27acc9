//! The hot loop: chunked reads over one byte range into a dense counter
//! matrix.
//!
//! The input shape is fixed (see the crate docs): a 25-byte URL prefix, the
//! slug, then a 26-byte `,YYYY-MM-DDTHH:MM:SS+00:00` tail before the `\n`.
//! The walk exploits that shape instead of parsing:
//! - the comma sits exactly `LINE_TAIL_LEN` bytes before the newline,
//! - the `YY-MM-DD` key sits at a fixed offset after the comma,
//! - the next slug starts exactly `URL_PREFIX_LEN + 1` bytes past the `\n`.
//!
//! Per line the loop does one `memchr`, one borrowed-slice map probe, one
//! arithmetic date decode, and one `counts[offset + day_id] += 1`. Nothing
//! is allocated after the chunk buffer and the matrix.
//!
//! Chunks are read into a flat buffer and truncated at their last newline;
//! the file cursor is seeked back over the cut tail so the next read starts
//! at a line start. A chunk without any newline ends the range early (the
//! chunk is smaller than one line, which the fixed-shape contract rules
//! out for sane chunk sizes).

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;

use memchr::{memchr, memrchr};

use crate::dates::DateIndex;
use crate::errors::AggregateError;
use crate::registry::{read_up_to, PathRegistry};
use crate::{LINE_TAIL_LEN, URL_PREFIX_LEN};

/// Comma offset to the first byte of the `YY-MM-DD` key (skips `,20`).
const DATE_KEY_START: usize = 3;
/// Comma offset one past the last byte of the `YY-MM-DD` key.
const DATE_KEY_END: usize = 11;

/// Dense `P × D` visit counters, stored row-major with row = path.
///
/// The matrix is one contiguous allocation; a cell is addressed by the
/// registry's pre-multiplied path offset plus a day id. Partials produced
/// by workers have the same shape and are summed cell-wise.
#[derive(Debug)]
pub struct CounterMatrix {
    cells: Vec<u32>,
}

impl CounterMatrix {
    /// Allocates a zeroed matrix of `cells` counters.
    pub fn zeroed(cells: usize) -> Self {
        Self {
            cells: vec![0u32; cells],
        }
    }

    /// Number of cells (`P · D`).
    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true for the degenerate zero-path matrix.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.cells
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.cells
    }

    /// Sums a same-shape partial into this matrix. Order of merges is
    /// irrelevant; cell overflow is outside the design envelope.
    pub fn merge_from(&mut self, partial: &[u32]) {
        debug_assert_eq!(self.cells.len(), partial.len());
        for (acc, &cell) in self.cells.iter_mut().zip(partial) {
            *acc += cell;
        }
    }

    /// Total count across all cells (= accepted input rows).
    pub fn total(&self) -> u64 {
        self.cells.iter().map(|&c| c as u64).sum()
    }
}

/// Aggregates `[range.start, range.end)` of the input into a partial matrix.
///
/// Both range endpoints must be line-aligned (0, file size, or one past a
/// `\n`), which is what the partitioner produces. The worker opens its own
/// file handle, so any number of aggregations can run over the same input
/// concurrently.
///
/// Open, seek, and read failures are fatal for this range; no partial is
/// returned and the coordinator recomputes the range in-process.
pub fn aggregate_range(
    input: &Path,
    range: Range<u64>,
    registry: &PathRegistry,
    dates: &DateIndex,
    chunk_size: usize,
) -> Result<CounterMatrix, AggregateError> {
    assert!(
        chunk_size >= crate::MIN_CHUNK_SIZE,
        "chunk size must exceed the longest input line"
    );
    let mut counts = CounterMatrix::zeroed(registry.cell_count());
    let mut remaining = range.end.saturating_sub(range.start);
    if remaining == 0 || counts.is_empty() {
        return Ok(counts);
    }

    let mut file = File::open(input).map_err(AggregateError::Open)?;
    file.seek(SeekFrom::Start(range.start))
        .map_err(AggregateError::Seek)?;

    let mut buf = vec![0u8; chunk_size];
    while remaining > 0 {
        let want = remaining.min(chunk_size as u64) as usize;
        let got = read_up_to(&mut file, &mut buf[..want]).map_err(AggregateError::Read)?;
        if got == 0 {
            break;
        }

        let Some(last_nl) = memrchr(b'\n', &buf[..got]) else {
            // No complete line in this chunk; rewind and end the range.
            file.seek(SeekFrom::Current(-(got as i64)))
                .map_err(AggregateError::Seek)?;
            break;
        };
        let tail = got - last_nl - 1;
        if tail > 0 {
            file.seek(SeekFrom::Current(-(tail as i64)))
                .map_err(AggregateError::Seek)?;
        }

        scan_lines(&buf[..last_nl + 1], registry, dates, counts.as_mut_slice());
        remaining -= (last_nl + 1) as u64;
    }

    Ok(counts)
}

/// Walks complete fixed-shape lines in `buf` and bumps matrix cells.
///
/// `buf` must start at a line start and end one past a `\n`. Lines whose
/// slug or date is unregistered are skipped silently; a line too short for
/// the fixed tail ends the walk (the shape contract is broken past it).
fn scan_lines(buf: &[u8], registry: &PathRegistry, dates: &DateIndex, counts: &mut [u32]) {
    let end = buf.len();
    let mut pos = URL_PREFIX_LEN;
    while pos < end {
        let Some(rel) = memchr(b'\n', &buf[pos..end]) else {
            break;
        };
        let nl = pos + rel;
        if nl < pos + LINE_TAIL_LEN {
            break;
        }
        let comma = nl - LINE_TAIL_LEN;

        if let Some(offset) = registry.offset_of(&buf[pos..comma]) {
            if let Some(day) = dates.lookup(&buf[comma + DATE_KEY_START..comma + DATE_KEY_END]) {
                let cell = (offset + day) as usize;
                debug_assert!(cell < counts.len());
                counts[cell] += 1;
            }
        }

        pos = nl + URL_PREFIX_LEN + 1;
    }
}
