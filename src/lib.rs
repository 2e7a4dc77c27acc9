//! High-throughput visit-log aggregation with byte-deterministic output.
//!
//! The input is a very large append-only CSV of page visits in which every
//! line has one fixed shape:
//!
//! ```text
//! https://stitcher.io/blog/<slug>,YYYY-MM-DDTHH:MM:SS+00:00\n
//! ```
//!
//! The engine counts visits per (slug, calendar day) over the fixed
//! 2020–2026 window and emits a pretty-printed JSON report whose bytes are
//! identical across runs, worker counts, and IPC transports. It is built
//! around:
//! - Dense integer ids for days and slugs, with path ids pre-multiplied by
//!   the day count so a counter cell is one addition away.
//! - Newline-aligned byte-range partitioning so workers never share a line.
//! - A zero-allocation hot loop that walks fixed-shape lines in large read
//!   chunks and bumps a contiguous `u32` matrix.
//! - A coordinator that fans out W aggregators (threads by default, forked
//!   processes over shared memory or temp files as fallbacks), recovers
//!   failed workers in-process, and merges partials cell-wise.
//!
//! High-level flow (one parse):
//! Input -> DateIndex + PathRegistry -> RangePartitioner ->
//! W x RangeAggregator -> merge -> JsonEmitter -> output file.
//!
//! Rows whose slug or date is unregistered are skipped silently; that is a
//! deliberate throughput/robustness trade given the fixed-shape contract.

pub mod aggregate;
pub mod dates;
pub mod emit;
pub mod errors;
pub mod merge;
pub mod partition;
pub mod registry;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub use aggregate::{aggregate_range, CounterMatrix};
pub use dates::DateIndex;
pub use errors::{AggregateError, InputError, OutputError, ParseError, TransportError};
pub use merge::{default_worker_count, MergeOutcome, Transport, TransportPref, MAX_WORKERS};
pub use registry::PathRegistry;

/// Fixed URL prefix preceding every slug.
pub const URL_PREFIX: &[u8] = b"https://stitcher.io/blog/";
/// Length of [`URL_PREFIX`]; the hot loop's per-line cursor jump bakes it in.
pub const URL_PREFIX_LEN: usize = URL_PREFIX.len();
/// Length of the fixed line tail between the slug and the newline.
pub const LINE_TAIL_LEN: usize = ",YYYY-MM-DDTHH:MM:SS+00:00".len();

const _: () = {
    assert!(URL_PREFIX_LEN == 25);
    assert!(LINE_TAIL_LEN == 26);
};

/// Default bytes per aggregation read chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024 * 1024;
/// Smallest permitted chunk; must comfortably exceed the longest line.
pub const MIN_CHUNK_SIZE: usize = 64 * 1024;
/// Default registry pre-scan window over the head of the input.
pub const DEFAULT_PRESCAN_WINDOW: usize = 16 * 1024 * 1024;

/// Tuning knobs for one parse invocation.
///
/// The defaults fit the benchmark envelope (2 vCPU, 1.5 GiB): peak memory
/// is `W · P·D·4` bytes of partial matrices plus `W · chunk_size` of read
/// buffers.
#[derive(Clone, Debug)]
pub struct ParseConfig {
    /// Worker count. `None` resolves to one per logical CPU (capped at
    /// [`MAX_WORKERS`]), or to 1 when the input fits in the pre-scan
    /// window and parallelism cannot pay for itself.
    pub workers: Option<usize>,
    /// Bytes per read chunk; a performance knob, not a correctness knob.
    pub chunk_size: usize,
    /// Registry pre-scan window over the head of the input.
    pub prescan_window: usize,
    /// IPC transport selection.
    pub transport: TransportPref,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            workers: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            prescan_window: DEFAULT_PRESCAN_WINDOW,
            transport: TransportPref::Auto,
        }
    }
}

/// Summary of one completed parse.
#[derive(Clone, Debug)]
pub struct ParseStats {
    /// Distinct slugs registered (seed list plus pre-scan).
    pub paths: usize,
    /// Days in the reporting window.
    pub days: u32,
    /// Accepted rows (sum of all counter cells).
    pub visits: u64,
    /// Input size in bytes.
    pub bytes: u64,
    /// Worker count used.
    pub workers: usize,
    /// Transport that carried the partials.
    pub transport: Transport,
    /// Ranges recomputed in-process after worker failures.
    pub recovered_ranges: usize,
}

/// Aggregates `input` and writes the JSON report to `output`.
///
/// Equivalent to [`parse_with_seeds`] with an empty seed list.
pub fn parse(input: &Path, output: &Path, config: &ParseConfig) -> Result<ParseStats, ParseError> {
    parse_with_seeds(input, output, std::iter::empty::<&[u8]>(), config)
}

/// Aggregates `input` and writes the JSON report to `output`, seeding the
/// path registry from previously-seen URIs first.
///
/// Seeded slugs get the lowest ids (and thus lead the report), keeping the
/// hottest counter rows at low matrix offsets. Fatal errors are limited to
/// unreadable input, unwritable output, and an aggregation failure that
/// survives in-process recovery. Worker and transport failures are recovered
/// internally and only show up in the stats.
pub fn parse_with_seeds<I, S>(
    input: &Path,
    output: &Path,
    seeds: I,
    config: &ParseConfig,
) -> Result<ParseStats, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    assert!(
        config.chunk_size >= MIN_CHUNK_SIZE,
        "chunk size must exceed the longest input line"
    );

    let mut file = File::open(input).map_err(|source| InputError::Open {
        path: input.to_path_buf(),
        source,
    })?;
    let file_size = file
        .metadata()
        .map_err(|source| InputError::Metadata {
            path: input.to_path_buf(),
            source,
        })?
        .len();

    let dates = DateIndex::build();
    let mut registry = PathRegistry::with_day_stride(dates.count());
    registry.seed(seeds);
    registry
        .prescan(&mut file, file_size, config.prescan_window)
        .map_err(|source| InputError::Prescan {
            path: input.to_path_buf(),
            source,
        })?;

    let workers = match config.workers {
        Some(requested) => requested.clamp(1, MAX_WORKERS),
        // Inputs the pre-scan already read whole are not worth fanning out.
        None if file_size <= config.prescan_window as u64 => 1,
        None => default_worker_count(),
    };

    let boundaries =
        partition::split(&mut file, file_size, workers).map_err(|source| InputError::Partition {
            path: input.to_path_buf(),
            source,
        })?;
    drop(file);

    let outcome = merge::run(
        input,
        &boundaries,
        &registry,
        &dates,
        config.chunk_size,
        config.transport,
    )?;

    let out_file = File::create(output).map_err(|source| OutputError::Create {
        path: output.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(out_file);
    emit::write_report(&mut writer, outcome.matrix.as_slice(), &registry, &dates).map_err(
        |source| OutputError::Write {
            path: output.to_path_buf(),
            source,
        },
    )?;
    writer.flush().map_err(|source| OutputError::Write {
        path: output.to_path_buf(),
        source,
    })?;

    Ok(ParseStats {
        paths: registry.len(),
        days: dates.count(),
        visits: outcome.matrix.total(),
        bytes: file_size,
        workers,
        transport: outcome.transport,
        recovered_ranges: outcome.recovered_ranges,
    })
}
