//! Worker coordination and partial-matrix merging.
//!
//! The coordinator fans one aggregation out over W newline-aligned ranges
//! and sums the W partials into a single accumulator. Three transports move
//! partials back, preferred in order:
//! 1. `threads`: scoped worker threads hand partials over a channel. No
//!    serialisation, always available, the default.
//! 2. `shm`: forked processes publish little-endian `u32` payloads through
//!    POSIX shared-memory segments of exactly `P·D·4` bytes.
//! 3. `spill`: forked processes write the same payload to temp files in a
//!    tmpfs-backed directory.
//!
//! The transport is selected once per invocation; an unavailable transport
//! falls through to the next one and changes nothing but the transport:
//! output bytes are identical across all three. A worker that fails (error,
//! panic, non-zero exit, missing or short payload) has its range recomputed
//! in-process by the coordinator, so worker failure is never visible to the
//! caller.
//!
//! The merge is cell-wise addition, commutative and associative, so worker
//! completion order is irrelevant.

use std::path::Path;

use crate::aggregate::{aggregate_range, CounterMatrix};
use crate::dates::DateIndex;
use crate::errors::{AggregateError, TransportError};
use crate::registry::PathRegistry;

mod threads;

#[cfg(unix)]
mod shm;
#[cfg(unix)]
mod spill;

/// Upper bound on the worker count; beyond this the merge cost outweighs
/// the read parallelism on the target hosts.
pub const MAX_WORKERS: usize = 16;

/// Mechanism used to move a partial from a worker to the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    /// Scoped worker threads in the coordinator's address space.
    Threads,
    /// Forked processes with POSIX shared-memory segments.
    SharedMemory,
    /// Forked processes with temp-file payloads.
    TempFile,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Threads => "threads",
            Self::SharedMemory => "shm",
            Self::TempFile => "spill",
        }
    }
}

/// Transport selection: probe for the best available, or force one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportPref {
    /// Use the best available transport (threads, in-process).
    #[default]
    Auto,
    /// Start the fallback chain at a specific transport.
    Force(Transport),
}

/// Result of a coordinated aggregation.
pub struct MergeOutcome {
    /// The fully merged accumulator.
    pub matrix: CounterMatrix,
    /// Transport that actually ran.
    pub transport: Transport,
    /// Ranges recomputed in-process after a worker failure.
    pub recovered_ranges: usize,
}

/// Internal result of one transport attempt.
pub(crate) enum RunError {
    /// The transport could not be established; fall through to the next.
    Transport(TransportError),
    /// An in-process aggregation failed; fatal, no further fallback.
    Aggregate(AggregateError),
}

/// Default worker count: one per logical CPU, capped at [`MAX_WORKERS`].
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, MAX_WORKERS)
}

/// Runs W aggregators over `boundaries` and merges their partials.
///
/// `boundaries` must be the partitioner's output: `W + 1` non-decreasing
/// line-aligned offsets. Single-range inputs and zero-path registries are
/// served in-process without touching any transport.
pub fn run(
    input: &Path,
    boundaries: &[u64],
    registry: &PathRegistry,
    dates: &DateIndex,
    chunk_size: usize,
    pref: TransportPref,
) -> Result<MergeOutcome, AggregateError> {
    assert!(boundaries.len() >= 2, "need at least one range");
    let workers = boundaries.len() - 1;

    if registry.cell_count() == 0 {
        // Nothing can be counted; skip the workers (and the zero-length
        // segments a fork transport would otherwise have to map).
        return Ok(MergeOutcome {
            matrix: CounterMatrix::zeroed(0),
            transport: Transport::Threads,
            recovered_ranges: 0,
        });
    }

    if workers == 1 {
        let matrix = aggregate_range(
            input,
            boundaries[0]..boundaries[1],
            registry,
            dates,
            chunk_size,
        )?;
        return Ok(MergeOutcome {
            matrix,
            transport: Transport::Threads,
            recovered_ranges: 0,
        });
    }

    for &transport in fallback_chain(pref) {
        let attempt = match transport {
            Transport::Threads => threads::run(input, boundaries, registry, dates, chunk_size)
                .map_err(RunError::Aggregate),
            Transport::SharedMemory => shm_run(input, boundaries, registry, dates, chunk_size),
            Transport::TempFile => spill_run(input, boundaries, registry, dates, chunk_size),
        };
        match attempt {
            Ok((matrix, recovered_ranges)) => {
                return Ok(MergeOutcome {
                    matrix,
                    transport,
                    recovered_ranges,
                })
            }
            Err(RunError::Transport(err)) => {
                eprintln!(
                    "transport {} unavailable ({err}); falling through",
                    transport.as_str()
                );
            }
            Err(RunError::Aggregate(err)) => return Err(err),
        }
    }

    unreachable!("the thread transport terminates every fallback chain")
}

/// Transports to try, most preferred first. Threads are always available
/// in-process, so they terminate every chain.
fn fallback_chain(pref: TransportPref) -> &'static [Transport] {
    match pref {
        TransportPref::Auto | TransportPref::Force(Transport::Threads) => &[Transport::Threads],
        TransportPref::Force(Transport::SharedMemory) => &[
            Transport::SharedMemory,
            Transport::TempFile,
            Transport::Threads,
        ],
        TransportPref::Force(Transport::TempFile) => &[Transport::TempFile, Transport::Threads],
    }
}

#[cfg(unix)]
fn shm_run(
    input: &Path,
    boundaries: &[u64],
    registry: &PathRegistry,
    dates: &DateIndex,
    chunk_size: usize,
) -> Result<(CounterMatrix, usize), RunError> {
    shm::run(input, boundaries, registry, dates, chunk_size)
}

#[cfg(not(unix))]
fn shm_run(
    _input: &Path,
    _boundaries: &[u64],
    _registry: &PathRegistry,
    _dates: &DateIndex,
    _chunk_size: usize,
) -> Result<(CounterMatrix, usize), RunError> {
    Err(RunError::Transport(TransportError::Unsupported(
        "shared memory requires unix",
    )))
}

#[cfg(unix)]
fn spill_run(
    input: &Path,
    boundaries: &[u64],
    registry: &PathRegistry,
    dates: &DateIndex,
    chunk_size: usize,
) -> Result<(CounterMatrix, usize), RunError> {
    spill::run(input, boundaries, registry, dates, chunk_size)
}

#[cfg(not(unix))]
fn spill_run(
    _input: &Path,
    _boundaries: &[u64],
    _registry: &PathRegistry,
    _dates: &DateIndex,
    _chunk_size: usize,
) -> Result<(CounterMatrix, usize), RunError> {
    Err(RunError::Transport(TransportError::Unsupported(
        "fork-based temp-file payloads require unix",
    )))
}

/// Serialises cells as a little-endian `u32` payload.
#[cfg(unix)]
pub(crate) fn store_cells_le(cells: &[u32], out: &mut [u8]) {
    debug_assert_eq!(out.len(), cells.len() * 4);
    for (chunk, &cell) in out.chunks_exact_mut(4).zip(cells) {
        chunk.copy_from_slice(&cell.to_le_bytes());
    }
}

/// Sums a little-endian `u32` payload into the accumulator.
///
/// Returns false when the payload length does not match the matrix shape
/// (a worker died mid-write); the caller recomputes that range.
#[cfg(unix)]
pub(crate) fn merge_cells_le(acc: &mut [u32], payload: &[u8]) -> bool {
    if payload.len() != acc.len() * 4 {
        return false;
    }
    for (cell, chunk) in acc.iter_mut().zip(payload.chunks_exact(4)) {
        *cell += u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    true
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn payload_round_trip() {
        let cells = [0u32, 1, 42, 7, 0x0102_0304];
        let mut payload = vec![0u8; cells.len() * 4];
        store_cells_le(&cells, &mut payload);

        let mut acc = vec![1u32; cells.len()];
        assert!(merge_cells_le(&mut acc, &payload));
        assert_eq!(acc, [1, 2, 43, 8, 0x0102_0305]);
    }

    #[test]
    fn short_payload_is_rejected() {
        let mut acc = vec![0u32; 4];
        assert!(!merge_cells_le(&mut acc, &[0u8; 12]));
        assert_eq!(acc, [0, 0, 0, 0]);
    }
}
