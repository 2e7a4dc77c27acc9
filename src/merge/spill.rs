//! Fork transport over temp-file payloads.
//!
//! Same payload layout as the shared-memory transport (little-endian `u32`
//! array of exactly `P·D·4` bytes) but written to per-worker temp files,
//! preferably on a tmpfs so the round trip stays in memory. The parent
//! pre-creates the files so their names exist before any fork, reads each
//! payload back after reaping its child, and relies on `NamedTempFile` to
//! unlink on drop.
//!
//! A missing or short payload (child crashed mid-write) fails length
//! validation and the parent recomputes that range in-process.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::aggregate::{aggregate_range, CounterMatrix};
use crate::dates::DateIndex;
use crate::errors::TransportError;
use crate::registry::PathRegistry;

use super::{merge_cells_le, store_cells_le, RunError};

/// Payload directory: a tmpfs when the platform has the conventional one,
/// else the system temp dir.
fn payload_dir() -> PathBuf {
    let shm = Path::new("/dev/shm");
    if shm.is_dir() {
        shm.to_path_buf()
    } else {
        std::env::temp_dir()
    }
}

fn write_payload(path: &Path, cells: &[u32]) -> io::Result<()> {
    let mut bytes = vec![0u8; cells.len() * 4];
    store_cells_le(cells, &mut bytes);
    let mut file = File::create(path)?;
    file.write_all(&bytes)
}

pub(super) fn run(
    input: &Path,
    boundaries: &[u64],
    registry: &PathRegistry,
    dates: &DateIndex,
    chunk_size: usize,
) -> Result<(CounterMatrix, usize), RunError> {
    let workers = boundaries.len() - 1;
    debug_assert!(workers >= 2);
    let payload_len = registry.cell_count() * 4;
    let dir = payload_dir();

    let mut payloads: Vec<NamedTempFile> = Vec::with_capacity(workers - 1);
    for _ in 0..workers - 1 {
        let file = tempfile::Builder::new()
            .prefix("visit-part-")
            .tempfile_in(&dir)
            .map_err(|err| RunError::Transport(TransportError::PayloadCreate(err)))?;
        payloads.push(file);
    }

    let mut children: Vec<libc::pid_t> = Vec::with_capacity(workers - 1);
    for (idx, payload) in payloads.iter().enumerate() {
        let range = boundaries[idx]..boundaries[idx + 1];
        let pid = unsafe { libc::fork() };
        if pid == 0 {
            let code = match aggregate_range(input, range, registry, dates, chunk_size) {
                Ok(partial) => match write_payload(payload.path(), partial.as_slice()) {
                    Ok(()) => 0,
                    Err(_) => 1,
                },
                Err(_) => 1,
            };
            // `_exit` skips drops, so the child never unlinks the payload.
            unsafe { libc::_exit(code) };
        }
        children.push(pid);
    }

    let own = aggregate_range(
        input,
        boundaries[workers - 1]..boundaries[workers],
        registry,
        dates,
        chunk_size,
    );

    let mut exited_clean = vec![false; children.len()];
    for (idx, &pid) in children.iter().enumerate() {
        if pid <= 0 {
            continue;
        }
        let mut status = 0i32;
        let reaped = unsafe { libc::waitpid(pid, &mut status, 0) };
        exited_clean[idx] =
            reaped == pid && libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0;
    }

    let mut acc = own.map_err(RunError::Aggregate)?;
    let mut recovered = 0usize;
    for (idx, payload) in payloads.iter().enumerate() {
        let merged = exited_clean[idx]
            && match fs::read(payload.path()) {
                Ok(bytes) if bytes.len() == payload_len => {
                    merge_cells_le(acc.as_mut_slice(), &bytes)
                }
                _ => false,
            };
        if !merged {
            eprintln!("spill worker {idx} failed; recomputing range in-process");
            let partial = aggregate_range(
                input,
                boundaries[idx]..boundaries[idx + 1],
                registry,
                dates,
                chunk_size,
            )
            .map_err(RunError::Aggregate)?;
            acc.merge_from(partial.as_slice());
            recovered += 1;
        }
    }

    Ok((acc, recovered))
}
