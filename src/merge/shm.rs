//! Fork transport over POSIX shared-memory segments.
//!
//! The parent creates W-1 segments of exactly `P·D·4` bytes and maps them
//! `MAP_SHARED` before forking, so each child inherits its mapping and
//! publishes its partial with one store pass. The parent computes the last
//! slice itself, reaps the children, sums each clean segment into the
//! accumulator, and unlinks the segments.
//!
//! A child that exits non-zero (or dies to a signal) leaves its segment
//! untrusted; the parent recomputes that range in-process. Registries are
//! inherited through the fork's copy-on-write address space, so nothing is
//! serialised besides the payload itself.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::unix::io::FromRawFd;
use std::path::Path;
use std::process;

use memmap2::MmapMut;

use crate::aggregate::{aggregate_range, CounterMatrix};
use crate::dates::DateIndex;
use crate::errors::TransportError;
use crate::registry::PathRegistry;

use super::{merge_cells_le, store_cells_le, RunError};

/// A named segment, unlinked on drop.
struct Segment {
    name: CString,
    map: MmapMut,
}

impl Drop for Segment {
    fn drop(&mut self) {
        // Children never run drops (`_exit`), so the unlink happens exactly
        // once, in the parent.
        unsafe {
            libc::shm_unlink(self.name.as_ptr());
        }
    }
}

fn create_segment(index: usize, len: usize) -> Result<Segment, TransportError> {
    let name = CString::new(format!("/visit-tally-{}-{index}", process::id()))
        .expect("segment name has no interior NUL");

    let fd = unsafe {
        libc::shm_open(
            name.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o600,
        )
    };
    if fd < 0 {
        return Err(TransportError::SegmentCreate(io::Error::last_os_error()));
    }
    let file = unsafe { File::from_raw_fd(fd) };

    if unsafe { libc::ftruncate(fd, len as libc::off_t) } != 0 {
        let err = io::Error::last_os_error();
        unsafe { libc::shm_unlink(name.as_ptr()) };
        return Err(TransportError::SegmentResize(err));
    }

    match unsafe { MmapMut::map_mut(&file) } {
        Ok(map) => Ok(Segment { name, map }),
        Err(err) => {
            unsafe { libc::shm_unlink(name.as_ptr()) };
            Err(TransportError::SegmentMap(err))
        }
    }
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

    // Any segment failure here aborts the transport before a single fork,
    // falling through to the next transport.
    let mut segments = Vec::with_capacity(workers - 1);
    for idx in 0..workers - 1 {
        segments.push(create_segment(idx, payload_len).map_err(RunError::Transport)?);
    }

    let mut children: Vec<libc::pid_t> = Vec::with_capacity(workers - 1);
    for (idx, segment) in segments.iter_mut().enumerate() {
        let range = boundaries[idx]..boundaries[idx + 1];
        let pid = unsafe { libc::fork() };
        if pid == 0 {
            let code = match aggregate_range(input, range, registry, dates, chunk_size) {
                Ok(partial) => {
                    store_cells_le(partial.as_slice(), &mut segment.map[..]);
                    0
                }
                Err(_) => 1,
            };
            unsafe { libc::_exit(code) };
        }
        // pid < 0 is a failed fork; left in place and recovered below.
        children.push(pid);
    }

    // The parent's own slice runs while the children do. Reap before
    // propagating any error so no child outlives this call.
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
    for (idx, segment) in segments.iter().enumerate() {
        let merged = exited_clean[idx] && merge_cells_le(acc.as_mut_slice(), &segment.map[..]);
        if !merged {
            eprintln!("shm worker {idx} failed; recomputing range in-process");
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
