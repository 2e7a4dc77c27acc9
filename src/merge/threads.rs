//! In-process transport: scoped worker threads, channel fan-in.
//!
//! Workers hand their partials back by value through a bounded channel and
//! the coordinator merges them in completion order (the merge commutes, so
//! order does not matter). The coordinator computes the last slice itself
//! while the workers run.
//!
//! A worker that errors or panics simply never delivers a good partial;
//! its range is recomputed in-process after the fan-in drains, matching
//! the recovery contract of the fork transports.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::thread;

use crate::aggregate::{aggregate_range, CounterMatrix};
use crate::dates::DateIndex;
use crate::errors::AggregateError;
use crate::registry::PathRegistry;

pub(super) fn run(
    input: &Path,
    boundaries: &[u64],
    registry: &PathRegistry,
    dates: &DateIndex,
    chunk_size: usize,
) -> Result<(CounterMatrix, usize), AggregateError> {
    let workers = boundaries.len() - 1;
    debug_assert!(workers >= 2);

    let (tx, rx) = crossbeam_channel::bounded::<(usize, Result<CounterMatrix, AggregateError>)>(
        workers - 1,
    );
    let mut recovered = 0usize;

    let acc = thread::scope(|scope| -> Result<CounterMatrix, AggregateError> {
        for idx in 0..workers - 1 {
            let tx = tx.clone();
            let range = boundaries[idx]..boundaries[idx + 1];
            let spawned = thread::Builder::new()
                .name(format!("range-worker-{idx}"))
                .spawn_scoped(scope, move || {
                    // A panicking worker must not take the scope down; it is
                    // recovered like any failed worker.
                    let result = catch_unwind(AssertUnwindSafe(|| {
                        aggregate_range(input, range, registry, dates, chunk_size)
                    }));
                    if let Ok(partial) = result {
                        let _ = tx.send((idx, partial));
                    }
                });
            if let Err(err) = spawned {
                eprintln!("range worker {idx} failed to spawn ({err}); will recompute");
            }
        }
        drop(tx);

        // The coordinator's own slice runs while the workers do.
        let mut acc = aggregate_range(
            input,
            boundaries[workers - 1]..boundaries[workers],
            registry,
            dates,
            chunk_size,
        )?;

        let mut delivered = vec![false; workers - 1];
        for (idx, result) in rx.iter() {
            match result {
                Ok(partial) => {
                    delivered[idx] = true;
                    acc.merge_from(partial.as_slice());
                }
                Err(err) => {
                    eprintln!("range worker {idx} failed ({err}); recomputing in-process");
                }
            }
        }

        for (idx, done) in delivered.iter().enumerate() {
            if !done {
                let partial = aggregate_range(
                    input,
                    boundaries[idx]..boundaries[idx + 1],
                    registry,
                    dates,
                    chunk_size,
                )?;
                acc.merge_from(partial.as_slice());
                recovered += 1;
            }
        }

        Ok(acc)
    })?;

    Ok((acc, recovered))
}
