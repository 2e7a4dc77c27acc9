//! Error types for the aggregation stages.
//!
//! Errors are stage-specific to keep diagnostics precise and avoid a
//! single monolithic error enum that grows unbounded. All enums are
//! `#[non_exhaustive]` to allow adding variants without breaking callers;
//! consumers should include a fallback match arm.
//!
//! The taxonomy mirrors the recovery policy: input and output errors are
//! fatal and bubble out of `parse`; transport errors are internal and only
//! ever cause a fall-through to the next transport; a failed worker range
//! is recomputed in-process and surfaces here only if that recomputation
//! itself fails.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Errors from opening, sizing, pre-scanning, or partitioning the input.
///
/// All of these occur before any worker starts and abort the parse.
#[derive(Debug)]
#[non_exhaustive]
pub enum InputError {
    /// The input file could not be opened.
    Open { path: PathBuf, source: io::Error },
    /// The input file size could not be determined.
    Metadata { path: PathBuf, source: io::Error },
    /// Reading the registry pre-scan window failed.
    Prescan { path: PathBuf, source: io::Error },
    /// Seeking or reading while aligning range boundaries failed.
    Partition { path: PathBuf, source: io::Error },
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, source } => {
                write!(f, "cannot open input {}: {source}", path.display())
            }
            Self::Metadata { path, source } => {
                write!(f, "cannot stat input {}: {source}", path.display())
            }
            Self::Prescan { path, source } => {
                write!(f, "pre-scan of {} failed: {source}", path.display())
            }
            Self::Partition { path, source } => {
                write!(f, "range partitioning of {} failed: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for InputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { source, .. }
            | Self::Metadata { source, .. }
            | Self::Prescan { source, .. }
            | Self::Partition { source, .. } => Some(source),
        }
    }
}

/// Errors from aggregating one byte range.
///
/// Inside a worker these abort only that worker; the coordinator recomputes
/// the range in-process. From the in-process recomputation they are fatal.
#[derive(Debug)]
#[non_exhaustive]
pub enum AggregateError {
    /// The worker could not reopen the input file.
    Open(io::Error),
    /// Seeking to the range start or back over a chunk tail failed.
    Seek(io::Error),
    /// Reading a chunk failed.
    Read(io::Error),
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open(err) => write!(f, "range open failed: {err}"),
            Self::Seek(err) => write!(f, "range seek failed: {err}"),
            Self::Read(err) => write!(f, "range read failed: {err}"),
        }
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open(err) | Self::Seek(err) | Self::Read(err) => Some(err),
        }
    }
}

/// Errors from producing the output document.
#[derive(Debug)]
#[non_exhaustive]
pub enum OutputError {
    /// The output file could not be created.
    Create { path: PathBuf, source: io::Error },
    /// Writing or flushing the report failed.
    Write { path: PathBuf, source: io::Error },
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { path, source } => {
                write!(f, "cannot create output {}: {source}", path.display())
            }
            Self::Write { path, source } => {
                write!(f, "cannot write output {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Create { source, .. } | Self::Write { source, .. } => Some(source),
        }
    }
}

/// Errors establishing an IPC transport.
///
/// These never surface to the caller: the coordinator falls through to the
/// next transport in the preference chain (shared memory, temp files,
/// threads) and only the transport changes, never the output.
#[derive(Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// A shared-memory segment could not be created.
    SegmentCreate(io::Error),
    /// Sizing a shared-memory segment to the payload length failed.
    SegmentResize(io::Error),
    /// Mapping a shared-memory segment failed.
    SegmentMap(io::Error),
    /// A temp-file payload could not be created.
    PayloadCreate(io::Error),
    /// The transport is not available on this platform.
    Unsupported(&'static str),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentCreate(err) => write!(f, "shm segment create failed: {err}"),
            Self::SegmentResize(err) => write!(f, "shm segment resize failed: {err}"),
            Self::SegmentMap(err) => write!(f, "shm segment map failed: {err}"),
            Self::PayloadCreate(err) => write!(f, "payload file create failed: {err}"),
            Self::Unsupported(what) => write!(f, "transport unsupported: {what}"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SegmentCreate(err)
            | Self::SegmentResize(err)
            | Self::SegmentMap(err)
            | Self::PayloadCreate(err) => Some(err),
            Self::Unsupported(_) => None,
        }
    }
}

/// Top-level error returned by `parse`.
#[derive(Debug)]
#[non_exhaustive]
pub enum ParseError {
    /// The input is missing, unreadable, or could not be partitioned.
    Input(InputError),
    /// An in-process aggregation pass failed (no worker left to recover it).
    Aggregate(AggregateError),
    /// The output file could not be created or written.
    Output(OutputError),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input(err) => write!(f, "{err}"),
            Self::Aggregate(err) => write!(f, "{err}"),
            Self::Output(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Input(err) => Some(err),
            Self::Aggregate(err) => Some(err),
            Self::Output(err) => Some(err),
        }
    }
}

impl From<InputError> for ParseError {
    fn from(err: InputError) -> Self {
        Self::Input(err)
    }
}

impl From<AggregateError> for ParseError {
    fn from(err: AggregateError) -> Self {
        Self::Aggregate(err)
    }
}

impl From<OutputError> for ParseError {
    fn from(err: OutputError) -> Self {
        Self::Output(err)
    }
}
