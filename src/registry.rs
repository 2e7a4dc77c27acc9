//! Slug discovery and dense pre-multiplied path ids.
//!
//! The registry maps each distinct URL slug to `id * D`, where `D` is the
//! day count of the reporting window, so the hot loop locates a counter cell
//! with a single addition (`offset + day_id`). Ids are assigned in discovery
//! order and the registry is append-only; nothing is ever renumbered, which
//! is what makes the report ordering deterministic.
//!
//! Discovery runs in two phases:
//! 1. Seed phase: previously-seen URIs, if supplied, get the lowest ids so
//!    the hottest counter rows sit at low offsets.
//! 2. Pre-scan phase: the head of the input (truncated at its last newline)
//!    is walked for any additional slugs.
//!
//! A slug that first appears beyond the pre-scan window is not registered
//! and its lines are silently skipped at parse time.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

use ahash::AHashMap;
use memchr::{memchr_iter, memrchr};

use crate::{LINE_TAIL_LEN, URL_PREFIX, URL_PREFIX_LEN};

/// Append-only slug registry with pre-multiplied matrix offsets.
pub struct PathRegistry {
    /// Slug bytes to `id * day_stride`. Probed with borrowed slices from the
    /// read buffer; the owned key is allocated once per distinct slug.
    slug_to_offset: AHashMap<Box<[u8]>, u32>,
    /// Slugs in id order, for emission.
    id_to_slug: Vec<Box<[u8]>>,
    day_stride: u32,
}

impl PathRegistry {
    /// Creates an empty registry whose offsets stride by `day_stride`.
    pub fn with_day_stride(day_stride: u32) -> Self {
        Self {
            slug_to_offset: AHashMap::new(),
            id_to_slug: Vec::new(),
            day_stride,
        }
    }

    /// Number of distinct slugs discovered so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.id_to_slug.len()
    }

    /// Returns true when no slug has been discovered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id_to_slug.is_empty()
    }

    /// The day-count stride baked into every stored offset.
    #[inline]
    pub fn day_stride(&self) -> u32 {
        self.day_stride
    }

    /// Total counter-matrix length for the current slug set.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.id_to_slug.len() * self.day_stride as usize
    }

    /// Slug bytes for a path id.
    #[inline]
    pub fn slug(&self, id: usize) -> &[u8] {
        &self.id_to_slug[id]
    }

    /// Pre-multiplied offset for a slug, if registered.
    #[inline]
    pub fn offset_of(&self, slug: &[u8]) -> Option<u32> {
        self.slug_to_offset.get(slug).copied()
    }

    /// Inserts a slug if new and returns its pre-multiplied offset.
    pub fn insert(&mut self, slug: &[u8]) -> u32 {
        if let Some(&offset) = self.slug_to_offset.get(slug) {
            return offset;
        }
        let next = self.id_to_slug.len() as u64 * self.day_stride as u64;
        assert!(next <= u32::MAX as u64, "path registry offset overflow");
        let offset = next as u32;
        let owned: Box<[u8]> = slug.into();
        self.id_to_slug.push(owned.clone());
        self.slug_to_offset.insert(owned, offset);
        offset
    }

    /// Seed phase: registers slugs from previously-seen URIs.
    ///
    /// Entries that do not carry the fixed URL prefix are ignored.
    pub fn seed<I, S>(&mut self, uris: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        for uri in uris {
            if let Some(slug) = uri.as_ref().strip_prefix(URL_PREFIX) {
                self.insert(slug);
            }
        }
    }

    /// Pre-scan phase: walks the head of the input for slugs.
    ///
    /// Reads `min(file_size, window)` bytes from the start of the file,
    /// truncates at the last newline, and inserts the slug of every line
    /// that has the fixed shape. A window without a newline registers
    /// nothing; with no seeds either, the report will be empty.
    pub fn prescan(&mut self, file: &mut File, file_size: u64, window: usize) -> io::Result<()> {
        let want = file_size.min(window as u64) as usize;
        if want == 0 {
            return Ok(());
        }
        let mut buf = vec![0u8; want];
        file.seek(SeekFrom::Start(0))?;
        let got = read_up_to(file, &mut buf)?;
        let Some(last_nl) = memrchr(b'\n', &buf[..got]) else {
            return Ok(());
        };

        let mut start = 0usize;
        for nl in memchr_iter(b'\n', &buf[..=last_nl]) {
            if nl >= start + URL_PREFIX_LEN + LINE_TAIL_LEN {
                self.insert(&buf[start + URL_PREFIX_LEN..nl - LINE_TAIL_LEN]);
            }
            start = nl + 1;
        }
        Ok(())
    }
}

/// Reads until `buf` is full or EOF, retrying on interruption.
pub(crate) fn read_up_to(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
