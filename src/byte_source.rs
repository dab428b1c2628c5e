//! The minimal seek+read contract a volume image must satisfy.
//!
//! This crate never reads a disk, file, or stream directly: every decoder goes through a
//! [`ByteSource`] handed to it via the [`crate::io_context::IoContext`]. Constructing,
//! opening, or pooling the underlying storage is the caller's responsibility; this module
//! only defines the contract and two convenience adapters (a file and an in-memory buffer).

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Mutex;

use crate::error::{io_error, Result};

/// A seekable source of bytes representing a raw volume image.
///
/// Implementors are assumed stable for the lifetime of the [`crate::volume::Volume`] that
/// wraps them: nothing in this crate re-reads a region expecting to observe a different value
/// than a previous read of the same range.
///
/// `read_at` must either fill `buffer` completely or report that the source ended before
/// `buffer` could be filled — partial reads of structural metadata are never accepted by the
/// decoders built on top of this trait.
pub trait ByteSource: Send + Sync {
    /// Reads `buffer.len()` bytes starting at `offset`.
    ///
    /// Returns `Ok(true)` if `buffer` was filled completely, `Ok(false)` if the source ended
    /// before `buffer` could be filled (a structural short read), or `Err` on an underlying
    /// I/O failure.
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<bool>;

    /// Total length of the source in bytes, when known.
    fn len(&self) -> Result<u64>;

    /// Returns `true` if the source reports zero length.
    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// A [`ByteSource`] backed by an open file, read via `pread`-style positioned reads.
///
/// A single [`Mutex`]-guarded cursor is used so the adapter works even on platforms without a
/// positioned-read syscall; callers that need concurrent reads to truly overlap should supply
/// their own [`ByteSource`] backed by multiple file descriptors instead.
pub struct FileByteSource {
    file: Mutex<File>,
    len: u64,
}

impl FileByteSource {
    /// Opens `path` read-only and wraps it as a [`ByteSource`].
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = File::open(path).map_err(|e| io_error(e.to_string()))?;
        let len = file
            .metadata()
            .map_err(|e| io_error(e.to_string()))?
            .len();
        Ok(Self {
            file: Mutex::new(file),
            len,
        })
    }
}

impl ByteSource for FileByteSource {
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<bool> {
        if buffer.is_empty() {
            return Ok(true);
        }
        let mut guard = self.file.lock().map_err(|_| io_error("poisoned file lock"))?;
        guard
            .seek(SeekFrom::Start(offset))
            .map_err(|e| io_error(e.to_string()))?;
        match read_exact_or_eof(&mut *guard, buffer) {
            Ok(filled) => Ok(filled),
            Err(e) => Err(io_error(e.to_string())),
        }
    }

    fn len(&self) -> Result<u64> {
        Ok(self.len)
    }
}

/// A [`ByteSource`] backed by an in-memory byte buffer, useful for tests and small images.
pub struct SliceByteSource {
    data: Vec<u8>,
}

impl SliceByteSource {
    /// Wraps an owned buffer as a [`ByteSource`].
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteSource for SliceByteSource {
    fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<bool> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(buffer.is_empty());
        }
        let available = &self.data[offset..];
        if available.len() < buffer.len() {
            return Ok(false);
        }
        buffer.copy_from_slice(&available[..buffer.len()]);
        Ok(true)
    }

    fn len(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }
}

fn read_exact_or_eof(reader: &mut impl Read, buffer: &mut [u8]) -> io::Result<bool> {
    let mut total = 0;
    while total < buffer.len() {
        match reader.read(&mut buffer[total..]) {
            Ok(0) => return Ok(false),
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}
