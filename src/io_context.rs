//! The shared, immutable context every decoder operates against.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::byte_source::ByteSource;
use crate::error::{io_error, ErrorKind, Result};
use crate::geometry::Geometry;

/// A callback invoked when a non-fatal condition is detected (currently: v3 checksum
/// mismatches in non-strict mode). Registered once at [`crate::volume::Volume::open`] time.
pub type WarningCallback = dyn Fn(&str) + Send + Sync;

/// Holds the decoded [`Geometry`] plus the [`ByteSource`] every decoder reads through.
///
/// Immutable after construction and freely shared by reference or by cloning the inner `Arc`s:
/// there is no interior mutability here beyond the cooperative abort flag, which is designed
/// to be flipped from another thread while decoders are running.
#[derive(Clone)]
pub struct IoContext {
    source: Arc<dyn ByteSource>,
    geometry: Geometry,
    abort: Arc<AtomicBool>,
    strict_checksums: bool,
    warn: Option<Arc<WarningCallback>>,
}

impl IoContext {
    pub(crate) fn new(
        source: Arc<dyn ByteSource>,
        geometry: Geometry,
        strict_checksums: bool,
        warn: Option<Arc<WarningCallback>>,
    ) -> Self {
        Self {
            source,
            geometry,
            abort: Arc::new(AtomicBool::new(false)),
            strict_checksums,
            warn,
        }
    }

    /// Returns the volume's decoded geometry.
    #[must_use]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Reads `buffer.len()` bytes at `offset` from the underlying source.
    ///
    /// # Errors
    ///
    /// Returns `IoError` on an underlying failure or a short read.
    pub fn read_at(&self, offset: u64, buffer: &mut [u8]) -> Result<()> {
        self.check_abort()?;
        let filled = self.source.read_at(offset, buffer)?;
        if !filled {
            return Err(io_error(format!(
                "short read at offset {offset}, expected {} bytes",
                buffer.len()
            )));
        }
        Ok(())
    }

    /// Reads exactly `len` bytes at `offset`, returning them as an owned buffer.
    ///
    /// # Errors
    ///
    /// Returns `IoError` on an underlying failure or a short read.
    pub fn read_vec_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.read_at(offset, &mut buffer)?;
        Ok(buffer)
    }

    /// Returns `Err(Aborted)` if [`Self::signal_abort`] was called and not yet cleared.
    ///
    /// Polled at the entry point of every significant decoder (inode decode, directory
    /// decode, btree node load, file-read-range chunk) per §5 CONCURRENCY & RESOURCE MODEL.
    pub fn check_abort(&self) -> Result<()> {
        if self.abort.load(Ordering::Acquire) {
            return Err(ErrorKind::Aborted.into());
        }
        Ok(())
    }

    /// Sets the cooperative abort flag. Does not poison the volume: a subsequent
    /// [`Self::clear_abort`] and retry is permitted.
    pub(crate) fn signal_abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    /// Clears the abort flag. The flag is never auto-cleared by a successful operation, so
    /// callers must clear it explicitly to preserve caller intent across re-open (see
    /// §9 DESIGN NOTES, open question on abort-flag lifecycle).
    pub(crate) fn clear_abort(&self) {
        self.abort.store(false, Ordering::Release);
    }

    /// `true` if v3 checksum mismatches should be surfaced as `ChecksumMismatch` errors rather
    /// than warnings.
    #[must_use]
    pub fn strict_checksums(&self) -> bool {
        self.strict_checksums
    }

    /// Emits a checksum-mismatch warning through the registered callback, if any.
    pub(crate) fn warn(&self, message: &str) {
        if let Some(cb) = &self.warn {
            cb(message);
        } else {
            log::warn!("{message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceByteSource;
    use crate::geometry::IncompatFeatures;
    use std::sync::Mutex;

    fn geo() -> Geometry {
        Geometry {
            block_size: 4096,
            block_size_log2: 12,
            sector_size: 512,
            directory_block_size: 4096,
            dir_block_log2: 0,
            inodes_per_block: 16,
            inodes_per_block_log2: 4,
            inode_size: 256,
            ag_block_count: 1024,
            ag_block_log2: 10,
            ag_count: 1,
            total_blocks: 1024,
            ag_relative_inode_bits: 14,
            root_inode: 0,
            has_v3_inodes: false,
            has_crc: false,
            has_ftype: false,
            incompat_features: IncompatFeatures(0),
            has_nrext64: false,
            label_bytes: [0; 12],
        }
    }

    fn ctx_with(data: Vec<u8>, warn: Option<Arc<WarningCallback>>) -> IoContext {
        IoContext::new(Arc::new(SliceByteSource::new(data)), geo(), false, warn)
    }

    #[test]
    fn read_at_fails_once_abort_is_signalled() {
        let ctx = ctx_with(vec![0u8; 16], None);
        let mut buf = [0u8; 4];
        ctx.read_at(0, &mut buf).unwrap();

        ctx.signal_abort();
        let err = ctx.read_at(0, &mut buf).unwrap_err();
        assert!(matches!(err.kind(), &ErrorKind::Aborted));

        ctx.clear_abort();
        ctx.read_at(0, &mut buf).unwrap();
    }

    #[test]
    fn read_vec_at_reports_a_short_read_as_an_io_error() {
        let ctx = ctx_with(vec![1, 2, 3], None);
        assert!(ctx.read_vec_at(0, 8).is_err());
    }

    #[test]
    fn warn_invokes_the_registered_callback_instead_of_logging() {
        let captured: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let captured_for_cb = captured.clone();
        let cb: Arc<WarningCallback> = Arc::new(move |msg: &str| {
            captured_for_cb.lock().unwrap().push(msg.to_string());
        });
        let ctx = ctx_with(Vec::new(), Some(cb));

        ctx.warn("checksum mismatch in inode 7");

        let messages = captured.lock().unwrap();
        assert_eq!(messages.as_slice(), ["checksum mismatch in inode 7"]);
    }

    #[test]
    fn warn_without_a_callback_does_not_panic() {
        let ctx = ctx_with(Vec::new(), None);
        ctx.warn("no callback registered, falls through to the log crate");
    }
}
