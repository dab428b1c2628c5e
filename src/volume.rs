//! Volume facade: the entry point that opens a [`ByteSource`], decodes its superblock, and
//! exposes root-directory retrieval, inode lookup, and path resolution. See §6 and §9.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::byte_source::ByteSource;
use crate::error::{invalid_argument, ErrorKind, Result};
use crate::file_entry::FileEntry;
use crate::io_context::{IoContext, WarningCallback};
use crate::path::resolve;
use crate::xfs::inode::read_inode;
use crate::xfs::superblock::read_superblock;

/// Open-mode flag accepted by [`Volume::open`]. Only read-only access is supported (§6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
}

/// Optional settings accepted at open time.
#[derive(Default)]
pub struct OpenOptions {
    /// Upgrades v3 metadata checksum mismatches from warnings to `ChecksumMismatch` errors.
    pub strict_checksums: bool,
    /// Invoked for non-fatal conditions detected during decoding (currently: checksum
    /// mismatches in non-strict mode).
    pub warning_callback: Option<Arc<WarningCallback>>,
}

/// An opened XFS volume. Owns the [`ByteSource`] (via the shared [`IoContext`]) and tracks how
/// many [`FileEntry`] handles are currently outstanding, so [`Volume::close`] can refuse to
/// release the source while any remain open (§5 CONCURRENCY & RESOURCE MODEL).
pub struct Volume {
    ctx: IoContext,
    open_entries: Arc<AtomicUsize>,
}

impl Volume {
    /// Opens `source` as an XFS volume, decoding its superblock eagerly.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `mode` is not [`OpenMode::ReadOnly`]. Returns
    /// `CorruptSuperblock`/`UnsupportedFormat` per [`crate::xfs::superblock::read_superblock`].
    pub fn open(source: Arc<dyn ByteSource>, mode: OpenMode, options: OpenOptions) -> Result<Self> {
        if mode != OpenMode::ReadOnly {
            return Err(invalid_argument("only read-only open mode is supported"));
        }
        let geometry = read_superblock(source.as_ref())?;
        let ctx = IoContext::new(
            source,
            geometry,
            options.strict_checksums,
            options.warning_callback,
        );
        Ok(Self {
            ctx,
            open_entries: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Closes the volume.
    ///
    /// # Errors
    ///
    /// Returns `ResourceBusy` if any [`FileEntry`] produced by this volume is still alive.
    pub fn close(self) -> Result<()> {
        if self.open_entries.load(Ordering::Acquire) != 0 {
            return Err(ErrorKind::ResourceBusy.into());
        }
        Ok(())
    }

    /// Sets the cooperative abort flag; see §4.9.
    pub fn signal_abort(&self) {
        self.ctx.signal_abort();
    }

    /// Clears a previously set abort flag. Not auto-cleared on success, per §9 DESIGN NOTES.
    pub fn clear_abort(&self) {
        self.ctx.clear_abort();
    }

    /// Returns the volume label, if it decodes as valid UTF-8 after trimming NUL padding.
    #[must_use]
    pub fn get_label(&self) -> Option<String> {
        let raw = &self.ctx.geometry().label_bytes;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        std::str::from_utf8(&raw[..end]).ok().map(str::to_owned)
    }

    /// Returns a [`FileEntry`] for the root directory.
    ///
    /// # Errors
    ///
    /// Propagates errors from decoding the root inode.
    pub fn get_root_directory(&self) -> Result<FileEntry> {
        let root_inode_number = self.ctx.geometry().root_inode;
        let inode = read_inode(&self.ctx, root_inode_number)?;
        Ok(FileEntry::new(
            self.ctx.clone(),
            inode,
            None,
            None,
            self.open_entries.clone(),
        ))
    }

    /// Returns a [`FileEntry`] for `inode_number`. Returns `Ok(None)` if the inode number
    /// decomposes to an AG outside the volume, rather than erroring, since the public surface
    /// treats lookup-miss as a sentinel-null result (§7).
    ///
    /// # Errors
    ///
    /// Propagates `CorruptInode` and I/O errors encountered while decoding.
    pub fn get_file_entry_by_inode(&self, inode_number: u64) -> Result<Option<FileEntry>> {
        let (ag, _) = self.ctx.geometry().inode_to_ag(inode_number);
        if ag >= self.ctx.geometry().ag_count {
            return Ok(None);
        }
        let inode = read_inode(&self.ctx, inode_number)?;
        Ok(Some(FileEntry::new(
            self.ctx.clone(),
            inode,
            None,
            None,
            self.open_entries.clone(),
        )))
    }

    /// Resolves a UTF-8 path and returns the matching [`FileEntry`]. Returns `Ok(None)` for a
    /// genuine miss. See §4.8.
    ///
    /// # Errors
    ///
    /// Returns `SymlinkLoop` on an excessively long or cyclic symlink chain. Propagates decode
    /// and I/O errors from the path walk.
    pub fn get_file_entry_by_utf8_path(&self, path: &[u8]) -> Result<Option<FileEntry>> {
        let root_inode_number = self.ctx.geometry().root_inode;
        let Some(inode_number) = resolve(&self.ctx, root_inode_number, path)? else {
            return Ok(None);
        };
        let inode = read_inode(&self.ctx, inode_number)?;
        Ok(Some(FileEntry::new(
            self.ctx.clone(),
            inode,
            None,
            None,
            self.open_entries.clone(),
        )))
    }
}
