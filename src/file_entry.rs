//! The caller-facing file/directory handle. See §3 DATA MODEL and §6 EXTERNAL INTERFACES.
//!
//! A [`FileEntry`] is a value: it holds a decoded snapshot of its inode plus a cheap clone of
//! the volume's [`IoContext`], not an owning reference to the volume itself. Per §9 DESIGN
//! NOTES, the parent link is a weak back-reference (an inode number plus the name under which
//! this entry was found) that is re-resolved on demand rather than an owning pointer, which
//! would otherwise make a directory tree a cycle of `Arc`s.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::{corrupt_directory, Result};
use crate::io_context::IoContext;
use crate::path::symlink_target_bytes;
use crate::xfs::attr::{read_attributes, Attribute};
use crate::xfs::dir::{Directory, DirectoryEntry};
use crate::xfs::inode::{read_inode, Inode, Timestamp};
use crate::xfs::reader::read_range;

/// A non-owning reference to the directory a [`FileEntry`] was looked up from: just the inode
/// number, re-resolved into a fresh inode read on demand rather than held as a live pointer.
#[derive(Clone, Copy, Debug)]
struct ParentRef {
    inode_number: u64,
}

/// A handle to one inode plus the name it was found under, if any.
///
/// Cloning an [`IoContext`] is cheap (it is built from `Arc`s), so a `FileEntry` is cheap to
/// hold onto; the [`Volume`](crate::volume::Volume) that produced it tracks how many are live
/// via an atomic counter so `volume_close` can refuse to tear down a volume with entries still
/// outstanding (§5 CONCURRENCY & RESOURCE MODEL).
pub struct FileEntry {
    ctx: IoContext,
    inode: Inode,
    name: Option<Vec<u8>>,
    parent: Option<ParentRef>,
    open_entries: Arc<AtomicUsize>,
}

impl Drop for FileEntry {
    fn drop(&mut self) {
        self.open_entries.fetch_sub(1, Ordering::AcqRel);
    }
}

impl FileEntry {
    pub(crate) fn new(
        ctx: IoContext,
        inode: Inode,
        name: Option<Vec<u8>>,
        parent_inode_number: Option<u64>,
        open_entries: Arc<AtomicUsize>,
    ) -> Self {
        open_entries.fetch_add(1, Ordering::AcqRel);
        Self {
            ctx,
            inode,
            name,
            parent: parent_inode_number.map(|inode_number| ParentRef { inode_number }),
            open_entries,
        }
    }

    #[must_use]
    pub fn get_inode_number(&self) -> u64 {
        self.inode.inode_number
    }

    #[must_use]
    pub fn get_file_mode(&self) -> u16 {
        self.inode.file_mode
    }

    #[must_use]
    pub fn get_owner(&self) -> u32 {
        self.inode.uid
    }

    #[must_use]
    pub fn get_group(&self) -> u32 {
        self.inode.gid
    }

    #[must_use]
    pub fn get_access_time(&self) -> Timestamp {
        self.inode.atime
    }

    #[must_use]
    pub fn get_modification_time(&self) -> Timestamp {
        self.inode.mtime
    }

    #[must_use]
    pub fn get_inode_change_time(&self) -> Timestamp {
        self.inode.ctime
    }

    #[must_use]
    pub fn get_creation_time(&self) -> Option<Timestamp> {
        self.inode.crtime
    }

    #[must_use]
    pub fn get_size(&self) -> u64 {
        self.inode.size
    }

    #[must_use]
    pub fn get_name(&self) -> Option<&[u8]> {
        self.name.as_deref()
    }

    /// Reads the target of a symlink entry.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDirectory` if this entry is not a symlink. Propagates I/O errors reading
    /// an extent-backed target.
    pub fn get_symlink_target(&self) -> Result<Vec<u8>> {
        if !self.inode.is_symlink() {
            return Err(corrupt_directory("get_symlink_target on a non-symlink entry"));
        }
        symlink_target_bytes(&self.ctx, &self.inode)
    }

    fn directory(&self) -> Result<Directory> {
        Directory::from_inode(&self.inode)
    }

    /// Number of children, including the synthetic `.` and `..` entries.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDirectory` if this entry is not a directory, or on a malformed backing
    /// structure. Propagates I/O errors for leaf-form directories.
    pub fn get_number_of_sub_entries(&self) -> Result<usize> {
        Ok(self.directory()?.iterate(&self.ctx)?.len())
    }

    /// Returns the `index`-th child in on-disk traversal order (`.` and `..` included).
    ///
    /// # Errors
    ///
    /// Same as [`Self::get_number_of_sub_entries`]. Returns `OutOfBounds` if `index` is past
    /// the last entry.
    pub fn get_sub_entry_by_index(&self, index: usize) -> Result<FileEntry> {
        let entries = self.directory()?.iterate(&self.ctx)?;
        let entry = entries
            .get(index)
            .ok_or_else(|| crate::error::ErrorKind::OutOfBounds)?;
        self.entry_to_file_entry(entry)
    }

    /// Looks up a child by name. Returns `Ok(None)` for a genuine miss.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDirectory` if this entry is not a directory. Propagates errors from the
    /// backing directory decoder.
    pub fn get_sub_entry_by_utf8_name(&self, name: &[u8]) -> Result<Option<FileEntry>> {
        match self.directory()?.lookup(&self.ctx, name)? {
            Some(entry) => Ok(Some(self.entry_to_file_entry(&entry)?)),
            None => Ok(None),
        }
    }

    fn entry_to_file_entry(&self, entry: &DirectoryEntry) -> Result<FileEntry> {
        let child_inode = read_inode(&self.ctx, entry.inode_number)?;
        Ok(FileEntry::new(
            self.ctx.clone(),
            child_inode,
            Some(entry.name.clone()),
            Some(self.inode.inode_number),
            self.open_entries.clone(),
        ))
    }

    fn attributes(&self) -> Result<Vec<Attribute>> {
        match &self.inode.attr_fork {
            None => Ok(Vec::new()),
            Some(fork) => read_attributes(&self.ctx, fork),
        }
    }

    /// # Errors
    ///
    /// Returns `CorruptAttribute` on a malformed attr fork. Propagates I/O errors.
    pub fn get_number_of_extended_attributes(&self) -> Result<usize> {
        Ok(self.attributes()?.len())
    }

    /// # Errors
    ///
    /// Same as [`Self::get_number_of_extended_attributes`]. Returns `OutOfBounds` if `index` is
    /// past the last attribute.
    pub fn get_extended_attribute_by_index(&self, index: usize) -> Result<Attribute> {
        self.attributes()?
            .into_iter()
            .nth(index)
            .ok_or_else(|| crate::error::ErrorKind::OutOfBounds.into())
    }

    /// Reads up to `length` bytes of file content starting at logical `offset`, clamped to the
    /// file's reported size.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying extent/btree reads.
    pub fn read_buffer_at_offset(&self, offset: u64, length: u64) -> Result<Vec<u8>> {
        read_range(&self.ctx, &self.inode.data_fork, self.inode.size, offset, length)
    }

    /// Re-resolves the parent back-reference into a fresh [`FileEntry`], if one was recorded.
    ///
    /// # Errors
    ///
    /// Propagates errors from re-reading the parent inode.
    pub fn parent_entry(&self) -> Result<Option<FileEntry>> {
        let Some(parent) = &self.parent else {
            return Ok(None);
        };
        let parent_inode = read_inode(&self.ctx, parent.inode_number)?;
        Ok(Some(FileEntry::new(
            self.ctx.clone(),
            parent_inode,
            None,
            None,
            self.open_entries.clone(),
        )))
    }
}
