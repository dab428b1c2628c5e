//! Directory decoders.
//!
//! Per §9 DESIGN NOTES, directories are modelled as a tagged variant rather than a branch on
//! fork type buried inside a single reader: [`DirectoryBacking`] selects one of the three
//! on-disk encodings, and [`Directory`] gives a uniform `iterate()`/`lookup()` capability over
//! whichever one applies.
//!
//! Only the shortform encoding omits `.`/`..` from its on-disk bytes — block and leaf-form
//! directories carry them as ordinary data records, written by the allocator like any other
//! entry. So the synthetic injection in [`Directory::iterate`]/[`Directory::lookup`] applies to
//! shortform only; the other two encodings surface their real `.`/`..` records as-is.

pub mod block;
pub mod leaf;
pub mod shortform;

use crate::error::{corrupt_directory, Result};
use crate::io_context::IoContext;
use crate::xfs::extent::ExtentRecord;
use crate::xfs::inode::{ForkData, Inode};

/// A single decoded directory entry, as surfaced to callers (§3 DATA MODEL).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub name: Vec<u8>,
    pub inode_number: u64,
    pub file_type_hint: Option<u8>,
}

/// Which on-disk encoding backs a directory inode's data fork.
enum DirectoryBacking {
    /// Inline bytes, read straight from the inode's local data fork. Carries the inode's own
    /// number and its parsed parent field, since shortform entries don't include `.`/`..`.
    Shortform { bytes: Vec<u8>, self_inode: u64, parent_inode: u64 },
    /// Exactly one extent, sized to one directory block.
    Block(ExtentRecord),
    /// More than one extent: a full data/leaf/freespace layout.
    Leaf(Vec<ExtentRecord>),
}

/// A decoded directory: the inode's `.`/`..` entries (synthetic for shortform, real for the
/// other two encodings) plus its on-disk children.
pub struct Directory {
    backing: DirectoryBacking,
}

impl Directory {
    /// Builds a [`Directory`] view over `inode`, which must be a directory inode.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDirectory` if the data fork holds an unexpected format/extent shape for
    /// a directory (e.g. a `dev` or `uuid` fork, or a `local` fork whose parent field cannot be
    /// parsed).
    pub fn from_inode(inode: &Inode) -> Result<Self> {
        if !inode.is_directory() {
            return Err(corrupt_directory("inode is not a directory"));
        }
        let backing = match &inode.data_fork {
            ForkData::Local(bytes) => DirectoryBacking::Shortform {
                parent_inode: shortform::parent_inode(bytes)?,
                self_inode: inode.inode_number,
                bytes: bytes.clone(),
            },
            ForkData::Extents(extents) if extents.len() == 1 => {
                DirectoryBacking::Block(extents[0])
            }
            ForkData::Extents(extents) => DirectoryBacking::Leaf(extents.clone()),
            ForkData::Dev(_) | ForkData::Uuid(_) => {
                return Err(corrupt_directory("directory inode has a non-directory fork format"))
            }
        };
        Ok(Self { backing })
    }

    /// Returns every entry in on-disk traversal order, `.` and `..` first.
    ///
    /// # Errors
    ///
    /// Returns `CorruptDirectory` on a malformed block, and propagates `IoError`/`Aborted` for
    /// leaf-form directories, which must read their data blocks through `ctx`.
    pub fn iterate(&self, ctx: &IoContext) -> Result<Vec<DirectoryEntry>> {
        match &self.backing {
            DirectoryBacking::Shortform { bytes, self_inode, parent_inode } => {
                let mut entries = synthetic_dot_entries(*self_inode, *parent_inode);
                entries.extend(shortform::iterate_entries(ctx.geometry(), bytes)?);
                Ok(entries)
            }
            DirectoryBacking::Block(extent) => {
                let buf = block::read_block(ctx, *extent)?;
                block::iterate_entries(ctx.geometry(), &buf)
            }
            DirectoryBacking::Leaf(extents) => leaf::iterate_data_blocks(ctx, extents),
        }
    }

    /// Looks up a single entry by name. Returns `Ok(None)` for a genuine miss (`NotFound` is a
    /// successful absence, per §7).
    ///
    /// # Errors
    ///
    /// Same as [`Self::iterate`]. Leaf-form directories use the on-disk hash index rather than a
    /// full scan.
    pub fn lookup(&self, ctx: &IoContext, name: &[u8]) -> Result<Option<DirectoryEntry>> {
        match &self.backing {
            DirectoryBacking::Shortform { bytes, self_inode, parent_inode } => {
                if let Some(entry) = lookup_synthetic(name, *self_inode, *parent_inode) {
                    return Ok(Some(entry));
                }
                let all = shortform::iterate_entries(ctx.geometry(), bytes)?;
                Ok(all.into_iter().find(|e| e.name == name))
            }
            DirectoryBacking::Block(extent) => {
                let buf = block::read_block(ctx, *extent)?;
                let all = block::iterate_entries(ctx.geometry(), &buf)?;
                Ok(all.into_iter().find(|e| e.name == name))
            }
            DirectoryBacking::Leaf(extents) => leaf::lookup_by_name(ctx, extents, name),
        }
    }
}

fn synthetic_dot_entries(self_inode: u64, parent_inode: u64) -> Vec<DirectoryEntry> {
    vec![
        DirectoryEntry {
            name: b".".to_vec(),
            inode_number: self_inode,
            file_type_hint: None,
        },
        DirectoryEntry {
            name: b"..".to_vec(),
            inode_number: parent_inode,
            file_type_hint: None,
        },
    ]
}

fn lookup_synthetic(name: &[u8], self_inode: u64, parent_inode: u64) -> Option<DirectoryEntry> {
    synthetic_dot_entries(self_inode, parent_inode)
        .into_iter()
        .find(|e| e.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceByteSource;
    use crate::geometry::{Geometry, IncompatFeatures};
    use crate::xfs::inode::{FileType, Inode, Timestamp};
    use std::sync::Arc;

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

    fn zero_time() -> Timestamp {
        Timestamp { seconds: 0, nanoseconds: 0 }
    }

    fn directory_inode(inode_number: u64, data_fork: ForkData) -> Inode {
        Inode {
            inode_number,
            format_version: 2,
            file_type: FileType::Directory,
            file_mode: 0o755,
            link_count: 2,
            uid: 0,
            gid: 0,
            size: 0,
            block_count: 0,
            atime: zero_time(),
            mtime: zero_time(),
            ctime: zero_time(),
            crtime: None,
            generation: 0,
            data_fork,
            attr_fork: None,
            number_of_data_extents: 0,
            number_of_attr_extents: 0,
            attr_fork_offset: None,
        }
    }

    fn shortform_bytes(parent: u32, entries: &[(&[u8], u32)]) -> Vec<u8> {
        let mut buf = vec![entries.len() as u8, 0u8];
        buf.extend_from_slice(&parent.to_be_bytes());
        for (name, child_ino) in entries {
            buf.push(name.len() as u8);
            buf.extend_from_slice(&[0, 0]);
            buf.extend_from_slice(name);
            buf.extend_from_slice(&child_ino.to_be_bytes());
        }
        buf
    }

    #[test]
    fn shortform_directory_surfaces_synthetic_dot_entries_first() {
        let bytes = shortform_bytes(1, &[(b"child", 5)]);
        let inode = directory_inode(2, ForkData::Local(bytes));
        let dir = Directory::from_inode(&inode).unwrap();
        let ctx = IoContext::new(Arc::new(SliceByteSource::new(Vec::new())), geo(), false, None);

        let entries = dir.iterate(&ctx).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, b".");
        assert_eq!(entries[0].inode_number, 2);
        assert_eq!(entries[1].name, b"..");
        assert_eq!(entries[1].inode_number, 1);
        assert_eq!(entries[2].name, b"child");
        assert_eq!(entries[2].inode_number, 5);
    }

    #[test]
    fn shortform_lookup_resolves_both_synthetic_and_real_entries() {
        let bytes = shortform_bytes(1, &[(b"child", 5)]);
        let inode = directory_inode(2, ForkData::Local(bytes));
        let dir = Directory::from_inode(&inode).unwrap();
        let ctx = IoContext::new(Arc::new(SliceByteSource::new(Vec::new())), geo(), false, None);

        assert_eq!(dir.lookup(&ctx, b"..").unwrap().unwrap().inode_number, 1);
        assert_eq!(dir.lookup(&ctx, b"child").unwrap().unwrap().inode_number, 5);
        assert!(dir.lookup(&ctx, b"missing").unwrap().is_none());
    }

    #[test]
    fn single_extent_fork_is_treated_as_block_form() {
        let extent = ExtentRecord { start_logical_block: 0, start_physical_block: 1, length: 1, unwritten: false };
        let inode = directory_inode(2, ForkData::Extents(vec![extent]));
        let dir = Directory::from_inode(&inode).unwrap();
        assert!(matches!(dir.backing, DirectoryBacking::Block(_)));
    }

    #[test]
    fn multi_extent_fork_is_treated_as_leaf_form() {
        let extents = vec![
            ExtentRecord { start_logical_block: 0, start_physical_block: 1, length: 1, unwritten: false },
            ExtentRecord { start_logical_block: 1, start_physical_block: 2, length: 1, unwritten: false },
        ];
        let inode = directory_inode(2, ForkData::Extents(extents));
        let dir = Directory::from_inode(&inode).unwrap();
        assert!(matches!(dir.backing, DirectoryBacking::Leaf(_)));
    }

    #[test]
    fn non_directory_fork_format_is_rejected() {
        let inode = directory_inode(2, ForkData::Dev(0));
        assert!(Directory::from_inode(&inode).is_err());
    }
}
