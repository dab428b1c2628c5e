//! Shortform directories: inline bytes in a directory inode's `local` data fork. See §4.6.
//!
//! ```text
//! count (1) i8count (1) parent_ino (4 or 8, width chosen by i8count != 0)
//! entry* { namelen (1) offset (2) name[namelen] filetype? (1) child_ino (4 or 8) }
//! ```
//!
//! The per-entry inode width is also governed by `i8count`: if any entry's child inode needs
//! more than 32 bits, every entry in the block uses the 8-byte form.

use crate::error::{corrupt_directory, Result};
use crate::geometry::Geometry;
use crate::xfs::dir::DirectoryEntry;

const HEADER_SMALL: usize = 1 + 1 + 4;
const HEADER_LARGE: usize = 1 + 1 + 8;

fn inode_width(i8count: u8) -> usize {
    if i8count == 0 {
        4
    } else {
        8
    }
}

fn read_inode_field(bytes: &[u8], offset: usize, width: usize) -> Result<u64> {
    let slice = bytes
        .get(offset..offset + width)
        .ok_or_else(|| corrupt_directory("shortform inode field truncated"))?;
    Ok(match width {
        4 => u64::from(u32::from_be_bytes(slice.try_into().unwrap())),
        8 => u64::from_be_bytes(slice.try_into().unwrap()),
        _ => unreachable!("inode_width only returns 4 or 8"),
    })
}

/// Reads the parent inode field out of a shortform directory's header.
///
/// # Errors
///
/// Returns `CorruptDirectory` if `bytes` is too short for the header.
pub(super) fn parent_inode(bytes: &[u8]) -> Result<u64> {
    if bytes.len() < 2 {
        return Err(corrupt_directory("shortform header truncated"));
    }
    let i8count = bytes[1];
    read_inode_field(bytes, 2, inode_width(i8count))
}

/// Decodes every on-disk entry (excluding the synthetic `.`/`..` pair, which the caller adds).
///
/// # Errors
///
/// Returns `CorruptDirectory` if the header or any record runs past the end of `bytes`.
pub(super) fn iterate_entries(geometry: &Geometry, bytes: &[u8]) -> Result<Vec<DirectoryEntry>> {
    if bytes.len() < 2 {
        return Err(corrupt_directory("shortform header truncated"));
    }
    let count = bytes[0];
    let i8count = bytes[1];
    let width = inode_width(i8count);
    let header_len = if width == 4 { HEADER_SMALL } else { HEADER_LARGE };
    if bytes.len() < header_len {
        return Err(corrupt_directory("shortform header truncated"));
    }

    let mut entries = Vec::with_capacity(usize::from(count));
    let mut offset = header_len;
    for _ in 0..count {
        let namelen = *bytes
            .get(offset)
            .ok_or_else(|| corrupt_directory("shortform record truncated"))? as usize;
        offset += 1;
        offset += 2; // opaque hash-compat offset field, not interpreted
        let name = bytes
            .get(offset..offset + namelen)
            .ok_or_else(|| corrupt_directory("shortform name truncated"))?
            .to_vec();
        offset += namelen;

        let file_type_hint = if geometry.has_ftype {
            let b = *bytes
                .get(offset)
                .ok_or_else(|| corrupt_directory("shortform filetype byte truncated"))?;
            offset += 1;
            Some(b)
        } else {
            None
        };

        let child_inode = read_inode_field(bytes, offset, width)?;
        offset += width;

        entries.push(DirectoryEntry {
            name,
            inode_number: child_inode,
            file_type_hint,
        });
    }

    let mut seen = hashbrown::HashSet::with_capacity(entries.len());
    for entry in &entries {
        if !seen.insert(entry.name.clone()) {
            return Err(corrupt_directory("duplicate name in shortform directory"));
        }
    }

    Ok(entries)
}
