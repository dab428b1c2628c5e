//! Block-form directories: a single directory block embedded in an extents-format data fork.
//! See §4.6.
//!
//! ```text
//! header (16 bytes v4 "XD2B", 56 bytes v5 "XDB3")
//! entry* { active: inumber(8) namelen(1) name[namelen] filetype?(1) pad tag(2)
//!        | unused: freetag(2)=0xffff length(2) ... tag(2) at record end }
//! leaf_entry[count] { hashval(4) address(4) }   // growing backward from the tail
//! tail { count(4) stale(4) }                    // last 8 bytes of the block
//! ```

use crate::error::{corrupt_directory, Result};
use crate::geometry::Geometry;
use crate::io_context::IoContext;
use crate::xfs::dir::DirectoryEntry;
use crate::xfs::extent::ExtentRecord;

const MAGIC_V4: u32 = 0x5844_3242; // "XD2B"
const MAGIC_V5: u32 = 0x5844_4233; // "XDB3"
const MAGIC_DATA_V4: u32 = 0x5844_3244; // "XD2D"
const MAGIC_DATA_V5: u32 = 0x5844_4433; // "XDD3"
const FREETAG: u16 = 0xffff;

pub(super) fn header_size(has_crc: bool) -> usize {
    if has_crc {
        56
    } else {
        16
    }
}

/// Reads the single directory block for `extent` into memory.
///
/// # Errors
///
/// Returns `CorruptDirectory` if the extent does not span exactly one directory block.
/// Propagates `IoError`/`Aborted` from the underlying read.
pub(super) fn read_block(ctx: &IoContext, extent: ExtentRecord) -> Result<Vec<u8>> {
    let geo = ctx.geometry();
    if extent.length != u64::from(geo.dir_block_fsblocks()) {
        return Err(corrupt_directory(
            "block-form directory extent is not exactly one directory block",
        ));
    }
    let byte_offset = geo.fsblock_to_byte(extent.start_physical_block);
    ctx.read_vec_at(byte_offset, geo.directory_block_size as usize)
        .map_err(|e| e.context("directory block"))
}

fn be32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes(buf[off..off + 4].try_into().unwrap())
}
fn be64(buf: &[u8], off: usize) -> u64 {
    u64::from_be_bytes(buf[off..off + 8].try_into().unwrap())
}
fn be16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes(buf[off..off + 2].try_into().unwrap())
}

/// Decodes the active entries of a single directory-block buffer, stopping at the leaf tail.
///
/// # Errors
///
/// Returns `CorruptDirectory` on a bad magic, a truncated record, or a tail whose declared
/// entry count does not fit in the block.
pub(super) fn iterate_entries(geometry: &Geometry, buf: &[u8]) -> Result<Vec<DirectoryEntry>> {
    if buf.len() < 8 {
        return Err(corrupt_directory("directory block too small for header"));
    }
    let magic = be32(buf, 0);
    let expected = if geometry.has_crc { MAGIC_V5 } else { MAGIC_V4 };
    if magic != expected {
        return Err(corrupt_directory("directory block magic mismatch"));
    }

    let hdr = header_size(geometry.has_crc);
    if buf.len() < hdr + 8 {
        return Err(corrupt_directory("directory block too small for tail"));
    }

    let tail_count = be32(buf, buf.len() - 8) as usize;
    let leaf_bytes = tail_count
        .checked_mul(8)
        .ok_or_else(|| corrupt_directory("leaf entry count overflow"))?;
    let stop = buf
        .len()
        .checked_sub(8 + leaf_bytes)
        .ok_or_else(|| corrupt_directory("leaf tail entry count exceeds block size"))?;
    if stop < hdr {
        return Err(corrupt_directory("leaf tail overlaps directory header"));
    }

    decode_entries(geometry, buf, hdr, stop)
}

/// Decodes a data block from a multi-block (leaf-form) directory: same record layout as a
/// single-block directory, but no trailing leaf tail — every record runs to the end of the
/// block.
///
/// # Errors
///
/// Returns `CorruptDirectory` on a bad magic or a truncated record.
pub(super) fn iterate_data_block_entries(geometry: &Geometry, buf: &[u8]) -> Result<Vec<DirectoryEntry>> {
    if buf.len() < 8 {
        return Err(corrupt_directory("directory data block too small for header"));
    }
    let magic = be32(buf, 0);
    let expected = if geometry.has_crc { MAGIC_DATA_V5 } else { MAGIC_DATA_V4 };
    if magic != expected {
        return Err(corrupt_directory("directory data block magic mismatch"));
    }
    let hdr = header_size(geometry.has_crc);
    decode_entries(geometry, buf, hdr, buf.len())
}

pub(super) fn decode_entries(
    geometry: &Geometry,
    buf: &[u8],
    mut offset: usize,
    stop: usize,
) -> Result<Vec<DirectoryEntry>> {
    let mut entries = Vec::new();
    while offset < stop {
        if offset + 2 > buf.len() {
            return Err(corrupt_directory("directory record header truncated"));
        }
        let maybe_freetag = be16(buf, offset);
        if maybe_freetag == FREETAG {
            if offset + 4 > buf.len() {
                return Err(corrupt_directory("unused record truncated"));
            }
            let length = be16(buf, offset + 2) as usize;
            if length == 0 || offset + length > buf.len() {
                return Err(corrupt_directory("unused record length invalid"));
            }
            offset += length;
            continue;
        }

        if offset + 9 > buf.len() {
            return Err(corrupt_directory("active record truncated before namelen"));
        }
        let inumber = be64(buf, offset);
        let namelen = buf[offset + 8] as usize;
        let name_start = offset + 9;
        let name_end = name_start + namelen;
        if name_end > buf.len() {
            return Err(corrupt_directory("active record name truncated"));
        }
        let name = buf[name_start..name_end].to_vec();

        let mut cursor = name_end;
        let file_type_hint = if geometry.has_ftype {
            let b = *buf
                .get(cursor)
                .ok_or_else(|| corrupt_directory("active record filetype truncated"))?;
            cursor += 1;
            Some(b)
        } else {
            None
        };

        // Records are padded to 8-byte alignment; a 2-byte tag sits immediately before the
        // next 8-byte boundary.
        let unaligned_end = cursor + 2;
        let record_end = (unaligned_end + 7) & !7;
        if record_end > buf.len() {
            return Err(corrupt_directory("active record padding overruns block"));
        }

        entries.push(DirectoryEntry {
            name,
            inode_number: inumber,
            file_type_hint,
        });

        offset = record_end;
    }

    Ok(entries)
}
