//! Superblock decoding.
//!
//! Reads allocation group 0's superblock (always at byte offset 0) and derives the
//! [`Geometry`] every other decoder in the crate depends on. Fields are read by fixed byte
//! offset rather than overlaid with a `#[repr(C)]` struct: the on-disk layout mixes 1-, 2-,
//! 4-, 8- and 16-byte fields with no padding, and reading by offset keeps that contract
//! explicit instead of leaning on the target's struct layout rules.

use crate::byte_source::ByteSource;
use crate::error::{corrupt_superblock, unsupported, Result};
use crate::geometry::{Features2, Geometry, IncompatFeatures};

/// "XFSB"
const XFS_SB_MAGIC: u32 = 0x5846_5342;

/// Superblock bytes read up front; enough to cover every v5 field this crate inspects.
const SUPERBLOCK_READ_SIZE: usize = 288;

fn be32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn be64(buf: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(buf[offset..offset + 8].try_into().unwrap())
}

fn be16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes(buf[offset..offset + 2].try_into().unwrap())
}

/// Reads and validates the superblock, returning the derived [`Geometry`].
///
/// # Errors
///
/// Returns `CorruptSuperblock` if the magic does not match or a short read occurs, and
/// `UnsupportedFormat` if the version is below 4, the block size is not a power of two in
/// `[512, 65536]`, the inode size is not one of `{256, 512, 1024, 2048}`, the realtime
/// subvolume is declared non-empty, or a v5 volume sets an incompat feature bit this decoder
/// does not understand.
pub fn read_superblock(source: &dyn ByteSource) -> Result<Geometry> {
    let mut buf = [0u8; SUPERBLOCK_READ_SIZE];
    let filled = source.read_at(0, &mut buf)?;
    if !filled {
        return Err(corrupt_superblock("short read of superblock"));
    }

    let magic = be32(&buf, 0);
    if magic != XFS_SB_MAGIC {
        return Err(corrupt_superblock("bad magic"));
    }

    let block_size = be32(&buf, 4);
    if !block_size.is_power_of_two() || !(512..=65536).contains(&block_size) {
        return Err(unsupported("block size out of range"));
    }
    let block_size_log2 = buf[120];
    if 1u32.checked_shl(u32::from(block_size_log2)) != Some(block_size) {
        return Err(corrupt_superblock("block_size_log2 inconsistent with block_size"));
    }

    let total_blocks = be64(&buf, 8);
    let rblocks = be64(&buf, 16);
    let rextents = be64(&buf, 24);
    if rblocks != 0 || rextents != 0 {
        return Err(unsupported("realtime subvolume is not supported"));
    }

    let root_inode = be64(&buf, 56);

    let ag_block_count = be32(&buf, 84);
    let ag_count = be32(&buf, 88);

    let versionnum = be16(&buf, 100);
    let sector_size = be16(&buf, 102);
    let inode_size = be16(&buf, 104);
    if !matches!(inode_size, 256 | 512 | 1024 | 2048) {
        return Err(unsupported("unsupported inode size"));
    }
    let inodes_per_block = be16(&buf, 106);

    let sect_log = buf[121];
    let inode_log = buf[122];
    let inop_blog = buf[123];
    let ag_blklog = buf[124];

    let features2 = Features2(be32(&buf, 200));

    let version = versionnum & 0x000f;
    if version < 4 {
        return Err(unsupported("superblock version below 4"));
    }
    let has_v3_inodes = version >= 5;
    let has_crc = has_v3_inodes;

    let incompat_features = if has_crc {
        IncompatFeatures(be32(&buf, 216))
    } else {
        IncompatFeatures(0)
    };
    if has_crc {
        let unknown = incompat_features.unknown_bits();
        if unknown != 0 {
            return Err(unsupported(format!(
                "unknown incompat feature bits: {unknown:#x}"
            )));
        }
    }

    let has_ftype = has_v3_inodes
        || incompat_features.contains(IncompatFeatures::FTYPE)
        || features2.contains(Features2::FTYPE);
    let has_nrext64 = has_crc && incompat_features.contains(IncompatFeatures::NREXT64);

    let dir_block_log2 = buf[192];

    let mut label_bytes = [0u8; 12];
    label_bytes.copy_from_slice(&buf[108..120]);

    let ag_relative_inode_bits = inop_blog
        .checked_add(ag_blklog)
        .ok_or_else(|| corrupt_superblock("ag_relative_inode_bits overflow"))?;

    Ok(Geometry {
        block_size,
        block_size_log2,
        sector_size,
        directory_block_size: block_size << dir_block_log2,
        dir_block_log2,
        inodes_per_block,
        inodes_per_block_log2: inop_blog,
        inode_size,
        ag_block_count,
        ag_block_log2: ag_blklog,
        ag_count,
        total_blocks,
        ag_relative_inode_bits,
        root_inode,
        has_v3_inodes,
        has_crc,
        has_ftype,
        incompat_features,
        has_nrext64,
        label_bytes,
    })
    .and_then(|geo| validate_geometry(&buf, geo, sect_log, inode_log))
}


fn validate_geometry(
    buf: &[u8],
    geo: Geometry,
    sect_log: u8,
    inode_log: u8,
) -> Result<Geometry> {
    if 1u32.checked_shl(u32::from(sect_log)) != Some(u32::from(geo.sector_size)) {
        return Err(corrupt_superblock("sector_size_log2 inconsistent"));
    }
    if 1u32.checked_shl(u32::from(inode_log)) != Some(u32::from(geo.inode_size)) {
        return Err(corrupt_superblock("inode_size_log2 inconsistent"));
    }
    if u32::from(geo.inodes_per_block) * u32::from(geo.inode_size) != geo.block_size {
        return Err(corrupt_superblock(
            "inodes_per_block * inode_size != block_size",
        ));
    }
    let _ = buf;
    Ok(geo)
}
