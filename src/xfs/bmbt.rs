//! The bmap B+tree (bmbt) fork reader, used when a fork's extent list overflows the inline
//! area and is rooted instead as a btree inside the inode.
//!
//! The root, stored inline in the fork, uses a compact "short-form" layout (no sibling
//! pointers, no checksum, keys then pointers packed tightly). Every block it points to on
//! disk uses the long-form layout with a full header (magic, level, sibling pointers, and for
//! v5 a checksum/owner/LSN/UUID block). Both layouts are walked top-down to a flat stream of
//! leaf-level extent records, identical in shape to an inline extents-format fork.

use crate::error::{corrupt_btree, Result};
use crate::io_context::IoContext;
use crate::xfs::extent::ExtentRecord;

/// V4 bmbt long-form block magic: "BMAP"
const XFS_BMAP_MAGIC: u32 = 0x424d_4150;
/// V5 bmbt long-form block magic: "BMA3"
const XFS_BMAP3_MAGIC: u32 = 0x424d_4133;

fn long_form_header_size(has_v3: bool) -> usize {
    if has_v3 {
        // magic(4) level(2) numrecs(2) leftsib(8) rightsib(8) blkno(8) lsn(8) uuid(16) owner(8) crc(4) pad(4)
        72
    } else {
        // magic(4) level(2) numrecs(2) leftsib(8) rightsib(8)
        24
    }
}

/// Walks a btree-format fork's inline root (`root_bytes`, the raw bytes of the fork area) and
/// returns the flattened leaf extent stream.
///
/// # Errors
///
/// Returns `CorruptBtree` if the root is too small, a pointer leads to a block with a bad
/// magic or inconsistent level, or the structure is otherwise malformed. Propagates `IoError`
/// and `Aborted` from reads performed while descending the tree.
pub fn walk_bmbt_root(ctx: &IoContext, root_bytes: &[u8], fork_capacity: usize) -> Result<Vec<ExtentRecord>> {
    if root_bytes.len() < 4 {
        return Err(corrupt_btree("bmbt root too small"));
    }

    let level = u16::from_be_bytes(root_bytes[0..2].try_into().unwrap());
    let numrecs = u16::from_be_bytes(root_bytes[2..4].try_into().unwrap()) as usize;

    if level == 0 {
        return decode_leaf_records(&root_bytes[4..], numrecs);
    }

    // Short-form interior root: keys[maxrecs] then ptrs[maxrecs], 8 bytes each.
    let maxrecs = fork_capacity.saturating_sub(4) / 16;
    let ptr_start = 4 + maxrecs * 8;

    let mut extents = Vec::new();
    for i in 0..numrecs {
        let off = ptr_start + i * 8;
        if off + 8 > root_bytes.len() {
            return Err(corrupt_btree("bmbt root pointer array truncated"));
        }
        let fsblock = u64::from_be_bytes(root_bytes[off..off + 8].try_into().unwrap());
        walk_block(ctx, fsblock, u32::from(level) - 1, &mut extents)?;
    }
    Ok(extents)
}

fn walk_block(
    ctx: &IoContext,
    fsblock: u64,
    expected_level: u32,
    extents: &mut Vec<ExtentRecord>,
) -> Result<()> {
    ctx.check_abort()?;

    let geo = ctx.geometry();
    let byte_offset = geo.fsblock_to_byte(fsblock);
    let buf = ctx.read_vec_at(byte_offset, geo.block_size as usize)?;

    if buf.len() < 8 {
        return Err(corrupt_btree("bmbt block too small"));
    }

    let magic = u32::from_be_bytes(buf[0..4].try_into().unwrap());
    let expected_magic = if geo.has_v3_inodes {
        XFS_BMAP3_MAGIC
    } else {
        XFS_BMAP_MAGIC
    };
    if magic != expected_magic {
        return Err(corrupt_btree("bmbt block magic mismatch"));
    }

    let level = u16::from_be_bytes(buf[4..6].try_into().unwrap());
    let numrecs = u16::from_be_bytes(buf[6..8].try_into().unwrap()) as usize;
    if u32::from(level) != expected_level {
        return Err(corrupt_btree("bmbt level mismatch"));
    }

    let hdr_size = long_form_header_size(geo.has_v3_inodes);

    if level == 0 {
        extents.extend(decode_leaf_records(&buf[hdr_size..], numrecs)?);
        return Ok(());
    }

    let maxrecs = (geo.block_size as usize - hdr_size) / 16;
    let ptr_start = hdr_size + maxrecs * 8;

    let mut children = Vec::with_capacity(numrecs);
    for i in 0..numrecs {
        let off = ptr_start + i * 8;
        if off + 8 > buf.len() {
            return Err(corrupt_btree("bmbt pointer array truncated"));
        }
        children.push(u64::from_be_bytes(buf[off..off + 8].try_into().unwrap()));
    }

    for child in children {
        walk_block(ctx, child, u32::from(level) - 1, extents)?;
    }

    Ok(())
}

fn decode_leaf_records(buf: &[u8], numrecs: usize) -> Result<Vec<ExtentRecord>> {
    if buf.len() < numrecs * 16 {
        return Err(corrupt_btree("bmbt leaf records truncated"));
    }
    let mut extents = Vec::with_capacity(numrecs);
    for i in 0..numrecs {
        let raw: [u8; 16] = buf[i * 16..i * 16 + 16].try_into().unwrap();
        extents.push(ExtentRecord::unpack(&raw).map_err(|_| corrupt_btree("bad leaf extent record"))?);
    }
    Ok(extents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_source::SliceByteSource;
    use crate::geometry::{Geometry, IncompatFeatures};
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

    fn pack_extent(logical: u64, physical: u64, length: u64) -> [u8; 16] {
        let l0 = (logical & ((1u64 << 54) - 1)) << 9 | (physical >> 43);
        let l1 = (physical & ((1u64 << 43) - 1)) << 21 | (length & ((1u64 << 21) - 1));
        let mut buf = [0u8; 16];
        buf[0..8].copy_from_slice(&l0.to_be_bytes());
        buf[8..16].copy_from_slice(&l1.to_be_bytes());
        buf
    }

    fn ctx_with_image(image: Vec<u8>) -> IoContext {
        IoContext::new(Arc::new(SliceByteSource::new(image)), geo(), false, None)
    }

    #[test]
    fn leaf_root_decodes_inline_without_touching_the_source() {
        // level = 0: the short-form root itself holds the leaf records, no disk block involved.
        let mut root = vec![0u8, 0u8]; // level
        root.extend_from_slice(&1u16.to_be_bytes()); // numrecs
        root.extend_from_slice(&pack_extent(0, 50, 3));

        let ctx = ctx_with_image(Vec::new());
        let extents = walk_bmbt_root(&ctx, &root, root.len()).unwrap();
        assert_eq!(extents.len(), 1);
        assert_eq!(extents[0].start_physical_block, 50);
        assert_eq!(extents[0].length, 3);
    }

    #[test]
    fn interior_root_descends_one_level_to_a_long_form_leaf_block() {
        // Long-form leaf block for fsblock 1, at byte offset 1 * block_size = 4096.
        let mut leaf_block = vec![0u8; 4096];
        leaf_block[0..4].copy_from_slice(&XFS_BMAP_MAGIC.to_be_bytes());
        leaf_block[4..6].copy_from_slice(&0u16.to_be_bytes()); // level = 0
        leaf_block[6..8].copy_from_slice(&1u16.to_be_bytes()); // numrecs = 1
        leaf_block[24..40].copy_from_slice(&pack_extent(0, 900, 8));

        let mut image = vec![0u8; 8192];
        image[4096..4096 + leaf_block.len()].copy_from_slice(&leaf_block);

        // Short-form interior root: level=1, numrecs=1, one key (ignored) then one pointer to
        // fsblock 1. fork_capacity = 20 so maxrecs = (20-4)/16 = 1, ptr_start = 4 + 1*8 = 12.
        let mut root = vec![0u8, 1u8]; // level = 1
        root.extend_from_slice(&1u16.to_be_bytes()); // numrecs
        root.extend_from_slice(&0u64.to_be_bytes()); // key slot (unused by this decoder)
        root.extend_from_slice(&1u64.to_be_bytes()); // pointer: fsblock 1

        let ctx = ctx_with_image(image);
        let extents = walk_bmbt_root(&ctx, &root, 20).unwrap();
        assert_eq!(extents.len(), 1);
        assert_eq!(extents[0].start_physical_block, 900);
        assert_eq!(extents[0].length, 8);
    }

    #[test]
    fn block_with_wrong_magic_is_rejected() {
        let mut leaf_block = vec![0u8; 4096];
        leaf_block[0..4].copy_from_slice(&0xdead_beefu32.to_be_bytes());

        let mut image = vec![0u8; 8192];
        image[4096..4096 + leaf_block.len()].copy_from_slice(&leaf_block);

        let mut root = vec![0u8, 1u8];
        root.extend_from_slice(&1u16.to_be_bytes());
        root.extend_from_slice(&0u64.to_be_bytes());
        root.extend_from_slice(&1u64.to_be_bytes());

        let ctx = ctx_with_image(image);
        assert!(walk_bmbt_root(&ctx, &root, 20).is_err());
    }

    #[test]
    fn short_root_is_rejected() {
        let ctx = ctx_with_image(Vec::new());
        assert!(walk_bmbt_root(&ctx, &[0u8, 1u8, 0u8], 20).is_err());
    }
}
