//! File content reader: maps a byte range of a fork's logical space to physical reads. See §4.5.

use crate::error::Result;
use crate::io_context::IoContext;
use crate::xfs::extent::{physical_offset, ExtentRecord};
use crate::xfs::inode::ForkData;

/// Reads `length` bytes starting at `start_byte` within a data fork's logical content, clamped
/// to `logical_size` (the inode's reported file size).
///
/// # Errors
///
/// Propagates `IoError`/`Aborted` from the underlying reads.
pub fn read_range(
    ctx: &IoContext,
    fork: &ForkData,
    logical_size: u64,
    start_byte: u64,
    length: u64,
) -> Result<Vec<u8>> {
    if start_byte >= logical_size {
        return Ok(Vec::new());
    }
    let end_byte = start_byte.saturating_add(length).min(logical_size);
    if end_byte <= start_byte {
        return Ok(Vec::new());
    }
    let want = (end_byte - start_byte) as usize;

    match fork {
        ForkData::Local(bytes) => {
            let start = start_byte as usize;
            let end = (start + want).min(bytes.len());
            Ok(if start >= bytes.len() {
                Vec::new()
            } else {
                bytes[start..end].to_vec()
            })
        }
        ForkData::Extents(extents) => read_from_extents(ctx, extents, start_byte, want),
        ForkData::Dev(_) | ForkData::Uuid(_) => Ok(Vec::new()),
    }
}

fn read_from_extents(
    ctx: &IoContext,
    extents: &[ExtentRecord],
    start_byte: u64,
    want: usize,
) -> Result<Vec<u8>> {
    let geo = ctx.geometry();
    let block_size = u64::from(geo.block_size);

    let mut out = Vec::with_capacity(want);
    let mut byte_cursor = start_byte;
    let end_byte = start_byte + want as u64;

    while byte_cursor < end_byte {
        ctx.check_abort()?;
        let logical_block = byte_cursor / block_size;
        let block_start_byte = logical_block * block_size;
        let within_block = (byte_cursor - block_start_byte) as usize;

        match physical_offset(extents, logical_block) {
            None => {
                // Hole: sparse region reads as zero, same as an unwritten extent.
                let chunk = (block_size as usize - within_block).min((end_byte - byte_cursor) as usize);
                out.extend(std::iter::repeat(0u8).take(chunk));
                byte_cursor += chunk as u64;
            }
            Some(mapping) if mapping.unwritten => {
                let available_bytes = mapping.contiguous_length * block_size - within_block as u64;
                let chunk = available_bytes.min(end_byte - byte_cursor) as usize;
                out.extend(std::iter::repeat(0u8).take(chunk));
                byte_cursor += chunk as u64;
            }
            Some(mapping) => {
                let contiguous_bytes = mapping.contiguous_length * block_size - within_block as u64;
                let chunk = contiguous_bytes.min(end_byte - byte_cursor) as usize;
                let physical_byte = geo.fsblock_to_byte(mapping.physical_block) + within_block as u64;
                let buf = ctx.read_vec_at(physical_byte, chunk)?;
                out.extend_from_slice(&buf);
                byte_cursor += chunk as u64;
            }
        }
    }

    Ok(out)
}
