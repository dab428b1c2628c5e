//! Extent-list decoding.
//!
//! Packed on-disk layout (big-endian, 128 bits total), per §4.4:
//!
//! ```text
//! bit  127        : unwritten flag
//! bits 126..73    : start_logical_block (54 bits)
//! bits 72..21     : start_physical_block (52 bits)
//! bits 20..0      : length in filesystem blocks (21 bits)
//! ```

use crate::error::{corrupt_extent, Result};

/// One decoded extent record: a contiguous run of `length` filesystem blocks mapping
/// `start_logical_block..start_logical_block + length` (in the fork's logical block space) to
/// `start_physical_block..start_physical_block + length` (absolute filesystem blocks).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExtentRecord {
    pub start_logical_block: u64,
    pub start_physical_block: u64,
    pub length: u64,
    pub unwritten: bool,
}

const LOGICAL_BLOCK_BITS: u32 = 54;
const PHYSICAL_BLOCK_BITS: u32 = 52;
const LENGTH_BITS: u32 = 21;

impl ExtentRecord {
    /// Unpacks a single 16-byte big-endian extent record.
    ///
    /// # Errors
    ///
    /// Returns `CorruptExtent` if the decoded length is zero.
    pub fn unpack(raw: &[u8; 16]) -> Result<Self> {
        let l0 = u64::from_be_bytes(raw[0..8].try_into().unwrap());
        let l1 = u64::from_be_bytes(raw[8..16].try_into().unwrap());

        let unwritten = (l0 >> 63) != 0;
        let start_logical_block = (l0 >> (63 - LOGICAL_BLOCK_BITS)) & mask(LOGICAL_BLOCK_BITS);
        let low_bits_in_l0 = 63 - LOGICAL_BLOCK_BITS;
        let start_physical_block = ((l0 & mask(low_bits_in_l0)) << (PHYSICAL_BLOCK_BITS - low_bits_in_l0))
            | (l1 >> (64 - (PHYSICAL_BLOCK_BITS - low_bits_in_l0)));
        let length = l1 & mask(LENGTH_BITS);

        if length == 0 {
            return Err(corrupt_extent("zero-length extent record"));
        }

        Ok(Self {
            start_logical_block,
            start_physical_block,
            length,
            unwritten,
        })
    }
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Decodes a packed extent-format fork: `nextents` consecutive 16-byte records.
///
/// # Errors
///
/// Returns `CorruptExtent` if `fork_bytes` is too short for `nextents` records, a record has
/// zero length, or the logical ranges are not strictly increasing and non-overlapping.
pub fn decode_extent_list(fork_bytes: &[u8], nextents: u64) -> Result<Vec<ExtentRecord>> {
    let nextents = usize::try_from(nextents).map_err(|_| corrupt_extent("nextents too large"))?;
    if fork_bytes.len() < nextents * 16 {
        return Err(corrupt_extent("fork area too short for declared extent count"));
    }

    let mut extents = Vec::with_capacity(nextents);
    for i in 0..nextents {
        let raw: [u8; 16] = fork_bytes[i * 16..i * 16 + 16].try_into().unwrap();
        extents.push(ExtentRecord::unpack(&raw)?);
    }

    validate_ordering(&extents)?;
    Ok(extents)
}

fn validate_ordering(extents: &[ExtentRecord]) -> Result<()> {
    for pair in extents.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b.start_logical_block < a.start_logical_block + a.length {
            return Err(corrupt_extent(
                "extent list is not strictly increasing / overlaps",
            ));
        }
    }
    Ok(())
}

/// Result of mapping a logical block to its physical location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    pub physical_block: u64,
    /// Number of further contiguous logical blocks (including this one) covered by the same
    /// extent, capped at the fork's declared size.
    pub contiguous_length: u64,
    pub unwritten: bool,
}

/// Maps `logical_block` to a physical block via binary search over `extents`, which must
/// already be ordered (as returned by [`decode_extent_list`]).
///
/// Returns `None` for a hole (a logical block not covered by any extent); XFS data forks may
/// be sparse, and callers treat holes the same way as unwritten extents for read purposes,
/// except no physical range is implicated for the zero-fill.
#[must_use]
pub fn physical_offset(extents: &[ExtentRecord], logical_block: u64) -> Option<Mapping> {
    let idx = extents
        .partition_point(|e| e.start_logical_block + e.length <= logical_block);
    let extent = extents.get(idx)?;
    if logical_block < extent.start_logical_block {
        return None;
    }
    let delta = logical_block - extent.start_logical_block;
    Some(Mapping {
        physical_block: extent.start_physical_block + delta,
        contiguous_length: extent.length - delta,
        unwritten: extent.unwritten,
    })
}
