//! The directory/attribute name hash function used by leaf and node directory blocks to order
//! and binary-search entries. See §4.6.
//!
//! Byte-at-a-time rotate-left-4/XOR-fold: `hash = (hash << 4 | hash >> 28) XOR b` for each byte
//! `b` of the name, starting from `hash = 0`.

/// Computes the XFS directory/attribute name hash of `name`.
#[must_use]
pub fn name_hash(name: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &b in name {
        hash = (hash << 4 | hash >> 28) ^ u32::from(b);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_hashes_to_zero() {
        assert_eq!(name_hash(b""), 0);
    }

    #[test]
    fn matches_known_values() {
        assert_eq!(name_hash(b"test"), 0x0007_2244);
        assert_eq!(name_hash(b"hello.txt"), 0x3aad_939a);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(name_hash(b"hello.txt"), name_hash(b"hello.txt"));
        assert_ne!(name_hash(b"hello.txt"), name_hash(b"world.txt"));
    }

    #[test]
    fn single_byte_names_differ() {
        assert_ne!(name_hash(b"a"), name_hash(b"b"));
    }
}
