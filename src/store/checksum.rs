//! CRC32 checksums for corpus frames and content snapshots
//!
//! - Every frame read from disk is verified
//! - A mismatch before the tail of the file is corruption
//! - Commits carry the checksum of the content they were planned against
//!
//! Uses CRC32 (IEEE polynomial).

use crc32fast::Hasher;

/// Computes a CRC32 checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Computes a CRC32 checksum over several parts as if concatenated.
pub fn compute_checksum_parts(parts: &[&[u8]]) -> u32 {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_deterministic() {
        let data = b"<!-- wp:paragraph /-->";
        assert_eq!(compute_checksum(data), compute_checksum(data));
    }

    #[test]
    fn test_checksum_detects_single_bit_change() {
        let mut data = b"content".to_vec();
        let original = compute_checksum(&data);
        data[3] ^= 0x01;
        assert_ne!(original, compute_checksum(&data));
    }

    #[test]
    fn test_parts_match_concatenation() {
        let whole = compute_checksum(b"core/paragraph\n{}");
        let parts = compute_checksum_parts(&[b"core/paragraph", b"\n", b"{}"]);
        assert_eq!(whole, parts);
    }
}
