//! CRC32 integrity digest (IEEE, reflected polynomial 0xEDB88320)

/// Computes the CRC32 of `bytes`
pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}
