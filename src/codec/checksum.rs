//! Reassembly check sequence.

/// CRC-32 (IEEE 802.3, reflected, as used by zlib) of `bytes`.
///
/// # Examples
///
/// ```
/// assert_eq!(schc_gateway::codec::checksum(b"123456789"), 0xCBF4_3926);
/// ```
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 { crc32fast::hash(bytes) }

/// CRC-32 over several slices as if they were concatenated.
#[must_use]
pub fn checksum_parts<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}
