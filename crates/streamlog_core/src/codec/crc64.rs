//! CRC-64 checksum used by the record header.

/// Computes the CRC-64 checksum of `data` (XZ variant, reflected).
///
/// The record header carries 8-byte checksum fields for both the header
/// bytes and the payload, so a 64-bit CRC is used end to end.
pub fn compute_crc64(data: &[u8]) -> u64 {
    // CRC-64/XZ: reflected ECMA-182 polynomial
    const CRC64_TABLE: [u64; 256] = {
        let mut table = [0u64; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u64;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xC96C_5795_D787_0F42;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = u64::MAX;
    for &byte in data {
        let index = ((crc ^ u64::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC64_TABLE[index];
    }
    !crc
}
