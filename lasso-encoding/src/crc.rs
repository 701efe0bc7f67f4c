//! Pluggable frame checksum
//!
//! The host computes a CRC through a user-installed function and truncates
//! it to the configured width. The default is a plain byte-XOR checksum,
//! which is self-checking: feeding a frame including its own checksum bytes
//! yields zero. Production deployments install CRC-16-CCITT or similar
//! through the same hook.

use lasso_core::CrcWidth;

/// User-suppliable checksum over a byte range, right-aligned in the result
pub type CrcFn = fn(&[u8]) -> u32;

/// Default checksum: XOR over all bytes
pub fn xor_checksum(bytes: &[u8]) -> u32 {
    let mut value = 0u8;
    for &byte in bytes {
        value ^= byte;
    }
    u32::from(value)
}

/// Store the low `width` bytes of `crc` at `dest` in host byte order.
pub fn store(crc: u32, width: CrcWidth, dest: &mut [u8]) {
    let bytes = crc.to_ne_bytes();
    dest[..width.into_usize()].copy_from_slice(&bytes[..width.into_usize()]);
}

/// Compute `crc` over `payload` and append it behind the payload.
///
/// `buf[..payload_len]` is the checksummed range, the checksum lands at
/// `buf[payload_len..payload_len + width]`.
pub fn append(crc: CrcFn, width: CrcWidth, buf: &mut [u8], payload_len: usize) {
    let value = crc(&buf[..payload_len]);
    store(value, width, &mut buf[payload_len..]);
}
