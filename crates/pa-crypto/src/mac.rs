//! HMAC-SHA256 and HOTP dynamic truncation.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 of `data` under `key`.
///
/// # Example
///
/// ```
/// use pa_crypto::mac::hmac_sha256;
///
/// let mac = hmac_sha256(b"key", b"message");
/// assert_eq!(mac.len(), 32);
/// ```
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    // HMAC accepts keys of any length.
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// Constant-time comparison of a computed MAC against a received one.
pub fn hmac_sha256_verify(key: &[u8], data: &[u8], expected: &[u8]) -> bool {
    let computed = hmac_sha256(key, data);
    computed.ct_eq(expected).into()
}

/// Dynamic truncation of an HMAC-SHA256 value per RFC 4226 §5.3.
///
/// The low nibble of the last byte selects a 4-byte window; the window is
/// read big-endian with the sign bit masked off. Callers reduce the result
/// modulo a decimal range.
pub fn hotp_truncate(mac: &[u8; 32]) -> u32 {
    let offset = (mac[31] & 0x0f) as usize;
    u32::from_be_bytes([
        mac[offset] & 0x7f,
        mac[offset + 1],
        mac[offset + 2],
        mac[offset + 3],
    ])
}
