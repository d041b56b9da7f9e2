//! Key derivation functions.
//!
//! Two derivations cover the whole protocol:
//! - KDF_X9.63 with SHA-256 (ANSI X9.63, the KDF2 construction) expands ECDH
//!   shared secrets into working keys and ECIES envelope material.
//! - PBKDF2-HMAC-SHA1 turns the user password into the knowledge-factor
//!   key-encryption key.

use crate::{Error, Result};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// Iteration count for the knowledge-factor PBKDF2 derivation.
pub const PBKDF2_ITERATIONS: u32 = 10_000;

/// KDF_X9.63 with SHA-256.
///
/// Output block `i` (1-based) is `SHA-256(secret || i_be32 || shared_info)`;
/// blocks are concatenated and truncated to `output_len`.
///
/// # Errors
///
/// Returns [`Error::KeyDerivation`] for an empty secret or a zero output
/// length.
pub fn kdf_x963_sha256(
    secret: &[u8],
    shared_info: &[u8],
    output_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    if secret.is_empty() {
        return Err(Error::KeyDerivation("Empty input secret".into()));
    }
    if output_len == 0 {
        return Err(Error::KeyDerivation("Zero output length".into()));
    }

    let mut okm = Zeroizing::new(Vec::with_capacity(output_len.next_multiple_of(32)));
    let mut counter = 1u32;
    while okm.len() < output_len {
        let mut hasher = Sha256::new();
        hasher.update(secret);
        hasher.update(counter.to_be_bytes());
        hasher.update(shared_info);
        okm.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    okm.truncate(output_len);
    Ok(okm)
}

/// Derive a 16-byte key-encryption key from a password and salt with
/// PBKDF2-HMAC-SHA1 ([`PBKDF2_ITERATIONS`] rounds).
pub fn pbkdf2_derive_key(password: &[u8], salt: &[u8]) -> Zeroizing<[u8; 16]> {
    let mut out = Zeroizing::new([0u8; 16]);
    pbkdf2::pbkdf2_hmac::<sha1::Sha1>(password, salt, PBKDF2_ITERATIONS, &mut *out);
    out
}
