//! Encrypted activation status blob decoding.
//!
//! The server reports activation status as a 48-byte blob: a 16-byte IV
//! followed by 32 bytes of AES-128-CBC ciphertext under the transport key.
//! The padded plaintext carries, in order: state, current version, upgrade
//! version, fail count, max fail count, a counter low byte and the 16-byte
//! truncated hash of the server's counter value used for resynchronization.

use crate::types::{ActivationState, ActivationStatus};
use crate::{Error, Result};
use pa_crypto::aes::aes_cbc_decrypt;

/// Total size of the encrypted status blob.
pub const STATUS_BLOB_SIZE: usize = 48;

const STATUS_IV_SIZE: usize = 16;
const STATUS_PLAINTEXT_SIZE: usize = 22;

/// Status fields recovered from the encrypted blob.
pub struct DecodedStatus {
    /// Parsed public status.
    pub status: ActivationStatus,
    /// Low byte of the server's counter state. Diagnostic only.
    pub counter_byte: u8,
    /// `SHA-256(server_ctr)[..16]`, consumed by counter resynchronization.
    pub counter_hash: [u8; 16],
}

/// Decrypt and parse a status blob with the unwrapped transport key.
///
/// # Errors
///
/// [`Error::WrongParam`] when the blob is not exactly 48 bytes;
/// [`Error::Encryption`] for any decryption or parse failure.
pub fn decode_status_blob(blob: &[u8], transport_key: &[u8; 16]) -> Result<DecodedStatus> {
    if blob.len() != STATUS_BLOB_SIZE {
        return Err(Error::WrongParam(format!(
            "Status blob must be {STATUS_BLOB_SIZE} bytes, got {}",
            blob.len()
        )));
    }
    let mut iv = [0u8; STATUS_IV_SIZE];
    iv.copy_from_slice(&blob[..STATUS_IV_SIZE]);
    let plaintext = aes_cbc_decrypt(transport_key, &iv, &blob[STATUS_IV_SIZE..])?;
    if plaintext.len() != STATUS_PLAINTEXT_SIZE {
        return Err(Error::Encryption("Unexpected status payload size".into()));
    }

    let state = ActivationState::from_u8(plaintext[0])
        .ok_or_else(|| Error::Encryption("Unknown activation state".into()))?;
    let mut counter_hash = [0u8; 16];
    counter_hash.copy_from_slice(&plaintext[6..22]);

    Ok(DecodedStatus {
        status: ActivationStatus {
            state,
            current_version: plaintext[1],
            upgrade_version: plaintext[2],
            fail_count: plaintext[3] as u32,
            max_fail_count: plaintext[4] as u32,
        },
        counter_byte: plaintext[5],
        counter_hash,
    })
}

/// Build an encrypted status blob. Test support for exercising the decoder
/// against a simulated server.
pub fn encode_status_blob(
    status: &ActivationStatus,
    counter_byte: u8,
    counter_hash: &[u8; 16],
    transport_key: &[u8; 16],
    iv: &[u8; 16],
) -> Result<Vec<u8>> {
    let mut plaintext = Vec::with_capacity(STATUS_PLAINTEXT_SIZE);
    plaintext.push(status.state as u8);
    plaintext.push(status.current_version);
    plaintext.push(status.upgrade_version);
    plaintext.push(status.fail_count as u8);
    plaintext.push(status.max_fail_count as u8);
    plaintext.push(counter_byte);
    plaintext.extend_from_slice(counter_hash);

    let ciphertext = pa_crypto::aes::aes_cbc_encrypt(transport_key, iv, &plaintext)?;
    let mut blob = Vec::with_capacity(STATUS_BLOB_SIZE);
    blob.extend_from_slice(iv);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}
