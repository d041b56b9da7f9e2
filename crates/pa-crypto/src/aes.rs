//! AES-128-CBC with PKCS#7 padding, and the key wrap built on it.
//!
//! PowerAuth protects all persisted key material symmetrically: ECIES bodies
//! and the encrypted status blob use AES-128-CBC with an explicit IV, while
//! stored keys are wrapped with AES-128-CBC under a zero IV. A wrap of one
//! 16-byte key therefore occupies exactly two blocks, and the PKCS#7 padding
//! check gives the unwrap a cheap malleability tripwire (a wrong unlock key
//! fails with overwhelming probability instead of yielding garbage).

use crate::{Error, Result};
use aes::Aes128;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES block size in bytes; also the size of every symmetric key in the
/// protocol.
pub const AES_BLOCK_SIZE: usize = 16;

const ZERO_IV: [u8; AES_BLOCK_SIZE] = [0u8; AES_BLOCK_SIZE];

/// Encrypt `plaintext` with AES-128-CBC and PKCS#7 padding.
///
/// # Errors
///
/// Returns [`Error::InvalidKeyLength`] unless `key` is 16 bytes.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8; AES_BLOCK_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes128CbcEnc::new_from_slices(key, iv)
        .map_err(|_| Error::InvalidKeyLength("AES-128 key must be 16 bytes".into()))?;
    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt AES-128-CBC ciphertext and strip PKCS#7 padding.
///
/// The plaintext is wrapped in `Zeroizing`; most call sites decrypt key
/// material.
///
/// # Errors
///
/// Returns [`Error::Decryption`] when the ciphertext is not a whole number of
/// blocks or the padding is invalid, and [`Error::InvalidKeyLength`] unless
/// `key` is 16 bytes.
pub fn aes_cbc_decrypt(
    key: &[u8],
    iv: &[u8; AES_BLOCK_SIZE],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if ciphertext.is_empty() || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(Error::Decryption(
            "Ciphertext is not a whole number of AES blocks".into(),
        ));
    }
    let cipher = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|_| Error::InvalidKeyLength("AES-128 key must be 16 bytes".into()))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::Decryption("Invalid PKCS#7 padding".into()))?;
    Ok(Zeroizing::new(plaintext))
}

/// Wrap key material under a 16-byte key-encryption key.
///
/// Uses AES-128-CBC with a zero IV. The IV can be constant because every
/// wrapped payload is either fresh random key material or an already-wrapped
/// blob, never attacker-chosen plaintext.
pub fn wrap_key(kek: &[u8; AES_BLOCK_SIZE], key_material: &[u8]) -> Result<Vec<u8>> {
    aes_cbc_encrypt(kek, &ZERO_IV, key_material)
}

/// Unwrap key material previously produced by [`wrap_key`].
///
/// `expected_len` pins the unwrapped length; a mismatch is treated as a
/// decryption failure.
pub fn unwrap_key(
    kek: &[u8; AES_BLOCK_SIZE],
    wrapped: &[u8],
    expected_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let unwrapped = aes_cbc_decrypt(kek, &ZERO_IV, wrapped)?;
    if unwrapped.len() != expected_len {
        return Err(Error::Decryption(format!(
            "Unwrapped key has length {}, expected {}",
            unwrapped.len(),
            expected_len
        )));
    }
    Ok(unwrapped)
}
