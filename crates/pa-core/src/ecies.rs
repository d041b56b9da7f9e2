//! ECIES encryption for end-to-end protected request/response exchanges.
//!
//! The construction is P-256 ECDH + KDF_X9.63-SHA256 + AES-128-CBC +
//! HMAC-SHA256. A client encryptor generates an ephemeral key pair per
//! request, derives a 32-byte envelope key from the ECDH secret and splits it
//! into an encryption half and a MAC half. The response reuses the same
//! envelope (the server sends no ephemeral key back); only the nonce, and
//! therefore the IV, is fresh.
//!
//! Request MAC covers `body || shared_info2 || ephemeral_pub || nonce`;
//! response MAC covers `body || shared_info2 || nonce`. IVs derive from the
//! envelope key and the cryptogram nonce, so no IV travels on the wire.

use crate::{Error, Result};
use pa_crypto::aes::{aes_cbc_decrypt, aes_cbc_encrypt};
use pa_crypto::kdf::kdf_x963_sha256;
use pa_crypto::mac::{hmac_sha256, hmac_sha256_verify};
use pa_crypto::EcKeyPair;
use rand::RngCore;
use zeroize::Zeroizing;

const ENVELOPE_KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 16;
const MAC_SIZE: usize = 32;

/// Envelope key for one ECIES exchange: AES half and MAC half.
pub struct EciesEnvelopeKey {
    key: Zeroizing<[u8; ENVELOPE_KEY_SIZE]>,
}

impl EciesEnvelopeKey {
    /// Derive the envelope from an ECDH shared secret and `shared_info1`.
    pub fn derive(shared_secret: &[u8], shared_info1: &[u8]) -> Result<Self> {
        let okm = kdf_x963_sha256(shared_secret, shared_info1, ENVELOPE_KEY_SIZE)?;
        let mut key = Zeroizing::new([0u8; ENVELOPE_KEY_SIZE]);
        key.copy_from_slice(&okm);
        Ok(Self { key })
    }

    /// AES-128 encryption key (first half).
    pub fn enc_key(&self) -> &[u8] {
        &self.key[..16]
    }

    /// HMAC key (second half).
    pub fn mac_key(&self) -> &[u8] {
        &self.key[16..]
    }

    /// Derive the CBC initialization vector for one cryptogram nonce.
    pub fn derive_iv(&self, nonce: &[u8]) -> Result<[u8; 16]> {
        let okm = kdf_x963_sha256(&*self.key, nonce, 16)?;
        let mut iv = [0u8; 16];
        iv.copy_from_slice(&okm);
        Ok(iv)
    }
}

/// ECIES cryptogram, the raw form of the JSON envelope exchanged with the
/// server (`encryptedData`, `mac`, `ephemeralPublicKey`, `nonce` — all
/// Base64; the JSON framing itself is the transport layer's job).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EciesCryptogram {
    /// AES-128-CBC ciphertext.
    pub body: Vec<u8>,
    /// HMAC-SHA256 over the ciphertext and associated data.
    pub mac: Vec<u8>,
    /// Ephemeral public key, SEC 1 compressed. Empty in responses.
    pub key: Vec<u8>,
    /// Nonce the IV was derived from.
    pub nonce: Vec<u8>,
}

/// Client-side ECIES encryptor.
///
/// One encryptor handles one request/response pair: `encrypt_request`
/// establishes the envelope, `decrypt_response` consumes the server's answer
/// under the same envelope.
pub struct EciesEncryptor {
    peer_public_key: Vec<u8>,
    shared_info1: Vec<u8>,
    shared_info2: Vec<u8>,
    envelope: Option<EciesEnvelopeKey>,
}

impl EciesEncryptor {
    /// Create an encryptor targeting `peer_public_key` (SEC 1 encoded).
    ///
    /// The key is validated lazily, when the first request is encrypted.
    pub fn new(peer_public_key: &[u8], shared_info1: &[u8], shared_info2: &[u8]) -> Self {
        Self {
            peer_public_key: peer_public_key.to_vec(),
            shared_info1: shared_info1.to_vec(),
            shared_info2: shared_info2.to_vec(),
            envelope: None,
        }
    }

    /// Whether a request was already encrypted, establishing the envelope a
    /// response can be decrypted under.
    pub fn can_decrypt_response(&self) -> bool {
        self.envelope.is_some()
    }

    /// Encrypt a request payload.
    ///
    /// Generates a fresh ephemeral key pair, so consecutive calls produce
    /// unrelated cryptograms. The envelope is retained for the matching
    /// response.
    ///
    /// # Errors
    ///
    /// [`Error::Encryption`] when the peer key is not a valid P-256 point or
    /// any derivation fails. No cryptogram is produced on failure.
    pub fn encrypt_request(&mut self, plaintext: &[u8]) -> Result<EciesCryptogram> {
        let ephemeral = EcKeyPair::generate()?;
        let shared_secret = ephemeral.ecdh(&self.peer_public_key)?;
        let envelope = EciesEnvelopeKey::derive(&*shared_secret, &self.shared_info1)?;

        let mut nonce = vec![0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let iv = envelope.derive_iv(&nonce)?;
        let body = aes_cbc_encrypt(envelope.enc_key(), &iv, plaintext)?;

        let ephemeral_public = ephemeral.public_key().to_vec();
        let mut associated =
            Vec::with_capacity(body.len() + self.shared_info2.len() + ephemeral_public.len() + NONCE_SIZE);
        associated.extend_from_slice(&body);
        associated.extend_from_slice(&self.shared_info2);
        associated.extend_from_slice(&ephemeral_public);
        associated.extend_from_slice(&nonce);
        let mac = hmac_sha256(envelope.mac_key(), &associated).to_vec();

        self.envelope = Some(envelope);
        Ok(EciesCryptogram {
            body,
            mac,
            key: ephemeral_public,
            nonce,
        })
    }

    /// Verify and decrypt a response cryptogram.
    ///
    /// # Errors
    ///
    /// [`Error::WrongState`] before any request was encrypted;
    /// [`Error::Encryption`] for missing fields, a MAC mismatch or a
    /// decryption failure.
    pub fn decrypt_response(&self, cryptogram: &EciesCryptogram) -> Result<Zeroizing<Vec<u8>>> {
        let envelope = self.envelope.as_ref().ok_or_else(|| {
            Error::WrongState("No request was encrypted with this encryptor".into())
        })?;
        decrypt_with_envelope(
            envelope,
            &self.shared_info2,
            &cryptogram.body,
            &cryptogram.mac,
            None,
            &cryptogram.nonce,
        )
    }
}

/// Server-side ECIES decryptor.
///
/// The client core does not need this in production; it mirrors the server so
/// the whole exchange can be exercised in tests.
pub struct EciesDecryptor {
    private_key: EcKeyPair,
    shared_info1: Vec<u8>,
    shared_info2: Vec<u8>,
    envelope: Option<EciesEnvelopeKey>,
}

impl EciesDecryptor {
    /// Create a decryptor owning the private half of the target key.
    pub fn new(private_key: EcKeyPair, shared_info1: &[u8], shared_info2: &[u8]) -> Self {
        Self {
            private_key,
            shared_info1: shared_info1.to_vec(),
            shared_info2: shared_info2.to_vec(),
            envelope: None,
        }
    }

    /// Verify and decrypt a request cryptogram, establishing the envelope
    /// for the response.
    pub fn decrypt_request(&mut self, cryptogram: &EciesCryptogram) -> Result<Zeroizing<Vec<u8>>> {
        if cryptogram.key.is_empty() {
            return Err(Error::Encryption(
                "Request cryptogram lacks an ephemeral key".into(),
            ));
        }
        let shared_secret = self.private_key.ecdh(&cryptogram.key)?;
        let envelope = EciesEnvelopeKey::derive(&*shared_secret, &self.shared_info1)?;
        let plaintext = decrypt_with_envelope(
            &envelope,
            &self.shared_info2,
            &cryptogram.body,
            &cryptogram.mac,
            Some(&cryptogram.key),
            &cryptogram.nonce,
        )?;
        self.envelope = Some(envelope);
        Ok(plaintext)
    }

    /// Encrypt a response under the envelope established by the request.
    pub fn encrypt_response(&self, plaintext: &[u8]) -> Result<EciesCryptogram> {
        let envelope = self.envelope.as_ref().ok_or_else(|| {
            Error::WrongState("No request was decrypted with this decryptor".into())
        })?;

        let mut nonce = vec![0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let iv = envelope.derive_iv(&nonce)?;
        let body = aes_cbc_encrypt(envelope.enc_key(), &iv, plaintext)?;

        let mut associated =
            Vec::with_capacity(body.len() + self.shared_info2.len() + NONCE_SIZE);
        associated.extend_from_slice(&body);
        associated.extend_from_slice(&self.shared_info2);
        associated.extend_from_slice(&nonce);
        let mac = hmac_sha256(envelope.mac_key(), &associated).to_vec();

        Ok(EciesCryptogram {
            body,
            mac,
            key: Vec::new(),
            nonce,
        })
    }
}

fn decrypt_with_envelope(
    envelope: &EciesEnvelopeKey,
    shared_info2: &[u8],
    body: &[u8],
    mac: &[u8],
    ephemeral_key: Option<&[u8]>,
    nonce: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    if body.is_empty() || mac.len() != MAC_SIZE || nonce.len() != NONCE_SIZE {
        return Err(Error::Encryption("Malformed cryptogram".into()));
    }
    let key_part = ephemeral_key.unwrap_or(&[]);
    let mut associated =
        Vec::with_capacity(body.len() + shared_info2.len() + key_part.len() + nonce.len());
    associated.extend_from_slice(body);
    associated.extend_from_slice(shared_info2);
    associated.extend_from_slice(key_part);
    associated.extend_from_slice(nonce);
    if !hmac_sha256_verify(envelope.mac_key(), &associated, mac) {
        return Err(Error::Encryption("Cryptogram MAC mismatch".into()));
    }

    let iv = envelope.derive_iv(nonce)?;
    let plaintext = aes_cbc_decrypt(envelope.enc_key(), &iv, body)?;
    Ok(plaintext)
}
