//! NIST P-256 key pairs and ECDH key agreement.
//!
//! All PowerAuth key agreement and server identity verification runs on the
//! NIST P-256 (secp256r1) curve. Public keys travel in SEC 1 compressed form
//! (33 bytes, `0x02`/`0x03` prefix); imported keys are fully validated, so a
//! point that is off-curve, at infinity, or has out-of-range coordinates is
//! rejected before any agreement is computed.
//!
//! # Security
//!
//! - Private scalars and shared secrets are wrapped in `Zeroizing<>` so they
//!   are cleared from memory when dropped.
//! - Uses the `p256` crate from RustCrypto, which performs NIST SP 800-56A
//!   compliant public key validation.

use crate::{Error, Result};
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, PublicKey, SecretKey};
use zeroize::Zeroizing;

/// P-256 key pair used for key agreement and device signatures.
///
/// The private scalar is zeroed on drop. The public key is cached in SEC 1
/// compressed form (33 bytes).
pub struct EcKeyPair {
    secret_key: SecretKey,
    /// Public key in compressed form (0x02/0x03 || x), cached.
    public_key_bytes: Vec<u8>,
}

impl EcKeyPair {
    /// Generate a new random P-256 key pair using the operating system RNG.
    ///
    /// # Example
    ///
    /// ```
    /// use pa_crypto::EcKeyPair;
    ///
    /// let keypair = EcKeyPair::generate().unwrap();
    /// assert_eq!(keypair.public_key().len(), 33); // compressed format
    /// ```
    pub fn generate() -> Result<Self> {
        let secret_key = SecretKey::random(&mut rand::rngs::OsRng);
        let public_key_bytes = compress_public_key(&secret_key.public_key());
        Ok(Self {
            secret_key,
            public_key_bytes,
        })
    }

    /// Create a key pair from an existing 32-byte private scalar.
    ///
    /// Used to restore the device key from its unwrapped persistent form and
    /// for known-answer tests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPrivateKey`] if the scalar is zero or not
    /// reduced modulo the curve order, and [`Error::InvalidKeyLength`] for a
    /// slice that is not 32 bytes long.
    pub fn from_private(private_key: &[u8]) -> Result<Self> {
        if private_key.len() != 32 {
            return Err(Error::InvalidKeyLength(format!(
                "P-256 private key must be 32 bytes, got {}",
                private_key.len()
            )));
        }
        let secret_key = SecretKey::from_slice(private_key)
            .map_err(|_| Error::InvalidPrivateKey("Invalid P-256 private scalar".into()))?;
        let public_key_bytes = compress_public_key(&secret_key.public_key());
        Ok(Self {
            secret_key,
            public_key_bytes,
        })
    }

    /// Public key in SEC 1 compressed form (33 bytes).
    pub fn public_key(&self) -> &[u8] {
        &self.public_key_bytes
    }

    /// Private scalar as 32 big-endian bytes, zeroed on drop.
    pub fn private_key_bytes(&self) -> Zeroizing<[u8; 32]> {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.secret_key.to_bytes());
        Zeroizing::new(out)
    }

    /// Perform ECDH key agreement with a peer's public key.
    ///
    /// The peer key may be in compressed (33 bytes) or uncompressed (65 bytes)
    /// SEC 1 encoding; it is validated before use. The shared secret is the
    /// x-coordinate of the result point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPublicKey`] if the peer key does not decode to
    /// a valid point on P-256.
    pub fn ecdh(&self, peer_public: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        let peer_key = parse_public_key(peer_public)?;
        let shared = diffie_hellman(self.secret_key.to_nonzero_scalar(), peer_key.as_affine());

        let mut result = [0u8; 32];
        result.copy_from_slice(shared.raw_secret_bytes().as_slice());
        Ok(Zeroizing::new(result))
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }
}

/// Parse and validate a SEC 1 encoded P-256 public key.
///
/// Accepts compressed and uncompressed encodings. Rejects anything that is
/// not a valid curve point, including the point at infinity.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|_| Error::InvalidPublicKey("Malformed SEC1 point encoding".into()))?;
    Option::from(PublicKey::from_encoded_point(&encoded))
        .ok_or_else(|| Error::InvalidPublicKey("Point is not on the P-256 curve".into()))
}

/// Re-encode a SEC 1 public key into the canonical compressed form, validating
/// it on the way.
pub fn normalize_public_key(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(compress_public_key(&parse_public_key(bytes)?))
}

fn compress_public_key(key: &PublicKey) -> Vec<u8> {
    key.to_encoded_point(true).as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ECDH commutativity: Alice->Bob == Bob->Alice
    #[test]
    fn test_key_agreement_commutativity() {
        let alice = EcKeyPair::generate().unwrap();
        let bob = EcKeyPair::generate().unwrap();

        let alice_shared = alice.ecdh(bob.public_key()).unwrap();
        let bob_shared = bob.ecdh(alice.public_key()).unwrap();

        assert_eq!(&*alice_shared, &*bob_shared);
    }

    #[test]
    fn test_generate_produces_compressed_key() {
        let keypair = EcKeyPair::generate().unwrap();

        assert_eq!(keypair.public_key().len(), 33);
        assert!(keypair.public_key()[0] == 0x02 || keypair.public_key()[0] == 0x03);
    }

    /// The same private scalar always yields the same public key.
    #[test]
    fn test_deterministic_from_private() {
        let private_key = [0x42u8; 32];

        let keypair1 = EcKeyPair::from_private(&private_key).unwrap();
        let keypair2 = EcKeyPair::from_private(&private_key).unwrap();

        assert_eq!(keypair1.public_key(), keypair2.public_key());
    }

    #[test]
    fn test_private_key_roundtrip() {
        let keypair = EcKeyPair::generate().unwrap();
        let scalar = keypair.private_key_bytes();

        let restored = EcKeyPair::from_private(&*scalar).unwrap();
        assert_eq!(restored.public_key(), keypair.public_key());
    }

    #[test]
    fn test_reject_zero_private_key() {
        assert!(EcKeyPair::from_private(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_reject_wrong_private_key_length() {
        assert!(EcKeyPair::from_private(&[0x42u8; 31]).is_err());
    }

    /// A compressed point whose x-coordinate has no square root on the curve
    /// must be rejected.
    #[test]
    fn test_reject_invalid_curve_point() {
        let invalid =
            hex::decode("02B70BF043C144935756F8F4578C369CF960EE510A5A0F90E93A373A21F0D1397F")
                .unwrap();
        assert!(parse_public_key(&invalid).is_err());

        let keypair = EcKeyPair::generate().unwrap();
        assert!(keypair.ecdh(&invalid).is_err());
    }

    #[test]
    fn test_reject_truncated_public_key() {
        let keypair = EcKeyPair::generate().unwrap();
        let truncated = &keypair.public_key()[..32];
        assert!(parse_public_key(truncated).is_err());
    }

    #[test]
    fn test_uncompressed_encoding_accepted() {
        use p256::elliptic_curve::sec1::ToEncodedPoint;

        let alice = EcKeyPair::generate().unwrap();
        let bob = EcKeyPair::generate().unwrap();

        let bob_point = parse_public_key(bob.public_key()).unwrap();
        let bob_uncompressed = bob_point.to_encoded_point(false);

        let via_compressed = alice.ecdh(bob.public_key()).unwrap();
        let via_uncompressed = alice.ecdh(bob_uncompressed.as_bytes()).unwrap();

        assert_eq!(&*via_compressed, &*via_uncompressed);
    }
}
