//! ECDSA-P256 detached signatures.
//!
//! Signatures are computed over SHA-256 of the message (the default digest
//! for P-256) and exchanged in ASN.1 DER encoding, matching what PowerAuth
//! servers produce for activation data and what they expect from the device
//! key.

use crate::ecc::{parse_public_key, EcKeyPair};
use crate::{Error, Result};
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};

/// Sign `data` with the key pair's private scalar.
///
/// Returns the signature in DER encoding. Signing is deterministic
/// (RFC 6979), so identical inputs produce identical signatures.
pub fn ecdsa_sign_data(keypair: &EcKeyPair, data: &[u8]) -> Result<Vec<u8>> {
    let signing_key = SigningKey::from(keypair.secret_key());
    let signature: Signature = signing_key.sign(data);
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Verify a DER-encoded signature of `data` against a SEC 1 encoded public key.
///
/// # Errors
///
/// Returns [`Error::InvalidPublicKey`] for a malformed key and
/// [`Error::Signature`] when the signature is malformed or does not verify.
pub fn ecdsa_verify_data(public_key: &[u8], data: &[u8], signature_der: &[u8]) -> Result<()> {
    let key = parse_public_key(public_key)?;
    let verifying_key = VerifyingKey::from(&key);
    let signature = Signature::from_der(signature_der)
        .map_err(|_| Error::Signature("Malformed DER signature".into()))?;
    verifying_key
        .verify(data, &signature)
        .map_err(|_| Error::Signature("Signature does not verify".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let keypair = EcKeyPair::generate().unwrap();
        let data = b"activation code payload";

        let signature = ecdsa_sign_data(&keypair, data).unwrap();
        ecdsa_verify_data(keypair.public_key(), data, &signature).unwrap();
    }

    #[test]
    fn test_signing_is_deterministic() {
        let keypair = EcKeyPair::from_private(&[0x42u8; 32]).unwrap();

        let sig1 = ecdsa_sign_data(&keypair, b"data").unwrap();
        let sig2 = ecdsa_sign_data(&keypair, b"data").unwrap();

        assert_eq!(sig1, sig2);
    }

    #[test]
    fn test_reject_tampered_data() {
        let keypair = EcKeyPair::generate().unwrap();
        let signature = ecdsa_sign_data(&keypair, b"original").unwrap();

        assert!(ecdsa_verify_data(keypair.public_key(), b"tampered", &signature).is_err());
    }

    #[test]
    fn test_reject_wrong_key() {
        let keypair = EcKeyPair::generate().unwrap();
        let other = EcKeyPair::generate().unwrap();
        let signature = ecdsa_sign_data(&keypair, b"data").unwrap();

        assert!(ecdsa_verify_data(other.public_key(), b"data", &signature).is_err());
    }

    #[test]
    fn test_reject_malformed_signature() {
        let keypair = EcKeyPair::generate().unwrap();

        assert!(ecdsa_verify_data(keypair.public_key(), b"data", &[0x30, 0x01, 0x00]).is_err());
    }
}
