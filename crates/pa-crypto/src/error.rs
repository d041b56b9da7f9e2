//! Error types for cryptographic operations.

use thiserror::Error;

/// Result type alias for cryptographic operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// ECDH key agreement failed.
    #[error("Key agreement failed: {0}")]
    KeyAgreement(String),

    /// Symmetric encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Symmetric decryption, unpadding or key unwrap failed.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Signature computation failed or the signature did not verify.
    #[error("Signature operation failed: {0}")]
    Signature(String),

    /// Invalid key length.
    #[error("Invalid key length: {0}")]
    InvalidKeyLength(String),

    /// Invalid private key.
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    /// Invalid public key.
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
}
