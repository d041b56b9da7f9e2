//! Cryptographic primitives for the PowerAuth client core.
//!
//! This crate implements the low-level building blocks consumed by `pa-core`:
//! - P-256 key pairs, ECDH key agreement, public key validation
//! - ECDSA-P256/SHA-256 detached signatures (DER encoded)
//! - AES-128-CBC with PKCS#7 padding, and the key wrap derived from it
//! - HMAC-SHA256 with constant-time verification and HOTP truncation
//! - KDF_X9.63-SHA256 and PBKDF2-HMAC-SHA1
//!
//! Security requirements:
//! - No unsafe code
//! - All secrets use `Zeroizing` wrappers
//! - Constant-time comparisons via the `subtle` crate
//! - No logging of key material

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aes;
pub mod ecc;
pub mod error;
pub mod kdf;
pub mod mac;
pub mod sign;

pub use ecc::EcKeyPair;
pub use error::{Error, Result};
