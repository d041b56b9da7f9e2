//! Error types for session operations.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Session operation errors.
///
/// The taxonomy is deliberately small. Callers normally check only for
/// success; the three failure kinds separate "treat as attack or corruption"
/// from the two flavors of API misuse.
#[derive(Debug, Error)]
pub enum Error {
    /// A cryptographic operation failed: MAC mismatch, decryption failure,
    /// invalid curve point, malformed Base64, bad check digit, invalid
    /// signature. Callers should treat this as potential attack or data
    /// corruption; the session itself stays intact.
    #[error("Cryptographic failure: {0}")]
    Encryption(String),

    /// The method was called in the wrong session state. This is a
    /// programming error in the caller and must never surface to end users.
    #[error("Wrong session state: {0}")]
    WrongState(String),

    /// A parameter was missing or malformed in a way that local validation
    /// can detect. This is a programming error in the caller and must never
    /// surface to end users.
    #[error("Wrong parameter: {0}")]
    WrongParam(String),
}

impl Error {
    /// The wire-level code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Encryption(_) => ErrorCode::Encryption,
            Error::WrongState(_) => ErrorCode::WrongState,
            Error::WrongParam(_) => ErrorCode::WrongParam,
        }
    }
}

impl From<pa_crypto::Error> for Error {
    fn from(err: pa_crypto::Error) -> Self {
        // Every primitive failure is an Encryption error at this level.
        Error::Encryption(err.to_string())
    }
}

/// Numeric error codes matching the historical client SDKs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Everything is OK.
    Ok = 0,
    /// Cryptographic failure (potential attack or corruption).
    Encryption = 1,
    /// Method called in the wrong session state.
    WrongState = 2,
    /// Missing or malformed parameter.
    WrongParam = 3,
}

impl ErrorCode {
    /// Convert to the wire representation.
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Convert from the wire representation.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::Encryption),
            2 => Some(Self::WrongState),
            3 => Some(Self::WrongParam),
            _ => None,
        }
    }
}
