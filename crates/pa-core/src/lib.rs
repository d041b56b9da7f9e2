//! Client-side PowerAuth protocol core.
//!
//! This crate implements the protocol engine behind a mobile authentication
//! SDK:
//! - Activation state machine with code parsing and protocol upgrade
//! - Multi-factor HTTP request signatures over a hash-chain counter
//! - ECIES end-to-end encryption (application and activation scope)
//! - Token store protocol for token-based authorization headers
//! - Versioned binary serialization of the session state
//!
//! Platform concerns (keychain storage, HTTP transport, JSON codecs, wall
//! clock) stay outside; the core consumes byte slices and trait objects from
//! `pa-platform` and emits serialized state and header strings.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod code;
pub mod ecies;
pub mod error;
pub mod session;
pub mod signature;
pub mod state;
pub mod status;
pub mod token;
pub mod types;

pub use error::{Error, ErrorCode, Result};
pub use session::Session;
pub use token::{AuthorizationHttpHeader, Token, TokenStore};
pub use types::{
    ActivationState, ActivationStatus, EciesEncryptorScope, HTTPRequestData,
    HTTPRequestDataSignature, ProtocolVersion, SessionSetup, SignatureFactor,
    SignatureUnlockKeys,
};
