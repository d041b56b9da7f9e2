//! Host-side abstractions for the PowerAuth client core.
//!
//! The core never touches the filesystem, keychain or wall clock directly;
//! the host application supplies those through the traits defined here:
//! - [`traits::TokenDatabase`] — encrypted local storage for access tokens
//! - [`traits::Clock`] — wall-clock time for token digests
//!
//! [`mock`] provides deterministic in-memory implementations for tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod mock;
pub mod traits;

pub use error::{Error, Result};
