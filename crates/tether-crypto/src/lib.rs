//! # Tether Crypto
//!
//! Key material and signature primitives for the session core:
//!
//! - [`KeyPair`]: X25519 keypairs (Noise static key, account identity key),
//!   zeroized on drop
//! - [`xeddsa`]: XEd25519 signatures under X25519 keys, used to
//!   counter-sign device identities during pairing
//! - [`mac`]: HMAC-SHA256 and constant-time comparison
//!
//! Curve arithmetic comes from `curve25519-dalek`; nothing here
//! re-implements field or group operations.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod error;
pub mod keypair;
pub mod mac;
pub mod xeddsa;

pub use error::CryptoError;
pub use keypair::KeyPair;
