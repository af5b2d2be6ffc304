//! # Tether Proto
//!
//! Hand-written protocol buffer schemas for the parts of the wire the
//! session core touches: the signed-device-identity family exchanged during
//! pairing and the client hello carried in the Noise handshake. Field
//! numbers match the server; everything is proto2-style optional.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod adv;
pub mod handshake;

pub use adv::{AccountType, DeviceIdentity, SignedDeviceIdentity, SignedDeviceIdentityHmac};
pub use handshake::{
    AppVersion, ClientPayload, DevicePairingRegistrationData, Platform, ReleaseChannel, UserAgent,
};
