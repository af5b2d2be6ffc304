//! Signed-device-identity messages exchanged during pairing.
//!
//! Field numbers are fixed by the server; all fields are optional in the
//! proto2 sense and surfaced through accessor helpers.

/// Credential model of the account signing a device identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum AccountType {
    /// End-to-end-encrypted account; the default.
    E2ee = 0,
    /// Server-hosted credential model; signature prefixes differ.
    Hosted = 1,
}

/// Outer container: HMAC-authenticated identity blob.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedDeviceIdentityHmac {
    /// Serialized [`SignedDeviceIdentity`].
    #[prost(bytes = "vec", optional, tag = "1")]
    pub details: Option<Vec<u8>>,
    /// HMAC-SHA256 over (optional hosted prefix ‖ details) under the adv
    /// secret shared with the primary device.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub hmac: Option<Vec<u8>>,
    /// Account credential model; absent means [`AccountType::E2ee`].
    #[prost(enumeration = "AccountType", optional, tag = "3")]
    pub account_type: Option<i32>,
}

/// The doubly-signed binding between an account and one device key.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SignedDeviceIdentity {
    /// Serialized [`DeviceIdentity`].
    #[prost(bytes = "vec", optional, tag = "1")]
    pub details: Option<Vec<u8>>,
    /// Account-level signature public key (32 bytes).
    #[prost(bytes = "vec", optional, tag = "2")]
    pub account_signature_key: Option<Vec<u8>>,
    /// Signature by the account key over prefix ‖ details ‖ device identity
    /// public key.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub account_signature: Option<Vec<u8>>,
    /// Counter-signature by this device over prefix ‖ details ‖ device
    /// identity public key ‖ account signature key.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub device_signature: Option<Vec<u8>>,
}

/// Per-device details inside a signed identity.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeviceIdentity {
    /// Server-assigned raw device id.
    #[prost(uint32, optional, tag = "1")]
    pub raw_id: Option<u32>,
    /// Enrollment timestamp, seconds since the epoch.
    #[prost(uint64, optional, tag = "2")]
    pub timestamp: Option<u64>,
    /// Index of the device key in the account's key list.
    #[prost(uint32, optional, tag = "3")]
    pub key_index: Option<u32>,
    /// Account credential model echo.
    #[prost(enumeration = "AccountType", optional, tag = "4")]
    pub account_type: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_hmac_container_roundtrip() {
        let container = SignedDeviceIdentityHmac {
            details: Some(vec![1, 2, 3]),
            hmac: Some(vec![9; 32]),
            account_type: Some(AccountType::Hosted as i32),
        };
        let bytes = container.encode_to_vec();
        let decoded = SignedDeviceIdentityHmac::decode(bytes.as_slice()).unwrap();
        assert_eq!(decoded, container);
        assert_eq!(decoded.account_type(), AccountType::Hosted);
    }

    #[test]
    fn test_absent_fields_default() {
        let container = SignedDeviceIdentityHmac::default();
        assert!(container.details().is_empty());
        assert!(container.hmac().is_empty());
        assert_eq!(container.account_type(), AccountType::E2ee);
        assert_eq!(DeviceIdentity::default().key_index(), 0);
    }

    #[test]
    fn test_identity_roundtrip() {
        let identity = SignedDeviceIdentity {
            details: Some(
                DeviceIdentity {
                    raw_id: Some(77),
                    timestamp: Some(1_700_000_000),
                    key_index: Some(4),
                    account_type: None,
                }
                .encode_to_vec(),
            ),
            account_signature_key: Some(vec![2; 32]),
            account_signature: Some(vec![3; 64]),
            device_signature: None,
        };
        let decoded =
            SignedDeviceIdentity::decode(identity.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, identity);
        let details = DeviceIdentity::decode(decoded.details()).unwrap();
        assert_eq!(details.key_index(), 4);
    }

    #[test]
    fn test_garbage_decode_fails() {
        assert!(SignedDeviceIdentityHmac::decode(&[0xFF, 0xFF, 0xFF][..]).is_err());
    }
}
