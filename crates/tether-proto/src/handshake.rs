//! Client hello payload carried in the final Noise handshake message.

/// Platform identifier reported in the user agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Platform {
    /// Reference desktop client.
    Desktop = 0,
    /// Portable/CLI client.
    Portable = 1,
}

/// Release channel of the connecting build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ReleaseChannel {
    /// Production release.
    Release = 0,
    /// Beta release.
    Beta = 1,
    /// Development build.
    Debug = 2,
}

/// Client build version.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AppVersion {
    /// Major version.
    #[prost(uint32, optional, tag = "1")]
    pub primary: Option<u32>,
    /// Minor version.
    #[prost(uint32, optional, tag = "2")]
    pub secondary: Option<u32>,
    /// Patch version.
    #[prost(uint32, optional, tag = "3")]
    pub tertiary: Option<u32>,
}

/// User agent block of the client hello.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UserAgent {
    /// Platform identifier.
    #[prost(enumeration = "Platform", optional, tag = "1")]
    pub platform: Option<i32>,
    /// Build version.
    #[prost(message, optional, tag = "2")]
    pub app_version: Option<AppVersion>,
    /// Operating system name.
    #[prost(string, optional, tag = "5")]
    pub os_name: Option<String>,
    /// Operating system version.
    #[prost(string, optional, tag = "6")]
    pub os_version: Option<String>,
    /// Device manufacturer.
    #[prost(string, optional, tag = "7")]
    pub manufacturer: Option<String>,
    /// Device model.
    #[prost(string, optional, tag = "8")]
    pub device: Option<String>,
    /// Release channel.
    #[prost(enumeration = "ReleaseChannel", optional, tag = "14")]
    pub release_channel: Option<i32>,
}

/// Registration block sent by a device that is not yet paired.
///
/// The server relays these keys to the primary device during QR pairing.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DevicePairingRegistrationData {
    /// Registration id, big-endian u32.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub e_regid: Option<Vec<u8>>,
    /// Key type marker (0x05 for Curve25519).
    #[prost(bytes = "vec", optional, tag = "2")]
    pub e_keytype: Option<Vec<u8>>,
    /// Identity key public bytes.
    #[prost(bytes = "vec", optional, tag = "3")]
    pub e_ident: Option<Vec<u8>>,
    /// Signed pre-key id, big-endian u24.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub e_skey_id: Option<Vec<u8>>,
    /// Signed pre-key public bytes.
    #[prost(bytes = "vec", optional, tag = "5")]
    pub e_skey_val: Option<Vec<u8>>,
    /// Signed pre-key signature.
    #[prost(bytes = "vec", optional, tag = "6")]
    pub e_skey_sig: Option<Vec<u8>>,
    /// Build hash of the connecting client.
    #[prost(bytes = "vec", optional, tag = "7")]
    pub build_hash: Option<Vec<u8>>,
    /// Serialized device properties.
    #[prost(bytes = "vec", optional, tag = "8")]
    pub device_props: Option<Vec<u8>>,
}

/// The client hello, encrypted into the last handshake message.
///
/// Exactly one of `username`/`device` (login) or `device_pairing_data`
/// (registration) is populated, driven by whether the store holds a paired
/// identity.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClientPayload {
    /// Account user id for login connects.
    #[prost(uint64, optional, tag = "1")]
    pub username: Option<u64>,
    /// Passive connects receive no offline stanzas.
    #[prost(bool, optional, tag = "3")]
    pub passive: Option<bool>,
    /// User agent block, always present.
    #[prost(message, optional, tag = "5")]
    pub user_agent: Option<UserAgent>,
    /// Push name for login connects.
    #[prost(string, optional, tag = "7")]
    pub push_name: Option<String>,
    /// Device index for login connects.
    #[prost(uint32, optional, tag = "10")]
    pub device: Option<u32>,
    /// Registration block for pairing connects.
    #[prost(message, optional, tag = "12")]
    pub device_pairing_data: Option<DevicePairingRegistrationData>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_login_payload_roundtrip() {
        let payload = ClientPayload {
            username: Some(15_551_234_567),
            passive: Some(false),
            user_agent: Some(UserAgent {
                platform: Some(Platform::Portable as i32),
                app_version: Some(AppVersion {
                    primary: Some(2),
                    secondary: Some(3000),
                    tertiary: Some(0),
                }),
                os_name: Some("linux".into()),
                ..Default::default()
            }),
            push_name: Some("tether".into()),
            device: Some(4),
            device_pairing_data: None,
        };
        let decoded = ClientPayload::decode(payload.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_registration_payload_roundtrip() {
        let payload = ClientPayload {
            passive: Some(false),
            device_pairing_data: Some(DevicePairingRegistrationData {
                e_regid: Some(vec![0, 0, 0x30, 0x39]),
                e_keytype: Some(vec![0x05]),
                e_ident: Some(vec![2; 32]),
                e_skey_id: Some(vec![0, 0, 1]),
                e_skey_val: Some(vec![3; 32]),
                e_skey_sig: Some(vec![4; 64]),
                build_hash: Some(vec![5; 16]),
                device_props: Some(Vec::new()),
            }),
            ..Default::default()
        };
        let decoded = ClientPayload::decode(payload.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, payload);
    }
}
