//! The device row: this client's identity material and pairing state.

use rand::Rng;
use tether_binary::Jid;
use tether_crypto::{xeddsa, KeyPair};
use tether_proto::SignedDeviceIdentity;

/// Curve25519 key type marker used by the double-ratchet library.
pub const KEY_BUNDLE_TYPE: u8 = 0x05;

/// A signed pre-key: keypair, numeric id and the identity-key signature
/// over its type-prefixed public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPreKey {
    /// The pre-key pair itself.
    pub key_pair: KeyPair,
    /// Numeric id referenced by pre-key messages.
    pub key_id: u32,
    /// XEd25519 signature by the identity key.
    pub signature: [u8; 64],
}

impl SignedPreKey {
    /// Generate and sign a fresh pre-key under `identity_key`.
    #[must_use]
    pub fn generate(identity_key: &KeyPair, key_id: u32) -> Self {
        let key_pair = KeyPair::generate();
        let mut message = Vec::with_capacity(33);
        message.push(KEY_BUNDLE_TYPE);
        message.extend_from_slice(key_pair.public());
        let signature = xeddsa::sign(identity_key, &message);
        Self {
            key_pair,
            key_id,
            signature,
        }
    }
}

/// Everything the store persists about this device.
///
/// Key material is generated once at first run and never rotated while
/// paired. `id`, `lid` and `account` are written together by the pairing
/// commit and cleared together by logout; `account` is present iff `id`
/// is present.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// X25519 keypair used only for the Noise transport.
    pub noise_key: KeyPair,
    /// Curve25519 keypair for the double-ratchet protocol and
    /// device-identity signatures.
    pub identity_key: KeyPair,
    /// Current signed pre-key.
    pub signed_pre_key: SignedPreKey,
    /// Registration id advertised to the server.
    pub registration_id: u32,
    /// 32-byte secret shared with the primary device at pairing; HMAC key
    /// over device-identity blobs.
    pub adv_secret_key: [u8; 32],
    /// Own device-qualified address; `None` until paired.
    pub id: Option<Jid>,
    /// Own address in the pseudonymous namespace.
    pub lid: Option<Jid>,
    /// Verified business name, empty for consumer accounts.
    pub business_name: String,
    /// Primary device's platform name.
    pub platform: String,
    /// Display name pushed with outgoing messages.
    pub push_name: String,
    /// Server-attested, self-counter-signed device identity.
    pub account: Option<SignedDeviceIdentity>,
}

impl Device {
    /// Generate fresh, unpaired device material.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let identity_key = KeyPair::generate();
        let signed_pre_key = SignedPreKey::generate(&identity_key, 1);
        let mut adv_secret_key = [0u8; 32];
        rng.fill(&mut adv_secret_key);
        Self {
            noise_key: KeyPair::generate(),
            identity_key,
            signed_pre_key,
            registration_id: rng.gen_range(1..=0x3FFF_FFFF),
            adv_secret_key,
            id: None,
            lid: None,
            business_name: String::new(),
            platform: String::new(),
            push_name: String::new(),
            account: None,
        }
    }

    /// Whether this device has completed pairing.
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unpaired() {
        let device = Device::generate();
        assert!(!device.is_paired());
        assert!(device.account.is_none());
        assert_ne!(device.noise_key.public(), device.identity_key.public());
        assert!(device.registration_id >= 1);
    }

    #[test]
    fn test_signed_pre_key_verifies() {
        let device = Device::generate();
        let mut message = vec![KEY_BUNDLE_TYPE];
        message.extend_from_slice(device.signed_pre_key.key_pair.public());
        assert!(xeddsa::verify(
            device.identity_key.public(),
            &message,
            &device.signed_pre_key.signature
        ));
    }
}
