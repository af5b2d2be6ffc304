//! Client hello construction.
//!
//! An unpaired device sends its registration block so the server can relay
//! the keys to the primary device during QR pairing; a paired device logs
//! in with its account user and device index.

use crate::config::ClientConfig;
use sha2::{Digest, Sha256};
use tether_proto::{
    AppVersion, ClientPayload, DevicePairingRegistrationData, Platform, ReleaseChannel, UserAgent,
};
use tether_store::{Store, KEY_BUNDLE_TYPE};

pub(crate) async fn build_client_payload(store: &Store, config: &ClientConfig) -> ClientPayload {
    let device = store.device.read().await;
    let user_agent = UserAgent {
        platform: Some(Platform::Portable as i32),
        app_version: Some(AppVersion {
            primary: Some(config.version[0]),
            secondary: Some(config.version[1]),
            tertiary: Some(config.version[2]),
        }),
        os_name: Some(config.os_name.clone()),
        os_version: None,
        manufacturer: None,
        device: Some(config.device_name.clone()),
        release_channel: Some(ReleaseChannel::Release as i32),
    };

    match &device.id {
        Some(jid) => ClientPayload {
            username: jid.user.parse().ok(),
            passive: Some(false),
            user_agent: Some(user_agent),
            push_name: Some(device.push_name.clone()),
            device: Some(u32::from(jid.device)),
            device_pairing_data: None,
        },
        None => ClientPayload {
            username: None,
            passive: Some(false),
            user_agent: Some(user_agent),
            push_name: None,
            device: None,
            device_pairing_data: Some(DevicePairingRegistrationData {
                e_regid: Some(device.registration_id.to_be_bytes().to_vec()),
                e_keytype: Some(vec![KEY_BUNDLE_TYPE]),
                e_ident: Some(device.identity_key.public().to_vec()),
                e_skey_id: Some(device.signed_pre_key.key_id.to_be_bytes()[1..].to_vec()),
                e_skey_val: Some(device.signed_pre_key.key_pair.public().to_vec()),
                e_skey_sig: Some(device.signed_pre_key.signature.to_vec()),
                build_hash: Some(build_hash(config)),
                device_props: None,
            }),
        },
    }
}

fn build_hash(config: &ClientConfig) -> Vec<u8> {
    let [major, minor, patch] = config.version;
    let digest = Sha256::digest(format!("tether {major}.{minor}.{patch}"));
    digest[..16].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tether_binary::Jid;

    #[tokio::test]
    async fn test_unpaired_sends_registration_block() {
        let store = Arc::new(Store::new_in_memory());
        let payload = build_client_payload(&store, &ClientConfig::default()).await;
        let reg = payload.device_pairing_data.expect("registration block");
        assert!(payload.username.is_none());
        assert_eq!(reg.e_keytype.as_deref(), Some(&[KEY_BUNDLE_TYPE][..]));
        assert_eq!(reg.e_ident.as_ref().unwrap().len(), 32);
        assert_eq!(reg.e_skey_id.as_ref().unwrap().len(), 3);
        assert_eq!(reg.e_skey_sig.as_ref().unwrap().len(), 64);
        assert_eq!(reg.build_hash.as_ref().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_paired_logs_in_with_device_index() {
        let store = Arc::new(Store::new_in_memory());
        {
            let mut device = store.device.write().await;
            device.id = Some(Jid::new_ad("15551234567", 0, 7));
            device.push_name = "laptop".into();
        }
        let payload = build_client_payload(&store, &ClientConfig::default()).await;
        assert_eq!(payload.username, Some(15_551_234_567));
        assert_eq!(payload.device, Some(7));
        assert_eq!(payload.push_name.as_deref(), Some("laptop"));
        assert!(payload.device_pairing_data.is_none());
    }
}
