//! In-memory backend for tests and ephemeral sessions.

use crate::device::Device;
use crate::error::StoreError;
use crate::traits::*;
use crate::{DeviceBackend, PreKey};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tether_crypto::KeyPair;
use tokio::sync::RwLock;

/// Everything in maps; per-namespace writes serialize on their own lock.
#[derive(Default)]
pub struct MemoryBackend {
    device: RwLock<Option<Device>>,
    identities: RwLock<HashMap<String, [u8; 32]>>,
    sessions: RwLock<HashMap<String, Vec<u8>>>,
    pre_keys: RwLock<PreKeyRing>,
    sender_keys: RwLock<HashMap<(String, String), Vec<u8>>>,
    app_state: RwLock<HashMap<String, (u64, [u8; 32])>>,
    chat_settings: RwLock<HashMap<String, ChatSettings>>,
    contacts: RwLock<HashMap<String, ContactInfo>>,
    lid_map: RwLock<LidMap>,
}

#[derive(Default)]
struct PreKeyRing {
    keys: BTreeMap<u32, PreKey>,
    next_id: u32,
}

#[derive(Default)]
struct LidMap {
    lid_to_pn: HashMap<String, String>,
    pn_to_lid: HashMap<String, String>,
}

impl MemoryBackend {
    /// Empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceBackend for MemoryBackend {
    async fn save_device(&self, device: &Device) -> Result<(), StoreError> {
        *self.device.write().await = Some(device.clone());
        Ok(())
    }

    async fn load_device(&self) -> Result<Option<Device>, StoreError> {
        Ok(self.device.read().await.clone())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        *self.device.write().await = None;
        self.identities.write().await.clear();
        self.sessions.write().await.clear();
        *self.pre_keys.write().await = PreKeyRing::default();
        self.sender_keys.write().await.clear();
        self.app_state.write().await.clear();
        self.chat_settings.write().await.clear();
        self.contacts.write().await.clear();
        *self.lid_map.write().await = LidMap::default();
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryBackend {
    async fn put_identity(&self, address: &str, key: [u8; 32]) -> Result<(), StoreError> {
        self.identities.write().await.insert(address.to_owned(), key);
        Ok(())
    }

    async fn delete_identity(&self, address: &str) -> Result<(), StoreError> {
        self.identities.write().await.remove(address);
        Ok(())
    }

    async fn get_identity(&self, address: &str) -> Result<Option<[u8; 32]>, StoreError> {
        Ok(self.identities.read().await.get(address).copied())
    }

    async fn is_trusted_identity(&self, address: &str, key: &[u8; 32]) -> Result<bool, StoreError> {
        Ok(match self.identities.read().await.get(address) {
            Some(stored) => stored == key,
            None => true,
        })
    }
}

#[async_trait]
impl SessionStore for MemoryBackend {
    async fn get_session(&self, address: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.sessions.read().await.get(address).cloned())
    }

    async fn put_session(&self, address: &str, record: &[u8]) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(address.to_owned(), record.to_vec());
        Ok(())
    }

    async fn delete_session(&self, address: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(address);
        Ok(())
    }

    async fn has_session(&self, address: &str) -> Result<bool, StoreError> {
        Ok(self.sessions.read().await.contains_key(address))
    }
}

#[async_trait]
impl PreKeyStore for MemoryBackend {
    async fn get_or_gen_pre_keys(&self, count: u32) -> Result<Vec<PreKey>, StoreError> {
        let mut ring = self.pre_keys.write().await;
        while (ring.keys.len() as u32) < count {
            ring.next_id += 1;
            let key_id = ring.next_id;
            ring.keys.insert(
                key_id,
                PreKey {
                    key_pair: KeyPair::generate(),
                    key_id,
                    uploaded: false,
                },
            );
        }
        Ok(ring.keys.values().take(count as usize).cloned().collect())
    }

    async fn get_pre_key(&self, id: u32) -> Result<Option<PreKey>, StoreError> {
        Ok(self.pre_keys.read().await.keys.get(&id).cloned())
    }

    async fn remove_pre_key(&self, id: u32) -> Result<(), StoreError> {
        self.pre_keys.write().await.keys.remove(&id);
        Ok(())
    }

    async fn mark_pre_keys_as_uploaded(&self, up_to: u32) -> Result<(), StoreError> {
        let mut ring = self.pre_keys.write().await;
        for (_, key) in ring.keys.range_mut(..=up_to) {
            key.uploaded = true;
        }
        Ok(())
    }

    async fn uploaded_pre_key_count(&self) -> Result<u32, StoreError> {
        Ok(self
            .pre_keys
            .read()
            .await
            .keys
            .values()
            .filter(|key| key.uploaded)
            .count() as u32)
    }
}

#[async_trait]
impl SenderKeyStore for MemoryBackend {
    async fn put_sender_key(
        &self,
        group: &str,
        sender: &str,
        record: &[u8],
    ) -> Result<(), StoreError> {
        self.sender_keys
            .write()
            .await
            .insert((group.to_owned(), sender.to_owned()), record.to_vec());
        Ok(())
    }

    async fn get_sender_key(
        &self,
        group: &str,
        sender: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .sender_keys
            .read()
            .await
            .get(&(group.to_owned(), sender.to_owned()))
            .cloned())
    }
}

#[async_trait]
impl AppStateStore for MemoryBackend {
    async fn put_app_state_version(
        &self,
        name: &str,
        version: u64,
        hash: [u8; 32],
    ) -> Result<(), StoreError> {
        self.app_state
            .write()
            .await
            .insert(name.to_owned(), (version, hash));
        Ok(())
    }

    async fn get_app_state_version(
        &self,
        name: &str,
    ) -> Result<Option<(u64, [u8; 32])>, StoreError> {
        Ok(self.app_state.read().await.get(name).copied())
    }
}

#[async_trait]
impl ChatSettingsStore for MemoryBackend {
    async fn put_chat_settings(
        &self,
        chat: &str,
        settings: ChatSettings,
    ) -> Result<(), StoreError> {
        self.chat_settings
            .write()
            .await
            .insert(chat.to_owned(), settings);
        Ok(())
    }

    async fn get_chat_settings(&self, chat: &str) -> Result<ChatSettings, StoreError> {
        Ok(self
            .chat_settings
            .read()
            .await
            .get(chat)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ContactStore for MemoryBackend {
    async fn put_push_name(&self, jid: &str, push_name: &str) -> Result<(), StoreError> {
        let mut contacts = self.contacts.write().await;
        contacts.entry(jid.to_owned()).or_default().push_name = push_name.to_owned();
        Ok(())
    }

    async fn put_contact(&self, jid: &str, info: ContactInfo) -> Result<(), StoreError> {
        self.contacts.write().await.insert(jid.to_owned(), info);
        Ok(())
    }

    async fn get_contact(&self, jid: &str) -> Result<Option<ContactInfo>, StoreError> {
        Ok(self.contacts.read().await.get(jid).cloned())
    }
}

#[async_trait]
impl LidMapStore for MemoryBackend {
    async fn put_lid_mapping(&self, lid: &str, pn: &str) -> Result<(), StoreError> {
        let mut map = self.lid_map.write().await;
        if let Some(old_pn) = map.lid_to_pn.insert(lid.to_owned(), pn.to_owned()) {
            map.pn_to_lid.remove(&old_pn);
        }
        if let Some(old_lid) = map.pn_to_lid.insert(pn.to_owned(), lid.to_owned()) {
            if old_lid != lid {
                map.lid_to_pn.remove(&old_lid);
            }
        }
        Ok(())
    }

    async fn get_lid_for_pn(&self, pn: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lid_map.read().await.pn_to_lid.get(pn).cloned())
    }

    async fn get_pn_for_lid(&self, lid: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lid_map.read().await.lid_to_pn.get(lid).cloned())
    }
}
