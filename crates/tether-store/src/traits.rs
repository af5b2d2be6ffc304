//! Namespaced repository traits.
//!
//! Every mutator is transactional within its own namespace and safe for
//! concurrent use; per-namespace writes serialize inside the backend.
//! Callers only ever see public key material through these interfaces.

use crate::error::StoreError;
use crate::PreKey;
use async_trait::async_trait;

/// Per-peer double-ratchet identity keys, addressed as `name:device-index`.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert or replace a peer identity key.
    async fn put_identity(&self, address: &str, key: [u8; 32]) -> Result<(), StoreError>;
    /// Remove a peer identity key.
    async fn delete_identity(&self, address: &str) -> Result<(), StoreError>;
    /// Fetch a peer identity key.
    async fn get_identity(&self, address: &str) -> Result<Option<[u8; 32]>, StoreError>;
    /// True when `key` matches the stored identity, or none is stored yet.
    async fn is_trusted_identity(&self, address: &str, key: &[u8; 32]) -> Result<bool, StoreError>;
}

/// Opaque double-ratchet session records.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a session record.
    async fn get_session(&self, address: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Insert or replace a session record.
    async fn put_session(&self, address: &str, record: &[u8]) -> Result<(), StoreError>;
    /// Remove a session record.
    async fn delete_session(&self, address: &str) -> Result<(), StoreError>;
    /// True when a record exists for `address`.
    async fn has_session(&self, address: &str) -> Result<bool, StoreError>;
}

/// Bounded ring of one-time pre-keys.
#[async_trait]
pub trait PreKeyStore: Send + Sync {
    /// Return `count` unused pre-keys, generating new ones to fill.
    async fn get_or_gen_pre_keys(&self, count: u32) -> Result<Vec<PreKey>, StoreError>;
    /// Fetch one pre-key by id.
    async fn get_pre_key(&self, id: u32) -> Result<Option<PreKey>, StoreError>;
    /// Remove a consumed pre-key.
    async fn remove_pre_key(&self, id: u32) -> Result<(), StoreError>;
    /// Mark every pre-key with id up to `up_to` as uploaded.
    async fn mark_pre_keys_as_uploaded(&self, up_to: u32) -> Result<(), StoreError>;
    /// Number of uploaded, unconsumed pre-keys.
    async fn uploaded_pre_key_count(&self) -> Result<u32, StoreError>;
}

/// Group sender-key records.
#[async_trait]
pub trait SenderKeyStore: Send + Sync {
    /// Insert or replace a sender key.
    async fn put_sender_key(
        &self,
        group: &str,
        sender: &str,
        record: &[u8],
    ) -> Result<(), StoreError>;
    /// Fetch a sender key.
    async fn get_sender_key(&self, group: &str, sender: &str)
        -> Result<Option<Vec<u8>>, StoreError>;
}

/// App-state sync checkpoints, keyed by collection name.
#[async_trait]
pub trait AppStateStore: Send + Sync {
    /// Store a collection's version and state hash.
    async fn put_app_state_version(
        &self,
        name: &str,
        version: u64,
        hash: [u8; 32],
    ) -> Result<(), StoreError>;
    /// Fetch a collection's version and state hash.
    async fn get_app_state_version(&self, name: &str)
        -> Result<Option<(u64, [u8; 32])>, StoreError>;
}

/// Local per-chat settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSettings {
    /// Mute deadline, seconds since the epoch; zero means unmuted.
    pub muted_until: i64,
    /// Chat pinned to the top of the list.
    pub pinned: bool,
    /// Chat archived.
    pub archived: bool,
}

/// Per-chat settings storage.
#[async_trait]
pub trait ChatSettingsStore: Send + Sync {
    /// Insert or replace a chat's settings.
    async fn put_chat_settings(&self, chat: &str, settings: ChatSettings)
        -> Result<(), StoreError>;
    /// Fetch a chat's settings, defaults when unset.
    async fn get_chat_settings(&self, chat: &str) -> Result<ChatSettings, StoreError>;
}

/// Names known for a contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactInfo {
    /// First name from the address book.
    pub first_name: String,
    /// Full name from the address book.
    pub full_name: String,
    /// Push name the contact broadcasts.
    pub push_name: String,
    /// Verified business name.
    pub business_name: String,
}

/// Contact name storage.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Update a contact's push name.
    async fn put_push_name(&self, jid: &str, push_name: &str) -> Result<(), StoreError>;
    /// Insert or replace a whole contact entry.
    async fn put_contact(&self, jid: &str, info: ContactInfo) -> Result<(), StoreError>;
    /// Fetch a contact entry.
    async fn get_contact(&self, jid: &str) -> Result<Option<ContactInfo>, StoreError>;
}

/// Bidirectional mapping between pseudonymous and phone-number addresses.
#[async_trait]
pub trait LidMapStore: Send + Sync {
    /// Install a LID↔PN pair, replacing stale entries on both sides.
    async fn put_lid_mapping(&self, lid: &str, pn: &str) -> Result<(), StoreError>;
    /// Resolve a PN address to its LID.
    async fn get_lid_for_pn(&self, pn: &str) -> Result<Option<String>, StoreError>;
    /// Resolve a LID address to its PN.
    async fn get_pn_for_lid(&self, lid: &str) -> Result<Option<String>, StoreError>;
}
