//! # Tether Store
//!
//! Persistent identity and key store for the session core. One [`Device`]
//! row holds the long-lived key material and pairing state; eight
//! namespaced repositories hold per-peer double-ratchet state, pre-keys,
//! app-state checkpoints, chat settings, contacts and the LID↔PN map.
//!
//! Two backends exist: [`memory::MemoryBackend`] for tests and ephemeral
//! clients, and [`sqlite::SqliteBackend`] with a schema version table and
//! ordered migrations. `Store::save` persists the device row atomically;
//! `Store::delete` wipes everything, which is the pairing rollback path.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod device;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use device::{Device, SignedPreKey, KEY_BUNDLE_TYPE};
pub use error::StoreError;
pub use traits::{
    AppStateStore, ChatSettings, ChatSettingsStore, ContactInfo, ContactStore, IdentityStore,
    LidMapStore, PreKeyStore, SenderKeyStore, SessionStore,
};

use async_trait::async_trait;
use std::sync::Arc;
use tether_crypto::KeyPair;
use tokio::sync::RwLock;

/// One one-time pre-key in the ring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreKey {
    /// The pre-key pair.
    pub key_pair: KeyPair,
    /// Numeric id referenced by pre-key messages.
    pub key_id: u32,
    /// Whether this key has been uploaded to the server.
    pub uploaded: bool,
}

/// Persistence backend for the device row.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// Persist the device row atomically.
    async fn save_device(&self, device: &Device) -> Result<(), StoreError>;
    /// Load the device row, if one was saved.
    async fn load_device(&self) -> Result<Option<Device>, StoreError>;
    /// Wipe the device row and every namespace.
    async fn delete_all(&self) -> Result<(), StoreError>;
}

/// The assembled store: device row plus namespaced repositories.
///
/// Shared across handlers behind an `Arc`; the device row is guarded by a
/// `RwLock`, the repositories synchronize internally.
pub struct Store {
    /// The device row.
    pub device: RwLock<Device>,
    /// Per-peer identity keys.
    pub identities: Arc<dyn IdentityStore>,
    /// Double-ratchet session records.
    pub sessions: Arc<dyn SessionStore>,
    /// One-time pre-key ring.
    pub pre_keys: Arc<dyn PreKeyStore>,
    /// Group sender keys.
    pub sender_keys: Arc<dyn SenderKeyStore>,
    /// App-state sync checkpoints.
    pub app_state: Arc<dyn AppStateStore>,
    /// Per-chat settings.
    pub chat_settings: Arc<dyn ChatSettingsStore>,
    /// Contact names.
    pub contacts: Arc<dyn ContactStore>,
    /// LID↔PN address map.
    pub lid_map: Arc<dyn LidMapStore>,
    backend: Arc<dyn DeviceBackend>,
}

impl Store {
    /// Assemble a store from a device row and a backend that implements
    /// every repository.
    pub fn assemble<B>(device: Device, backend: Arc<B>) -> Self
    where
        B: DeviceBackend
            + IdentityStore
            + SessionStore
            + PreKeyStore
            + SenderKeyStore
            + AppStateStore
            + ChatSettingsStore
            + ContactStore
            + LidMapStore
            + 'static,
    {
        Self {
            device: RwLock::new(device),
            identities: backend.clone(),
            sessions: backend.clone(),
            pre_keys: backend.clone(),
            sender_keys: backend.clone(),
            app_state: backend.clone(),
            chat_settings: backend.clone(),
            contacts: backend.clone(),
            lid_map: backend.clone(),
            backend,
        }
    }

    /// Fresh in-memory store with generated device material.
    #[must_use]
    pub fn new_in_memory() -> Self {
        Self::assemble(Device::generate(), Arc::new(memory::MemoryBackend::new()))
    }

    /// Open (or initialize) a SQLite-backed store.
    ///
    /// Loads the saved device row when one exists; otherwise generates
    /// fresh material and persists it.
    ///
    /// # Errors
    ///
    /// Propagates connection, migration and row-decoding failures.
    pub async fn open_sqlite(path: &std::path::Path) -> Result<Self, StoreError> {
        let backend = Arc::new(sqlite::SqliteBackend::connect(path).await?);
        let device = match backend.load_device().await? {
            Some(device) => device,
            None => {
                let device = Device::generate();
                backend.save_device(&device).await?;
                tracing::info!("generated fresh device identity");
                device
            }
        };
        Ok(Self::assemble(device, backend))
    }

    /// Persist the device row.
    ///
    /// # Errors
    ///
    /// Propagates backend failures; the row is written whole or not at all.
    pub async fn save(&self) -> Result<(), StoreError> {
        let device = self.device.read().await.clone();
        self.backend.save_device(&device).await
    }

    /// Wipe the device row and every namespace.
    ///
    /// This is the pairing rollback path: a failure after `id` was
    /// persisted must not leave a half-paired store behind.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn delete(&self) -> Result<(), StoreError> {
        tracing::warn!("wiping device store");
        self.backend.delete_all().await
    }
}
