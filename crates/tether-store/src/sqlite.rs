//! SQLite backend.
//!
//! One database holds the device row and every namespace. The `version`
//! table pins the schema; ordered migrations bring older databases up to
//! date inside a single transaction at connect time.

use crate::device::{Device, SignedPreKey};
use crate::error::StoreError;
use crate::traits::*;
use crate::{DeviceBackend, PreKey};
use async_trait::async_trait;
use prost::Message;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use sqlx::Row;
use std::path::Path;
use tether_crypto::KeyPair;
use tether_proto::SignedDeviceIdentity;

/// Newest schema version this build writes.
pub const SCHEMA_VERSION: i64 = 2;

/// Ordered migrations; index + 1 is the version they produce.
const MIGRATIONS: &[&str] = &[
    // v1: device row and the double-ratchet namespaces
    "CREATE TABLE device (
        lock INTEGER PRIMARY KEY CHECK (lock = 1),
        noise_key BLOB NOT NULL,
        identity_key BLOB NOT NULL,
        signed_pre_key BLOB NOT NULL,
        signed_pre_key_id INTEGER NOT NULL,
        signed_pre_key_sig BLOB NOT NULL,
        adv_secret BLOB NOT NULL,
        registration_id INTEGER NOT NULL,
        jid TEXT,
        lid TEXT,
        business_name TEXT NOT NULL DEFAULT '',
        platform TEXT NOT NULL DEFAULT '',
        push_name TEXT NOT NULL DEFAULT '',
        account BLOB
    );
    CREATE TABLE identities (
        address TEXT PRIMARY KEY,
        key BLOB NOT NULL
    );
    CREATE TABLE sessions (
        address TEXT PRIMARY KEY,
        record BLOB NOT NULL
    );
    CREATE TABLE pre_keys (
        key_id INTEGER PRIMARY KEY,
        key BLOB NOT NULL,
        uploaded INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE sender_keys (
        group_id TEXT NOT NULL,
        sender TEXT NOT NULL,
        record BLOB NOT NULL,
        PRIMARY KEY (group_id, sender)
    );
    CREATE TABLE app_state_versions (
        name TEXT PRIMARY KEY,
        version INTEGER NOT NULL,
        hash BLOB NOT NULL
    );
    CREATE TABLE chat_settings (
        chat TEXT PRIMARY KEY,
        muted_until INTEGER NOT NULL DEFAULT 0,
        pinned INTEGER NOT NULL DEFAULT 0,
        archived INTEGER NOT NULL DEFAULT 0
    );",
    // v2: contact names and the LID↔PN map
    "CREATE TABLE contacts (
        jid TEXT PRIMARY KEY,
        first_name TEXT NOT NULL DEFAULT '',
        full_name TEXT NOT NULL DEFAULT '',
        push_name TEXT NOT NULL DEFAULT '',
        business_name TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE lid_map (
        lid TEXT PRIMARY KEY,
        pn TEXT UNIQUE NOT NULL
    );",
];

/// SQLite-backed store implementation.
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Open the database, creating and migrating as needed.
    ///
    /// # Errors
    ///
    /// Propagates connection and migration failures; refuses databases
    /// written by a newer build with [`StoreError::SchemaTooNew`].
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options).await?;
        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("CREATE TABLE IF NOT EXISTS version (version INTEGER NOT NULL)")
            .execute(&mut *tx)
            .await?;
        let current: Option<i64> = sqlx::query_scalar("SELECT version FROM version")
            .fetch_optional(&mut *tx)
            .await?;
        let current = current.unwrap_or(0);
        if current > SCHEMA_VERSION {
            return Err(StoreError::SchemaTooNew {
                found: current,
                supported: SCHEMA_VERSION,
            });
        }

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = i as i64 + 1;
            if version <= current {
                continue;
            }
            tracing::info!(version, "applying store migration");
            sqlx::raw_sql(migration).execute(&mut *tx).await?;
        }

        sqlx::query("DELETE FROM version").execute(&mut *tx).await?;
        sqlx::query("INSERT INTO version (version) VALUES (?)")
            .bind(SCHEMA_VERSION)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    fn key_blob(pair: &KeyPair) -> Vec<u8> {
        let mut blob = Vec::with_capacity(64);
        blob.extend_from_slice(pair.private());
        blob.extend_from_slice(pair.public());
        blob
    }

    fn key_from_blob(blob: &[u8]) -> Result<KeyPair, StoreError> {
        if blob.len() != 64 {
            return Err(StoreError::Corrupt(format!(
                "keypair blob of {} bytes",
                blob.len()
            )));
        }
        KeyPair::from_private_slice(&blob[..32]).map_err(Into::into)
    }
}

#[async_trait]
impl DeviceBackend for SqliteBackend {
    async fn save_device(&self, device: &Device) -> Result<(), StoreError> {
        let account = device
            .account
            .as_ref()
            .map(SignedDeviceIdentity::encode_to_vec);
        sqlx::query(
            "INSERT OR REPLACE INTO device (
                lock, noise_key, identity_key,
                signed_pre_key, signed_pre_key_id, signed_pre_key_sig,
                adv_secret, registration_id,
                jid, lid, business_name, platform, push_name, account
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(Self::key_blob(&device.noise_key))
        .bind(Self::key_blob(&device.identity_key))
        .bind(Self::key_blob(&device.signed_pre_key.key_pair))
        .bind(i64::from(device.signed_pre_key.key_id))
        .bind(device.signed_pre_key.signature.to_vec())
        .bind(device.adv_secret_key.to_vec())
        .bind(i64::from(device.registration_id))
        .bind(device.id.as_ref().map(ToString::to_string))
        .bind(device.lid.as_ref().map(ToString::to_string))
        .bind(&device.business_name)
        .bind(&device.platform)
        .bind(&device.push_name)
        .bind(account)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_device(&self) -> Result<Option<Device>, StoreError> {
        let Some(row) = sqlx::query("SELECT * FROM device WHERE lock = 1")
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let parse_jid = |text: Option<String>| -> Result<Option<tether_binary::Jid>, StoreError> {
            text.map(|s| {
                s.parse()
                    .map_err(|_| StoreError::Corrupt(format!("stored jid {s:?}")))
            })
            .transpose()
        };

        let signature: Vec<u8> = row.try_get("signed_pre_key_sig")?;
        let signature: [u8; 64] = signature
            .try_into()
            .map_err(|_| StoreError::Corrupt("signed pre-key signature length".into()))?;
        let adv_secret: Vec<u8> = row.try_get("adv_secret")?;
        let adv_secret_key: [u8; 32] = adv_secret
            .try_into()
            .map_err(|_| StoreError::Corrupt("adv secret length".into()))?;
        let account: Option<Vec<u8>> = row.try_get("account")?;
        let account = account
            .map(|blob| SignedDeviceIdentity::decode(blob.as_slice()))
            .transpose()?;

        Ok(Some(Device {
            noise_key: Self::key_from_blob(&row.try_get::<Vec<u8>, _>("noise_key")?)?,
            identity_key: Self::key_from_blob(&row.try_get::<Vec<u8>, _>("identity_key")?)?,
            signed_pre_key: SignedPreKey {
                key_pair: Self::key_from_blob(&row.try_get::<Vec<u8>, _>("signed_pre_key")?)?,
                key_id: row.try_get::<i64, _>("signed_pre_key_id")? as u32,
                signature,
            },
            registration_id: row.try_get::<i64, _>("registration_id")? as u32,
            adv_secret_key,
            id: parse_jid(row.try_get("jid")?)?,
            lid: parse_jid(row.try_get("lid")?)?,
            business_name: row.try_get("business_name")?,
            platform: row.try_get("platform")?,
            push_name: row.try_get("push_name")?,
            account,
        }))
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "device",
            "identities",
            "sessions",
            "pre_keys",
            "sender_keys",
            "app_state_versions",
            "chat_settings",
            "contacts",
            "lid_map",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for SqliteBackend {
    async fn put_identity(&self, address: &str, key: [u8; 32]) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO identities (address, key) VALUES (?, ?)")
            .bind(address)
            .bind(key.to_vec())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_identity(&self, address: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM identities WHERE address = ?")
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_identity(&self, address: &str) -> Result<Option<[u8; 32]>, StoreError> {
        let blob: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT key FROM identities WHERE address = ?")
                .bind(address)
                .fetch_optional(&self.pool)
                .await?;
        blob.map(|blob| {
            blob.try_into()
                .map_err(|_| StoreError::Corrupt("identity key length".into()))
        })
        .transpose()
    }

    async fn is_trusted_identity(&self, address: &str, key: &[u8; 32]) -> Result<bool, StoreError> {
        Ok(match self.get_identity(address).await? {
            Some(stored) => &stored == key,
            None => true,
        })
    }
}

#[async_trait]
impl SessionStore for SqliteBackend {
    async fn get_session(&self, address: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT record FROM sessions WHERE address = ?")
                .bind(address)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn put_session(&self, address: &str, record: &[u8]) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO sessions (address, record) VALUES (?, ?)")
            .bind(address)
            .bind(record)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_session(&self, address: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sessions WHERE address = ?")
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn has_session(&self, address: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE address = ?")
            .bind(address)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }
}

#[async_trait]
impl PreKeyStore for SqliteBackend {
    async fn get_or_gen_pre_keys(&self, count: u32) -> Result<Vec<PreKey>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query("SELECT key_id, key, uploaded FROM pre_keys ORDER BY key_id")
            .fetch_all(&mut *tx)
            .await?;
        let mut keys = Vec::with_capacity(count as usize);
        for row in &rows {
            if keys.len() as u32 >= count {
                break;
            }
            keys.push(PreKey {
                key_pair: KeyPair::from_private_slice(&row.try_get::<Vec<u8>, _>("key")?)?,
                key_id: row.try_get::<i64, _>("key_id")? as u32,
                uploaded: row.try_get::<i64, _>("uploaded")? != 0,
            });
        }

        let mut next_id: u32 = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(key_id) FROM pre_keys")
            .fetch_one(&mut *tx)
            .await?
            .unwrap_or(0) as u32;
        while (keys.len() as u32) < count {
            next_id += 1;
            let pre_key = PreKey {
                key_pair: KeyPair::generate(),
                key_id: next_id,
                uploaded: false,
            };
            sqlx::query("INSERT INTO pre_keys (key_id, key, uploaded) VALUES (?, ?, 0)")
                .bind(i64::from(next_id))
                .bind(pre_key.key_pair.private().to_vec())
                .execute(&mut *tx)
                .await?;
            keys.push(pre_key);
        }
        tx.commit().await?;
        Ok(keys)
    }

    async fn get_pre_key(&self, id: u32) -> Result<Option<PreKey>, StoreError> {
        let Some(row) = sqlx::query("SELECT key_id, key, uploaded FROM pre_keys WHERE key_id = ?")
            .bind(i64::from(id))
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(PreKey {
            key_pair: KeyPair::from_private_slice(&row.try_get::<Vec<u8>, _>("key")?)?,
            key_id: row.try_get::<i64, _>("key_id")? as u32,
            uploaded: row.try_get::<i64, _>("uploaded")? != 0,
        }))
    }

    async fn remove_pre_key(&self, id: u32) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pre_keys WHERE key_id = ?")
            .bind(i64::from(id))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_pre_keys_as_uploaded(&self, up_to: u32) -> Result<(), StoreError> {
        sqlx::query("UPDATE pre_keys SET uploaded = 1 WHERE key_id <= ?")
            .bind(i64::from(up_to))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn uploaded_pre_key_count(&self) -> Result<u32, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pre_keys WHERE uploaded = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u32)
    }
}

#[async_trait]
impl SenderKeyStore for SqliteBackend {
    async fn put_sender_key(
        &self,
        group: &str,
        sender: &str,
        record: &[u8],
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO sender_keys (group_id, sender, record) VALUES (?, ?, ?)",
        )
        .bind(group)
        .bind(sender)
        .bind(record)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_sender_key(
        &self,
        group: &str,
        sender: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(sqlx::query_scalar(
            "SELECT record FROM sender_keys WHERE group_id = ? AND sender = ?",
        )
        .bind(group)
        .bind(sender)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl AppStateStore for SqliteBackend {
    async fn put_app_state_version(
        &self,
        name: &str,
        version: u64,
        hash: [u8; 32],
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO app_state_versions (name, version, hash) VALUES (?, ?, ?)",
        )
        .bind(name)
        .bind(version as i64)
        .bind(hash.to_vec())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_app_state_version(
        &self,
        name: &str,
    ) -> Result<Option<(u64, [u8; 32])>, StoreError> {
        let Some(row) =
            sqlx::query("SELECT version, hash FROM app_state_versions WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?
        else {
            return Ok(None);
        };
        let hash: Vec<u8> = row.try_get("hash")?;
        let hash: [u8; 32] = hash
            .try_into()
            .map_err(|_| StoreError::Corrupt("app state hash length".into()))?;
        Ok(Some((row.try_get::<i64, _>("version")? as u64, hash)))
    }
}

#[async_trait]
impl ChatSettingsStore for SqliteBackend {
    async fn put_chat_settings(
        &self,
        chat: &str,
        settings: ChatSettings,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO chat_settings (chat, muted_until, pinned, archived)
             VALUES (?, ?, ?, ?)",
        )
        .bind(chat)
        .bind(settings.muted_until)
        .bind(i64::from(settings.pinned))
        .bind(i64::from(settings.archived))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_chat_settings(&self, chat: &str) -> Result<ChatSettings, StoreError> {
        let Some(row) = sqlx::query(
            "SELECT muted_until, pinned, archived FROM chat_settings WHERE chat = ?",
        )
        .bind(chat)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(ChatSettings::default());
        };
        Ok(ChatSettings {
            muted_until: row.try_get("muted_until")?,
            pinned: row.try_get::<i64, _>("pinned")? != 0,
            archived: row.try_get::<i64, _>("archived")? != 0,
        })
    }
}

#[async_trait]
impl ContactStore for SqliteBackend {
    async fn put_push_name(&self, jid: &str, push_name: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO contacts (jid, push_name) VALUES (?, ?)
             ON CONFLICT (jid) DO UPDATE SET push_name = excluded.push_name",
        )
        .bind(jid)
        .bind(push_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_contact(&self, jid: &str, info: ContactInfo) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO contacts (jid, first_name, full_name, push_name, business_name)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(jid)
        .bind(&info.first_name)
        .bind(&info.full_name)
        .bind(&info.push_name)
        .bind(&info.business_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_contact(&self, jid: &str) -> Result<Option<ContactInfo>, StoreError> {
        let Some(row) = sqlx::query(
            "SELECT first_name, full_name, push_name, business_name FROM contacts WHERE jid = ?",
        )
        .bind(jid)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };
        Ok(Some(ContactInfo {
            first_name: row.try_get("first_name")?,
            full_name: row.try_get("full_name")?,
            push_name: row.try_get("push_name")?,
            business_name: row.try_get("business_name")?,
        }))
    }
}

#[async_trait]
impl LidMapStore for SqliteBackend {
    async fn put_lid_mapping(&self, lid: &str, pn: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM lid_map WHERE lid = ? OR pn = ?")
            .bind(lid)
            .bind(pn)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO lid_map (lid, pn) VALUES (?, ?)")
            .bind(lid)
            .bind(pn)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_lid_for_pn(&self, pn: &str) -> Result<Option<String>, StoreError> {
        Ok(sqlx::query_scalar("SELECT lid FROM lid_map WHERE pn = ?")
            .bind(pn)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_pn_for_lid(&self, lid: &str) -> Result<Option<String>, StoreError> {
        Ok(sqlx::query_scalar("SELECT pn FROM lid_map WHERE lid = ?")
            .bind(lid)
            .fetch_optional(&self.pool)
            .await?)
    }
}
