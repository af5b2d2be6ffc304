//! SQLite backend integration tests against a temporary database file.

use tempfile::TempDir;
use tether_store::sqlite::SqliteBackend;
use tether_store::{IdentityStore, LidMapStore, PreKeyStore, Store};

async fn open(dir: &TempDir) -> Store {
    Store::open_sqlite(&dir.path().join("store.db")).await.unwrap()
}

#[tokio::test]
async fn test_fresh_store_generates_and_persists_device() {
    let dir = TempDir::new().unwrap();
    let public = {
        let store = open(&dir).await;
        let public = *store.device.read().await.noise_key.public();
        public
    };

    // Reopening loads the same identity rather than generating a new one.
    let store = open(&dir).await;
    assert_eq!(*store.device.read().await.noise_key.public(), public);
}

#[tokio::test]
async fn test_device_row_roundtrip() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;
    {
        let mut device = store.device.write().await;
        device.id = Some("15551234567:4@c.tether.net".parse().unwrap());
        device.lid = Some("887766.1:4@lid".parse().unwrap());
        device.business_name = "Example Inc".into();
        device.platform = "desktop".into();
        device.push_name = "example".into();
    }
    store.save().await.unwrap();

    let reopened = open(&dir).await;
    let device = reopened.device.read().await;
    assert_eq!(device.id.as_ref().unwrap().device, 4);
    assert!(device.lid.as_ref().unwrap().is_lid());
    assert_eq!(device.business_name, "Example Inc");
    assert_eq!(device.platform, "desktop");
    assert!(device.is_paired());
}

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.db");
    // Connect twice; the second run must see the version table and skip.
    SqliteBackend::connect(&path).await.unwrap();
    SqliteBackend::connect(&path).await.unwrap();
}

#[tokio::test]
async fn test_delete_wipes_all_namespaces() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    store.identities.put_identity("peer:0", [1u8; 32]).await.unwrap();
    store.lid_map.put_lid_mapping("9@lid", "1@pn").await.unwrap();
    store.pre_keys.get_or_gen_pre_keys(3).await.unwrap();

    store.delete().await.unwrap();

    assert!(store.identities.get_identity("peer:0").await.unwrap().is_none());
    assert!(store.lid_map.get_pn_for_lid("9@lid").await.unwrap().is_none());
    assert_eq!(store.pre_keys.uploaded_pre_key_count().await.unwrap(), 0);

    // The device row is gone too: a fresh open regenerates.
    drop(store);
    let reopened = open(&dir).await;
    assert!(!reopened.device.read().await.is_paired());
}

#[tokio::test]
async fn test_pre_key_ring_persists_ids() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir).await;

    let first = store.pre_keys.get_or_gen_pre_keys(4).await.unwrap();
    assert_eq!(
        first.iter().map(|k| k.key_id).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    store.pre_keys.remove_pre_key(1).await.unwrap();

    // New generation continues after the highest ever issued id.
    let refilled = store.pre_keys.get_or_gen_pre_keys(4).await.unwrap();
    assert_eq!(
        refilled.iter().map(|k| k.key_id).collect::<Vec<_>>(),
        vec![2, 3, 4, 5]
    );
}
