//! QR device pairing and identity counter-signing.
//!
//! Two server-initiated stanzas drive enrollment. `pair-device` advertises
//! rotating refs that become QR codes; `pair-success` delivers the
//! HMAC-authenticated, account-signed device identity, which this device
//! verifies, counter-signs and commits to the store before confirming to
//! the server. The commit is two-phase: a failure after the device row was
//! written rolls back by wiping the store.

use crate::events::Event;
use crate::{Client, ClientError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use prost::Message;
use std::sync::Arc;
use std::time::Instant;
use tether_binary::{Jid, Node};
use tether_crypto::mac::{ct_eq, hmac_sha256};
use tether_crypto::{xeddsa, KeyPair};
use tether_proto::{AccountType, DeviceIdentity, SignedDeviceIdentity, SignedDeviceIdentityHmac};
use thiserror::Error;

/// Account-signature message prefix.
const ACCOUNT_SIGNATURE_PREFIX: [u8; 2] = [0x06, 0x00];
/// Device-signature message prefix.
const DEVICE_SIGNATURE_PREFIX: [u8; 2] = [0x06, 0x01];
/// Hosted-account variant of the account-signature prefix, also prepended
/// to the HMAC input for hosted accounts.
const HOSTED_ACCOUNT_SIGNATURE_PREFIX: [u8; 2] = [0x06, 0x05];
/// Hosted-account variant of the device-signature prefix.
const HOSTED_DEVICE_SIGNATURE_PREFIX: [u8; 2] = [0x06, 0x06];

/// Why a pairing attempt failed.
#[derive(Debug, Error)]
pub enum PairError {
    /// A protobuf blob in the pair-success flow failed to decode or encode.
    #[error("malformed pairing payload: {context}")]
    Proto {
        /// Which blob was malformed.
        context: &'static str,
    },

    /// The identity blob's HMAC does not match the adv secret.
    #[error("invalid device identity HMAC in pair success message")]
    InvalidDeviceIdentityHmac,

    /// The account signature over the device identity does not verify.
    #[error("invalid device signature in pair success message")]
    InvalidDeviceSignature,

    /// The pre-pair callback vetoed the pairing.
    #[error("pairing rejected locally")]
    RejectedLocally,

    /// Persisting the pairing state failed.
    #[error("failed to persist pairing: {0}")]
    Database(#[source] tether_store::StoreError),

    /// The confirmation stanza could not be sent after commit; the store
    /// has been rolled back.
    #[error("failed to send pairing confirmation: {0}")]
    Confirm(#[source] Box<ClientError>),
}

/// Route a server iq to the pairing handlers.
///
/// Returns `true` when the stanza was a pairing stanza, whether or not it
/// was handled successfully.
pub(crate) async fn handle_pair_iq(client: &Client, node: &Node) -> bool {
    if node.get_attr_jid("from") != Some(Jid::server_jid()) {
        return false;
    }
    let children = node.child_nodes();
    if children.len() != 1 {
        return false;
    }
    match children[0].tag.as_str() {
        "pair-device" => {
            handle_pair_device(client, node).await;
            true
        }
        "pair-success" => {
            handle_pair_success(client, node).await;
            true
        }
        _ => false,
    }
}

/// `pair-device`: acknowledge, then emit one QR payload per ref.
async fn handle_pair_device(client: &Client, node: &Node) {
    let ack = Node::new("iq")
        .attr("to", node.get_attr_jid("from").unwrap_or_else(Jid::server_jid))
        .attr("id", node.get_attr("id").unwrap_or_default())
        .attr("type", "result");
    if let Err(e) = client.send_node(ack).await {
        tracing::warn!(error = %e, "failed to acknowledge pair-device request");
    }

    let Some(pair_device) = node.child_by_tag("pair-device") else {
        return;
    };
    let mut codes = Vec::with_capacity(pair_device.child_nodes().len());
    {
        let device = client.inner.store.device.read().await;
        for (i, child) in pair_device.child_nodes().iter().enumerate() {
            if child.tag != "ref" {
                tracing::warn!(tag = %child.tag, index = i, "unexpected child in pair-device node");
                continue;
            }
            let Some(content) = child.content_bytes() else {
                tracing::warn!(index = i, "pair-device ref without byte content");
                continue;
            };
            codes.push(make_qr_data(
                &device.noise_key,
                &device.identity_key,
                &device.adv_secret_key,
                &String::from_utf8_lossy(content),
            ));
        }
    }

    // The whole pairing flow gets a fixed budget from this point.
    *client.inner.pair_deadline.lock().expect("lock poisoned") =
        Some(Instant::now() + client.inner.config.pair_timeout);
    spawn_pair_watchdog(client);

    client.dispatch_event(Event::Qr { codes });
}

fn make_qr_data(noise: &KeyPair, identity: &KeyPair, adv_secret: &[u8; 32], reference: &str) -> String {
    format!(
        "{reference},{},{},{}",
        BASE64.encode(noise.public()),
        BASE64.encode(identity.public()),
        BASE64.encode(adv_secret)
    )
}

fn spawn_pair_watchdog(client: &Client) {
    let client = client.clone();
    let timeout = client.inner.config.pair_timeout;
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let expired = client
            .inner
            .pair_deadline
            .lock()
            .expect("lock poisoned")
            .is_some_and(|deadline| deadline <= Instant::now());
        if expired && !client.inner.store.device.read().await.is_paired() {
            tracing::warn!("pairing did not complete in time, disconnecting");
            client.disconnect().await;
        }
    });
}

/// `pair-success`: verify, counter-sign, commit, confirm.
async fn handle_pair_success(client: &Client, node: &Node) {
    let req_id = node.get_attr("id").unwrap_or_default();
    let Some(pair_success) = node.child_by_tag("pair-success") else {
        return;
    };

    let device_identity_bytes = pair_success
        .child_by_tag("device-identity")
        .and_then(Node::content_bytes)
        .unwrap_or_default()
        .to_vec();
    let business_name = pair_success
        .child_by_tag("biz")
        .and_then(|n| n.get_attr("name"))
        .unwrap_or_default();
    let device_node = pair_success.child_by_tag("device");
    let jid = device_node
        .and_then(|n| n.get_attr_jid("jid"))
        .unwrap_or_default();
    let lid = device_node
        .and_then(|n| n.get_attr_jid("lid"))
        .unwrap_or_default();
    let platform = pair_success
        .child_by_tag("platform")
        .and_then(|n| n.get_attr("name"))
        .unwrap_or_default();

    *client.inner.pair_deadline.lock().expect("lock poisoned") = None;

    // Runs inline on the reader path: the commit below is mutually
    // exclusive with all other stanza routing.
    match do_pair(
        client,
        &device_identity_bytes,
        &req_id,
        &business_name,
        &platform,
        &jid,
        &lid,
    )
    .await
    {
        Ok(()) => {
            tracing::info!(id = %jid, "successfully paired");
            client.dispatch_event(Event::PairSuccess {
                id: jid,
                lid,
                business_name,
                platform,
            });
        }
        Err(error) => {
            tracing::error!(error = %error, "failed to pair device");
            let error = Arc::new(error);
            client.dispatch_event(Event::PairError {
                id: jid,
                lid,
                business_name,
                platform,
                error,
            });
            client.disconnect().await;
        }
    }
}

#[allow(clippy::too_many_lines)]
async fn do_pair(
    client: &Client,
    device_identity_bytes: &[u8],
    req_id: &str,
    business_name: &str,
    platform: &str,
    jid: &Jid,
    lid: &Jid,
) -> Result<(), PairError> {
    let store = &client.inner.store;

    let container = match SignedDeviceIdentityHmac::decode(device_identity_bytes) {
        Ok(container) => container,
        Err(_) => {
            send_pair_error(client, req_id, 500, "internal-error").await;
            return Err(PairError::Proto {
                context: "device identity container",
            });
        }
    };
    let is_hosted = container.account_type() == AccountType::Hosted;

    // HMAC under the adv secret; hosted accounts prepend their prefix,
    // non-hosted accounts prepend nothing.
    let expected_hmac = {
        let device = store.device.read().await;
        if is_hosted {
            hmac_sha256(
                &device.adv_secret_key,
                &[&HOSTED_ACCOUNT_SIGNATURE_PREFIX, container.details()],
            )
        } else {
            hmac_sha256(&device.adv_secret_key, &[container.details()])
        }
    };
    if !ct_eq(&expected_hmac, container.hmac()) {
        tracing::warn!("invalid HMAC in pair success message");
        send_pair_error(client, req_id, 401, "hmac-mismatch").await;
        return Err(PairError::InvalidDeviceIdentityHmac);
    }

    let mut identity = match SignedDeviceIdentity::decode(container.details()) {
        Ok(identity) => identity,
        Err(_) => {
            send_pair_error(client, req_id, 500, "internal-error").await;
            return Err(PairError::Proto {
                context: "signed device identity",
            });
        }
    };

    {
        let device = store.device.read().await;
        if !verify_account_signature(&identity, &device.identity_key, is_hosted) {
            send_pair_error(client, req_id, 401, "signature-mismatch").await;
            return Err(PairError::InvalidDeviceSignature);
        }
        identity.device_signature =
            Some(generate_device_signature(&identity, &device.identity_key, is_hosted).to_vec());
    }

    let details = match DeviceIdentity::decode(identity.details()) {
        Ok(details) => details,
        Err(_) => {
            send_pair_error(client, req_id, 500, "internal-error").await;
            return Err(PairError::Proto {
                context: "device identity details",
            });
        }
    };
    let key_index = details.key_index();

    let accepted = client
        .inner
        .pre_pair_callback
        .lock()
        .expect("lock poisoned")
        .as_ref()
        .map_or(true, |callback| callback(jid, platform, business_name));
    if !accepted {
        send_pair_error(client, req_id, 500, "internal-error").await;
        return Err(PairError::RejectedLocally);
    }

    // The stored copy keeps the account signature key; only the on-wire
    // confirmation below is blanked.
    let main_device_lid = lid.with_device(0);
    let main_device_identity: [u8; 32] = match identity.account_signature_key().try_into() {
        Ok(key) => key,
        Err(_) => {
            send_pair_error(client, req_id, 500, "internal-error").await;
            return Err(PairError::Proto {
                context: "account signature key",
            });
        }
    };
    let stored_identity = identity.clone();
    identity.account_signature_key = None;
    let self_signed_identity = identity.encode_to_vec();

    // Phase one: the device row.
    {
        let mut device = store.device.write().await;
        device.account = Some(stored_identity);
        device.id = Some(jid.clone());
        device.lid = Some(lid.clone());
        device.business_name = business_name.to_owned();
        device.platform = platform.to_owned();
    }
    if let Err(e) = store.save().await {
        send_pair_error(client, req_id, 500, "internal-error").await;
        return Err(PairError::Database(e));
    }

    // Phase two: the LID map and the primary device's identity key. A
    // failure here rolls the whole store back.
    if let Err(e) = store
        .lid_map
        .put_lid_mapping(&lid.to_string(), &jid.to_string())
        .await
    {
        tracing::warn!(error = %e, "failed to store LID mapping");
    }
    if let Err(e) = store
        .identities
        .put_identity(&main_device_lid.signal_address(), main_device_identity)
        .await
    {
        let _ = store.delete().await;
        send_pair_error(client, req_id, 500, "internal-error").await;
        return Err(PairError::Database(e));
    }

    // The server closes the stream after a successful pair; that close is
    // not an error.
    client.expect_disconnect();

    let confirmation = Node::new("iq")
        .attr("to", Jid::server_jid())
        .attr("type", "result")
        .attr("id", req_id)
        .children(vec![Node::new("pair-device-sign").children(vec![Node::new(
            "device-identity",
        )
        .attr("key-index", u64::from(key_index))
        .bytes(self_signed_identity)])]);
    if let Err(e) = client.send_node(confirmation).await {
        let _ = store.delete().await;
        return Err(PairError::Confirm(Box::new(e)));
    }
    Ok(())
}

/// Check the account signature over
/// `prefix ‖ details ‖ identity-key-public`.
fn verify_account_signature(
    identity: &SignedDeviceIdentity,
    identity_key: &KeyPair,
    is_hosted: bool,
) -> bool {
    let Ok(signature_key) = <[u8; 32]>::try_from(identity.account_signature_key()) else {
        return false;
    };
    let Ok(signature) = <[u8; 64]>::try_from(identity.account_signature()) else {
        return false;
    };
    let prefix = if is_hosted {
        &HOSTED_ACCOUNT_SIGNATURE_PREFIX
    } else {
        &ACCOUNT_SIGNATURE_PREFIX
    };
    let message = [prefix.as_slice(), identity.details(), identity_key.public()].concat();
    xeddsa::verify(&signature_key, &message, &signature)
}

/// Produce this device's counter-signature over
/// `prefix ‖ details ‖ identity-key-public ‖ account-signature-key`.
fn generate_device_signature(
    identity: &SignedDeviceIdentity,
    identity_key: &KeyPair,
    is_hosted: bool,
) -> [u8; 64] {
    let prefix = if is_hosted {
        &HOSTED_DEVICE_SIGNATURE_PREFIX
    } else {
        &DEVICE_SIGNATURE_PREFIX
    };
    let message = [
        prefix.as_slice(),
        identity.details(),
        identity_key.public(),
        identity.account_signature_key(),
    ]
    .concat();
    xeddsa::sign(identity_key, &message)
}

async fn send_pair_error(client: &Client, id: &str, code: u16, text: &str) {
    let node = Node::new("iq")
        .attr("to", Jid::server_jid())
        .attr("type", "error")
        .attr("id", id)
        .children(vec![Node::new("error")
            .attr("code", u64::from(code))
            .attr("text", text)]);
    if let Err(e) = client.send_node(node).await {
        tracing::error!(error = %e, "failed to send pair error node");
    }
}

/// Verify a device's stored account against its identity key; used by
/// tests and by consistency checks after loading the store.
#[must_use]
pub fn verify_stored_account(
    account: &SignedDeviceIdentity,
    identity_key: &KeyPair,
    is_hosted: bool,
) -> bool {
    verify_account_signature(account, identity_key, is_hosted)
        && account.device_signature.as_deref().is_some_and(|sig| {
            let Ok(signature) = <[u8; 64]>::try_from(sig) else {
                return false;
            };
            let prefix = if is_hosted {
                &HOSTED_DEVICE_SIGNATURE_PREFIX
            } else {
                &DEVICE_SIGNATURE_PREFIX
            };
            let message = [
                prefix.as_slice(),
                account.details(),
                identity_key.public(),
                account.account_signature_key(),
            ]
            .concat();
            xeddsa::verify(identity_key.public(), &message, &signature)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::connected_test_client;
    use crate::Client;
    use tokio::sync::mpsc;

    const ACCOUNT_KEY_INDEX: u32 = 4;

    fn test_jid() -> Jid {
        Jid::new_ad("15551234567", 0, 4)
    }

    fn test_lid() -> Jid {
        Jid::new_ad("887766554433", 1, 4)
    }

    struct SyntheticPairing {
        account_key: KeyPair,
        container: SignedDeviceIdentityHmac,
    }

    /// Build a pair-success identity container the way the primary device
    /// would: inner details, account signature over the device's identity
    /// key, HMAC under the shared adv secret.
    async fn synthetic_pairing(client: &Client, hosted: bool) -> SyntheticPairing {
        let device = client.inner.store.device.read().await;
        let account_key = KeyPair::generate();

        let details = DeviceIdentity {
            raw_id: Some(11),
            timestamp: Some(1_700_000_000),
            key_index: Some(ACCOUNT_KEY_INDEX),
            account_type: hosted.then_some(AccountType::Hosted as i32),
        }
        .encode_to_vec();

        let account_prefix: &[u8] = if hosted {
            &HOSTED_ACCOUNT_SIGNATURE_PREFIX
        } else {
            &ACCOUNT_SIGNATURE_PREFIX
        };
        let message = [account_prefix, &details, device.identity_key.public()].concat();
        let account_signature = xeddsa::sign(&account_key, &message);

        let identity = SignedDeviceIdentity {
            details: Some(details),
            account_signature_key: Some(account_key.public().to_vec()),
            account_signature: Some(account_signature.to_vec()),
            device_signature: None,
        };
        let identity_bytes = identity.encode_to_vec();

        let hmac = if hosted {
            hmac_sha256(
                &device.adv_secret_key,
                &[&HOSTED_ACCOUNT_SIGNATURE_PREFIX, &identity_bytes],
            )
        } else {
            hmac_sha256(&device.adv_secret_key, &[&identity_bytes])
        };

        SyntheticPairing {
            account_key,
            container: SignedDeviceIdentityHmac {
                details: Some(identity_bytes),
                hmac: Some(hmac.to_vec()),
                account_type: hosted.then_some(AccountType::Hosted as i32),
            },
        }
    }

    fn pair_success_node(container: &SignedDeviceIdentityHmac) -> Node {
        Node::new("iq")
            .attr("from", Jid::server_jid())
            .attr("id", "pair-1")
            .attr("type", "set")
            .children(vec![Node::new("pair-success").children(vec![
                Node::new("device-identity").bytes(container.encode_to_vec()),
                Node::new("device")
                    .attr("jid", test_jid())
                    .attr("lid", test_lid()),
                Node::new("platform").attr("name", "desktop"),
                Node::new("biz").attr("name", "Example Inc"),
            ])])
    }

    async fn expect_outbound(outbound: &mut mpsc::Receiver<Node>) -> Node {
        tokio::time::timeout(std::time::Duration::from_secs(1), outbound.recv())
            .await
            .expect("no outbound node")
            .expect("sender closed")
    }

    #[tokio::test]
    async fn test_qr_emission() {
        let (client, mut outbound) = connected_test_client().await;
        let mut events = client.subscribe();

        let node = Node::new("iq")
            .attr("from", Jid::server_jid())
            .attr("id", "42")
            .attr("type", "set")
            .children(vec![Node::new("pair-device").children(vec![
                Node::new("ref").bytes(b"R1".to_vec()),
                Node::new("ref").bytes(b"R2".to_vec()),
                // Unexpected children are skipped with a warning.
                Node::new("bogus"),
            ])]);
        client.dispatch_node(node).await;

        let ack = expect_outbound(&mut outbound).await;
        assert_eq!(ack.tag, "iq");
        assert_eq!(ack.get_attr("id").as_deref(), Some("42"));
        assert_eq!(ack.get_attr("type").as_deref(), Some("result"));
        assert_eq!(ack.get_attr_jid("to"), Some(Jid::server_jid()));

        let suffix = {
            let device = client.inner.store.device.read().await;
            format!(
                "{},{},{}",
                BASE64.encode(device.noise_key.public()),
                BASE64.encode(device.identity_key.public()),
                BASE64.encode(device.adv_secret_key)
            )
        };
        match events.recv().await.unwrap() {
            Event::Qr { codes } => {
                assert_eq!(codes, vec![format!("R1,{suffix}"), format!("R2,{suffix}")]);
            }
            other => panic!("expected Qr, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pair_success_happy_path() {
        let (client, mut outbound) = connected_test_client().await;
        let mut events = client.subscribe();
        let pairing = synthetic_pairing(&client, false).await;

        client.dispatch_node(pair_success_node(&pairing.container)).await;

        // Outbound confirmation: self-signed identity with the account
        // signature key blanked, under the inner key index.
        let confirmation = expect_outbound(&mut outbound).await;
        assert_eq!(confirmation.get_attr("type").as_deref(), Some("result"));
        assert_eq!(confirmation.get_attr("id").as_deref(), Some("pair-1"));
        let sign = confirmation.child_by_tag("pair-device-sign").unwrap();
        let wire_identity = sign.child_by_tag("device-identity").unwrap();
        assert_eq!(
            wire_identity.get_attr_u64("key-index"),
            Some(u64::from(ACCOUNT_KEY_INDEX))
        );
        let sent = SignedDeviceIdentity::decode(wire_identity.content_bytes().unwrap()).unwrap();
        assert!(sent.account_signature_key.is_none());
        let device_signature: [u8; 64] = sent.device_signature.as_deref().unwrap().try_into().unwrap();

        // The counter-signature verifies under this device's identity key
        // over prefix ‖ details ‖ identity pub ‖ account signature key.
        let device = client.inner.store.device.read().await;
        let message = [
            DEVICE_SIGNATURE_PREFIX.as_slice(),
            sent.details(),
            device.identity_key.public(),
            pairing.account_key.public(),
        ]
        .concat();
        assert!(xeddsa::verify(
            device.identity_key.public(),
            &message,
            &device_signature
        ));

        // Store committed: id, lid, names, and the account with its
        // signature key retained.
        assert_eq!(device.id, Some(test_jid()));
        assert_eq!(device.lid, Some(test_lid()));
        assert_eq!(device.business_name, "Example Inc");
        assert_eq!(device.platform, "desktop");
        let account = device.account.as_ref().unwrap();
        assert_eq!(account.account_signature_key(), pairing.account_key.public());
        assert!(verify_stored_account(account, &device.identity_key, false));
        drop(device);

        // The primary device's identity key lands under device 0 of the LID.
        let stored = client
            .inner
            .store
            .identities
            .get_identity(&test_lid().with_device(0).signal_address())
            .await
            .unwrap();
        assert_eq!(stored, Some(*pairing.account_key.public()));
        assert_eq!(
            client
                .inner
                .store
                .lid_map
                .get_pn_for_lid(&test_lid().to_string())
                .await
                .unwrap()
                .as_deref(),
            Some(test_jid().to_string().as_str())
        );

        // The post-pair server close is expected, then the event fires.
        assert!(client.take_expected_disconnect());
        match events.recv().await.unwrap() {
            Event::PairSuccess {
                id,
                lid,
                business_name,
                platform,
            } => {
                assert_eq!(id, test_jid());
                assert_eq!(lid, test_lid());
                assert_eq!(business_name, "Example Inc");
                assert_eq!(platform, "desktop");
            }
            other => panic!("expected PairSuccess, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_pair_success_hosted_account() {
        let (client, mut outbound) = connected_test_client().await;
        let mut events = client.subscribe();
        let pairing = synthetic_pairing(&client, true).await;

        client.dispatch_node(pair_success_node(&pairing.container)).await;

        let confirmation = expect_outbound(&mut outbound).await;
        assert_eq!(confirmation.get_attr("type").as_deref(), Some("result"));

        let device = client.inner.store.device.read().await;
        let account = device.account.as_ref().unwrap();
        // Hosted accounts verify under the hosted prefix pair only.
        assert!(verify_stored_account(account, &device.identity_key, true));
        assert!(!verify_stored_account(account, &device.identity_key, false));
        drop(device);

        assert!(matches!(
            events.recv().await.unwrap(),
            Event::PairSuccess { .. }
        ));
    }

    #[tokio::test]
    async fn test_pair_hmac_mismatch() {
        let (client, mut outbound) = connected_test_client().await;
        let mut events = client.subscribe();
        let mut pairing = synthetic_pairing(&client, false).await;
        pairing.container.hmac.as_mut().unwrap()[0] ^= 0x01;

        client.dispatch_node(pair_success_node(&pairing.container)).await;

        let error = expect_outbound(&mut outbound).await;
        assert_eq!(error.get_attr("type").as_deref(), Some("error"));
        let child = error.child_by_tag("error").unwrap();
        assert_eq!(child.get_attr_u64("code"), Some(401));
        assert_eq!(child.get_attr("text").as_deref(), Some("hmac-mismatch"));

        match events.recv().await.unwrap() {
            Event::PairError { error, .. } => {
                assert!(matches!(*error, PairError::InvalidDeviceIdentityHmac));
            }
            other => panic!("expected PairError, got {other:?}"),
        }

        // No store mutation.
        let device = client.inner.store.device.read().await;
        assert!(device.id.is_none());
        assert!(device.account.is_none());
    }

    #[tokio::test]
    async fn test_pair_bad_account_signature() {
        let (client, mut outbound) = connected_test_client().await;
        let mut events = client.subscribe();
        let pairing = synthetic_pairing(&client, false).await;

        // Re-sign the inner identity with a flipped signature bit, then
        // recompute the HMAC so only the signature check can fail.
        let mut identity =
            SignedDeviceIdentity::decode(pairing.container.details()).unwrap();
        identity.account_signature.as_mut().unwrap()[5] ^= 0x01;
        let identity_bytes = identity.encode_to_vec();
        let hmac = {
            let device = client.inner.store.device.read().await;
            hmac_sha256(&device.adv_secret_key, &[&identity_bytes])
        };
        let container = SignedDeviceIdentityHmac {
            details: Some(identity_bytes),
            hmac: Some(hmac.to_vec()),
            account_type: None,
        };

        client.dispatch_node(pair_success_node(&container)).await;

        let error = expect_outbound(&mut outbound).await;
        let child = error.child_by_tag("error").unwrap();
        assert_eq!(child.get_attr_u64("code"), Some(401));
        assert_eq!(child.get_attr("text").as_deref(), Some("signature-mismatch"));

        match events.recv().await.unwrap() {
            Event::PairError { error, .. } => {
                assert!(matches!(*error, PairError::InvalidDeviceSignature));
            }
            other => panic!("expected PairError, got {other:?}"),
        }
        assert!(client.inner.store.device.read().await.id.is_none());
    }

    #[tokio::test]
    async fn test_pair_rejected_locally() {
        let (client, mut outbound) = connected_test_client().await;
        let mut events = client.subscribe();
        client.set_pre_pair_callback(Box::new(|_, _, _| false));
        let pairing = synthetic_pairing(&client, false).await;

        client.dispatch_node(pair_success_node(&pairing.container)).await;

        let error = expect_outbound(&mut outbound).await;
        let child = error.child_by_tag("error").unwrap();
        assert_eq!(child.get_attr_u64("code"), Some(500));
        assert_eq!(child.get_attr("text").as_deref(), Some("internal-error"));

        match events.recv().await.unwrap() {
            Event::PairError { error, .. } => {
                assert!(matches!(*error, PairError::RejectedLocally));
            }
            other => panic!("expected PairError, got {other:?}"),
        }
        let device = client.inner.store.device.read().await;
        assert!(device.id.is_none());
        assert!(device.account.is_none());
    }

    #[tokio::test]
    async fn test_pre_pair_callback_sees_offer() {
        let (client, mut outbound) = connected_test_client().await;
        let (saw_tx, mut saw_rx) = mpsc::unbounded_channel();
        client.set_pre_pair_callback(Box::new(move |jid, platform, business| {
            let _ = saw_tx.send((jid.clone(), platform.to_owned(), business.to_owned()));
            true
        }));
        let pairing = synthetic_pairing(&client, false).await;

        client.dispatch_node(pair_success_node(&pairing.container)).await;
        let _confirmation = expect_outbound(&mut outbound).await;

        let (jid, platform, business) = saw_rx.recv().await.unwrap();
        assert_eq!(jid, test_jid());
        assert_eq!(platform, "desktop");
        assert_eq!(business, "Example Inc");
        // Exactly one invocation.
        assert!(saw_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_pair_iq_ignores_other_senders() {
        let (client, _outbound) = connected_test_client().await;
        let node = Node::new("iq")
            .attr("from", Jid::new("attacker", "evil.example"))
            .attr("id", "x")
            .children(vec![Node::new("pair-device")]);
        assert!(!handle_pair_iq(&client, &node).await);
    }

    #[tokio::test]
    async fn test_garbage_container_reports_proto_error() {
        let (client, mut outbound) = connected_test_client().await;
        let mut events = client.subscribe();

        let node = Node::new("iq")
            .attr("from", Jid::server_jid())
            .attr("id", "pair-1")
            .attr("type", "set")
            .children(vec![Node::new("pair-success").children(vec![
                Node::new("device-identity").bytes(vec![0xFF, 0xFF, 0xFF]),
                Node::new("device")
                    .attr("jid", test_jid())
                    .attr("lid", test_lid()),
                Node::new("platform").attr("name", "desktop"),
            ])]);
        client.dispatch_node(node).await;

        let error = expect_outbound(&mut outbound).await;
        let child = error.child_by_tag("error").unwrap();
        assert_eq!(child.get_attr_u64("code"), Some(500));
        match events.recv().await.unwrap() {
            Event::PairError { error, .. } => {
                assert!(matches!(*error, PairError::Proto { .. }));
            }
            other => panic!("expected PairError, got {other:?}"),
        }
    }
}
