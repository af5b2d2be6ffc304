//! Connection supervision.
//!
//! Owns the connect→handshake→authenticate→run→disconnect lifecycle, the
//! reader and writer tasks, and the reconnect policy. The one-shot
//! `expect_disconnect` flag makes server-initiated closes after pairing or
//! logout quiet: teardown still runs, the `Disconnected` event does not
//! fire.

use crate::events::Event;
use crate::{Client, ClientError};
use prost::Message;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tether_binary::Node;
use tether_transport::{NoiseReader, NoiseWriter, TransportError};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// Supervisor states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Idle,
    /// Dialing the WebSocket.
    Connecting,
    /// Noise handshake in flight.
    Handshaking,
    /// Waiting for the server's authentication verdict.
    Authenticating,
    /// Session is live.
    Connected,
    /// Teardown in progress.
    Closing,
    /// The last connect attempt failed.
    Faulted,
}

impl Client {
    /// Dial, handshake and start the session tasks.
    ///
    /// Returns once the encrypted channel is up; authentication completes
    /// asynchronously and is announced with [`Event::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyConnected`] when a session is active,
    /// and transport or store errors from connection establishment.
    pub async fn connect(&self) -> Result<(), ClientError> {
        {
            let mut state = self.inner.state.lock().expect("lock poisoned");
            if !matches!(*state, SessionState::Idle | SessionState::Faulted) {
                return Err(ClientError::AlreadyConnected);
            }
            *state = SessionState::Connecting;
        }
        match self.establish().await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "connect failed");
                self.set_state(SessionState::Faulted);
                self.maybe_reconnect();
                Err(e)
            }
        }
    }

    async fn establish(&self) -> Result<(), ClientError> {
        let ws = tether_transport::connect(&self.inner.config.url).await?;
        self.set_state(SessionState::Handshaking);

        let hello = crate::auth::build_client_payload(&self.inner.store, &self.inner.config)
            .await
            .encode_to_vec();
        let noise_private = *self.inner.store.device.read().await.noise_key.private();
        let (writer, reader, _server_static) = tether_transport::handshake(
            ws,
            &noise_private,
            &hello,
            self.inner.config.handshake_timeout,
        )
        .await?;
        self.set_state(SessionState::Authenticating);

        let (tx, rx) = mpsc::channel::<Node>(64);
        self.install_sender(tx).await;
        tokio::spawn(run_writer(writer, rx));
        let client = self.clone();
        tokio::spawn(async move { client.run_reader(reader).await });
        Ok(())
    }

    /// Tear the session down without surfacing a `Disconnected` event.
    pub async fn disconnect(&self) {
        if self.state() == SessionState::Idle {
            return;
        }
        // Quiet close: the caller asked for it.
        self.expect_disconnect();
        self.teardown().await;
        self.set_state(SessionState::Idle);
    }

    pub(crate) async fn teardown(&self) {
        self.set_state(SessionState::Closing);
        // Dropping the sender ends the writer task, which closes the
        // socket; the reader then observes the disconnect.
        self.clear_sender().await;
        self.drain_waiters();
    }

    async fn run_reader<S: AsyncRead + AsyncWrite + Unpin>(self, mut reader: NoiseReader<S>) {
        loop {
            match reader.next_payload().await {
                Ok(payload) => match tether_binary::unmarshal(&payload) {
                    Ok(node) => self.dispatch_node(node).await,
                    Err(e) => {
                        // Malformed peer: terminate, never recover here.
                        tracing::error!(error = %e, "malformed inbound stanza, closing");
                        self.end_session(TransportError::Decrypt).await;
                        return;
                    }
                },
                Err(e) => {
                    self.end_session(e).await;
                    return;
                }
            }
        }
    }

    /// Reader termination: decide between quiet close, error event and
    /// reconnect.
    async fn end_session(&self, reason: TransportError) {
        let expected = self.take_expected_disconnect();
        self.teardown().await;
        self.set_state(SessionState::Idle);

        if expected {
            tracing::info!("connection closed (expected)");
            return;
        }
        match &reason {
            TransportError::Disconnected => tracing::warn!("connection closed by server"),
            other => tracing::warn!(error = %other, "connection failed"),
        }
        self.dispatch_event(Event::Disconnected);
        self.maybe_reconnect();
    }

    /// Schedule a reconnect attempt unless halted by an
    /// authentication-fatal condition.
    pub(crate) fn maybe_reconnect(&self) {
        if !self.inner.config.auto_reconnect || self.inner.logged_out.load(Ordering::SeqCst) {
            return;
        }
        let client = self.clone();
        let attempt = self.inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
        let delay = backoff_delay(
            attempt,
            self.inner.config.reconnect_base,
            self.inner.config.reconnect_cap,
            self.inner.config.reconnect_jitter,
        );
        tracing::info!(attempt, ?delay, "scheduling reconnect");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !matches!(client.state(), SessionState::Idle | SessionState::Faulted) {
                return;
            }
            if let Err(e) = client.connect().await {
                tracing::warn!(error = %e, "reconnect attempt failed");
            }
        });
    }
}

/// Exponential backoff with jitter.
pub(crate) fn backoff_delay(attempt: u32, base: Duration, cap: Duration, jitter: f64) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi(attempt.min(16) as i32);
    let capped = exp.min(cap.as_secs_f64());
    let factor = 1.0 + jitter * (rand::random::<f64>() * 2.0 - 1.0);
    Duration::from_secs_f64((capped * factor).max(0.0))
}

async fn run_writer<S: AsyncRead + AsyncWrite + Unpin>(
    mut writer: NoiseWriter<S>,
    mut rx: mpsc::Receiver<Node>,
) {
    while let Some(node) = rx.recv().await {
        let payload = match tether_binary::marshal(&node) {
            Ok(payload) => payload,
            Err(e) => {
                // Send-side codec errors stay with the caller's stanza and
                // never touch the wire.
                tracing::error!(error = %e, tag = %node.tag, "unserializable outbound stanza");
                continue;
            }
        };
        if let Err(e) = writer.send_payload(&payload).await {
            tracing::warn!(error = %e, "write failed, closing connection");
            break;
        }
    }
    writer.close().await;
}

/// `<success>`: authentication finished.
pub(crate) async fn handle_success(client: &Client, node: &Node) {
    client.set_state(SessionState::Connected);
    client.inner.reconnect_attempts.store(0, Ordering::SeqCst);

    if let Some(push_name) = node.get_attr("pushname") {
        let changed = {
            let mut device = client.inner.store.device.write().await;
            if device.push_name != push_name {
                device.push_name = push_name;
                true
            } else {
                false
            }
        };
        if changed {
            if let Err(e) = client.inner.store.save().await {
                tracing::warn!(error = %e, "failed to persist push name");
            }
        }
    }

    tracing::info!("authentication succeeded");
    client.dispatch_event(Event::Connected);
    crate::keepalive::spawn_keepalive(client);
}

/// `<failure>`: the server refused authentication.
pub(crate) async fn handle_failure(client: &Client, node: &Node) {
    let reason = node.get_attr("reason").unwrap_or_default();
    let code = node.get_attr_u64("code").unwrap_or(0);
    tracing::error!(%reason, code, "authentication failed");

    // The server closes the stream after a failure.
    client.expect_disconnect();

    let unauthorized = matches!(code, 401 | 403) || reason == "not-authorized";
    let outdated = code == 405 || reason == "client-outdated";
    if unauthorized {
        client.inner.logged_out.store(true, Ordering::SeqCst);
        client.dispatch_event(Event::LoggedOut {
            on_connect: true,
            reason,
        });
    } else if outdated {
        client.inner.logged_out.store(true, Ordering::SeqCst);
        client.dispatch_event(Event::ClientOutdated);
    } else {
        // Unknown failure: surface as a plain disconnect and let the
        // backoff policy retry.
        client.dispatch_event(Event::Disconnected);
        client.maybe_reconnect();
    }
}

/// `<stream:error>`: the server is about to drop the stream.
pub(crate) async fn handle_stream_error(client: &Client, node: &Node) {
    let code = node.get_attr("code").unwrap_or_default();
    let conflict_type = node
        .child_by_tag("conflict")
        .and_then(|conflict| conflict.get_attr("type"))
        .unwrap_or_default();
    tracing::error!(%code, %conflict_type, "stream error");

    if conflict_type == "device_removed" || code == "401" {
        client.inner.logged_out.store(true, Ordering::SeqCst);
        client.expect_disconnect();
        client.dispatch_event(Event::LoggedOut {
            on_connect: false,
            reason: if conflict_type.is_empty() {
                code
            } else {
                conflict_type
            },
        });
    } else if conflict_type == "replaced" {
        client.inner.logged_out.store(true, Ordering::SeqCst);
        client.expect_disconnect();
        client.dispatch_event(Event::StreamReplaced);
    }
    // Anything else is retryable; the close that follows triggers the
    // normal disconnect-and-backoff path.
}
