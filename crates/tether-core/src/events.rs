//! Typed event fan-out.
//!
//! Events are immutable values broadcast to every subscriber. The channel
//! is bounded: a subscriber that falls behind skips the oldest events and
//! gets a logged warning instead of growing an unbounded queue. Handlers
//! run in their own tasks, so one panicking subscriber cannot disturb the
//! others or the reader.

use crate::pair::PairError;
use std::sync::Arc;
use tether_binary::{Jid, Node};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A message receipt.
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Sender of the receipt.
    pub from: Jid,
    /// Message ids the receipt covers.
    pub ids: Vec<String>,
    /// Receipt flavor: empty for delivery, `read`, `played`, `retry`.
    pub receipt_type: String,
}

/// Events delivered to subscribers.
#[derive(Debug, Clone)]
pub enum Event {
    /// QR codes to render for pairing, one per rotated ref, in order.
    Qr {
        /// Pairing payload strings.
        codes: Vec<String>,
    },
    /// Pairing completed and the identity is committed.
    PairSuccess {
        /// Own device-qualified address.
        id: Jid,
        /// Own pseudonymous address.
        lid: Jid,
        /// Verified business name, empty for consumer accounts.
        business_name: String,
        /// Primary device platform.
        platform: String,
    },
    /// Pairing failed; the connection is being torn down.
    PairError {
        /// Address offered in the pair attempt.
        id: Jid,
        /// Pseudonymous address offered in the pair attempt.
        lid: Jid,
        /// Business name from the pair attempt.
        business_name: String,
        /// Platform from the pair attempt.
        platform: String,
        /// What went wrong.
        error: Arc<PairError>,
    },
    /// Authentication finished; the session is live.
    Connected,
    /// The connection closed and it was not an expected disconnect.
    Disconnected,
    /// The server refused or revoked this device's credentials.
    LoggedOut {
        /// True when the refusal happened during connect.
        on_connect: bool,
        /// Server-provided reason.
        reason: String,
    },
    /// Another client took over this device's stream.
    StreamReplaced,
    /// This client version is too old to connect.
    ClientOutdated,
    /// A keepalive ping went unanswered.
    KeepAliveTimeout {
        /// Consecutive misses so far.
        misses: u32,
    },
    /// Keepalive pings are being answered again.
    KeepAliveRestored,
    /// An encrypted message stanza arrived (payload decryption is the
    /// caller's concern).
    Message(Node),
    /// A receipt stanza arrived.
    Receipt(Receipt),
    /// A server notification stanza arrived.
    Notification(Node),
    /// A presence or chat-state stanza arrived.
    Presence(Node),
    /// A call stanza arrived.
    Call(Node),
}

/// Bounded broadcast fan-out.
pub(crate) struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the raw event stream.
    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Broadcast one event; delivery to each subscriber is in send order.
    pub(crate) fn dispatch(&self, event: Event) {
        tracing::trace!(?event, "dispatching event");
        if self.tx.send(event).is_err() {
            tracing::trace!("no event subscribers");
        }
    }

    /// Spawn a handler task consuming events until the bus closes.
    pub(crate) fn spawn_handler<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => handler(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event subscriber lagging, dropped oldest");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
