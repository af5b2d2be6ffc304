//! The client handle and inbound stanza routing.

use crate::config::ClientConfig;
use crate::connect::SessionState;
use crate::events::{Event, EventBus, Receipt};
use crate::ClientError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tether_binary::{Jid, Node};
use tether_store::Store;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;

/// Synchronous veto hook invoked before a pairing commit.
///
/// Return `false` to refuse the pairing; the server is answered with an
/// internal error and nothing is persisted.
pub type PrePairCallback = Box<dyn Fn(&Jid, &str, &str) -> bool + Send + Sync>;

/// Handle to one device session.
///
/// Cheap to clone; every clone shares the same session state. Handlers
/// receive a clone rather than a reference, and the writer half behind it
/// is a channel sender the supervisor drops on teardown, so shared
/// ownership releases on shutdown.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) store: Arc<Store>,
    pub(crate) config: ClientConfig,
    pub(crate) events: EventBus,
    /// Request-id → response slot, protected by a single mutex.
    pub(crate) waiters: Mutex<HashMap<String, tokio::sync::oneshot::Sender<Node>>>,
    pub(crate) id_counter: AtomicU64,
    pub(crate) id_suffix: String,
    /// Writer-task inbox; `None` while disconnected.
    pub(crate) sender: RwLock<Option<mpsc::Sender<Node>>>,
    pub(crate) state: Mutex<SessionState>,
    pub(crate) expect_disconnect: AtomicBool,
    pub(crate) logged_out: AtomicBool,
    pub(crate) reconnect_attempts: AtomicU32,
    pub(crate) pre_pair_callback: Mutex<Option<PrePairCallback>>,
    pub(crate) pair_deadline: Mutex<Option<Instant>>,
}

impl Client {
    /// Create a client over the given store.
    #[must_use]
    pub fn new(store: Arc<Store>, config: ClientConfig) -> Self {
        let event_buffer = config.event_buffer;
        let suffix: u16 = rand::random();
        Self {
            inner: Arc::new(ClientInner {
                store,
                config,
                events: EventBus::new(event_buffer),
                waiters: Mutex::new(HashMap::new()),
                id_counter: AtomicU64::new(0),
                id_suffix: format!("{suffix:04x}"),
                sender: RwLock::new(None),
                state: Mutex::new(SessionState::Idle),
                expect_disconnect: AtomicBool::new(false),
                logged_out: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                pre_pair_callback: Mutex::new(None),
                pair_deadline: Mutex::new(None),
            }),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.inner.store
    }

    /// Subscribe to the raw event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Run `handler` for every event on its own task.
    ///
    /// Abort the returned handle to unsubscribe. A panic inside the handler
    /// kills only that task.
    pub fn add_event_handler<F>(&self, handler: F) -> JoinHandle<()>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.inner.events.spawn_handler(handler)
    }

    /// Install the pre-pair veto callback.
    pub fn set_pre_pair_callback(&self, callback: PrePairCallback) {
        *self.inner.pre_pair_callback.lock().expect("lock poisoned") = Some(callback);
    }

    /// Current supervisor state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.inner.state.lock().expect("lock poisoned")
    }

    pub(crate) fn set_state(&self, next: SessionState) {
        let mut state = self.inner.state.lock().expect("lock poisoned");
        tracing::trace!(from = ?*state, to = ?next, "session state");
        *state = next;
    }

    pub(crate) fn dispatch_event(&self, event: Event) {
        self.inner.events.dispatch(event);
    }

    /// Mark the next disconnect as expected so it is not surfaced as an
    /// error event. One-shot.
    pub(crate) fn expect_disconnect(&self) {
        self.inner.expect_disconnect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_expected_disconnect(&self) -> bool {
        self.inner.expect_disconnect.swap(false, Ordering::SeqCst)
    }

    /// Queue one stanza for the writer task.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Disconnected`] when no connection is up.
    pub async fn send_node(&self, node: Node) -> Result<(), ClientError> {
        let sender = self
            .inner
            .sender
            .read()
            .await
            .clone()
            .ok_or(ClientError::Disconnected)?;
        sender
            .send(node)
            .await
            .map_err(|_| ClientError::Disconnected)
    }

    pub(crate) async fn install_sender(&self, tx: mpsc::Sender<Node>) {
        *self.inner.sender.write().await = Some(tx);
    }

    pub(crate) async fn clear_sender(&self) {
        *self.inner.sender.write().await = None;
    }

    /// Route one inbound stanza.
    ///
    /// Called only from the reader task, in receive order. Pairing runs
    /// inline here, which makes its commit mutually exclusive with all
    /// other routing.
    pub(crate) async fn dispatch_node(&self, node: Node) {
        match node.tag.as_str() {
            "iq" => self.handle_iq(node).await,
            "success" => crate::connect::handle_success(self, &node).await,
            "failure" => crate::connect::handle_failure(self, &node).await,
            "stream:error" => crate::connect::handle_stream_error(self, &node).await,
            "message" => self.dispatch_event(Event::Message(node)),
            "receipt" => self.handle_receipt(node),
            "presence" | "chatstate" => self.dispatch_event(Event::Presence(node)),
            "notification" => self.dispatch_event(Event::Notification(node)),
            "call" => self.dispatch_event(Event::Call(node)),
            "ib" => tracing::debug!("server info stanza: {:?}", node.child_nodes().first().map(|c| &c.tag)),
            "ack" => tracing::trace!(id = node.get_attr("id").as_deref(), "server ack"),
            other => tracing::debug!(tag = other, "unhandled stanza"),
        }
    }

    async fn handle_iq(&self, node: Node) {
        let iq_type = node.get_attr("type").unwrap_or_default();
        if iq_type == "result" || iq_type == "error" {
            if let Some(id) = node.get_attr("id") {
                let waiter = self.inner.waiters.lock().expect("lock poisoned").remove(&id);
                match waiter {
                    Some(tx) => {
                        if tx.send(node).is_err() {
                            tracing::debug!(%id, "response arrived after caller gave up");
                        }
                    }
                    None => tracing::debug!(%id, "dropping duplicate or unclaimed iq response"),
                }
                return;
            }
        }

        if crate::pair::handle_pair_iq(self, &node).await {
            return;
        }

        if iq_type == "get" && node.child_by_tag("ping").is_some() {
            self.answer_server_ping(&node).await;
            return;
        }

        tracing::debug!(
            %iq_type,
            id = node.get_attr("id").as_deref(),
            "unhandled iq"
        );
    }

    async fn answer_server_ping(&self, node: &Node) {
        let Some(id) = node.get_attr("id") else { return };
        let reply = Node::new("iq")
            .attr("to", Jid::server_jid())
            .attr("id", id)
            .attr("type", "result");
        if let Err(e) = self.send_node(reply).await {
            tracing::debug!(error = %e, "failed to answer server ping");
        }
    }

    fn handle_receipt(&self, node: Node) {
        let Some(from) = node.get_attr_jid("from") else {
            tracing::debug!("receipt without sender");
            return;
        };
        let mut ids: Vec<String> = node.get_attr("id").into_iter().collect();
        if let Some(list) = node.child_by_tag("list") {
            ids.extend(
                list.child_nodes()
                    .iter()
                    .filter(|item| item.tag == "item")
                    .filter_map(|item| item.get_attr("id")),
            );
        }
        let receipt = Receipt {
            from,
            ids,
            receipt_type: node.get_attr("type").unwrap_or_default(),
        };
        self.dispatch_event(Event::Receipt(receipt));
    }
}
