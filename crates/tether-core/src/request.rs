//! Request/response correlation.
//!
//! Every outbound request stanza carries a fresh id: a monotonic counter
//! plus a short random suffix fixed at client construction. The response
//! slot lives in the waiter map until a matching `iq` arrives, the caller
//! times out, or the caller cancels; all three paths release the slot.

use crate::{Client, ClientError, IqError};
use tether_binary::Node;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

impl Client {
    /// Fresh request id, unique over any finite run of this client.
    pub(crate) fn generate_request_id(&self) -> String {
        let counter = self
            .inner
            .id_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        format!("{counter}-{}", self.inner.id_suffix)
    }

    /// Send a request stanza and await its response.
    ///
    /// Uses the configured default timeout.
    ///
    /// # Errors
    ///
    /// See [`Client::send_iq_with_timeout`].
    pub async fn send_iq(&self, node: Node) -> Result<Node, ClientError> {
        self.send_iq_inner(node, self.inner.config.iq_timeout, None)
            .await
    }

    /// Send a request stanza and await its response with a caller-chosen
    /// deadline.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Iq`] when the server answers with an error stanza
    /// - [`ClientError::IqTimeout`] when the deadline passes
    /// - [`ClientError::Disconnected`] when the connection drops first
    pub async fn send_iq_with_timeout(
        &self,
        node: Node,
        timeout: std::time::Duration,
    ) -> Result<Node, ClientError> {
        self.send_iq_inner(node, timeout, None).await
    }

    /// Send a request stanza, awaiting its response or the caller's
    /// cancellation context.
    ///
    /// # Errors
    ///
    /// As [`Client::send_iq_with_timeout`], plus [`ClientError::Canceled`]
    /// when `cancel` fires first. The response slot is released either way.
    pub async fn send_iq_cancellable(
        &self,
        node: Node,
        cancel: &CancellationToken,
    ) -> Result<Node, ClientError> {
        self.send_iq_inner(node, self.inner.config.iq_timeout, Some(cancel))
            .await
    }

    async fn send_iq_inner(
        &self,
        mut node: Node,
        timeout: std::time::Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<Node, ClientError> {
        let id = match node.get_attr("id") {
            Some(id) => id,
            None => {
                let id = self.generate_request_id();
                node = node.attr("id", id.clone());
                id
            }
        };

        let (tx, rx) = oneshot::channel();
        self.inner
            .waiters
            .lock()
            .expect("lock poisoned")
            .insert(id.clone(), tx);
        // Released on every exit path below, including cancellation.
        let _guard = WaiterGuard {
            client: self,
            id: id.clone(),
        };

        self.send_node(node).await?;

        let recv = async {
            match tokio::time::timeout(timeout, rx).await {
                Err(_) => Err(ClientError::IqTimeout),
                // Teardown drains the waiter map, dropping our sender.
                Ok(Err(_)) => Err(ClientError::Disconnected),
                Ok(Ok(response)) => Ok(response),
            }
        };

        let response = match cancel {
            Some(token) => tokio::select! {
                () = token.cancelled() => Err(ClientError::Canceled),
                result = recv => result,
            },
            None => recv.await,
        }?;

        if response.get_attr("type").as_deref() == Some("error") {
            return Err(IqError::from_node(&response).into());
        }
        Ok(response)
    }

    /// Fail every pending request; used at teardown.
    pub(crate) fn drain_waiters(&self) {
        let drained: Vec<_> = self
            .inner
            .waiters
            .lock()
            .expect("lock poisoned")
            .drain()
            .collect();
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "failing pending requests");
        }
        // Dropping the senders wakes every waiting caller with Disconnected.
    }

    #[cfg(test)]
    pub(crate) fn pending_request_count(&self) -> usize {
        self.inner.waiters.lock().expect("lock poisoned").len()
    }
}

struct WaiterGuard<'a> {
    client: &'a Client,
    id: String,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.client
            .inner
            .waiters
            .lock()
            .expect("lock poisoned")
            .remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::connected_test_client;
    use std::collections::HashSet;
    use std::time::Duration;
    use tether_binary::Jid;

    fn ping() -> Node {
        Node::new("iq")
            .attr("to", Jid::server_jid())
            .attr("type", "get")
            .children(vec![Node::new("ping")])
    }

    #[tokio::test]
    async fn test_request_ids_unique() {
        let (client, _outbound) = connected_test_client().await;
        let ids: HashSet<String> = (0..10_000).map(|_| client.generate_request_id()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[tokio::test]
    async fn test_send_iq_result() {
        let (client, mut outbound) = connected_test_client().await;

        let responder = {
            let client = client.clone();
            tokio::spawn(async move {
                let sent = outbound.recv().await.unwrap();
                let id = sent.get_attr("id").unwrap();
                let response = Node::new("iq").attr("id", id).attr("type", "result");
                client.dispatch_node(response).await;
            })
        };

        let response = client.send_iq(ping()).await.unwrap();
        assert_eq!(response.get_attr("type").as_deref(), Some("result"));
        assert_eq!(client.pending_request_count(), 0);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_iq_error_mapped() {
        let (client, mut outbound) = connected_test_client().await;

        let responder = {
            let client = client.clone();
            tokio::spawn(async move {
                let sent = outbound.recv().await.unwrap();
                let id = sent.get_attr("id").unwrap();
                let response = Node::new("iq").attr("id", id).attr("type", "error").children(
                    vec![Node::new("error").attr("code", "404").attr("text", "item-not-found")],
                );
                client.dispatch_node(response).await;
            })
        };

        match client.send_iq(ping()).await {
            Err(ClientError::Iq(err)) => {
                assert_eq!(err.code, 404);
                assert_eq!(err.text, "item-not-found");
            }
            other => panic!("expected iq error, got {other:?}"),
        }
        assert_eq!(client.pending_request_count(), 0);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_releases_slot() {
        let (client, _outbound) = connected_test_client().await;
        let result = client
            .send_iq_with_timeout(ping(), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(ClientError::IqTimeout)));
        assert_eq!(client.pending_request_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_releases_slot() {
        let (client, _outbound) = connected_test_client().await;
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });
        let result = client.send_iq_cancellable(ping(), &token).await;
        assert!(matches!(result, Err(ClientError::Canceled)));
        assert_eq!(client.pending_request_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_response_dropped() {
        let (client, mut outbound) = connected_test_client().await;

        let responder = {
            let client = client.clone();
            tokio::spawn(async move {
                let sent = outbound.recv().await.unwrap();
                let id = sent.get_attr("id").unwrap();
                let response = Node::new("iq").attr("id", id).attr("type", "result");
                client.dispatch_node(response.clone()).await;
                // The second copy finds no slot and is dropped quietly.
                client.dispatch_node(response).await;
            })
        };

        client.send_iq(ping()).await.unwrap();
        responder.await.unwrap();
        assert_eq!(client.pending_request_count(), 0);
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let (client, outbound) = connected_test_client().await;
        drop(outbound);
        client.clear_sender().await;
        assert!(matches!(
            client.send_iq(ping()).await,
            Err(ClientError::Disconnected)
        ));
        assert_eq!(client.pending_request_count(), 0);
    }
}
