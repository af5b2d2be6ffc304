//! Application-level heartbeat.
//!
//! Independent of WebSocket ping/pong: a periodic `iq` ping proves the
//! server is still routing stanzas to this device. Misses are surfaced as
//! events; the connection itself is left to the transport's disconnect
//! detection.

use crate::connect::SessionState;
use crate::events::Event;
use crate::{Client, ClientError};
use tether_binary::{Jid, Node};

pub(crate) fn spawn_keepalive(client: &Client) {
    let client = client.clone();
    tokio::spawn(async move {
        let interval = client.inner.config.keepalive_interval;
        let timeout = client.inner.config.keepalive_timeout;
        let mut misses = 0u32;
        loop {
            tokio::time::sleep(interval).await;
            if client.state() != SessionState::Connected {
                break;
            }
            let ping = Node::new("iq")
                .attr("to", Jid::server_jid())
                .attr("type", "get")
                .attr("xmlns", "w:p")
                .children(vec![Node::new("ping")]);
            match client.send_iq_with_timeout(ping, timeout).await {
                Ok(_) => {
                    if misses > 0 {
                        tracing::info!(misses, "keepalive recovered");
                        client.dispatch_event(Event::KeepAliveRestored);
                    }
                    misses = 0;
                }
                Err(ClientError::IqTimeout) => {
                    misses += 1;
                    tracing::warn!(misses, "keepalive ping timed out");
                    client.dispatch_event(Event::KeepAliveTimeout { misses });
                }
                Err(e) => {
                    tracing::debug!(error = %e, "keepalive stopping");
                    break;
                }
            }
        }
    });
}
