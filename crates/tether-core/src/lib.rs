//! # Tether Core
//!
//! The session core of the tether client: device pairing, request/response
//! correlation, typed event fan-out and connection supervision over the
//! Noise transport.
//!
//! ```ignore
//! use std::sync::Arc;
//! use tether_core::{Client, ClientConfig, Event};
//! use tether_store::Store;
//!
//! let store = Arc::new(Store::open_sqlite("device.db".as_ref()).await?);
//! let client = Client::new(store, ClientConfig::default());
//! client.add_event_handler(|event| match event {
//!     Event::Qr { codes } => println!("scan: {}", codes[0]),
//!     Event::PairSuccess { id, .. } => println!("paired as {id}"),
//!     _ => {}
//! });
//! client.connect().await?;
//! ```
//!
//! One reader task owns the receive half and is the sole producer of
//! decoded stanzas; writers serialize through one channel into the writer
//! task, which owns the send cipher. Pairing runs inline on the reader
//! path, so its store commit cannot interleave with other routing.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

mod auth;
mod client;
mod config;
mod connect;
mod error;
mod events;
mod keepalive;
pub mod pair;
mod request;

pub use client::{Client, PrePairCallback};
pub use config::ClientConfig;
pub use connect::SessionState;
pub use error::{ClientError, IqError};
pub use events::{Event, Receipt};
pub use pair::PairError;

#[cfg(test)]
pub(crate) mod test_util {
    use crate::{Client, ClientConfig};
    use std::sync::Arc;
    use tether_binary::Node;
    use tether_store::Store;
    use tokio::sync::mpsc;

    /// A client over a fresh in-memory store whose outbound stanzas are
    /// captured on a channel instead of a socket.
    pub(crate) async fn connected_test_client() -> (Client, mpsc::Receiver<Node>) {
        let store = Arc::new(Store::new_in_memory());
        let client = Client::new(store, ClientConfig::default());
        let (tx, rx) = mpsc::channel(64);
        client.install_sender(tx).await;
        (client, rx)
    }
}
