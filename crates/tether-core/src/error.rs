//! Client-level errors.

use thiserror::Error;

/// An error stanza from the server, correlated to one request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("server returned error {code}: {text}")]
pub struct IqError {
    /// Numeric error code.
    pub code: u16,
    /// Server-provided error text.
    pub text: String,
}

impl IqError {
    /// Extract code and text from an `iq type=error` response node.
    #[must_use]
    pub fn from_node(node: &tether_binary::Node) -> Self {
        match node.child_by_tag("error") {
            Some(error) => Self {
                code: error.get_attr_u64("code").unwrap_or(0) as u16,
                text: error.get_attr("text").unwrap_or_default(),
            },
            None => Self {
                code: 0,
                text: String::new(),
            },
        }
    }
}

/// Errors surfaced to callers of the client API.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No connection is established.
    #[error("not connected")]
    Disconnected,

    /// The client is already connected or connecting.
    #[error("already connected")]
    AlreadyConnected,

    /// A request did not receive its response in time.
    #[error("request timed out")]
    IqTimeout,

    /// The caller's cancellation context fired.
    #[error("canceled")]
    Canceled,

    /// The server answered a request with an error stanza.
    #[error(transparent)]
    Iq(#[from] IqError),

    /// Transport failure.
    #[error(transparent)]
    Transport(#[from] tether_transport::TransportError),

    /// Outbound stanza could not be serialized.
    #[error(transparent)]
    Encode(#[from] tether_binary::EncodeError),

    /// Inbound payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] tether_binary::DecodeError),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] tether_store::StoreError),

    /// Pairing failure.
    #[error(transparent)]
    Pair(#[from] crate::pair::PairError),
}
