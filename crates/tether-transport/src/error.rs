//! Transport-level errors.
//!
//! Everything here terminates the connection; the session supervisor
//! decides whether to reconnect.

use thiserror::Error;

/// Errors raised by the frame and Noise layers.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Outbound payload exceeds the 24-bit frame length field.
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// The connection is gone; reads and writes both fail with this.
    #[error("disconnected")]
    Disconnected,

    /// The Noise handshake did not complete within its deadline.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// AEAD authentication failed on an inbound frame.
    #[error("frame decryption failed")]
    Decrypt,

    /// A direction's 64-bit nonce counter would wrap.
    #[error("nonce counter exhausted")]
    NonceExhausted,

    /// Noise protocol failure during the handshake.
    #[error("noise handshake: {0}")]
    Noise(#[from] snow::Error),

    /// WebSocket failure.
    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
