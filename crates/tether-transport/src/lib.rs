//! # Tether Transport
//!
//! The two lowest layers of the session core:
//!
//! - [`frame`]: 3-byte big-endian length framing over WebSocket binary
//!   messages, with reassembly across message boundaries
//! - [`noise`]: the `Noise_XX_25519_ChaChaPoly_SHA256` handshake and the
//!   per-direction counter-nonce transport cipher it installs
//!
//! The reader half is the sole producer of inbound payloads; the writer
//! half serializes sends, which keeps each direction's nonce counter
//! strictly monotonic. Every error in [`TransportError`] terminates the
//! connection; the session supervisor owns the reconnect decision.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![forbid(unsafe_code)]

pub mod error;
pub mod frame;
pub mod noise;
pub mod ws;

pub use error::TransportError;
pub use frame::{encode_frame, FrameBuffer, FRAME_HEADER_LEN, MAX_FRAME_LEN};
pub use noise::{
    handshake, CipherState, NoiseReader, NoiseWriter, CONNECTION_HEADER, HANDSHAKE_TIMEOUT,
    NOISE_PATTERN, PROTOCOL_VERSION,
};
pub use ws::{connect, WsStream};
