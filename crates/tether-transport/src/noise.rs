//! Noise handshake and post-handshake transport cipher.
//!
//! The client is always the XX initiator: it sends `e`, receives
//! `e, ee, s, es`, and sends `s, se` together with the encrypted client
//! hello. The 4-byte connection header rides in front of the first frame
//! and doubles as the Noise prologue, binding the advertised protocol and
//! dictionary versions into the handshake hash.
//!
//! After the split each direction owns an independent `(key, counter)`
//! cipher state. Nonces are 64-bit little-endian counters; wraparound is
//! fatal, reuse impossible by construction.

use crate::error::TransportError;
use crate::frame::{encode_frame, FrameBuffer};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use snow::Builder;
use std::time::Duration;
use tether_binary::DICT_VERSION;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use zeroize::Zeroize;

/// Noise parameter string for the session transport.
pub const NOISE_PATTERN: &str = "Noise_XX_25519_ChaChaPoly_SHA256";

/// Wire protocol revision advertised in the connection header.
pub const PROTOCOL_VERSION: u8 = 1;

/// One-time connection header: magic, protocol version, dictionary version.
pub const CONNECTION_HEADER: [u8; 4] = [b'T', b'D', PROTOCOL_VERSION, DICT_VERSION];

/// Default handshake deadline.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(20);

/// One direction's transport cipher: key plus strictly monotonic counter.
pub struct CipherState {
    cipher: ChaCha20Poly1305,
    counter: u64,
}

impl CipherState {
    fn new(mut key: [u8; 32]) -> Self {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        key.zeroize();
        Self { cipher, counter: 0 }
    }

    /// Messages processed so far in this direction.
    #[must_use]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    fn next_nonce(&mut self) -> Result<Nonce, TransportError> {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&self.counter.to_le_bytes());
        self.counter = self
            .counter
            .checked_add(1)
            .ok_or(TransportError::NonceExhausted)?;
        Ok(Nonce::from(nonce))
    }

    /// Encrypt one payload under the next nonce.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NonceExhausted`] on counter wraparound.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
        let nonce = self.next_nonce()?;
        self.cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| TransportError::Decrypt)
    }

    /// Decrypt one payload under the next nonce.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Decrypt`] on authentication failure and
    /// [`TransportError::NonceExhausted`] on counter wraparound. Both are
    /// fatal to the connection.
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, TransportError> {
        let nonce = self.next_nonce()?;
        self.cipher
            .decrypt(&nonce, ciphertext)
            .map_err(|_| TransportError::Decrypt)
    }
}

/// Sending half of an established connection.
///
/// Owned by the single writer task; serializing sends through it is what
/// keeps the send counter monotonic.
pub struct NoiseWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
    cipher: CipherState,
}

impl<S: AsyncRead + AsyncWrite + Unpin> NoiseWriter<S> {
    /// Encrypt, frame and send one payload.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::FrameTooLarge`] for oversized ciphertext,
    /// [`TransportError::Disconnected`]-equivalent WebSocket errors when the
    /// peer is gone, and cipher errors as described on [`CipherState`].
    pub async fn send_payload(&mut self, plaintext: &[u8]) -> Result<(), TransportError> {
        let ciphertext = self.cipher.encrypt(plaintext)?;
        let frame = encode_frame(&ciphertext, None)?;
        self.sink.send(Message::Binary(frame)).await?;
        Ok(())
    }

    /// Send counter value, for diagnostics and tests.
    #[must_use]
    pub fn send_counter(&self) -> u64 {
        self.cipher.counter()
    }

    /// Close the WebSocket gracefully.
    pub async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

/// Receiving half of an established connection.
///
/// Owned by the single reader task, which is the sole producer of decoded
/// stanzas and therefore preserves receive order.
pub struct NoiseReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
    cipher: CipherState,
    frames: FrameBuffer,
    closed: bool,
}

impl<S: AsyncRead + AsyncWrite + Unpin> NoiseReader<S> {
    /// Receive and decrypt the next payload.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Disconnected`] exactly once when the peer
    /// closes; every call after that fails the same way. AEAD failures
    /// surface as [`TransportError::Decrypt`] and are fatal.
    pub async fn next_payload(&mut self) -> Result<Vec<u8>, TransportError> {
        loop {
            if self.closed {
                return Err(TransportError::Disconnected);
            }
            if let Some(frame) = self.frames.next_frame() {
                return self.cipher.decrypt(&frame);
            }
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => self.frames.extend(&data),
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Err(TransportError::Disconnected);
                }
                // Ping/pong bookkeeping happens inside tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.closed = true;
                    return Err(e.into());
                }
            }
        }
    }

    /// Receive counter value, for diagnostics and tests.
    #[must_use]
    pub fn recv_counter(&self) -> u64 {
        self.cipher.counter()
    }
}

/// Run the client side of the Noise handshake over a fresh WebSocket.
///
/// `static_private` is the device's Noise static key; `client_payload` is
/// the serialized client hello encrypted into the final message. The whole
/// exchange races `timeout`.
///
/// # Errors
///
/// Returns [`TransportError::HandshakeTimeout`] when the deadline passes,
/// [`TransportError::Disconnected`] when the server hangs up mid-handshake
/// and [`TransportError::Noise`] for protocol failures (bad MAC, malformed
/// messages, wrong pattern).
pub async fn handshake<S: AsyncRead + AsyncWrite + Unpin>(
    ws: WebSocketStream<S>,
    static_private: &[u8; 32],
    client_payload: &[u8],
    timeout: Duration,
) -> Result<(NoiseWriter<S>, NoiseReader<S>, [u8; 32]), TransportError> {
    tokio::time::timeout(timeout, run_handshake(ws, static_private, client_payload))
        .await
        .map_err(|_| TransportError::HandshakeTimeout)?
}

async fn run_handshake<S: AsyncRead + AsyncWrite + Unpin>(
    mut ws: WebSocketStream<S>,
    static_private: &[u8; 32],
    client_payload: &[u8],
) -> Result<(NoiseWriter<S>, NoiseReader<S>, [u8; 32]), TransportError> {
    let params = NOISE_PATTERN.parse()?;
    let mut state = Builder::new(params)
        .local_private_key(static_private)
        .prologue(&CONNECTION_HEADER)
        .build_initiator()?;

    // -> e
    let mut msg = [0u8; 128];
    let len = state.write_message(&[], &mut msg)?;
    let first = encode_frame(&msg[..len], Some(&CONNECTION_HEADER))?;
    ws.send(Message::Binary(first)).await?;
    tracing::trace!("handshake: sent e");

    // <- e, ee, s, es
    let mut frames = FrameBuffer::new();
    let server_hello = read_frame(&mut ws, &mut frames).await?;
    let mut payload = vec![0u8; server_hello.len()];
    let _ = state.read_message(&server_hello, &mut payload)?;
    tracing::trace!("handshake: received server static");

    // -> s, se + client hello
    let mut finish = vec![0u8; client_payload.len() + 128];
    let len = state.write_message(client_payload, &mut finish)?;
    ws.send(Message::Binary(encode_frame(&finish[..len], None)?))
        .await?;

    let remote_static: [u8; 32] = state
        .get_remote_static()
        .and_then(|key| key.try_into().ok())
        .ok_or(snow::Error::Input)?;

    let (send_key, recv_key) = state.dangerously_get_raw_split();
    let (sink, stream) = ws.split();
    tracing::debug!("noise transport established");

    Ok((
        NoiseWriter {
            sink,
            cipher: CipherState::new(send_key),
        },
        NoiseReader {
            stream,
            cipher: CipherState::new(recv_key),
            frames,
            closed: false,
        },
        remote_static,
    ))
}

async fn read_frame<S: AsyncRead + AsyncWrite + Unpin>(
    ws: &mut WebSocketStream<S>,
    frames: &mut FrameBuffer,
) -> Result<Vec<u8>, TransportError> {
    loop {
        if let Some(frame) = frames.next_frame() {
            return Ok(frame);
        }
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => frames.extend(&data),
            Some(Ok(Message::Close(_))) | None => return Err(TransportError::Disconnected),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
}
