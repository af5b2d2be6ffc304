//! WebSocket dialing.

use crate::error::TransportError;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// The stream type produced by [`connect`].
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial the server's WebSocket endpoint.
///
/// # Errors
///
/// Returns [`TransportError::WebSocket`] when the dial or the HTTP upgrade
/// fails.
pub async fn connect(url: &str) -> Result<WsStream, TransportError> {
    tracing::debug!(url, "dialing websocket");
    let (stream, response) = connect_async(url).await?;
    tracing::debug!(status = %response.status(), "websocket established");
    Ok(stream)
}
