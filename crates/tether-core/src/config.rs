//! Client configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one client instance.
///
/// The defaults match the server's expectations; most deployments only set
/// `url` and the user-agent fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint of the server.
    pub url: String,
    /// Operating system name reported in the client hello.
    pub os_name: String,
    /// Client version reported in the client hello.
    pub version: [u32; 3],
    /// Display name announced after connecting.
    pub device_name: String,

    /// Noise handshake deadline.
    pub handshake_timeout: Duration,
    /// Default `send_iq` response deadline.
    pub iq_timeout: Duration,
    /// Budget for the whole pairing flow, measured from QR emission.
    pub pair_timeout: Duration,

    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Response deadline for one keepalive ping.
    pub keepalive_timeout: Duration,

    /// Reconnect automatically after unexpected disconnects.
    pub auto_reconnect: bool,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_cap: Duration,
    /// Fractional jitter applied to every reconnect delay.
    pub reconnect_jitter: f64,

    /// Event broadcast buffer per subscriber.
    pub event_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "wss://gateway.tether.net/ws".to_owned(),
            os_name: std::env::consts::OS.to_owned(),
            version: [0, 1, 0],
            device_name: "tether".to_owned(),
            handshake_timeout: Duration::from_secs(20),
            iq_timeout: Duration::from_secs(75),
            pair_timeout: Duration::from_secs(180),
            keepalive_interval: Duration::from_secs(24),
            keepalive_timeout: Duration::from_secs(10),
            auto_reconnect: true,
            reconnect_base: Duration::from_secs(2),
            reconnect_cap: Duration::from_secs(30),
            reconnect_jitter: 0.2,
            event_buffer: 256,
        }
    }
}
