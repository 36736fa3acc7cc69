//! Gateway configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the gateway. Read-only once the server starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Discovery endpoint every connection opens its session against.
    pub discovery_url: String,
    /// Host to bind both listeners on (default `"0.0.0.0"`).
    pub host: String,
    /// Socket channel port (default `8002`, `0` for auto-assign).
    pub socket_port: u16,
    /// Static asset, health and metrics port (default `8001`, `0` for auto-assign).
    pub http_port: u16,
    /// Directory holding `socket.io.js` and `qimessaging.js`.
    pub assets_dir: PathBuf,
    /// Maximum calls running concurrently on one connection.
    pub max_in_flight: usize,
    /// Per-call timeout in seconds (`None` waits indefinitely).
    pub call_timeout_secs: Option<u64>,
    /// Interval between server pings, in seconds.
    pub ping_interval_secs: u64,
    /// Disconnect a client silent for longer than this, in seconds.
    pub pong_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl GatewayConfig {
    /// Default configuration pointed at `discovery_url`.
    pub fn new(discovery_url: impl Into<String>) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            ..Self::default()
        }
    }

    /// `host:socket_port`.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.socket_port)
    }

    /// `host:http_port`.
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }

    /// Call timeout as a duration.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs.map(Duration::from_secs)
    }

    /// Ping interval as a duration.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Pong timeout as a duration.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            discovery_url: String::new(),
            host: "0.0.0.0".into(),
            socket_port: 8002,
            http_port: 8001,
            assets_dir: PathBuf::from("."),
            max_in_flight: 32,
            call_timeout_secs: None,
            ping_interval_secs: 30,
            pong_timeout_secs: 60,
            max_message_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}
