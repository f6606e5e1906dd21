use std::time::Duration;

use crate::error::ConfigError;

const DEFAULT_BROKER_URL: &str = "ws://localhost:8080/ws-chat/websocket";
const DEFAULT_API_URL: &str = "http://localhost:8080/api";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
const DEFAULT_HEARTBEAT_MS: u64 = 10_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Chat client configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// STOMP-over-WebSocket endpoint (e.g. `ws://localhost:8080/ws-chat/websocket`).
    pub broker_url: String,
    /// REST API origin including the `/api` prefix.
    pub api_url: String,
    /// Fixed delay between transport reconnect attempts.
    pub reconnect_delay: Duration,
    /// Heart-beat interval offered in both directions on CONNECT.
    pub heartbeat: Duration,
    /// Upper bound for the WebSocket + STOMP handshake.
    pub connect_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            heartbeat: Duration::from_millis(DEFAULT_HEARTBEAT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables. Every variable is
    /// optional; unset or empty ones fall back to the local defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let millis = |name: &'static str, default: u64| -> Result<Duration, ConfigError> {
            match var(name) {
                None => Ok(Duration::from_millis(default)),
                Some(v) => v.trim().parse().map(Duration::from_millis).map_err(|_| ConfigError {
                    name,
                    expected: "a number of milliseconds",
                    value: v,
                }),
            }
        };

        Ok(Self {
            broker_url: var("CHAT_BROKER_URL").unwrap_or_else(|| DEFAULT_BROKER_URL.to_string()),
            api_url: var("CHAT_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            reconnect_delay: millis("CHAT_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS)?,
            heartbeat: millis("CHAT_HEARTBEAT_MS", DEFAULT_HEARTBEAT_MS)?,
            connect_timeout: millis("CHAT_CONNECT_TIMEOUT_MS", DEFAULT_CONNECT_TIMEOUT_MS)?,
        })
    }

    /// Settings for the STOMP transport.
    pub fn socket(&self) -> SocketConfig {
        SocketConfig {
            broker_url: self.broker_url.clone(),
            reconnect_delay: self.reconnect_delay,
            heartbeat_outgoing: self.heartbeat,
            heartbeat_incoming: self.heartbeat,
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Transport-level settings used by [`StompConnector`](crate::socket::StompConnector).
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub broker_url: String,
    pub reconnect_delay: Duration,
    /// How often we promise to send heart-beats (zero disables).
    pub heartbeat_outgoing: Duration,
    /// How often we want the broker to send heart-beats (zero disables).
    pub heartbeat_incoming: Duration,
    pub connect_timeout: Duration,
}

impl Default for SocketConfig {
    fn default() -> Self {
        ChatConfig::default().socket()
    }
}
