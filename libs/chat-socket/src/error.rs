//! Error types for the socket manager, its transport, and the REST client.

use reqwest::StatusCode;

/// Errors returned by [`SubscriptionManager`](crate::socket::SubscriptionManager)
/// operations and reported to its error listener.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SocketError {
    #[error("no credential available")]
    MissingCredential,

    #[error("broker rejected the session: {message}")]
    Protocol { message: String, body: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures of the transport seam.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("invalid broker url: {0}")]
    InvalidUrl(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport closed")]
    Closed,
}

/// Why `send_message` refused to publish.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("socket is not connected")]
    NotConnected,

    #[error("message content is empty")]
    EmptyContent,

    #[error("room id {0} is not numeric")]
    InvalidRoomId(String),

    #[error("could not encode message: {0}")]
    Encode(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Malformed STOMP input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame is missing its command line")]
    MissingCommand,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("malformed header line {0:?}")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header {0:?}")]
    InvalidEscape(String),

    #[error("invalid content-length {0:?}")]
    InvalidContentLength(String),

    #[error("frame is not terminated")]
    Unterminated,
}

/// Errors from the REST client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not authenticated")]
    Unauthenticated,

    #[error("request failed with {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status(),
            Self::Unauthenticated => None,
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name} must be {expected}, got {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub expected: &'static str,
    pub value: String,
}
