//! Client side of the chat service: a desired-state STOMP subscription
//! manager plus the REST calls that accompany it.

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod socket;
pub mod stomp;

pub use api::{AttachmentUpload, ChatApi, MessagePage};
pub use config::{ChatConfig, SocketConfig};
pub use credentials::{CredentialSource, EnvToken, StaticToken};
pub use error::{ApiError, ConfigError, SendError, SocketError, TransportError};
pub use socket::{ChatSocket, ConnectionStatus, Listener, Payload, SubscriptionManager};
