//! Real-time subscriptions over the chat broker.

pub mod destinations;
mod listener;
mod manager;
mod payload;
pub mod stomp_transport;
mod transport;

pub use listener::Listener;
pub use manager::{ConnectionStatus, SubscriptionManager};
pub use payload::Payload;
pub use stomp_transport::{StompConnector, StompTransport};
pub use transport::{
    ConnectRequest, ConnectionId, Connector, EventSink, SubscriptionId, Transport, TransportEvent,
};

/// The manager wired to the real STOMP transport.
pub type ChatSocket = SubscriptionManager<StompConnector>;
