//! The seam between the subscription manager and a message broker.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::TransportError;

/// Handle of a live subscription, assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Identifies one transport instance created by a `connect` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

/// Things a transport reports back to its manager.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The broker accepted the session.
    Connected,
    /// The session ended; the transport will retry on its own.
    Disconnected { reason: Option<String> },
    /// A frame arrived on a subscription.
    Message { subscription: SubscriptionId, body: String },
    /// The broker sent an ERROR frame.
    ProtocolError { message: String, body: String },
    /// The underlying socket failed.
    TransportError(TransportError),
}

/// Parameters for opening a transport.
#[derive(Clone)]
pub struct ConnectRequest {
    pub connection: ConnectionId,
    pub token: String,
}

impl fmt::Debug for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectRequest")
            .field("connection", &self.connection)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Receiver side of [`EventSink`], implemented by the manager.
pub(crate) trait EventHandler: Send + Sync {
    fn handle_event(&self, connection: ConnectionId, event: TransportEvent);
}

/// Delivers transport events to the manager that opened the transport.
///
/// Holds only a weak reference, so a transport task outliving its manager
/// just stops reporting.
#[derive(Clone)]
pub struct EventSink {
    handler: Weak<dyn EventHandler>,
    connection: ConnectionId,
}

impl EventSink {
    pub(crate) fn new(handler: Weak<dyn EventHandler>, connection: ConnectionId) -> Self {
        Self { handler, connection }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Deliver one event. Returns false once the manager is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.handler.upgrade() {
            Some(handler) => {
                handler.handle_event(self.connection, event);
                true
            }
            None => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handler.strong_count() == 0
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

/// A live broker connection.
///
/// The manager calls these while holding its state lock, so implementations
/// must not block and must never deliver events synchronously from inside
/// them; events go through the [`EventSink`] from the transport's own task.
pub trait Transport: Send + Sync + 'static {
    fn subscribe(&self, destination: &str) -> Result<SubscriptionId, TransportError>;

    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError>;

    fn publish(&self, destination: &str, body: &str) -> Result<(), TransportError>;

    /// Stop the transport, including its reconnect loop.
    fn deactivate(&self) -> Result<(), TransportError>;
}

impl<T: Transport> Transport for Arc<T> {
    fn subscribe(&self, destination: &str) -> Result<SubscriptionId, TransportError> {
        (**self).subscribe(destination)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError> {
        (**self).unsubscribe(subscription)
    }

    fn publish(&self, destination: &str, body: &str) -> Result<(), TransportError> {
        (**self).publish(destination, body)
    }

    fn deactivate(&self) -> Result<(), TransportError> {
        (**self).deactivate()
    }
}

/// Creates transports. `open` starts the handshake in the background and
/// returns immediately; the outcome arrives as a [`TransportEvent`].
///
/// `open` also runs under the manager's state lock. It must not emit on the
/// `events` sink before returning.
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    fn open(&self, request: ConnectRequest, events: EventSink) -> Result<Self::Transport, TransportError>;
}
