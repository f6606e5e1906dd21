//! Desired-state subscription manager over a single broker connection.
//!
//! Callers declare which channels they want (the room list and any number of
//! rooms) independently of the connection lifecycle. Every time the
//! transport reports `Connected`, the desired set is replayed; every
//! `Disconnected` drops the live handles but keeps the desired set, so
//! callers never re-subscribe after a drop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chat_common::{OutgoingMessage, RoomId};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{SendError, SocketError, TransportError};

use super::destinations;
use super::listener::{Listener, ListenerSet};
use super::payload::Payload;
use super::transport::{
    ConnectRequest, ConnectionId, Connector, EventHandler, EventSink, SubscriptionId, Transport,
    TransportEvent,
};

/// Lifecycle of the single broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

type ErrorListener = Arc<dyn Fn(&SocketError) + Send + Sync>;

struct Connection<T> {
    id: ConnectionId,
    transport: T,
    status: ConnectionStatus,
}

/// What a live subscription feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Route {
    RoomList,
    Room(RoomId),
    Ping,
}

#[derive(Default)]
struct RoomListRequest {
    requested: bool,
    listeners: Vec<Listener>,
    active: Option<SubscriptionId>,
}

/// Presence in `State::rooms` is what marks a room as desired.
#[derive(Default)]
struct RoomRequest {
    listeners: ListenerSet,
    active: Option<SubscriptionId>,
}

struct State<T> {
    connection: Option<Connection<T>>,
    room_list: RoomListRequest,
    rooms: HashMap<RoomId, RoomRequest>,
    routes: HashMap<SubscriptionId, Route>,
    ping: Option<SubscriptionId>,
    ping_listener: Option<Listener>,
    error_listener: Option<ErrorListener>,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        Self {
            connection: None,
            room_list: RoomListRequest::default(),
            rooms: HashMap::new(),
            routes: HashMap::new(),
            ping: None,
            ping_listener: None,
            error_listener: None,
        }
    }
}

/// Work to do once the state lock is released.
#[derive(Default)]
struct Deferred {
    deliveries: Vec<(Listener, Payload)>,
    errors: Vec<SocketError>,
    error_listener: Option<ErrorListener>,
}

impl Deferred {
    fn run(self) {
        for (listener, payload) in &self.deliveries {
            listener.call(payload);
        }
        if let Some(on_error) = &self.error_listener {
            for err in &self.errors {
                on_error(err);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// State transitions (run under the lock)
// ---------------------------------------------------------------------------

impl<T: Transport> State<T> {
    fn status(&self) -> ConnectionStatus {
        self.connection
            .as_ref()
            .map_or(ConnectionStatus::Disconnected, |c| c.status)
    }

    fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    fn subscribe(&mut self, destination: &str, route: Route) -> Result<SubscriptionId, TransportError> {
        let conn = self.connection.as_ref().ok_or(TransportError::NotConnected)?;
        let id = conn.transport.subscribe(destination)?;
        tracing::debug!(subscription = %id, %destination, "subscribed");
        self.routes.insert(id, route);
        Ok(id)
    }

    /// Best-effort: the local handle is forgotten whatever the transport says.
    fn release(&mut self, id: SubscriptionId) {
        self.routes.remove(&id);
        let Some(conn) = &self.connection else {
            return;
        };
        if let Err(err) = conn.transport.unsubscribe(id) {
            tracing::debug!(subscription = %id, %err, "unsubscribe failed; ignoring");
        }
    }

    fn open_room_list(&mut self) -> Result<SubscriptionId, TransportError> {
        if let Some(id) = self.room_list.active {
            return Ok(id);
        }
        let id = self.subscribe(destinations::ROOM_LIST, Route::RoomList)?;
        self.room_list.active = Some(id);
        Ok(id)
    }

    fn open_room(&mut self, room_id: &RoomId) -> Result<SubscriptionId, TransportError> {
        if let Some(id) = self.rooms.get(room_id).and_then(|r| r.active) {
            return Ok(id);
        }
        let id = self.subscribe(&destinations::room(room_id), Route::Room(room_id.clone()))?;
        if let Some(request) = self.rooms.get_mut(room_id) {
            request.active = Some(id);
        }
        Ok(id)
    }

    fn close_room_list(&mut self) {
        if let Some(id) = self.room_list.active.take() {
            self.release(id);
        }
        self.room_list.requested = false;
        self.room_list.listeners.clear();
    }

    fn close_room(&mut self, room_id: &RoomId) {
        if let Some(RoomRequest { active: Some(id), .. }) = self.rooms.remove(room_id) {
            self.release(id);
        }
    }

    /// Subscribe everything that is desired but not live.
    fn replay(&mut self, errors: &mut Vec<SocketError>) {
        if self.room_list.requested {
            if let Err(err) = self.open_room_list() {
                tracing::warn!(%err, "room list resubscribe failed");
                errors.push(err.into());
            }
        }

        let pending: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, r)| r.active.is_none() && !r.listeners.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        for room_id in pending {
            match self.open_room(&room_id) {
                Ok(id) => tracing::debug!(%room_id, subscription = %id, "room resubscribed"),
                Err(err) => {
                    tracing::warn!(%room_id, %err, "room resubscribe failed");
                    errors.push(err.into());
                }
            }
        }

        if self.ping.is_none() {
            match self.subscribe(destinations::PING_QUEUE, Route::Ping) {
                Ok(id) => self.ping = Some(id),
                Err(err) => tracing::debug!(%err, "ping subscribe failed"),
            }
            if let Some(conn) = &self.connection {
                if let Err(err) = conn.transport.publish(destinations::PING, "") {
                    tracing::debug!(%err, "ping publish failed");
                }
            }
        }
    }

    /// Drop every live handle, keeping what callers asked for.
    fn drop_live_subscriptions(&mut self) {
        let live: Vec<SubscriptionId> = self.routes.keys().copied().collect();
        for id in live {
            self.release(id);
        }
        self.room_list.active = None;
        for request in self.rooms.values_mut() {
            request.active = None;
        }
        self.ping = None;
    }

    fn route(&self, subscription: SubscriptionId) -> Vec<Listener> {
        match self.routes.get(&subscription) {
            Some(Route::RoomList) => self.room_list.listeners.clone(),
            Some(Route::Room(room_id)) => self
                .rooms
                .get(room_id)
                .map(|r| r.listeners.snapshot())
                .unwrap_or_default(),
            Some(Route::Ping) => self.ping_listener.iter().cloned().collect(),
            None => {
                tracing::debug!(%subscription, "frame for unknown subscription dropped");
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public manager
// ---------------------------------------------------------------------------

/// Owns one logical broker connection and the desired subscription set.
///
/// Create one per application with [`SubscriptionManager::new`] and share
/// the `Arc` with whatever needs live chat updates.
pub struct SubscriptionManager<C: Connector> {
    connector: C,
    state: Mutex<State<C::Transport>>,
    status: watch::Sender<ConnectionStatus>,
    next_connection: AtomicU64,
}

impl<C: Connector> SubscriptionManager<C> {
    pub fn new(connector: C) -> Arc<Self> {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Arc::new(Self {
            connector,
            state: Mutex::new(State::default()),
            status,
            next_connection: AtomicU64::new(1),
        })
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.lock().status()
    }

    /// Receiver that observes every status transition.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.state.lock().connection.as_ref().map(|c| c.id)
    }

    /// Called with broker ERROR frames, socket failures, and resubscribe
    /// failures.
    pub fn set_error_listener(&self, listener: impl Fn(&SocketError) + Send + Sync + 'static) {
        self.state.lock().error_listener = Some(Arc::new(listener));
    }

    /// Called with every answer on the ping queue.
    pub fn set_ping_listener(&self, listener: Listener) {
        self.state.lock().ping_listener = Some(listener);
    }

    /// Open the broker connection, or return the one that already exists.
    ///
    /// The handshake runs in the background. Its failure is not reported
    /// here; watch [`status`](Self::status) or the error listener instead.
    pub fn connect(self: &Arc<Self>, token: &str) -> Result<ConnectionId, SocketError> {
        let token = token.trim();
        if token.is_empty() {
            tracing::warn!("connect skipped: no credential");
            return Err(SocketError::MissingCredential);
        }

        let mut state = self.state.lock();
        if let Some(conn) = &state.connection {
            tracing::debug!(status = ?conn.status, "connect: reusing existing connection");
            return Ok(conn.id);
        }

        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        let handler: Weak<dyn EventHandler> = Arc::downgrade(self) as Weak<dyn EventHandler>;
        let request = ConnectRequest {
            connection: id,
            token: token.to_string(),
        };
        let transport = self.connector.open(request, EventSink::new(handler, id))?;

        state.connection = Some(Connection {
            id,
            transport,
            status: ConnectionStatus::Connecting,
        });
        self.status.send_replace(ConnectionStatus::Connecting);
        tracing::info!(connection = id.0, "chat socket connecting");
        Ok(id)
    }

    /// Tear everything down: live subscriptions, desired state, listeners,
    /// and the transport itself. A later `connect` starts from scratch.
    pub fn disconnect(&self) {
        let mut state = self.state.lock();
        state.drop_live_subscriptions();
        state.room_list = RoomListRequest::default();
        state.rooms.clear();

        if let Some(conn) = state.connection.take() {
            if let Err(err) = conn.transport.deactivate() {
                tracing::debug!(%err, "deactivate failed; ignoring");
            }
            tracing::info!(connection = conn.id.0, "chat socket disconnected");
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
    }

    /// Register a room-list listener. The same listener may be added twice
    /// and then fires twice.
    ///
    /// Returns the live handle, or `None` while the subscription is queued
    /// for the next connect.
    pub fn subscribe_room_list(&self, listener: Listener) -> Option<SubscriptionId> {
        let mut deferred = Deferred::default();
        let handle = {
            let mut state = self.state.lock();
            state.room_list.listeners.push(listener);
            state.room_list.requested = true;

            if state.is_connected() {
                match state.open_room_list() {
                    Ok(id) => Some(id),
                    Err(err) => {
                        tracing::warn!(%err, "room list subscribe failed");
                        deferred.errors.push(err.into());
                        deferred.error_listener = state.error_listener.clone();
                        None
                    }
                }
            } else {
                tracing::debug!("room list subscribe queued: not connected");
                None
            }
        };
        deferred.run();
        handle
    }

    /// Withdraw room-list interest.
    ///
    /// With `None`, tears the channel down regardless of remaining
    /// listeners. With a listener, removes every registration of it and
    /// tears down only when no listener is left.
    pub fn unsubscribe_room_list(&self, listener: Option<&Listener>) {
        let mut state = self.state.lock();
        if let Some(listener) = listener {
            state.room_list.listeners.retain(|l| !l.same_as(listener));
            if !state.room_list.listeners.is_empty() {
                return;
            }
        }
        state.close_room_list();
    }

    /// Register a listener for a room's messages. Adding the same listener
    /// again is a no-op; distinct listeners share one live subscription.
    ///
    /// Returns the live handle, or `None` while not connected.
    pub fn subscribe_room(&self, room_id: impl Into<RoomId>, listener: Listener) -> Option<SubscriptionId> {
        let room_id = room_id.into();
        let mut deferred = Deferred::default();
        let handle = {
            let mut state = self.state.lock();
            let listeners = &mut state.rooms.entry(room_id.clone()).or_default().listeners;
            if listeners.insert(listener) {
                tracing::debug!(%room_id, listeners = listeners.len(), "room listener added");
            }

            if !state.is_connected() {
                tracing::debug!(%room_id, "room subscribe queued: not connected");
                None
            } else {
                match state.open_room(&room_id) {
                    Ok(id) => Some(id),
                    Err(err) => {
                        tracing::warn!(%room_id, %err, "room subscribe failed");
                        deferred.errors.push(err.into());
                        deferred.error_listener = state.error_listener.clone();
                        None
                    }
                }
            }
        };
        deferred.run();
        handle
    }

    /// Withdraw room interest.
    ///
    /// With a listener, only that listener is removed; the room is torn down
    /// once its last listener goes. With `None`, the room is torn down
    /// immediately.
    pub fn unsubscribe_room(&self, room_id: impl Into<RoomId>, listener: Option<&Listener>) {
        let room_id = room_id.into();
        let mut state = self.state.lock();
        match listener {
            Some(listener) => {
                let Some(request) = state.rooms.get_mut(&room_id) else {
                    return;
                };
                request.listeners.remove(listener);
                if request.listeners.is_empty() {
                    state.close_room(&room_id);
                }
            }
            None => state.close_room(&room_id),
        }
    }

    /// Publish a chat message. Fire-and-forget: success means the frame was
    /// handed to the transport, not that the server stored it.
    pub fn send_message(&self, room_id: impl Into<RoomId>, content: &str) -> Result<(), SendError> {
        let room_id = room_id.into();
        let state = self.state.lock();
        let conn = match &state.connection {
            Some(conn) if conn.status == ConnectionStatus::Connected => conn,
            _ => {
                tracing::warn!(%room_id, "send skipped: not connected");
                return Err(SendError::NotConnected);
            }
        };

        let content = content.trim();
        if content.is_empty() {
            return Err(SendError::EmptyContent);
        }
        let numeric = room_id
            .as_number()
            .ok_or_else(|| SendError::InvalidRoomId(room_id.to_string()))?;

        let body = serde_json::to_string(&OutgoingMessage {
            room_id: numeric,
            content: content.to_string(),
        })
        .map_err(|err| SendError::Encode(err.to_string()))?;
        conn.transport.publish(destinations::SEND_MESSAGE, &body)?;
        Ok(())
    }

    /// Rooms the caller currently wants, live or not.
    pub fn desired_rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.state.lock().rooms.keys().cloned().collect();
        rooms.sort();
        rooms
    }

    pub fn room_subscription(&self, room_id: impl Into<RoomId>) -> Option<SubscriptionId> {
        let room_id = room_id.into();
        self.state.lock().rooms.get(&room_id).and_then(|r| r.active)
    }

    pub fn room_list_requested(&self) -> bool {
        self.state.lock().room_list.requested
    }

    pub fn room_list_subscription(&self) -> Option<SubscriptionId> {
        self.state.lock().room_list.active
    }
}

impl<C: Connector> EventHandler for SubscriptionManager<C> {
    fn handle_event(&self, connection: ConnectionId, event: TransportEvent) {
        let mut deferred = Deferred::default();
        {
            let mut state = self.state.lock();
            match &state.connection {
                Some(conn) if conn.id == connection => {}
                _ => {
                    tracing::trace!(connection = connection.0, "event from stale connection ignored");
                    return;
                }
            }
            deferred.error_listener = state.error_listener.clone();

            match event {
                TransportEvent::Connected => {
                    if let Some(conn) = state.connection.as_mut() {
                        conn.status = ConnectionStatus::Connected;
                    }
                    self.status.send_replace(ConnectionStatus::Connected);
                    tracing::info!(connection = connection.0, "chat socket connected");
                    state.replay(&mut deferred.errors);
                }
                TransportEvent::Disconnected { reason } => {
                    tracing::info!(connection = connection.0, reason = ?reason, "chat socket closed");
                    state.drop_live_subscriptions();
                    if let Some(conn) = state.connection.as_mut() {
                        conn.status = ConnectionStatus::Disconnected;
                    }
                    self.status.send_replace(ConnectionStatus::Disconnected);
                }
                TransportEvent::Message { subscription, body } => {
                    let listeners = state.route(subscription);
                    if !listeners.is_empty() {
                        let payload = Payload::parse(&body);
                        deferred
                            .deliveries
                            .extend(listeners.into_iter().map(|l| (l, payload.clone())));
                    }
                }
                TransportEvent::ProtocolError { message, body } => {
                    tracing::warn!(%message, %body, "broker reported an error");
                    deferred.errors.push(SocketError::Protocol { message, body });
                }
                TransportEvent::TransportError(err) => {
                    tracing::warn!(%err, "chat socket transport error");
                    deferred.errors.push(SocketError::Transport(err));
                }
            }
        }
        deferred.run();
    }
}
