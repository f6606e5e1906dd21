//! STOMP over WebSocket transport with automatic reconnect.
//!
//! One background task owns the socket. Transport calls only enqueue frames
//! (tagged with the session they were issued in) so they never block and
//! never call back into the manager. Each session walks
//! connect -> CONNECT/CONNECTED -> event loop, and after it ends the task
//! waits `reconnect_delay` and starts over until deactivated.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::http::Uri;
use tokio_tungstenite::tungstenite::Message;

use crate::config::SocketConfig;
use crate::error::TransportError;
use crate::stomp::{Command, Frame, HeartBeat, ACCEPT_VERSION};

use super::transport::{ConnectRequest, Connector, EventSink, SubscriptionId, Transport, TransportEvent};

/// Stand-in period for timers that are disabled by a zero heart-beat.
const IDLE_PERIOD: Duration = Duration::from_secs(3600);

/// Opens [`StompTransport`]s against one broker endpoint.
#[derive(Debug, Clone, Default)]
pub struct StompConnector {
    config: SocketConfig,
}

impl StompConnector {
    pub fn new(config: SocketConfig) -> Self {
        Self { config }
    }
}

impl Connector for StompConnector {
    type Transport = StompTransport;

    fn open(&self, request: ConnectRequest, events: EventSink) -> Result<StompTransport, TransportError> {
        let uri: Uri = self
            .config
            .broker_url
            .parse()
            .map_err(|_| TransportError::InvalidUrl(self.config.broker_url.clone()))?;
        let host = match (uri.scheme_str(), uri.host()) {
            (Some("ws" | "wss"), Some(host)) => host.to_string(),
            _ => return Err(TransportError::InvalidUrl(self.config.broker_url.clone())),
        };
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| TransportError::WebSocket("no tokio runtime available".into()))?;

        let shared = Arc::new(Shared::default());
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = Worker {
            config: self.config.clone(),
            host,
            token: request.token,
            shared: shared.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
            events,
        };
        runtime.spawn(worker.run());

        tracing::debug!(connection = request.connection.0, url = %self.config.broker_url, "stomp transport started");
        Ok(StompTransport {
            shared,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
        })
    }
}

#[derive(Default)]
struct Shared {
    /// True between CONNECTED and the end of that session.
    connected: AtomicBool,
    /// Bumped at every session end; frames queued under an older epoch are dropped.
    epoch: AtomicU64,
    next_subscription: AtomicU64,
}

struct Outbound {
    epoch: u64,
    frame: Frame,
}

/// Handle to a running STOMP session task.
pub struct StompTransport {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Outbound>,
    shutdown: watch::Sender<bool>,
}

impl StompTransport {
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn enqueue(&self, frame: Frame) -> Result<(), TransportError> {
        // epoch first: a session ending in between flips `connected` before
        // bumping the epoch, so a stale frame is caught by either check
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(Outbound { epoch, frame })
            .map_err(|_| TransportError::Closed)
    }
}

impl Transport for StompTransport {
    fn subscribe(&self, destination: &str) -> Result<SubscriptionId, TransportError> {
        let id = SubscriptionId(self.shared.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.enqueue(
            Frame::new(Command::Subscribe)
                .header("id", id.to_string())
                .header("destination", destination)
                .header("ack", "auto"),
        )?;
        Ok(id)
    }

    fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError> {
        self.enqueue(Frame::new(Command::Unsubscribe).header("id", subscription.to_string()))
    }

    fn publish(&self, destination: &str, body: &str) -> Result<(), TransportError> {
        let mut frame = Frame::new(Command::Send).header("destination", destination);
        if !body.is_empty() {
            frame = frame.header("content-type", "application/json").body(body);
        }
        self.enqueue(frame)
    }

    fn deactivate(&self) -> Result<(), TransportError> {
        self.shared.connected.store(false, Ordering::Release);
        self.shutdown.send_replace(true);
        Ok(())
    }
}

impl Drop for StompTransport {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

// ---------------------------------------------------------------------------
// Session task
// ---------------------------------------------------------------------------

enum Outcome {
    /// Socket closed or went silent.
    Closed(Option<String>),
    Failed(TransportError),
    /// Broker answered with an ERROR frame.
    Rejected { message: String, body: String },
    Shutdown,
}

struct Worker {
    config: SocketConfig,
    host: String,
    token: String,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    shutdown: watch::Receiver<bool>,
    events: EventSink,
}

impl Worker {
    async fn run(mut self) {
        let mut attempt: u64 = 0;
        loop {
            if *self.shutdown.borrow() || self.events.is_closed() {
                break;
            }
            attempt += 1;

            let mut established = false;
            let outcome = self.session(&mut established).await;

            self.shared.connected.store(false, Ordering::Release);
            self.shared.epoch.fetch_add(1, Ordering::AcqRel);

            let reason = match outcome {
                Outcome::Shutdown => break,
                Outcome::Closed(reason) => reason,
                Outcome::Failed(err) => {
                    tracing::warn!(attempt, %err, "stomp session failed");
                    let reason = err.to_string();
                    self.events.emit(TransportEvent::TransportError(err));
                    Some(reason)
                }
                Outcome::Rejected { message, body } => {
                    tracing::warn!(attempt, %message, "broker sent ERROR");
                    let reason = message.clone();
                    self.events.emit(TransportEvent::ProtocolError { message, body });
                    Some(reason)
                }
            };
            if established && !self.events.emit(TransportEvent::Disconnected { reason }) {
                break;
            }

            tokio::select! {
                _ = time::sleep(self.config.reconnect_delay) => {}
                _ = self.shutdown.changed() => break,
            }
        }
        tracing::debug!("stomp transport stopped");
    }

    async fn session(&mut self, established: &mut bool) -> Outcome {
        let connect = time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(self.config.broker_url.as_str()),
        );
        let ws = tokio::select! {
            res = connect => match res {
                Ok(Ok((ws, _response))) => ws,
                Ok(Err(err)) => return Outcome::Failed(TransportError::WebSocket(err.to_string())),
                Err(_) => return Outcome::Failed(TransportError::Handshake("websocket connect timed out".into())),
            },
            _ = self.shutdown.changed() => return Outcome::Shutdown,
        };
        let (mut sink, mut stream) = ws.split();

        let offered = HeartBeat::new(self.config.heartbeat_outgoing, self.config.heartbeat_incoming);
        let connect_frame = Frame::new(Command::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", self.host.as_str())
            .header("heart-beat", offered.to_header())
            .header("Authorization", format!("Bearer {}", self.token));
        if let Err(err) = sink.send(Message::text(connect_frame.encode())).await {
            return Outcome::Failed(TransportError::WebSocket(err.to_string()));
        }

        // -- wait for CONNECTED ------------------------------------------------

        let mut buffer = String::new();
        let deadline = Instant::now() + self.config.connect_timeout;
        let (server_beat, early) = 'handshake: loop {
            let msg = tokio::select! {
                msg = stream.next() => msg,
                _ = time::sleep_until(deadline) => {
                    return Outcome::Failed(TransportError::Handshake("no CONNECTED frame".into()));
                }
                _ = self.shutdown.changed() => return Outcome::Shutdown,
            };
            let text = match read_text(msg) {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(outcome) => return outcome,
            };
            buffer.push_str(&text);
            let mut frames = take_frames(&mut buffer).into_iter();
            while let Some(frame) = frames.next() {
                match frame.command {
                    Command::Connected => {
                        // frames read together with CONNECTED belong to the new session
                        let early: Vec<Frame> = frames.collect();
                        break 'handshake (HeartBeat::parse(frame.get("heart-beat")), early);
                    }
                    Command::Error => return rejected(frame),
                    other => {
                        tracing::debug!(command = other.as_str(), "unexpected frame before CONNECTED");
                    }
                }
            }
        };

        let (send_every, expect_within) = offered.negotiate(server_beat);
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        self.shared.connected.store(true, Ordering::Release);
        *established = true;
        tracing::info!(host = %self.host, send_every = ?send_every, expect_within = ?expect_within, "stomp session established");
        if !self.events.emit(TransportEvent::Connected) {
            return Outcome::Shutdown;
        }
        for frame in early {
            if let Some(outcome) = self.dispatch(frame) {
                return outcome;
            }
        }

        // -- event loop ----------------------------------------------------------

        let period = send_every.unwrap_or(IDLE_PERIOD);
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // tolerate one missed beat
        let silence_limit = expect_within.map(|d| d * 2);
        let mut last_read = Instant::now();

        loop {
            let silence_deadline = last_read + silence_limit.unwrap_or(IDLE_PERIOD);
            tokio::select! {
                msg = stream.next() => {
                    last_read = Instant::now();
                    let text = match read_text(msg) {
                        Ok(Some(text)) => text,
                        Ok(None) => continue,
                        Err(outcome) => return outcome,
                    };
                    buffer.push_str(&text);
                    for frame in take_frames(&mut buffer) {
                        if let Some(outcome) = self.dispatch(frame) {
                            return outcome;
                        }
                    }
                }
                out = self.outbound.recv() => {
                    let Some(Outbound { epoch: queued, frame }) = out else {
                        // transport handle dropped
                        say_goodbye(&mut sink).await;
                        return Outcome::Shutdown;
                    };
                    if queued != epoch {
                        tracing::trace!(command = frame.command.as_str(), "dropping frame from previous session");
                        continue;
                    }
                    if let Err(err) = sink.send(Message::text(frame.encode())).await {
                        return Outcome::Failed(TransportError::WebSocket(err.to_string()));
                    }
                }
                _ = heartbeat.tick(), if send_every.is_some() => {
                    if let Err(err) = sink.send(Message::text("\n")).await {
                        return Outcome::Failed(TransportError::WebSocket(err.to_string()));
                    }
                }
                _ = time::sleep_until(silence_deadline), if silence_limit.is_some() => {
                    tracing::warn!("no data from broker within heart-beat window");
                    return Outcome::Closed(Some("heart-beat timeout".into()));
                }
                _ = self.shutdown.changed() => {
                    say_goodbye(&mut sink).await;
                    return Outcome::Shutdown;
                }
            }
        }
    }

    fn dispatch(&self, frame: Frame) -> Option<Outcome> {
        match frame.command {
            Command::Message => {
                let subscription = frame
                    .get("subscription")
                    .and_then(|s| s.strip_prefix("sub-"))
                    .and_then(|n| n.parse().ok())
                    .map(SubscriptionId);
                match subscription {
                    Some(subscription) => {
                        self.events.emit(TransportEvent::Message {
                            subscription,
                            body: frame.body,
                        });
                    }
                    None => tracing::debug!("MESSAGE without a known subscription header"),
                }
                None
            }
            Command::Error => Some(rejected(frame)),
            Command::Receipt => None,
            other => {
                tracing::debug!(command = other.as_str(), "ignoring unexpected frame");
                None
            }
        }
    }
}

async fn say_goodbye<S>(sink: &mut S)
where
    S: futures_util::Sink<Message> + Unpin,
{
    let _ = sink.send(Message::text(Frame::new(Command::Disconnect).encode())).await;
    let _ = sink.close().await;
}

fn rejected(frame: Frame) -> Outcome {
    Outcome::Rejected {
        message: frame.get("message").unwrap_or("ERROR").to_string(),
        body: frame.body,
    }
}

type WsRead = Option<Result<Message, tokio_tungstenite::tungstenite::Error>>;

/// Text content of one socket read. `Ok(None)` for control frames.
fn read_text(msg: WsRead) -> Result<Option<String>, Outcome> {
    match msg {
        None => Err(Outcome::Closed(None)),
        Some(Err(err)) => Err(Outcome::Failed(TransportError::WebSocket(err.to_string()))),
        Some(Ok(Message::Text(text))) => Ok(Some(text.as_str().to_string())),
        Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
            Ok(text) => Ok(Some(text.to_string())),
            Err(_) => {
                tracing::debug!(len = bytes.len(), "ignoring non-utf8 binary message");
                Ok(None)
            }
        },
        Some(Ok(Message::Close(close))) => {
            Err(Outcome::Closed(close.map(|c| format!("{} {}", u16::from(c.code), c.reason.as_str()))))
        }
        Some(Ok(_)) => Ok(None),
    }
}

/// Drain every complete frame from `buffer`, leaving a trailing partial one.
fn take_frames(buffer: &mut String) -> Vec<Frame> {
    let mut frames = Vec::new();
    loop {
        match Frame::decode(buffer) {
            Ok(Some((frame, used))) => {
                buffer.replace_range(..used, "");
                frames.push(frame);
            }
            Ok(None) => {
                buffer.clear();
                break;
            }
            Err(crate::error::FrameError::Unterminated) => break,
            Err(err) => {
                tracing::warn!(%err, "discarding malformed frame data");
                buffer.clear();
                break;
            }
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::transport::{ConnectionId, EventHandler};
    use std::sync::Weak;

    #[test]
    fn take_frames_keeps_partial_tail() {
        let mut buffer = String::from("\nMESSAGE\nsubscription:sub-1\n\nhi\0MESS");
        let frames = take_frames(&mut buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, "hi");
        assert_eq!(buffer, "MESS");

        buffer.push_str("AGE\nsubscription:sub-2\n\nyo\0\n");
        let frames = take_frames(&mut buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].get("subscription"), Some("sub-2"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn take_frames_discards_garbage() {
        let mut buffer = String::from("BOGUS\n\n\0");
        assert!(take_frames(&mut buffer).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn open_rejects_non_websocket_urls() {
        let connector = StompConnector::new(SocketConfig {
            broker_url: "http://localhost:8080/ws-chat".into(),
            ..SocketConfig::default()
        });
        let handler: Weak<dyn EventHandler> = Weak::<NoopHandler>::new();
        let request = ConnectRequest {
            connection: ConnectionId(1),
            token: "t".into(),
        };
        let result = connector.open(request, EventSink::new(handler, ConnectionId(1)));
        assert!(matches!(result, Err(TransportError::InvalidUrl(_))));
    }

    struct NoopHandler;

    impl EventHandler for NoopHandler {
        fn handle_event(&self, _: ConnectionId, _: TransportEvent) {}
    }
}
