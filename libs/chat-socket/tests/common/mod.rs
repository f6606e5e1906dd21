#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::sync::{mpsc, Mutex};
use tokio::time;

use chat_socket::stomp::{Command, Frame};
use chat_socket::SocketConfig;

pub const WS_PATH: &str = "/ws-chat/websocket";

/// Bind `127.0.0.1:0` and serve `app` in the background.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Socket settings pointing at a local stub, with fast reconnects and no
/// heart-beating.
pub fn socket_config(addr: SocketAddr) -> SocketConfig {
    SocketConfig {
        broker_url: format!("ws://{addr}{WS_PATH}"),
        reconnect_delay: Duration::from_millis(50),
        heartbeat_outgoing: Duration::ZERO,
        heartbeat_incoming: Duration::ZERO,
        connect_timeout: Duration::from_secs(2),
    }
}

// ---------------------------------------------------------------------------
// STOMP broker stub
// ---------------------------------------------------------------------------

enum Control {
    Push(Frame),
    Drop,
}

struct BrokerState {
    inbound: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    session: Mutex<Option<mpsc::UnboundedSender<Control>>>,
    sessions: AtomicUsize,
    heartbeats: AtomicUsize,
    reject_connect: AtomicBool,
    ignore_connect: AtomicBool,
    heart_beat: StdMutex<String>,
    with_connected: StdMutex<Vec<Frame>>,
}

impl Default for BrokerState {
    fn default() -> Self {
        Self {
            inbound: Mutex::default(),
            session: Mutex::default(),
            sessions: AtomicUsize::new(0),
            heartbeats: AtomicUsize::new(0),
            reject_connect: AtomicBool::new(false),
            ignore_connect: AtomicBool::new(false),
            heart_beat: StdMutex::new("0,0".to_string()),
            with_connected: StdMutex::new(Vec::new()),
        }
    }
}

/// In-process STOMP broker that records every client frame and lets the test
/// push MESSAGE frames or kill the current session.
pub struct Broker {
    pub addr: SocketAddr,
    state: Arc<BrokerState>,
    frames: mpsc::UnboundedReceiver<Frame>,
}

impl Broker {
    pub async fn start() -> Self {
        let state = Arc::new(BrokerState::default());
        let (tx, frames) = mpsc::unbounded_channel();
        *state.inbound.lock().await = Some(tx);

        let app = Router::new()
            .route(WS_PATH, get(ws_handler))
            .with_state(state.clone());
        let addr = serve(app).await;
        Self { addr, state, frames }
    }

    /// Answer CONNECT with an ERROR frame instead of CONNECTED.
    pub fn reject_connect(&self, reject: bool) {
        self.state.reject_connect.store(reject, Ordering::SeqCst);
    }

    /// Never answer CONNECT.
    pub fn ignore_connect(&self, ignore: bool) {
        self.state.ignore_connect.store(ignore, Ordering::SeqCst);
    }

    /// `heart-beat` value sent in CONNECTED. The stub itself never beats.
    pub fn heart_beat(&self, value: &str) {
        *self.state.heart_beat.lock().unwrap() = value.to_string();
    }

    /// Append `frame` to the same WebSocket message as CONNECTED.
    pub fn with_connected(&self, frame: Frame) {
        self.state.with_connected.lock().unwrap().push(frame);
    }

    pub fn sessions(&self) -> usize {
        self.state.sessions.load(Ordering::SeqCst)
    }

    /// Bare EOL heart-beats received from clients so far.
    pub fn heartbeats(&self) -> usize {
        self.state.heartbeats.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` sessions have been opened.
    pub async fn wait_for_sessions(&self, n: usize) {
        time::timeout(Duration::from_secs(5), async {
            while self.sessions() < n {
                time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("timeout waiting for sessions");
    }

    pub async fn next_frame(&mut self) -> Frame {
        time::timeout(Duration::from_secs(5), self.frames.recv())
            .await
            .expect("timeout waiting for client frame")
            .expect("broker stopped")
    }

    /// Skip frames until one matches.
    pub async fn expect(&mut self, pred: impl Fn(&Frame) -> bool) -> Frame {
        loop {
            let frame = self.next_frame().await;
            if pred(&frame) {
                return frame;
            }
        }
    }

    pub async fn expect_subscribe(&mut self, destination: &str) -> Frame {
        self.expect(|f| f.command == Command::Subscribe && f.get("destination") == Some(destination))
            .await
    }

    /// Send a MESSAGE on the client's subscription `id`.
    pub async fn push(&self, subscription: &str, destination: &str, body: &str) {
        let frame = Frame::new(Command::Message)
            .header("destination", destination)
            .header("subscription", subscription)
            .header("message-id", "m-1")
            .body(body);
        self.control(Control::Push(frame)).await;
    }

    pub async fn push_error(&self, message: &str, body: &str) {
        let frame = Frame::new(Command::Error).header("message", message).body(body);
        self.control(Control::Push(frame)).await;
    }

    /// Close the current session from the server side.
    pub async fn drop_session(&self) {
        self.control(Control::Drop).await;
    }

    async fn control(&self, control: Control) {
        let session = self.state.session.lock().await;
        session
            .as_ref()
            .expect("no live session")
            .send(control)
            .ok()
            .expect("session gone");
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<BrokerState>>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

async fn run_session(mut socket: WebSocket, state: Arc<BrokerState>) {
    let (tx, mut control) = mpsc::unbounded_channel();
    *state.session.lock().await = Some(tx);
    state.sessions.fetch_add(1, Ordering::SeqCst);
    let inbound = state.inbound.lock().await.clone().expect("inbound channel");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { return };
                let text = match msg {
                    Message::Text(text) => text.as_str().to_string(),
                    Message::Close(_) => return,
                    _ => continue,
                };
                if !text.is_empty() && text.trim_matches(['\r', '\n']).is_empty() {
                    state.heartbeats.fetch_add(1, Ordering::SeqCst);
                    continue;
                }
                for frame in Frame::decode_all(&text).expect("client sent a malformed frame") {
                    if frame.command == Command::Connect && !state.ignore_connect.load(Ordering::SeqCst) {
                        let reply = if state.reject_connect.load(Ordering::SeqCst) {
                            Frame::new(Command::Error)
                                .header("message", "Unauthorized")
                                .body("invalid token")
                                .encode()
                        } else {
                            let heart_beat = state.heart_beat.lock().unwrap().clone();
                            let mut reply = Frame::new(Command::Connected)
                                .header("version", "1.2")
                                .header("heart-beat", heart_beat)
                                .encode();
                            for extra in state.with_connected.lock().unwrap().drain(..) {
                                reply.push_str(&extra.encode());
                            }
                            reply
                        };
                        if socket.send(Message::Text(reply.into())).await.is_err() {
                            return;
                        }
                    }
                    let _ = inbound.send(frame);
                }
            }
            cmd = control.recv() => match cmd {
                Some(Control::Push(frame)) => {
                    if socket.send(Message::Text(frame.encode().into())).await.is_err() {
                        return;
                    }
                }
                Some(Control::Drop) | None => return,
            }
        }
    }
}
