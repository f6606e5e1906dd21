mod feed;
mod input;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chat_common::{sort_by_recent_activity, ChatMessage, RoomId, RoomListEvent, RoomSummary};
use chat_socket::socket::StompConnector;
use chat_socket::{
    ChatApi, ChatConfig, ChatSocket, CredentialSource, EnvToken, Listener, MessagePage, Payload,
};

use feed::Feed;
use input::Input;

const HISTORY_LIMIT: u32 = 30;

/// Pushed payloads, handed from socket listeners to the main loop.
enum Push {
    Room(RoomId, Payload),
    RoomList(Payload),
}

struct App {
    api: ChatApi,
    socket: Arc<ChatSocket>,
    pushes: mpsc::UnboundedSender<Push>,
    rooms: Vec<RoomSummary>,
    open: Option<(Feed, Listener)>,
}

impl App {
    async fn reload_rooms(&mut self) -> anyhow::Result<()> {
        let mut rooms = self.api.rooms().await.context("loading rooms")?;
        sort_by_recent_activity(&mut rooms);
        self.rooms = rooms;
        Ok(())
    }

    fn print_rooms(&self) {
        if self.rooms.is_empty() {
            println!("(no rooms)");
        }
        for room in &self.rooms {
            let unread = if room.unread_count > 0 {
                format!(" [{}]", room.unread_count)
            } else {
                String::new()
            };
            println!(
                "  #{:<5} {}{} {}",
                room.room_id,
                room.display_name(),
                unread,
                room.last_content.as_deref().unwrap_or("")
            );
        }
    }

    async fn open_room(&mut self, room_id: RoomId) -> anyhow::Result<()> {
        if let Some((feed, listener)) = self.open.take() {
            self.socket.unsubscribe_room(feed.room_id().clone(), Some(&listener));
        }

        let history = self
            .api
            .messages(&room_id, MessagePage::latest(HISTORY_LIMIT))
            .await
            .with_context(|| format!("loading messages for room {room_id}"))?;

        let mut feed = Feed::new(room_id.clone());
        match self.api.room_meta(&room_id).await {
            Ok(meta) => feed.set_other_read(meta.other_last_read_message_id),
            Err(err) => tracing::warn!(%room_id, %err, "room meta unavailable"),
        }

        println!("--- room #{room_id} ---");
        for message in feed.load(history) {
            print_message(&message, feed.read_by_other(&message));
        }

        let pushes = self.pushes.clone();
        let for_room = room_id.clone();
        let listener = Listener::new(move |payload| {
            let _ = pushes.send(Push::Room(for_room.clone(), payload.clone()));
        });
        if self.socket.subscribe_room(room_id.clone(), listener.clone()).is_none() {
            tracing::debug!(%room_id, "room subscription queued until connected");
        }

        self.mark_read(&feed).await;
        self.open = Some((feed, listener));
        Ok(())
    }

    async fn mark_read(&self, feed: &Feed) {
        let Some(latest) = feed.latest() else { return };
        if let Err(err) = self.api.update_read(feed.room_id(), Some(latest)).await {
            tracing::warn!(room_id = %feed.room_id(), %err, "update read failed");
        }
    }

    async fn on_room_push(&mut self, room_id: RoomId, payload: Payload) {
        let Some(message) = payload.decode::<ChatMessage>() else {
            tracing::debug!(%room_id, "ignoring undecodable room payload");
            return;
        };

        if let Some(room) = self.rooms.iter_mut().find(|r| r.room_id == room_id) {
            if message.is_message() {
                room.bump(&message);
            }
        }
        sort_by_recent_activity(&mut self.rooms);

        let Some((feed, _)) = self.open.as_mut() else { return };
        if feed.room_id() != &room_id || !feed.accept(&message) {
            return;
        }
        print_message(&message, feed.read_by_other(&message));
        if let Some((feed, _)) = &self.open {
            self.mark_read(feed).await;
        }
    }

    async fn on_room_list_push(&mut self, payload: Payload) {
        match payload.decode::<RoomListEvent>() {
            Some(RoomListEvent::RoomsChanged) => {
                if let Err(err) = self.reload_rooms().await {
                    tracing::warn!(error = %err, "room reload failed");
                }
            }
            _ => tracing::debug!("ignoring room list event"),
        }
    }

    fn say(&self, text: &str) {
        let Some((feed, _)) = &self.open else {
            println!("(open a room first: /room <id>)");
            return;
        };
        if let Err(err) = self.socket.send_message(feed.room_id().clone(), text) {
            println!("(send failed: {err})");
        }
    }
}

fn print_message(message: &ChatMessage, read: bool) {
    let time = message
        .created_at
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".to_string());
    let sender = message
        .sender_id
        .map_or_else(|| "?".to_string(), |id| id.to_string());
    let receipt = if read { " ✓" } else { "" };
    println!("[{time}] {sender}: {}{receipt}", message.preview());
    for attachment in &message.attachments {
        println!(
            "        📎 {} ({})",
            attachment.original_name.as_deref().unwrap_or("file"),
            attachment.download_path()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ChatConfig::from_env()?;
    let credentials: Arc<dyn CredentialSource> = Arc::new(EnvToken::default());
    let Some(token) = credentials.token() else {
        bail!("set {} to a bearer token", EnvToken::DEFAULT_VAR);
    };

    tracing::info!(broker = %config.broker_url, api = %config.api_url, "chat-cli configured");

    let api = ChatApi::new(&config.api_url, credentials);
    let socket = ChatSocket::new(StompConnector::new(config.socket()));
    socket.set_error_listener(|err| eprintln!("(socket: {err})"));

    let (pushes, mut inbox) = mpsc::unbounded_channel();
    let list_pushes = pushes.clone();
    socket.subscribe_room_list(Listener::new(move |payload| {
        let _ = list_pushes.send(Push::RoomList(payload.clone()));
    }));
    socket.connect(&token)?;

    let mut app = App {
        api,
        socket: socket.clone(),
        pushes,
        rooms: Vec::new(),
        open: None,
    };

    app.reload_rooms().await?;
    let initial = std::env::args()
        .nth(1)
        .map(RoomId::from)
        .or_else(|| app.rooms.first().map(|r| r.room_id.clone()));
    match initial {
        Some(room_id) => app.open_room(room_id).await?,
        None => app.print_rooms(),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match input::parse(&line) {
                    Input::Say(text) => app.say(&text),
                    Input::OpenRoom(room_id) => {
                        if let Err(err) = app.open_room(room_id).await {
                            println!("({err:#})");
                        }
                    }
                    Input::ListRooms => app.print_rooms(),
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Unknown(cmd) => println!("(unknown command {cmd}; try /room <id>, /rooms, /quit)"),
                }
            }
            Some(push) = inbox.recv() => match push {
                Push::Room(room_id, payload) => app.on_room_push(room_id, payload).await,
                Push::RoomList(payload) => app.on_room_list_push(payload).await,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    socket.disconnect();
    tracing::info!("chat-cli exiting");
    Ok(())
}
