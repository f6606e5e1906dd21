//! Broker destinations used by the chat backend.

use chat_common::RoomId;

/// Per-user queue announcing room list changes.
pub const ROOM_LIST: &str = "/user/queue/rooms";

/// Application destination for outgoing chat messages.
pub const SEND_MESSAGE: &str = "/app/chat/send";

/// Per-user queue answering liveness pings.
pub const PING_QUEUE: &str = "/user/queue/ping";

/// Application destination that triggers a ping answer.
pub const PING: &str = "/app/ping";

/// Topic carrying a room's messages.
pub fn room(room_id: &RoomId) -> String {
    format!("/topic/room/{room_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_topic_uses_the_normalized_id() {
        assert_eq!(room(&RoomId::from(42)), "/topic/room/42");
        assert_eq!(room(&RoomId::from("42")), "/topic/room/42");
        assert_eq!(room(&RoomId::from(" 42 ")), "/topic/room/42");
    }
}
