//! Message feed for the open room.

use std::collections::HashSet;

use chat_common::{ChatMessage, RoomId};

/// Tracks which messages of the open room have been shown, so history and
/// live pushes that overlap are printed once.
#[derive(Debug)]
pub struct Feed {
    room_id: RoomId,
    seen: HashSet<i64>,
    latest: Option<i64>,
    other_read: Option<i64>,
}

impl Feed {
    pub fn new(room_id: RoomId) -> Self {
        Self {
            room_id,
            seen: HashSet::new(),
            latest: None,
            other_read: None,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Newest message id shown so far; what read receipts point at.
    pub fn latest(&self) -> Option<i64> {
        self.latest
    }

    /// Last message the other members have read, from the room meta.
    pub fn set_other_read(&mut self, message_id: Option<i64>) {
        self.other_read = message_id;
    }

    pub fn read_by_other(&self, message: &ChatMessage) -> bool {
        self.other_read.is_some_and(|read| message.message_id <= read)
    }

    /// Seed from history. Returns the messages not seen before, in order.
    pub fn load(&mut self, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
        history.into_iter().filter(|m| self.accept(m)).collect()
    }

    /// Whether a pushed event should be shown. Non-`MESSAGE` events,
    /// messages for other rooms, and duplicates are rejected.
    pub fn accept(&mut self, message: &ChatMessage) -> bool {
        if !message.is_message() {
            return false;
        }
        if let Some(room) = &message.room_id {
            if room != &self.room_id {
                return false;
            }
        }
        if !self.seen.insert(message.message_id) {
            return false;
        }
        self.latest = Some(self.latest.map_or(message.message_id, |l| l.max(message.message_id)));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: i64, kind: Option<&str>) -> ChatMessage {
        ChatMessage {
            message_id: id,
            room_id: Some(RoomId::from(1)),
            sender_id: Some(2),
            content: Some(format!("m{id}")),
            created_at: None,
            attachments: Vec::new(),
            kind: kind.map(str::to_string),
        }
    }

    #[test]
    fn history_then_live_push_dedupes() {
        let mut feed = Feed::new(RoomId::from(1));
        let shown = feed.load(vec![message(1, None), message(2, None)]);
        assert_eq!(shown.len(), 2);
        assert_eq!(feed.latest(), Some(2));

        assert!(!feed.accept(&message(2, Some("MESSAGE"))));
        assert!(feed.accept(&message(3, Some("MESSAGE"))));
        assert_eq!(feed.latest(), Some(3));
    }

    #[test]
    fn non_message_events_are_skipped() {
        let mut feed = Feed::new(RoomId::from(1));
        assert!(!feed.accept(&message(5, Some("READ"))));
        assert_eq!(feed.latest(), None);
        // a skipped event does not burn its id
        assert!(feed.accept(&message(5, None)));
    }

    #[test]
    fn other_rooms_are_ignored() {
        let mut feed = Feed::new(RoomId::from(1));
        let mut other = message(9, None);
        other.room_id = Some(RoomId::from("2"));
        assert!(!feed.accept(&other));
    }

    #[test]
    fn read_receipt_covers_messages_up_to_the_marker() {
        let mut feed = Feed::new(RoomId::from(1));
        assert!(!feed.read_by_other(&message(1, None)));

        feed.set_other_read(Some(4));
        assert!(feed.read_by_other(&message(3, None)));
        assert!(feed.read_by_other(&message(4, None)));
        assert!(!feed.read_by_other(&message(5, None)));
    }

    #[test]
    fn latest_tracks_the_maximum_id() {
        let mut feed = Feed::new(RoomId::from(1));
        feed.load(vec![message(10, None), message(4, None)]);
        assert_eq!(feed.latest(), Some(10));
    }
}
