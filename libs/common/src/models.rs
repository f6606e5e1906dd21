//! Wire models shared by the REST client and the real-time channel.

use std::cmp::Reverse;
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::RoomId;
use crate::timestamp;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Event type the backend attaches to regular chat messages.
pub const MESSAGE_EVENT_TYPE: &str = "MESSAGE";

/// A chat message, as returned by the messages endpoint and pushed on a
/// room's topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(alias = "id")]
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Set by the server on pushed events; absent on REST responses.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ChatMessage {
    /// True unless the event carries a type other than `MESSAGE`.
    pub fn is_message(&self) -> bool {
        self.kind.as_deref().map_or(true, |k| k == MESSAGE_EVENT_TYPE)
    }

    /// One-line summary used for room list previews.
    pub fn preview(&self) -> String {
        let text = self.content.as_deref().unwrap_or("").trim();
        if !text.is_empty() {
            return text.to_string();
        }
        match self.attachments.len() {
            0 => "…".to_string(),
            1 => "📎 1 file".to_string(),
            n => format!("📎 {n} files"),
        }
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(alias = "id")]
    pub attachment_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
}

impl Attachment {
    /// Path of the download endpoint, relative to the API base URL.
    pub fn download_path(&self) -> String {
        format!("/files/chat/{}/download", self.attachment_id)
    }
}

/// Payload of a message published over the real-time channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub room_id: i64,
    pub content: String,
}

/// Response of the multipart attachment upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default)]
    pub ok: Option<bool>,
    pub message_id: i64,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// One entry of the caller's room list.
///
/// The list endpoint has grown fields over time; the ones the client relies
/// on are typed and everything else is kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    #[serde(alias = "id")]
    pub room_id: RoomId,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_content: Option<String>,
    #[serde(default, deserialize_with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub last_created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub last_message_created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::lenient", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RoomSummary {
    /// Most recent activity timestamp, falling back through the fields the
    /// backend may populate.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_created_at
            .or(self.last_message_created_at)
            .or(self.updated_at)
    }

    /// Record a freshly received message as the room's latest activity.
    pub fn bump(&mut self, message: &ChatMessage) {
        self.last_content = Some(message.preview());
        self.last_created_at = Some(message.created_at.unwrap_or_else(Utc::now));
    }

    pub fn display_name(&self) -> &str {
        self.partner_name.as_deref().unwrap_or("(unknown)")
    }
}

/// Order rooms by most recent activity first; rooms without any timestamp
/// sink to the bottom in their original order.
pub fn sort_by_recent_activity(rooms: &mut [RoomSummary]) {
    rooms.sort_by_key(|r| Reverse(r.last_activity()));
}

/// Read-receipt metadata for a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMeta {
    pub room_id: RoomId,
    #[serde(default)]
    pub my_last_read_message_id: Option<i64>,
    #[serde(default)]
    pub other_last_read_message_id: Option<i64>,
    #[serde(default)]
    pub last_read_by_user: HashMap<String, Option<i64>>,
    #[serde(default)]
    pub member_count: u32,
}

/// Room created by the DM or group endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRoom {
    #[serde(alias = "id")]
    pub room_id: RoomId,
}

/// Event pushed on the per-user room-list queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomListEvent {
    #[serde(rename = "ROOMS_CHANGED")]
    RoomsChanged,
    #[serde(other)]
    Unknown,
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// A user search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    #[serde(alias = "id")]
    pub user_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}
