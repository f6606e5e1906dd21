pub mod id;
pub mod models;
pub mod timestamp;

pub use id::RoomId;
pub use models::{
    sort_by_recent_activity, Attachment, ChatMessage, CreatedRoom, OutgoingMessage, RoomListEvent,
    RoomMeta, RoomSummary, UploadResponse, UserSummary,
};
