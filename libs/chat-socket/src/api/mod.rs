//! REST endpoints that accompany the real-time channel.

mod client;

pub use client::{AttachmentUpload, ChatApi, MessagePage};
