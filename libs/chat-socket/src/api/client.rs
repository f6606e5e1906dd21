use std::sync::Arc;

use chat_common::{ChatMessage, CreatedRoom, RoomId, RoomMeta, RoomSummary, UploadResponse, UserSummary};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialSource;
use crate::error::ApiError;

/// Cursor/limit query for the message history endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessagePage {
    /// Return messages older than this id.
    pub cursor: Option<i64>,
    pub limit: Option<u32>,
}

impl MessagePage {
    pub fn latest(limit: u32) -> Self {
        Self {
            cursor: None,
            limit: Some(limit),
        }
    }
}

/// One file for [`ChatApi::upload_attachments`].
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime: Option<String>,
}

/// HTTP client for the chat REST API.
#[derive(Clone)]
pub struct ChatApi {
    base_url: String,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DmRequest {
    target_user_id: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupRequest<'a> {
    member_user_ids: &'a [i64],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteRequest<'a> {
    user_ids: &'a [i64],
}

#[derive(Serialize)]
struct ContentRequest<'a> {
    content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReadRequest {
    last_read_message_id: Option<i64>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl ChatApi {
    /// `base_url` includes the `/api` prefix, e.g. `http://localhost:8080/api`.
    pub fn new(base_url: &str, credentials: Arc<dyn CredentialSource>) -> Self {
        Self::with_client(base_url, credentials, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, credentials: Arc<dyn CredentialSource>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- users and room creation ------------------------------------------

    pub async fn search_users(&self, q: &str, limit: u32) -> Result<Vec<UserSummary>, ApiError> {
        let req = self
            .get("/chat/users/search")?
            .query(&[("q", q.to_string()), ("limit", limit.to_string())]);
        json(send(req).await?).await
    }

    pub async fn create_dm(&self, target_user_id: i64) -> Result<CreatedRoom, ApiError> {
        let req = self.post("/chat/rooms/dm")?.json(&DmRequest { target_user_id });
        json(send(req).await?).await
    }

    pub async fn create_group(&self, member_user_ids: &[i64]) -> Result<CreatedRoom, ApiError> {
        let req = self.post("/chat/rooms/group")?.json(&GroupRequest { member_user_ids });
        json(send(req).await?).await
    }

    pub async fn invite(&self, room_id: &RoomId, user_ids: &[i64]) -> Result<(), ApiError> {
        let req = self
            .post(&format!("/chat/rooms/{room_id}/invite"))?
            .json(&InviteRequest { user_ids });
        send(req).await?;
        Ok(())
    }

    // -- rooms and messages -----------------------------------------------

    pub async fn rooms(&self) -> Result<Vec<RoomSummary>, ApiError> {
        json(send(self.get("/chat/rooms")?).await?).await
    }

    pub async fn messages(&self, room_id: &RoomId, page: MessagePage) -> Result<Vec<ChatMessage>, ApiError> {
        let mut query = Vec::new();
        if let Some(cursor) = page.cursor {
            query.push(("cursor", cursor.to_string()));
        }
        if let Some(limit) = page.limit {
            query.push(("limit", limit.to_string()));
        }
        let req = self.get(&format!("/chat/rooms/{room_id}/messages"))?.query(&query);
        json(send(req).await?).await
    }

    /// REST fallback for sending; the real-time path is
    /// [`SubscriptionManager::send_message`](crate::socket::SubscriptionManager::send_message).
    pub async fn send_message(&self, room_id: &RoomId, content: &str) -> Result<ChatMessage, ApiError> {
        let req = self
            .post(&format!("/chat/rooms/{room_id}/messages"))?
            .json(&ContentRequest { content });
        json(send(req).await?).await
    }

    pub async fn update_read(&self, room_id: &RoomId, last_read_message_id: Option<i64>) -> Result<(), ApiError> {
        let req = self
            .post(&format!("/chat/rooms/{room_id}/read"))?
            .json(&ReadRequest { last_read_message_id });
        send(req).await?;
        Ok(())
    }

    pub async fn room_meta(&self, room_id: &RoomId) -> Result<RoomMeta, ApiError> {
        json(send(self.get(&format!("/chat/rooms/{room_id}/meta"))?).await?).await
    }

    pub async fn delete_room(&self, room_id: &RoomId) -> Result<(), ApiError> {
        let req = self.authorized(self.http.delete(self.url(&format!("/chat/rooms/{room_id}"))))?;
        send(req).await?;
        Ok(())
    }

    /// Post a message with files. `content` may be empty.
    pub async fn upload_attachments(
        &self,
        room_id: &RoomId,
        content: Option<&str>,
        files: Vec<AttachmentUpload>,
    ) -> Result<UploadResponse, ApiError> {
        let mut form = Form::new();
        if let Some(content) = content {
            form = form.text("content", content.to_string());
        }
        for file in files {
            let mut part = Part::bytes(file.bytes).file_name(file.file_name);
            if let Some(mime) = &file.mime {
                part = part.mime_str(mime)?;
            }
            form = form.part("files", part);
        }
        let req = self
            .post(&format!("/chat/rooms/{room_id}/attachments"))?
            .multipart(form);
        json(send(req).await?).await
    }

    /// Fetch an attachment's bytes.
    pub async fn download_attachment(&self, attachment: &chat_common::Attachment) -> Result<Vec<u8>, ApiError> {
        let resp = send(self.get(&attachment.download_path())?).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    // -- plumbing -----------------------------------------------------------

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        self.authorized(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> Result<RequestBuilder, ApiError> {
        self.authorized(self.http.post(self.url(path)))
    }

    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.credentials.token().ok_or(ApiError::Unauthenticated)?;
        Ok(req.bearer_auth(token))
    }
}

async fn send(req: RequestBuilder) -> Result<Response, ApiError> {
    let resp = req.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|b| b.message)
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    tracing::warn!(status = status.as_u16(), %message, "chat api request failed");
    Err(ApiError::Status { status, message })
}

async fn json<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    Ok(resp.json().await?)
}
