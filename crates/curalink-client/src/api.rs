//! REST-style collaborators consumed by the engine.
//!
//! Only the shapes matter here: room lookup/creation, paginated history with
//! an optional search term, and binary upload.  The HTTP implementation lives
//! with the embedding application.

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use curalink_shared::error::{CuralinkError, UploadError};
use curalink_shared::models::{AttachmentKind, Message, Room};
use curalink_shared::types::{RoomId, UserId};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network failure: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl From<ApiError> for CuralinkError {
    fn from(err: ApiError) -> Self {
        CuralinkError::Api(err.to_string())
    }
}

/// One page of room history, oldest first within the page.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub messages: Vec<Message>,
    pub page: u32,
    pub has_more: bool,
}

/// Result of uploading an attachment: URL plus normalized metadata.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_url: String,
    pub file_type: AttachmentKind,
    pub file_name: String,
}

/// One row of the REST unread summary.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomUnread {
    pub room: Room,
    pub unread_count: u32,
}

#[async_trait]
pub trait RestApi: Send + Sync {
    /// Get-or-create the 1:1 room with a counterpart.
    async fn get_or_create_room(&self, me: &UserId, counterpart: &UserId)
        -> Result<Room, ApiError>;

    /// Best-effort lookup of a room the directory does not know yet.
    async fn room_by_id(&self, room_id: &RoomId) -> Result<Option<Room>, ApiError>;

    /// Per-room unread summary, used to seed the counters until the push
    /// snapshot lands.
    async fn unread_summary(&self, me: &UserId) -> Result<Vec<RoomUnread>, ApiError>;

    /// Paginated, optionally filtered message history.
    async fn fetch_history(
        &self,
        room_id: &RoomId,
        page: u32,
        page_size: u32,
        search_term: Option<&str>,
    ) -> Result<HistoryPage, ApiError>;

    /// Upload raw bytes, receiving a URL plus metadata for the send payload.
    async fn upload_file(
        &self,
        file_name: &str,
        kind: AttachmentKind,
        bytes: Bytes,
    ) -> Result<UploadedFile, UploadError>;
}
