//! Domain model structs shared by every layer of the sync engine.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to a presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MessageId, ParticipantRole, RoomId, UserId};

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// Display metadata for the person on the other side of a room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CounterpartProfile {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub role: ParticipantRole,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// A 1:1 conversation between a customer and an expert.
///
/// `unread` is an annotation owned by the unread aggregator; `None` means the
/// source of this record did not carry a count, and a directory merge must
/// preserve whatever annotation is already held.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: RoomId,
    pub counterpart: CounterpartProfile,
    #[serde(default)]
    pub unread: Option<u32>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Kind of a message attachment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    Document,
}

/// Descriptor of an already-uploaded attachment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub file_name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// One chat entry.
///
/// The read flag means "seen by the other party" for outgoing messages and
/// "seen by me" for incoming ones.  It only ever transitions false to true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_role: ParticipantRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// Delivery state of a locally originated message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Appended optimistically, no server acknowledgement yet.
    Pending,
    /// Acknowledged by the server (or received from it).
    Confirmed,
    /// The acknowledgement failed; the entry stays visible for retry.
    Failed,
}

// ---------------------------------------------------------------------------
// Draft
// ---------------------------------------------------------------------------

/// A not-yet-uploaded attachment attached to a draft.
#[derive(Debug, Clone)]
pub struct AttachmentSource {
    pub kind: AttachmentKind,
    pub file_name: String,
    pub bytes: bytes::Bytes,
}

/// A locally composed message before it is sent.
#[derive(Debug, Clone, Default)]
pub struct Draft {
    pub content: Option<String>,
    pub attachment: Option<AttachmentSource>,
}

impl Draft {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            attachment: None,
        }
    }

    /// A draft is sendable when it has non-blank text or an attachment.
    pub fn is_empty(&self) -> bool {
        let no_text = self
            .content
            .as_deref()
            .map(|c| c.trim().is_empty())
            .unwrap_or(true);
        no_text && self.attachment.is_none()
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCategory {
    Message,
    Booking,
    Meeting,
    System,
}

/// Where a clicked notification should route the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum RouteHint {
    Room(RoomId),
    Bookings,
    Meetings,
}

/// An ephemeral, user-scoped alert.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    pub category: NotificationCategory,
    pub title: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    #[serde(default)]
    pub sender: Option<String>,
    /// Room to open when a MESSAGE notification is clicked.
    #[serde(default)]
    pub target: Option<RoomId>,
}

impl Notification {
    /// Route matching this notification's category.  SYSTEM alerts have no
    /// default route.
    pub fn route(&self) -> Option<RouteHint> {
        match self.category {
            NotificationCategory::Message => self.target.clone().map(RouteHint::Room),
            NotificationCategory::Booking => Some(RouteHint::Bookings),
            NotificationCategory::Meeting => Some(RouteHint::Meetings),
            NotificationCategory::System => None,
        }
    }
}
