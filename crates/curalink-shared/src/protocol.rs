//! Wire protocol for the persistent duplex channel.
//!
//! Every event carried over the channel is a [`Frame`]: a named event plus a
//! JSON payload, optionally tagged with an acknowledgement correlation id.
//! Inbound frames are validated into typed [`ServerEvent`] variants at the
//! transport boundary; nothing untyped crosses into the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::models::{Attachment, Message, NotificationCategory};
use crate::types::{MessageId, ParticipantRole, RoomId, UserId};

/// Event name used for direct acknowledgements of client commands.
pub const EVENT_ACK: &str = "ack";

/// One frame on the duplex channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Correlation id; set on `emit-with-ack` commands and echoed back by the
    /// server on the matching acknowledgement frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
}

impl Frame {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
            ack: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_type: ParticipantRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<crate::models::AttachmentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Commands the client emits over the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    JoinChat { room_id: RoomId, user_id: UserId },
    SendMessage(SendMessagePayload),
    Typing {
        room_id: RoomId,
        user_id: UserId,
        is_typing: bool,
    },
    MarkAsRead {
        room_id: RoomId,
        receiver_id: UserId,
    },
    GetUnreadCount,
    GetAllChatUnreadCounts,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChat { .. } => "joinChat",
            Self::SendMessage(_) => "sendMessage",
            Self::Typing { .. } => "typing",
            Self::MarkAsRead { .. } => "markAsRead",
            Self::GetUnreadCount => "getUnreadCount",
            Self::GetAllChatUnreadCounts => "getAllChatUnreadCounts",
        }
    }

    /// Serialize into a frame ready for the outbound half of the duplex.
    pub fn into_frame(self) -> Result<Frame, ProtocolError> {
        let name = self.name();
        let payload = match self {
            Self::JoinChat { room_id, user_id } => serde_json::json!({
                "roomId": room_id,
                "userId": user_id,
            }),
            Self::SendMessage(payload) => serde_json::to_value(payload)?,
            Self::Typing {
                room_id,
                user_id,
                is_typing,
            } => serde_json::json!({
                "roomId": room_id,
                "userId": user_id,
                "isTyping": is_typing,
            }),
            Self::MarkAsRead {
                room_id,
                receiver_id,
            } => serde_json::json!({
                "roomId": room_id,
                "receiverId": receiver_id,
            }),
            Self::GetUnreadCount | Self::GetAllChatUnreadCounts => serde_json::Value::Null,
        };
        Ok(Frame::new(name, payload))
    }
}

// ---------------------------------------------------------------------------
// Server -> client payloads
// ---------------------------------------------------------------------------

/// A message as the server serializes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    #[serde(alias = "messageId")]
    pub id: MessageId,
    pub room_id: RoomId,
    pub sender_id: UserId,
    pub sender_type: ParticipantRole,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub file_link: Option<String>,
    #[serde(default)]
    pub file_type: Option<crate::models::AttachmentKind>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl MessagePayload {
    pub fn into_message(self) -> Message {
        let attachment = match (self.file_link, self.file_type) {
            (Some(url), Some(kind)) => Some(Attachment {
                kind,
                url,
                file_name: self.file_name.unwrap_or_default(),
                size: self.file_size,
            }),
            _ => None,
        };
        Message {
            id: self.id,
            room_id: self.room_id,
            sender_id: self.sender_id,
            sender_role: self.sender_type,
            content: self.content,
            attachment,
            timestamp: self.timestamp,
            read: self.read,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagesReadPayload {
    pub room_id: RoomId,
    pub read_by: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub is_typing: bool,
}

/// Counter snapshot keyed only by counterpart id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountPayload {
    pub user_id: UserId,
    pub user_type: ParticipantRole,
    pub unread_count: u32,
}

/// Counter snapshot carrying both the room id and the counterpart id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatUnreadCountPayload {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub user_type: ParticipantRole,
    pub unread_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomUnreadEntry {
    pub room_id: RoomId,
    pub unread_count: u32,
    pub other_user: crate::models::CounterpartProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllUnreadCountsPayload {
    pub user_id: UserId,
    pub user_type: ParticipantRole,
    pub chat_unread_counts: Vec<RoomUnreadEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusPayload {
    pub user_id: UserId,
    pub is_online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(default)]
    pub category: Option<NotificationCategory>,
    pub title: String,
    #[serde(alias = "message")]
    pub body: String,
    /// Explicit recipient; alerts carrying a non-matching id are dropped.
    #[serde(default)]
    pub recipient_id: Option<UserId>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Server -> client events
// ---------------------------------------------------------------------------

/// Typed push events delivered by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    NewMessage(MessagePayload),
    UserTyping(TypingPayload),
    MessagesRead(MessagesReadPayload),
    UnreadCountUpdated(UnreadCountPayload),
    ChatUnreadCountUpdated(ChatUnreadCountPayload),
    AllChatUnreadCounts(AllUnreadCountsPayload),
    UserStatusChanged(UserStatusPayload),
    Notification(NotificationPayload),
}

impl ServerEvent {
    /// Validate an inbound frame into a typed event.
    ///
    /// Returns `Ok(None)` for event names the engine does not consume; a
    /// known name with a malformed payload is an error, to be dropped with a
    /// warning at the transport boundary.
    pub fn from_frame(frame: &Frame) -> Result<Option<Self>, ProtocolError> {
        fn parse<T: serde::de::DeserializeOwned>(
            event: &str,
            payload: &serde_json::Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(payload.clone()).map_err(|source| {
                ProtocolError::MalformedPayload {
                    event: event.to_string(),
                    source,
                }
            })
        }

        let event = frame.event.as_str();
        let ev = match event {
            "newMessage" => Self::NewMessage(parse(event, &frame.payload)?),
            "userTyping" => Self::UserTyping(parse(event, &frame.payload)?),
            "messagesRead" => Self::MessagesRead(parse(event, &frame.payload)?),
            "unreadCountResponse" | "unreadCountUpdated" => {
                Self::UnreadCountUpdated(parse(event, &frame.payload)?)
            }
            "chatUnreadCountUpdated" => {
                Self::ChatUnreadCountUpdated(parse(event, &frame.payload)?)
            }
            "allChatUnreadCountsResponse" => {
                Self::AllChatUnreadCounts(parse(event, &frame.payload)?)
            }
            "userStatusChanged" => Self::UserStatusChanged(parse(event, &frame.payload)?),
            "notification" | "messageNotification" | "bookingNotification"
            | "meetingNotification" => {
                let mut payload: NotificationPayload = parse(event, &frame.payload)?;
                // The event name is authoritative when the payload does not
                // carry its own category.
                if payload.category.is_none() {
                    payload.category = Some(match event {
                        "messageNotification" => NotificationCategory::Message,
                        "bookingNotification" => NotificationCategory::Booking,
                        "meetingNotification" => NotificationCategory::Meeting,
                        _ => NotificationCategory::System,
                    });
                }
                Self::Notification(payload)
            }
            _ => return Ok(None),
        };
        Ok(Some(ev))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_json() -> serde_json::Value {
        serde_json::json!({
            "id": "m1",
            "roomId": "room-1",
            "senderId": "u2",
            "senderType": "EXPERT",
            "content": "hello",
            "timestamp": "2026-03-02T10:15:00Z",
            "read": false,
        })
    }

    #[test]
    fn test_new_message_frame_parses() {
        let frame = Frame::new("newMessage", message_json());
        let ev = ServerEvent::from_frame(&frame).unwrap().unwrap();
        match ev {
            ServerEvent::NewMessage(payload) => {
                let msg = payload.into_message();
                assert_eq!(msg.id, MessageId::from("m1"));
                assert_eq!(msg.room_id, RoomId::from("room-1"));
                assert_eq!(msg.sender_role, ParticipantRole::Expert);
                assert_eq!(msg.content.as_deref(), Some("hello"));
                assert!(msg.attachment.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_attachment_message_maps_file_fields() {
        let mut json = message_json();
        json["content"] = serde_json::Value::Null;
        json["fileLink"] = "https://files.curalink.example/a.pdf".into();
        json["fileType"] = "document".into();
        json["fileName"] = "results.pdf".into();

        let frame = Frame::new("newMessage", json);
        let ev = ServerEvent::from_frame(&frame).unwrap().unwrap();
        let ServerEvent::NewMessage(payload) = ev else {
            panic!("wrong variant");
        };
        let msg = payload.into_message();
        let attachment = msg.attachment.expect("attachment");
        assert_eq!(attachment.kind, crate::models::AttachmentKind::Document);
        assert_eq!(attachment.file_name, "results.pdf");
    }

    #[test]
    fn test_unknown_event_is_skipped() {
        let frame = Frame::new("callOffer", serde_json::json!({"sdp": "..."}));
        assert!(ServerEvent::from_frame(&frame).unwrap().is_none());
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let frame = Frame::new("newMessage", serde_json::json!({"id": 42}));
        let err = ServerEvent::from_frame(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedPayload { ref event, .. } if event == "newMessage"));
    }

    #[test]
    fn test_notification_category_defaults_from_event_name() {
        let payload = serde_json::json!({"title": "Booking confirmed", "message": "Tomorrow 9:00"});
        let frame = Frame::new("bookingNotification", payload);
        let ev = ServerEvent::from_frame(&frame).unwrap().unwrap();
        let ServerEvent::Notification(n) = ev else {
            panic!("wrong variant");
        };
        assert_eq!(n.category, Some(NotificationCategory::Booking));
        assert_eq!(n.body, "Tomorrow 9:00");
    }

    #[test]
    fn test_client_event_frame_roundtrip() {
        let frame = ClientEvent::MarkAsRead {
            room_id: RoomId::from("room-9"),
            receiver_id: UserId::from("u1"),
        }
        .into_frame()
        .unwrap();
        assert_eq!(frame.event, "markAsRead");
        assert_eq!(frame.payload["roomId"], "room-9");
        assert_eq!(frame.payload["receiverId"], "u1");
        assert_eq!(frame.ack, None);
    }

    #[test]
    fn test_all_unread_counts_payload() {
        let json = serde_json::json!({
            "userId": "u1",
            "userType": "CUSTOMER",
            "chatUnreadCounts": [
                {
                    "roomId": "room-1",
                    "unreadCount": 3,
                    "otherUser": {
                        "id": "u2",
                        "name": "Dr. Osei",
                        "role": "EXPERT",
                        "online": true,
                    },
                },
            ],
        });
        let frame = Frame::new("allChatUnreadCountsResponse", json);
        let ev = ServerEvent::from_frame(&frame).unwrap().unwrap();
        let ServerEvent::AllChatUnreadCounts(payload) = ev else {
            panic!("wrong variant");
        };
        assert_eq!(payload.chat_unread_counts.len(), 1);
        assert_eq!(payload.chat_unread_counts[0].unread_count, 3);
        assert_eq!(payload.chat_unread_counts[0].other_user.name, "Dr. Osei");
    }
}
