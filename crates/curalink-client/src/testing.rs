//! Shared test harness: an in-process REST fake plus a client wired to a
//! loopback connector.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use tokio::sync::mpsc;

use curalink_net::{loopback, Credential, LoopbackPeer};
use curalink_shared::error::UploadError;
use curalink_shared::models::{Attachment, AttachmentKind, CounterpartProfile, Message, Room};
use curalink_shared::protocol::Frame;
use curalink_shared::types::{ConnectionState, MessageId, ParticipantRole, RoomId, UserId};

use crate::api::{ApiError, HistoryPage, RestApi, RoomUnread, UploadedFile};
use crate::client::ChatClient;
use crate::config::ClientConfig;
use crate::events::UiEvent;
use crate::notifications::NoopAlerter;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub(crate) fn credential() -> Credential {
    Credential {
        user_id: UserId::from("u1"),
        role: ParticipantRole::Customer,
        token: "token".into(),
    }
}

pub(crate) fn quick_config() -> ClientConfig {
    ClientConfig {
        ack_timeout: Duration::from_millis(300),
        popup_ttl: Duration::from_millis(60),
        reconnect_initial: Duration::from_millis(10),
        reconnect_max: Duration::from_millis(50),
        ..Default::default()
    }
}

pub(crate) fn test_room(room_id: &str, counterpart: &str) -> Room {
    Room {
        id: RoomId::from(room_id),
        counterpart: CounterpartProfile {
            id: UserId::from(counterpart),
            name: format!("user {counterpart}"),
            avatar_url: None,
            role: ParticipantRole::Expert,
            online: false,
            last_seen: None,
        },
        unread: None,
    }
}

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

pub(crate) fn test_message(
    id: &str,
    room: &str,
    role: ParticipantRole,
    minute: i64,
) -> Message {
    Message {
        id: MessageId::from(id),
        room_id: RoomId::from(room),
        sender_id: UserId::from(match role {
            ParticipantRole::Customer => "u1",
            ParticipantRole::Expert => "u2",
        }),
        sender_role: role,
        content: Some(format!("message {id}")),
        attachment: None,
        timestamp: base_time() + ChronoDuration::minutes(minute),
        read: false,
    }
}

pub(crate) fn message_frame(message: &Message) -> Frame {
    let mut payload = serde_json::json!({
        "id": message.id,
        "roomId": message.room_id,
        "senderId": message.sender_id,
        "senderType": message.sender_role,
        "timestamp": message.timestamp,
        "read": message.read,
    });
    if let Some(content) = &message.content {
        payload["content"] = content.clone().into();
    }
    if let Some(Attachment {
        kind,
        url,
        file_name,
        ..
    }) = &message.attachment
    {
        payload["fileLink"] = url.clone().into();
        payload["fileType"] = serde_json::to_value(kind).unwrap();
        payload["fileName"] = file_name.clone().into();
    }
    Frame::new("newMessage", payload)
}

// ---------------------------------------------------------------------------
// REST fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct MockApi {
    pub rooms: StdMutex<Vec<Room>>,
    pub history: StdMutex<HashMap<RoomId, Vec<Message>>>,
    pub search_hits: StdMutex<Vec<Message>>,
    pub summary: StdMutex<Vec<RoomUnread>>,
    pub fail_uploads: AtomicBool,
}

impl MockApi {
    pub fn add_room(&self, room: Room) {
        self.rooms.lock().unwrap().push(room);
    }
}

#[async_trait]
impl RestApi for MockApi {
    async fn get_or_create_room(
        &self,
        _me: &UserId,
        counterpart: &UserId,
    ) -> Result<Room, ApiError> {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.iter().find(|r| &r.counterpart.id == counterpart) {
            return Ok(room.clone());
        }
        let room = test_room(&format!("room-{}", counterpart.as_str()), counterpart.as_str());
        rooms.push(room.clone());
        Ok(room)
    }

    async fn room_by_id(&self, room_id: &RoomId) -> Result<Option<Room>, ApiError> {
        Ok(self
            .rooms
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.id == room_id)
            .cloned())
    }

    async fn unread_summary(&self, _me: &UserId) -> Result<Vec<RoomUnread>, ApiError> {
        Ok(self.summary.lock().unwrap().clone())
    }

    async fn fetch_history(
        &self,
        room_id: &RoomId,
        page: u32,
        _page_size: u32,
        search_term: Option<&str>,
    ) -> Result<HistoryPage, ApiError> {
        let messages = match search_term {
            Some(_) => self.search_hits.lock().unwrap().clone(),
            None => self
                .history
                .lock()
                .unwrap()
                .get(room_id)
                .cloned()
                .unwrap_or_default(),
        };
        Ok(HistoryPage {
            messages,
            page,
            has_more: false,
        })
    }

    async fn upload_file(
        &self,
        file_name: &str,
        kind: AttachmentKind,
        _bytes: Bytes,
    ) -> Result<UploadedFile, UploadError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(UploadError::Failed("mock upload down".into()));
        }
        Ok(UploadedFile {
            file_url: format!("https://files.test/{file_name}"),
            file_type: kind,
            file_name: file_name.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub(crate) struct Harness {
    pub client: ChatClient,
    pub ui: mpsc::Receiver<UiEvent>,
    pub peer: LoopbackPeer,
    pub accept: mpsc::Receiver<LoopbackPeer>,
    pub api: Arc<MockApi>,
}

/// Start a client against a loopback connection and wait until it reports
/// connected.
pub(crate) async fn start_harness() -> Harness {
    let api = Arc::new(MockApi::default());
    let (connector, mut accept) = loopback(64);
    let (client, mut ui) = ChatClient::start(
        connector,
        credential(),
        api.clone(),
        Arc::new(NoopAlerter),
        quick_config(),
    );
    let peer = accept.recv().await.expect("loopback peer");
    wait_for_ui(&mut ui, |e| {
        matches!(e, UiEvent::ConnectionChanged(ConnectionState::Connected))
    })
    .await;
    Harness {
        client,
        ui,
        peer,
        accept,
        api,
    }
}

/// Drain UI events until one matches, with a bounded wait.
pub(crate) async fn wait_for_ui(
    ui: &mut mpsc::Receiver<UiEvent>,
    pred: impl Fn(&UiEvent) -> bool,
) -> UiEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = ui.recv().await.expect("UI channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for UI event")
}

/// Read frames off the far end until one carries the given event name.
pub(crate) async fn next_frame_named(peer: &mut LoopbackPeer, name: &str) -> Frame {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let frame = peer.inbound.recv().await.expect("peer channel closed");
            if frame.event == name {
                return frame;
            }
        }
    })
    .await
    .expect("timed out waiting for frame")
}

/// Answer the next `sendMessage` command with an acknowledgement carrying the
/// server's copy of the message.  Optionally pushes the same message as a
/// `newMessage` event *before* the acknowledgement, to exercise the
/// push-beats-ack race.
pub(crate) async fn answer_send(
    mut peer: LoopbackPeer,
    server_id: &str,
    push_first: bool,
) -> LoopbackPeer {
    let frame = next_frame_named(&mut peer, "sendMessage").await;
    let ack_id = frame.ack.expect("sendMessage must carry an ack id");

    let mut payload = frame.payload.clone();
    payload["id"] = server_id.into();
    payload["timestamp"] = serde_json::to_value(base_time()).unwrap();
    payload["read"] = false.into();

    if push_first {
        peer.outbound
            .send(Frame::new("newMessage", payload.clone()))
            .await
            .unwrap();
    }

    peer.outbound
        .send(Frame {
            event: "ack".into(),
            payload,
            ack: Some(ack_id),
        })
        .await
        .unwrap();
    peer
}
