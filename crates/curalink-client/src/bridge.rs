//! The session bridge: consumes validated push events from the transport
//! session and applies them to the stores.
//!
//! Logical races between history fetches, pushes, and optimistic actions are
//! resolved by the store merge rules; the bridge's own responsibilities are
//! room resolution (with its explicit fallback chain), selected-room unread
//! suppression, reconnect recovery, and notification dispatch.  State guards
//! are never held across await points.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use curalink_net::{Session, SessionEvent};
use curalink_shared::error::MergeError;
use curalink_shared::models::{Notification, NotificationCategory, Room};
use curalink_shared::protocol::{
    AllUnreadCountsPayload, ChatUnreadCountPayload, ClientEvent, MessagePayload,
    MessagesReadPayload, NotificationPayload, ServerEvent, TypingPayload, UnreadCountPayload,
    UserStatusPayload,
};
use curalink_shared::types::{ConnectionState, RoomId, UserId};

use crate::api::RestApi;
use crate::events::{emit_ui, UiEvent};
use crate::notifications::PlatformAlerter;
use crate::state::{apply_unread_snapshot, lock_state, ChatState};

#[derive(Clone)]
pub(crate) struct BridgeContext {
    pub state: Arc<Mutex<ChatState>>,
    pub session: Session,
    pub api: Arc<dyn RestApi>,
    pub alerter: Arc<dyn PlatformAlerter>,
    pub ui_tx: mpsc::Sender<UiEvent>,
    pub popup_ttl: Duration,
}

/// Spawn the bridge loop over the session's primary event receiver.
pub(crate) fn spawn_bridge(
    ctx: BridgeContext,
    mut events_rx: mpsc::Receiver<SessionEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Session bridge started");
        while let Some(event) = events_rx.recv().await {
            match event {
                SessionEvent::Connected { resumed } => on_connected(&ctx, resumed).await,
                SessionEvent::Disconnected { reason, retrying } => {
                    on_disconnected(&ctx, &reason, retrying)
                }
                SessionEvent::Event(event) => handle_server_event(&ctx, event).await,
            }
        }
        warn!("Session bridge ended");
    })
}

/// The session does not resume room membership; re-join every known room and
/// re-request the unread snapshot here.
async fn on_connected(ctx: &BridgeContext, resumed: bool) {
    let (me, room_ids) = {
        let mut guard = lock_state(&ctx.state);
        guard.connection = ConnectionState::Connected;
        let rooms: Vec<RoomId> = guard.directory.rooms().map(|r| r.id.clone()).collect();
        (guard.me.clone(), rooms)
    };
    emit_ui(&ctx.ui_tx, UiEvent::ConnectionChanged(ConnectionState::Connected));

    info!(resumed, rooms = room_ids.len(), "Connected, re-joining rooms");
    for room_id in room_ids {
        if let Err(e) = ctx
            .session
            .emit(ClientEvent::JoinChat {
                room_id: room_id.clone(),
                user_id: me.clone(),
            })
            .await
        {
            warn!(room = %room_id, error = %e, "Failed to re-join room");
        }
    }
    if let Err(e) = ctx.session.emit(ClientEvent::GetAllChatUnreadCounts).await {
        warn!(error = %e, "Failed to request unread snapshot");
    }
}

fn on_disconnected(ctx: &BridgeContext, reason: &str, retrying: bool) {
    let state = if retrying {
        ConnectionState::Reconnecting
    } else {
        ConnectionState::Disconnected
    };
    {
        let mut guard = lock_state(&ctx.state);
        guard.connection = state.clone();
        // Typing and presence are stale the moment the channel drops;
        // message and unread state is retained.
        guard.typing.clear();
        guard.directory.invalidate_presence();
    }
    info!(reason = %reason, retrying, "Disconnected");
    emit_ui(&ctx.ui_tx, UiEvent::ConnectionChanged(state));
}

async fn handle_server_event(ctx: &BridgeContext, event: ServerEvent) {
    match event {
        ServerEvent::NewMessage(payload) => on_new_message(ctx, payload).await,
        ServerEvent::UserTyping(payload) => on_user_typing(ctx, payload),
        ServerEvent::MessagesRead(payload) => on_messages_read(ctx, payload),
        ServerEvent::UnreadCountUpdated(payload) => on_unread_count(ctx, payload).await,
        ServerEvent::ChatUnreadCountUpdated(payload) => on_chat_unread_count(ctx, payload).await,
        ServerEvent::AllChatUnreadCounts(payload) => on_all_unread_counts(ctx, payload),
        ServerEvent::UserStatusChanged(payload) => on_user_status(ctx, payload),
        ServerEvent::Notification(payload) => on_notification(ctx, payload),
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

async fn on_new_message(ctx: &BridgeContext, payload: MessagePayload) {
    let message = payload.into_message();
    let room_id = message.room_id.clone();

    // A push naming a room the directory does not know falls back to a
    // room-by-id query; an unresolvable room drops the event.
    let known = lock_state(&ctx.state)
        .directory
        .find_by_room_id(&room_id)
        .is_some();
    if !known && fetch_room(ctx, &room_id).await.is_none() {
        warn!(room = %room_id, msg = %message.id, "Dropping message for unresolvable room");
        return;
    }

    let (inserted, unread_total) = {
        let mut guard = lock_state(&ctx.state);
        let sender = message.sender_id.clone();
        let inserted = guard.conversations.append_live(message);
        let mut unread_total = None;
        if inserted {
            // A message from someone ends their typing indicator.
            guard.typing.set_typing(&room_id, &sender, false);

            let selected = guard.selected_room.as_ref() == Some(&room_id);
            let own = sender == guard.me;
            if !selected && !own {
                if let Some(counterpart) = guard.directory.counterpart_of(&room_id) {
                    guard.unread.apply_delta(&counterpart);
                    let count = guard.unread.count(&counterpart);
                    guard.directory.set_unread(&counterpart, count);
                    unread_total = Some(guard.unread.total());
                }
            }
        }
        (inserted, unread_total)
    };

    if inserted {
        emit_ui(
            &ctx.ui_tx,
            UiEvent::MessageAppended {
                room_id: room_id.clone(),
            },
        );
        if let Some(total) = unread_total {
            emit_ui(&ctx.ui_tx, UiEvent::UnreadChanged { total });
        }
    }
}

fn on_user_typing(ctx: &BridgeContext, payload: TypingPayload) {
    let changed = {
        let mut guard = lock_state(&ctx.state);
        if payload.user_id == guard.me {
            return;
        }
        guard
            .typing
            .set_typing(&payload.room_id, &payload.user_id, payload.is_typing)
    };
    if changed {
        emit_ui(
            &ctx.ui_tx,
            UiEvent::TypingChanged {
                room_id: payload.room_id,
            },
        );
    }
}

/// The counterpart read the local user's outgoing messages: flip their read
/// flags and clear the room's unread counter (the cleared signal is
/// authoritative over any stale deltas).
fn on_messages_read(ctx: &BridgeContext, payload: MessagesReadPayload) {
    let total = {
        let mut guard = lock_state(&ctx.state);
        let role = guard.role;
        guard.conversations.mark_read_from(&payload.room_id, role);
        match guard.directory.counterpart_of(&payload.room_id) {
            Some(counterpart) => {
                guard.unread.apply_cleared(&counterpart);
                guard.directory.set_unread(&counterpart, 0);
                Some(guard.unread.total())
            }
            None => {
                debug!(room = %payload.room_id, "messagesRead for room without directory entry");
                None
            }
        }
    };

    emit_ui(
        &ctx.ui_tx,
        UiEvent::MessagesRead {
            room_id: payload.room_id,
        },
    );
    if let Some(total) = total {
        emit_ui(&ctx.ui_tx, UiEvent::UnreadChanged { total });
    }
}

// ---------------------------------------------------------------------------
// Unread counters
// ---------------------------------------------------------------------------

async fn on_unread_count(ctx: &BridgeContext, payload: UnreadCountPayload) {
    let Some(counterpart) = resolve_counterpart(ctx, None, Some(&payload.user_id)).await else {
        return;
    };
    apply_room_snapshot(ctx, &counterpart, payload.unread_count);
}

async fn on_chat_unread_count(ctx: &BridgeContext, payload: ChatUnreadCountPayload) {
    let Some(counterpart) =
        resolve_counterpart(ctx, Some(&payload.room_id), Some(&payload.user_id)).await
    else {
        return;
    };
    apply_room_snapshot(ctx, &counterpart, payload.unread_count);
}

fn apply_room_snapshot(ctx: &BridgeContext, counterpart: &UserId, count: u32) {
    let total = {
        let mut guard = lock_state(&ctx.state);
        guard.unread.apply_room_snapshot(counterpart, count);
        guard.directory.set_unread(counterpart, count);
        guard.unread.total()
    };
    emit_ui(&ctx.ui_tx, UiEvent::UnreadChanged { total });
}

/// Wholesale snapshot.  Entries carry the counterpart profile, so rooms the
/// directory has never seen are inferred here as well.
fn on_all_unread_counts(ctx: &BridgeContext, payload: AllUnreadCountsPayload) {
    let entries: Vec<(Room, u32)> = payload
        .chat_unread_counts
        .into_iter()
        .map(|entry| {
            (
                Room {
                    id: entry.room_id,
                    counterpart: entry.other_user,
                    unread: None,
                },
                entry.unread_count,
            )
        })
        .collect();

    let total = apply_unread_snapshot(&mut lock_state(&ctx.state), entries);

    emit_ui(&ctx.ui_tx, UiEvent::RoomListChanged);
    emit_ui(&ctx.ui_tx, UiEvent::UnreadChanged { total });
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

fn on_user_status(ctx: &BridgeContext, payload: UserStatusPayload) {
    let updated = {
        let mut guard = lock_state(&ctx.state);
        let last_seen = payload
            .last_seen
            .or_else(|| (!payload.is_online).then(Utc::now));
        guard
            .directory
            .set_counterpart_presence(&payload.user_id, payload.is_online, last_seen)
    };
    if updated {
        emit_ui(
            &ctx.ui_tx,
            UiEvent::PresenceChanged {
                user_id: payload.user_id,
                online: payload.is_online,
            },
        );
    } else {
        debug!(user = %payload.user_id, "Status change for unknown counterpart");
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

fn on_notification(ctx: &BridgeContext, payload: NotificationPayload) {
    let me = lock_state(&ctx.state).me.clone();
    if let Some(recipient) = &payload.recipient_id {
        if recipient != &me {
            debug!(recipient = %recipient, "Notification for another user, dropped");
            return;
        }
    }

    let notification = Notification {
        id: Uuid::new_v4(),
        category: payload.category.unwrap_or(NotificationCategory::System),
        title: payload.title,
        body: payload.body,
        timestamp: payload.timestamp.unwrap_or_else(Utc::now),
        read: false,
        sender: payload.sender_name,
        target: payload.room_id,
    };

    let id = notification.id;
    let (title, body) = (notification.title.clone(), notification.body.clone());
    let shown = lock_state(&ctx.state)
        .notifications
        .insert(notification, Utc::now());

    ctx.alerter.alert(&title, &body);

    if shown {
        emit_ui(&ctx.ui_tx, UiEvent::PopupShown { id });
        schedule_popup_expiry(ctx.state.clone(), ctx.ui_tx.clone(), ctx.popup_ttl);
    }
}

/// Sleep out one popup TTL, then expire due popups and re-arm a timer for
/// every promotion.
pub(crate) fn schedule_popup_expiry(
    state: Arc<Mutex<ChatState>>,
    ui_tx: mpsc::Sender<UiEvent>,
    ttl: Duration,
) {
    tokio::spawn(async move {
        tokio::time::sleep(ttl).await;
        let changes = lock_state(&state).notifications.expire_due(Utc::now());
        for id in changes.expired {
            emit_ui(&ui_tx, UiEvent::PopupExpired { id });
        }
        for id in changes.promoted {
            emit_ui(&ui_tx, UiEvent::PopupShown { id });
            schedule_popup_expiry(state.clone(), ui_tx.clone(), ttl);
        }
    });
}

// ---------------------------------------------------------------------------
// Room resolution
// ---------------------------------------------------------------------------

/// Ordered resolution of an unread signal's room identifier: direct
/// counterpart match, reverse room-id lookup, REST fallback, give up.
async fn resolve_counterpart(
    ctx: &BridgeContext,
    room_id: Option<&RoomId>,
    user_id: Option<&UserId>,
) -> Option<UserId> {
    {
        let guard = lock_state(&ctx.state);
        if let Some(user_id) = user_id {
            if guard.directory.find_by_counterpart(user_id).is_some() {
                return Some(user_id.clone());
            }
        }
        if let Some(room_id) = room_id {
            if let Some(counterpart) = guard.directory.counterpart_of(room_id) {
                return Some(counterpart);
            }
        }
    }

    if let Some(room_id) = room_id {
        if let Some(room) = fetch_room(ctx, room_id).await {
            return Some(room.counterpart.id);
        }
    }

    // The terminal case of the fallback chain: give up, never throw.
    let error = match (room_id, user_id) {
        (Some(room_id), _) => MergeError::UnresolvableRoom(room_id.as_str().to_string()),
        (None, Some(user_id)) => MergeError::UnknownCounterpart(user_id.clone()),
        (None, None) => MergeError::UnresolvableRoom(String::new()),
    };
    warn!(error = %error, "Dropping inbound signal");
    None
}

/// REST fallback for a room the directory does not know; inserts it on
/// success.
async fn fetch_room(ctx: &BridgeContext, room_id: &RoomId) -> Option<Room> {
    match ctx.api.room_by_id(room_id).await {
        Ok(Some(room)) => {
            let room = lock_state(&ctx.state).directory.upsert_room(room).clone();
            emit_ui(&ctx.ui_tx, UiEvent::RoomListChanged);
            Some(room)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(room = %room_id, error = %e, "Room lookup failed");
            None
        }
    }
}
