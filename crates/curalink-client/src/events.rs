//! Typed events pushed to the presentation layer.

use tokio::sync::mpsc;
use uuid::Uuid;

use curalink_shared::models::Delivery;
use curalink_shared::types::{ConnectionState, PendingId, RoomId, UserId};

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    ConnectionChanged(ConnectionState),
    RoomListChanged,
    MessageAppended { room_id: RoomId },
    DeliveryChanged {
        room_id: RoomId,
        pending: PendingId,
        delivery: Delivery,
    },
    HistoryMerged { room_id: RoomId, inserted: usize },
    MessagesRead { room_id: RoomId },
    UnreadChanged { total: u64 },
    TypingChanged { room_id: RoomId },
    PresenceChanged { user_id: UserId, online: bool },
    SearchChanged,
    PopupShown { id: Uuid },
    PopupExpired { id: Uuid },
}

/// Fire-and-forget emission; a saturated or closed UI channel is logged,
/// never propagated.
pub fn emit_ui(tx: &mpsc::Sender<UiEvent>, event: UiEvent) {
    if let Err(e) = tx.try_send(event) {
        tracing::warn!(error = %e, "Failed to emit UI event");
    }
}
