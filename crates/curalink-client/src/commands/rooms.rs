//! Room lifecycle commands: open (get-or-create), select, delete.

use tracing::info;

use curalink_shared::error::CuralinkError;
use curalink_shared::models::Room;
use curalink_shared::protocol::ClientEvent;
use curalink_shared::types::{RoomId, UserId};
use curalink_store::SearchState;

use crate::client::ChatClient;
use crate::events::{emit_ui, UiEvent};

impl ChatClient {
    /// Open the 1:1 room with a counterpart, creating it server-side on first
    /// contact, then join and select it.
    pub async fn open_room(&self, counterpart: &UserId) -> Result<Room, CuralinkError> {
        let existing = self.lock().directory.find_by_counterpart(counterpart).cloned();

        let room = match existing {
            Some(room) => room,
            None => {
                let me = self.lock().me.clone();
                let room = self.api.get_or_create_room(&me, counterpart).await?;
                let room = self.lock().directory.upsert_room(room).clone();
                emit_ui(&self.ui_tx, UiEvent::RoomListChanged);
                info!(room = %room.id, counterpart = %counterpart, "Room created");
                room
            }
        };

        let me = self.lock().me.clone();
        self.session()
            .emit(ClientEvent::JoinChat {
                room_id: room.id.clone(),
                user_id: me,
            })
            .await?;

        self.select_room(Some(room.id.clone()));
        Ok(room)
    }

    /// Switch the open conversation.  A pure state swap: unread suppression
    /// applies to the newly selected room from this moment on, and the old
    /// room's search session ends.
    pub fn select_room(&self, room_id: Option<RoomId>) {
        let mut guard = self.lock();
        if guard.selected_room != room_id {
            guard.selected_room = room_id;
            guard.search = SearchState::Inactive;
        }
    }

    /// Delete the conversation with a counterpart, cascading to the message
    /// log, the unread counter, typing state, and the selection.
    pub fn delete_room(&self, counterpart: &UserId) -> bool {
        let total = {
            let mut guard = self.lock();
            let Some(room) = guard.directory.remove_room(counterpart) else {
                return false;
            };
            guard.conversations.drop_room(&room.id);
            guard.unread.drop_room(counterpart);
            guard.typing.drop_room(&room.id);
            if guard.selected_room.as_ref() == Some(&room.id) {
                guard.selected_room = None;
                guard.search = SearchState::Inactive;
            }
            guard.unread.total()
        };

        emit_ui(&self.ui_tx, UiEvent::RoomListChanged);
        emit_ui(&self.ui_tx, UiEvent::UnreadChanged { total });
        info!(counterpart = %counterpart, "Room deleted");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use curalink_shared::types::ParticipantRole;

    #[tokio::test]
    async fn test_open_room_creates_joins_and_selects() {
        let mut h = start_harness().await;

        let room = h.client.open_room(&UserId::from("u5")).await.unwrap();
        assert_eq!(room.id, RoomId::from("room-u5"));

        let join = next_frame_named(&mut h.peer, "joinChat").await;
        assert_eq!(join.payload["roomId"], "room-u5");
        assert_eq!(join.payload["userId"], "u1");

        let guard = h.client.lock();
        assert_eq!(guard.selected_room, Some(RoomId::from("room-u5")));
        assert!(guard.directory.find_by_counterpart(&UserId::from("u5")).is_some());
    }

    #[tokio::test]
    async fn test_open_room_reuses_directory_entry() {
        let mut h = start_harness().await;
        h.client.lock().directory.upsert_room(test_room("room-1", "u2"));

        let room = h.client.open_room(&UserId::from("u2")).await.unwrap();
        assert_eq!(room.id, RoomId::from("room-1"));
        // No REST room was created for a known counterpart.
        assert!(h.api.rooms.lock().unwrap().is_empty());
        next_frame_named(&mut h.peer, "joinChat").await;
    }

    #[tokio::test]
    async fn test_delete_room_cascades_everywhere() {
        let h = start_harness().await;
        {
            let mut guard = h.client.lock();
            guard.directory.upsert_room(test_room("room-1", "u2"));
            guard
                .conversations
                .append_live(test_message("m1", "room-1", ParticipantRole::Expert, 1));
            guard.unread.apply_room_snapshot(&UserId::from("u2"), 3);
            guard.typing.set_typing(&RoomId::from("room-1"), &UserId::from("u2"), true);
            guard.selected_room = Some(RoomId::from("room-1"));
        }

        assert!(h.client.delete_room(&UserId::from("u2")));

        let guard = h.client.lock();
        assert!(guard.directory.is_empty());
        assert_eq!(guard.conversations.len(&RoomId::from("room-1")), 0);
        assert_eq!(guard.unread.total(), 0);
        assert!(!guard.typing.is_anyone_typing(&RoomId::from("room-1")));
        assert_eq!(guard.selected_room, None);
    }

    #[tokio::test]
    async fn test_delete_unknown_room_is_a_noop() {
        let h = start_harness().await;
        assert!(!h.client.delete_room(&UserId::from("nobody")));
    }

    #[tokio::test]
    async fn test_select_room_is_a_pure_swap() {
        let h = start_harness().await;
        h.client.select_room(Some(RoomId::from("room-1")));
        assert_eq!(h.client.lock().selected_room, Some(RoomId::from("room-1")));

        h.client.select_room(None);
        assert_eq!(h.client.lock().selected_room, None);
    }
}
