//! Room directory: the set of conversations the user has ever participated
//! in, at most one per counterpart.
//!
//! Holds counterpart display metadata and the unread annotation written by
//! the unread aggregator.  Removal cascades (message log, counters, typing
//! state, selection) are orchestrated by the client layer.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use curalink_shared::models::Room;
use curalink_shared::types::{RoomId, UserId};

#[derive(Debug, Clone, Default)]
pub struct RoomDirectory {
    rooms: HashMap<UserId, Room>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Insert or merge-update a room, keyed by counterpart id.
    ///
    /// A merge takes every incoming field except the unread annotation, which
    /// is preserved unless the incoming record explicitly carries one.
    pub fn upsert_room(&mut self, room: Room) -> &Room {
        let key = room.counterpart.id.clone();
        match self.rooms.entry(key) {
            std::collections::hash_map::Entry::Occupied(mut slot) => {
                let existing_unread = slot.get().unread;
                let merged = Room {
                    unread: room.unread.or(existing_unread),
                    ..room
                };
                slot.insert(merged);
                slot.into_mut()
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                debug!(room = %room.id, counterpart = %room.counterpart.id, "New room in directory");
                slot.insert(room)
            }
        }
    }

    /// Delete the room for a counterpart.  Returns the removed room so the
    /// caller can cascade to the other stores.
    pub fn remove_room(&mut self, counterpart: &UserId) -> Option<Room> {
        let removed = self.rooms.remove(counterpart);
        if removed.is_some() {
            debug!(counterpart = %counterpart, "Removed room from directory");
        }
        removed
    }

    pub fn find_by_counterpart(&self, id: &UserId) -> Option<&Room> {
        self.rooms.get(id)
    }

    /// Reverse lookup from a room id, used by the signal resolution chain.
    pub fn find_by_room_id(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.values().find(|room| &room.id == id)
    }

    pub fn counterpart_of(&self, room_id: &RoomId) -> Option<UserId> {
        self.find_by_room_id(room_id)
            .map(|room| room.counterpart.id.clone())
    }

    /// In-place presence update; does not touch unread or message data.
    pub fn set_counterpart_presence(
        &mut self,
        id: &UserId,
        is_online: bool,
        last_seen: Option<DateTime<Utc>>,
    ) -> bool {
        match self.rooms.get_mut(id) {
            Some(room) => {
                room.counterpart.online = is_online;
                if last_seen.is_some() {
                    room.counterpart.last_seen = last_seen;
                }
                true
            }
            None => false,
        }
    }

    /// Write the unread annotation the aggregator derived for a room.
    pub fn set_unread(&mut self, counterpart: &UserId, count: u32) -> bool {
        match self.rooms.get_mut(counterpart) {
            Some(room) => {
                room.unread = Some(count);
                true
            }
            None => false,
        }
    }

    /// Presence data is stale once the duplex channel drops.
    pub fn invalidate_presence(&mut self) {
        for room in self.rooms.values_mut() {
            room.counterpart.online = false;
        }
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn clear(&mut self) {
        self.rooms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curalink_shared::models::CounterpartProfile;
    use curalink_shared::types::ParticipantRole;

    fn room(room_id: &str, counterpart: &str, unread: Option<u32>) -> Room {
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
            unread,
        }
    }

    #[test]
    fn test_one_room_per_counterpart() {
        let mut dir = RoomDirectory::new();
        dir.upsert_room(room("room-1", "u2", None));
        dir.upsert_room(room("room-1", "u2", None));
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_merge_preserves_unread_annotation() {
        let mut dir = RoomDirectory::new();
        dir.upsert_room(room("room-1", "u2", Some(4)));

        // Incoming record without a count keeps the annotation.
        dir.upsert_room(room("room-1", "u2", None));
        assert_eq!(dir.find_by_counterpart(&UserId::from("u2")).unwrap().unread, Some(4));

        // An explicit count replaces it.
        dir.upsert_room(room("room-1", "u2", Some(0)));
        assert_eq!(dir.find_by_counterpart(&UserId::from("u2")).unwrap().unread, Some(0));
    }

    #[test]
    fn test_presence_update_leaves_unread_alone() {
        let mut dir = RoomDirectory::new();
        dir.upsert_room(room("room-1", "u2", Some(2)));

        let seen = Utc::now();
        assert!(dir.set_counterpart_presence(&UserId::from("u2"), true, Some(seen)));

        let room = dir.find_by_counterpart(&UserId::from("u2")).unwrap();
        assert!(room.counterpart.online);
        assert_eq!(room.counterpart.last_seen, Some(seen));
        assert_eq!(room.unread, Some(2));

        assert!(!dir.set_counterpart_presence(&UserId::from("nobody"), true, None));
    }

    #[test]
    fn test_reverse_lookup_by_room_id() {
        let mut dir = RoomDirectory::new();
        dir.upsert_room(room("room-1", "u2", None));
        dir.upsert_room(room("room-2", "u3", None));

        assert_eq!(
            dir.counterpart_of(&RoomId::from("room-2")),
            Some(UserId::from("u3"))
        );
        assert_eq!(dir.counterpart_of(&RoomId::from("room-9")), None);
    }

    #[test]
    fn test_remove_room() {
        let mut dir = RoomDirectory::new();
        dir.upsert_room(room("room-1", "u2", None));
        assert!(dir.remove_room(&UserId::from("u2")).is_some());
        assert!(dir.remove_room(&UserId::from("u2")).is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn test_invalidate_presence() {
        let mut dir = RoomDirectory::new();
        dir.upsert_room(room("room-1", "u2", None));
        dir.set_counterpart_presence(&UserId::from("u2"), true, None);

        dir.invalidate_presence();
        assert!(!dir.find_by_counterpart(&UserId::from("u2")).unwrap().counterpart.online);
    }
}
