//! Typing indicator tracking.
//!
//! Purely transient: typing state is considered stale as soon as the duplex
//! channel drops and is cleared wholesale on disconnect.

use std::collections::{HashMap, HashSet};

use curalink_shared::types::{RoomId, UserId};

#[derive(Debug, Clone, Default)]
pub struct TypingTracker {
    typists: HashMap<RoomId, HashSet<UserId>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self {
            typists: HashMap::new(),
        }
    }

    /// Returns true if the room's typing set changed.
    pub fn set_typing(&mut self, room_id: &RoomId, user_id: &UserId, is_typing: bool) -> bool {
        if is_typing {
            self.typists
                .entry(room_id.clone())
                .or_default()
                .insert(user_id.clone())
        } else {
            match self.typists.get_mut(room_id) {
                Some(set) => {
                    let changed = set.remove(user_id);
                    if set.is_empty() {
                        self.typists.remove(room_id);
                    }
                    changed
                }
                None => false,
            }
        }
    }

    pub fn is_anyone_typing(&self, room_id: &RoomId) -> bool {
        self.typists.contains_key(room_id)
    }

    pub fn typists(&self, room_id: &RoomId) -> Vec<UserId> {
        self.typists
            .get(room_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn drop_room(&mut self, room_id: &RoomId) {
        self.typists.remove(room_id);
    }

    /// All typing state is stale once the connection drops.
    pub fn clear(&mut self) {
        self.typists.clear();
    }
}
