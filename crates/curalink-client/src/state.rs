//! Session-scoped application state shared by the bridge and the command
//! layer.
//!
//! [`ChatState`] is wrapped in `Arc<Mutex<>>`; guards are held only for
//! synchronous store mutations, never across await points.

use std::sync::{Arc, Mutex, MutexGuard};

use curalink_shared::models::Room;
use curalink_shared::types::{ConnectionState, ParticipantRole, RoomId, UserId};
use curalink_store::{
    ConversationStore, RoomDirectory, SearchState, TypingTracker, UnreadCounters,
};

use crate::config::ClientConfig;
use crate::notifications::NotificationCenter;

/// Central state for one authenticated user.
pub struct ChatState {
    /// The signed-in user.
    pub me: UserId,
    pub role: ParticipantRole,

    pub directory: RoomDirectory,
    pub conversations: ConversationStore,
    pub unread: UnreadCounters,
    pub typing: TypingTracker,
    pub notifications: NotificationCenter,

    /// Search mode of the currently open conversation.
    pub search: SearchState,

    /// The room whose conversation view is open.  Unread deltas for this
    /// room are suppressed while it is selected.
    pub selected_room: Option<RoomId>,

    pub connection: ConnectionState,
}

impl ChatState {
    pub fn new(me: UserId, role: ParticipantRole, config: &ClientConfig) -> Self {
        Self {
            me,
            role,
            directory: RoomDirectory::new(),
            conversations: ConversationStore::new(),
            unread: UnreadCounters::new(),
            typing: TypingTracker::new(),
            notifications: NotificationCenter::new(
                config.notification_cap,
                config.popup_cap,
                config.popup_ttl,
            ),
            search: SearchState::Inactive,
            selected_room: None,
            connection: ConnectionState::Disconnected,
        }
    }

    /// Full reset on logout or account switch.
    pub fn reset(&mut self) {
        self.directory.clear();
        self.conversations.clear();
        self.unread.clear();
        self.typing.clear();
        self.notifications.clear();
        self.search = SearchState::Inactive;
        self.selected_room = None;
        self.connection = ConnectionState::Disconnected;
    }
}

/// Lock the shared state, recovering from a poisoned mutex rather than
/// propagating the panic.
pub(crate) fn lock_state(state: &Arc<Mutex<ChatState>>) -> MutexGuard<'_, ChatState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Apply a wholesale unread snapshot: upsert every named room, replace the
/// counters, and refresh the per-room annotations.  Rooms absent from the
/// snapshot are implicitly zeroed.  Returns the new grand total.
pub(crate) fn apply_unread_snapshot(state: &mut ChatState, entries: Vec<(Room, u32)>) -> u64 {
    let mut counts = Vec::with_capacity(entries.len());
    for (mut room, count) in entries {
        room.unread = Some(count);
        let counterpart = room.counterpart.id.clone();
        state.directory.upsert_room(room);
        counts.push((counterpart, count));
    }
    state.unread.apply_full_snapshot(counts);

    let counterparts: Vec<UserId> = state
        .directory
        .rooms()
        .map(|r| r.counterpart.id.clone())
        .collect();
    for counterpart in counterparts {
        let count = state.unread.count(&counterpart);
        state.directory.set_unread(&counterpart, count);
    }
    state.unread.total()
}
