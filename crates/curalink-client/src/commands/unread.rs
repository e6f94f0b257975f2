//! Unread snapshot commands.
//!
//! The push responses are applied by the bridge; the REST summary seeds the
//! counters so badges are right before the first push snapshot lands.

use curalink_shared::error::CuralinkError;
use curalink_shared::protocol::ClientEvent;

use crate::client::ChatClient;
use crate::events::{emit_ui, UiEvent};
use crate::state::apply_unread_snapshot;

impl ChatClient {
    /// Refresh the counters: request fresh push snapshots and apply the REST
    /// summary in the meantime.  Whichever lands last wins wholesale.
    pub async fn refresh_unread(&self) -> Result<(), CuralinkError> {
        self.session().emit(ClientEvent::GetAllChatUnreadCounts).await?;
        self.session().emit(ClientEvent::GetUnreadCount).await?;

        let me = self.lock().me.clone();
        let summary = self.api.unread_summary(&me).await?;
        let entries = summary
            .into_iter()
            .map(|row| (row.room, row.unread_count))
            .collect();
        let total = apply_unread_snapshot(&mut self.lock(), entries);

        emit_ui(&self.ui_tx, UiEvent::RoomListChanged);
        emit_ui(&self.ui_tx, UiEvent::UnreadChanged { total });
        Ok(())
    }

    /// Current grand total, always recomputed from the per-room counters.
    pub fn total_unread(&self) -> u64 {
        self.lock().unread.total()
    }
}
