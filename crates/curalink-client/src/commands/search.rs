//! In-conversation search commands.

use tracing::warn;

use curalink_shared::error::CuralinkError;
use curalink_shared::types::{MessageId, RoomId};
use curalink_store::{merge_results, SearchState, MIN_QUERY_LEN};

use crate::client::ChatClient;
use crate::events::{emit_ui, UiEvent};

impl ChatClient {
    /// Run a search over a room: a server-side full-text query merged with a
    /// local scan of the loaded window.
    ///
    /// Queries shorter than two characters clear the result set and leave
    /// search mode.  A failed server query degrades to local-only results
    /// rather than erroring out.
    pub async fn search_room(&self, room_id: &RoomId, query: &str) -> Result<(), CuralinkError> {
        if query.chars().count() < MIN_QUERY_LEN {
            self.lock().search = SearchState::Inactive;
            emit_ui(&self.ui_tx, UiEvent::SearchChanged);
            return Ok(());
        }

        let server_hits = match self
            .api
            .fetch_history(room_id, 1, self.config.history_page_size, Some(query))
            .await
        {
            Ok(page) => page.messages,
            Err(e) => {
                warn!(room = %room_id, error = %e, "Server search failed, local results only");
                Vec::new()
            }
        };

        {
            let mut guard = self.lock();
            let window = guard.conversations.window(room_id);
            guard.search = merge_results(query, server_hits, &window);
        }
        emit_ui(&self.ui_tx, UiEvent::SearchChanged);
        Ok(())
    }

    /// Jump to the next match; saturates at the last one.
    pub fn search_next(&self) -> Option<MessageId> {
        let mut guard = self.lock();
        match &mut guard.search {
            SearchState::Active(results) => Some(results.next().message.id.clone()),
            _ => None,
        }
    }

    /// Jump to the previous match; saturates at the first one.
    pub fn search_prev(&self) -> Option<MessageId> {
        let mut guard = self.lock();
        match &mut guard.search {
            SearchState::Active(results) => Some(results.prev().message.id.clone()),
            _ => None,
        }
    }

    pub fn clear_search(&self) {
        self.lock().search = SearchState::Inactive;
        emit_ui(&self.ui_tx, UiEvent::SearchChanged);
    }
}
