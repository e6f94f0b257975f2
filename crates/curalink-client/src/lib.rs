//! # curalink-client
//!
//! Orchestration layer of the Curalink conversation sync engine: wires the
//! transport session to the state containers, exposes the command surface
//! (send, read, search, rooms, unread), dispatches notifications, and fans
//! typed events out to the presentation layer.

pub mod api;
pub mod bridge;
pub mod client;
pub mod commands;
pub mod config;
pub mod events;
pub mod notifications;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiError, HistoryPage, RestApi, RoomUnread, UploadedFile};
pub use client::ChatClient;
pub use config::ClientConfig;
pub use events::UiEvent;
pub use notifications::{NoopAlerter, NotificationCenter, PlatformAlerter, PopupChanges};
pub use state::ChatState;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing for an embedding application that has not set up its
/// own subscriber.  Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("curalink_client=debug,curalink_net=debug,curalink_store=info,warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
