//! The owning handle for one user's sync engine.
//!
//! [`ChatClient::start`] wires the transport session, the shared state, and
//! the bridge loop together; everything is torn down again by
//! [`ChatClient::logout`].  The connector and the REST collaborator are
//! injected, so tests run against in-process fakes.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use curalink_net::{spawn_session, Connector, Credential, Session};
use curalink_shared::models::RouteHint;

use crate::api::RestApi;
use crate::bridge::{schedule_popup_expiry, spawn_bridge, BridgeContext};
use crate::config::ClientConfig;
use crate::events::UiEvent;
use crate::notifications::PlatformAlerter;
use crate::state::{lock_state, ChatState};

pub struct ChatClient {
    state: Arc<Mutex<ChatState>>,
    session: Session,
    pub(crate) api: Arc<dyn RestApi>,
    pub(crate) config: ClientConfig,
    pub(crate) ui_tx: mpsc::Sender<UiEvent>,
    bridge: JoinHandle<()>,
}

impl ChatClient {
    /// Start the engine for one authenticated user.  Returns the client and
    /// the UI event receiver the presentation layer drains.
    pub fn start<C: Connector>(
        connector: C,
        credential: Credential,
        api: Arc<dyn RestApi>,
        alerter: Arc<dyn PlatformAlerter>,
        config: ClientConfig,
    ) -> (Self, mpsc::Receiver<UiEvent>) {
        let (session, session_events) =
            spawn_session(connector, credential.clone(), config.session_config());

        let state = Arc::new(Mutex::new(ChatState::new(
            credential.user_id,
            credential.role,
            &config,
        )));
        let (ui_tx, ui_rx) = mpsc::channel(config.channel_capacity);

        let bridge = spawn_bridge(
            BridgeContext {
                state: state.clone(),
                session: session.clone(),
                api: api.clone(),
                alerter,
                ui_tx: ui_tx.clone(),
                popup_ttl: config.popup_ttl,
            },
            session_events,
        );

        info!("Chat client started");
        (
            Self {
                state,
                session,
                api,
                config,
                ui_tx,
                bridge,
            },
            ui_rx,
        )
    }

    /// Shared state handle for presentation reads.
    pub fn state(&self) -> Arc<Mutex<ChatState>> {
        self.state.clone()
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, ChatState> {
        lock_state(&self.state)
    }

    /// Mark a notification read and return its route hint; the popup slot it
    /// held is backfilled from the queue.
    pub fn click_notification(&self, id: Uuid) -> Option<RouteHint> {
        let (route, promoted) = {
            let mut guard = self.lock();
            let route = guard.notifications.click(id);
            let changes = guard.notifications.dismiss_popup(id, chrono::Utc::now());
            (route, changes.promoted)
        };
        for id in promoted {
            crate::events::emit_ui(&self.ui_tx, UiEvent::PopupShown { id });
            schedule_popup_expiry(self.state.clone(), self.ui_tx.clone(), self.config.popup_ttl);
        }
        route
    }

    /// Drop the whole notification collection.
    pub fn clear_notifications(&self) {
        self.lock().notifications.clear();
    }

    /// Tear down the session and wipe all session-scoped state.
    pub async fn logout(self) {
        self.session.shutdown().await;
        lock_state(&self.state).reset();
        self.bridge.abort();
        info!("Chat client stopped");
    }
}
