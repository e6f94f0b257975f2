//! Client configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the engine runs with zero
//! configuration in development.

use std::time::Duration;

use curalink_net::SessionConfig;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bounded wait for emit-with-acknowledgement commands.
    /// Env: `CURALINK_ACK_TIMEOUT_MS`
    /// Default: 10000
    pub ack_timeout: Duration,

    /// Page size for history fetches and server-side search.
    /// Env: `CURALINK_HISTORY_PAGE_SIZE`
    /// Default: 50
    pub history_page_size: u32,

    /// Maximum transient popups shown concurrently.
    /// Env: `CURALINK_POPUP_CAP`
    /// Default: 3
    pub popup_cap: usize,

    /// Auto-expiry of a transient popup.
    /// Env: `CURALINK_POPUP_TTL_MS`
    /// Default: 8000
    pub popup_ttl: Duration,

    /// Capacity of the persistent notification collection.
    /// Env: `CURALINK_NOTIFICATION_CAP`
    /// Default: 50
    pub notification_cap: usize,

    /// First reconnect delay; doubled per consecutive failure.
    pub reconnect_initial: Duration,

    /// Upper bound on the reconnect delay.
    pub reconnect_max: Duration,

    /// Capacity of the internal channels.
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(10),
            history_page_size: 50,
            popup_cap: 3,
            popup_ttl: Duration::from_secs(8),
            notification_cap: 50,
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
            channel_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(ms) = env_u64("CURALINK_ACK_TIMEOUT_MS") {
            config.ack_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("CURALINK_HISTORY_PAGE_SIZE") {
            config.history_page_size = n as u32;
        }
        if let Some(n) = env_u64("CURALINK_POPUP_CAP") {
            config.popup_cap = n as usize;
        }
        if let Some(ms) = env_u64("CURALINK_POPUP_TTL_MS") {
            config.popup_ttl = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("CURALINK_NOTIFICATION_CAP") {
            config.notification_cap = n as usize;
        }

        config
    }

    /// The transport-session slice of this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            ack_timeout: self.ack_timeout,
            channel_capacity: self.channel_capacity,
            reconnect_initial: self.reconnect_initial,
            reconnect_max: self.reconnect_max,
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}
