//! Notification dispatcher state.
//!
//! Holds the capped persistent collection and the transient popup slots.
//! Time is passed in explicitly; the bridge owns the expiry timers.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use curalink_shared::models::{Notification, RouteHint};

/// Best-effort OS-level alert hook.  Implementations must fall back silently
/// when the platform does not support alerts or permission was not granted.
pub trait PlatformAlerter: Send + Sync {
    fn alert(&self, title: &str, body: &str);
}

/// Alerter for platforms without notification support.
pub struct NoopAlerter;

impl PlatformAlerter for NoopAlerter {
    fn alert(&self, _title: &str, _body: &str) {}
}

#[derive(Debug, Clone)]
struct Popup {
    id: Uuid,
    expires_at: DateTime<Utc>,
}

/// Popup slots freed or filled by an expiry or dismissal pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PopupChanges {
    pub expired: Vec<Uuid>,
    /// Queued notifications promoted into freed slots; each needs a fresh
    /// expiry timer.
    pub promoted: Vec<Uuid>,
}

/// The persistent notification collection plus transient popup state.
pub struct NotificationCenter {
    /// Oldest at the front; evicted first when the cap is hit.
    entries: VecDeque<Notification>,
    cap: usize,
    popup_cap: usize,
    popup_ttl: chrono::Duration,
    popups: Vec<Popup>,
    /// Alerts recorded while all popup slots were taken, oldest first.
    queued: VecDeque<Uuid>,
    unread: usize,
}

impl NotificationCenter {
    pub fn new(cap: usize, popup_cap: usize, popup_ttl: Duration) -> Self {
        Self {
            entries: VecDeque::new(),
            cap: cap.max(1),
            popup_cap,
            popup_ttl: chrono::Duration::from_std(popup_ttl)
                .unwrap_or_else(|_| chrono::Duration::seconds(8)),
            popups: Vec::new(),
            queued: VecDeque::new(),
            unread: 0,
        }
    }

    /// Insert a notification.  Returns true when it claimed a popup slot;
    /// otherwise it is queued until a slot frees up.
    pub fn insert(&mut self, notification: Notification, now: DateTime<Utc>) -> bool {
        let id = notification.id;
        if !notification.read {
            self.unread += 1;
        }
        self.entries.push_back(notification);

        if self.entries.len() > self.cap {
            if let Some(evicted) = self.entries.pop_front() {
                if !evicted.read {
                    self.unread = self.unread.saturating_sub(1);
                }
                self.popups.retain(|p| p.id != evicted.id);
                self.queued.retain(|q| *q != evicted.id);
                debug!(id = %evicted.id, "Evicted oldest notification");
            }
        }

        if self.popups.len() < self.popup_cap {
            self.popups.push(Popup {
                id,
                expires_at: now + self.popup_ttl,
            });
            true
        } else {
            self.queued.push_back(id);
            false
        }
    }

    /// Expire due popups and promote queued alerts into the freed slots.
    pub fn expire_due(&mut self, now: DateTime<Utc>) -> PopupChanges {
        let mut changes = PopupChanges::default();
        self.popups.retain(|popup| {
            if popup.expires_at <= now {
                changes.expired.push(popup.id);
                false
            } else {
                true
            }
        });
        self.promote(now, &mut changes);
        changes
    }

    /// Remove one popup (user dismissed it) and backfill from the queue.
    pub fn dismiss_popup(&mut self, id: Uuid, now: DateTime<Utc>) -> PopupChanges {
        let mut changes = PopupChanges::default();
        self.popups.retain(|p| p.id != id);
        self.promote(now, &mut changes);
        changes
    }

    fn promote(&mut self, now: DateTime<Utc>, changes: &mut PopupChanges) {
        while self.popups.len() < self.popup_cap {
            let Some(id) = self.queued.pop_front() else {
                break;
            };
            // The entry may have been evicted or read while queued.
            if !self.entries.iter().any(|n| n.id == id && !n.read) {
                continue;
            }
            self.popups.push(Popup {
                id,
                expires_at: now + self.popup_ttl,
            });
            changes.promoted.push(id);
        }
    }

    /// Mark a notification read (idempotent) and return where the click
    /// should route.
    pub fn click(&mut self, id: Uuid) -> Option<RouteHint> {
        let entry = self.entries.iter_mut().find(|n| n.id == id)?;
        if !entry.read {
            entry.read = true;
            self.unread = self.unread.saturating_sub(1);
        }
        let route = entry.route();
        self.popups.retain(|p| p.id != id);
        self.queued.retain(|q| *q != id);
        route
    }

    /// Drop the entire collection.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.popups.clear();
        self.queued.clear();
        self.unread = 0;
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first, the order the panel renders them.
    pub fn entries(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter().rev()
    }

    /// Ids of the popups currently on screen.
    pub fn active_popups(&self) -> Vec<Uuid> {
        self.popups.iter().map(|p| p.id).collect()
    }
}
