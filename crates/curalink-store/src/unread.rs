//! Unread counter aggregation.
//!
//! Four independent signal kinds write the counters; conflicts between
//! out-of-order arrivals are resolved by the rules here, not by locking.
//! The grand total is recomputed from the per-room counters on every read
//! rather than maintained incrementally, so it cannot drift.

use std::collections::HashMap;

use tracing::debug;

use curalink_shared::types::UserId;

/// Which signal last wrote a counter, kept to arbitrate conflicting updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Full or single-room snapshot from the server's counter table.
    Snapshot,
    /// `new-message` increment inferred client-side.
    Delta,
    /// `messages-read` push or local mark-read action; authoritative zero.
    Cleared,
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    last_signal: SignalKind,
}

/// Per-room unread counters, keyed by counterpart id.
#[derive(Debug, Clone, Default)]
pub struct UnreadCounters {
    counters: HashMap<UserId, Counter>,
}

impl UnreadCounters {
    pub fn new() -> Self {
        Self {
            counters: HashMap::new(),
        }
    }

    /// Wholesale replacement from an `all-rooms` snapshot.  Rooms absent from
    /// the snapshot are implicitly zeroed because the old map is discarded.
    pub fn apply_full_snapshot(&mut self, counts: impl IntoIterator<Item = (UserId, u32)>) {
        self.counters = counts
            .into_iter()
            .map(|(counterpart, count)| {
                (
                    counterpart,
                    Counter {
                        count,
                        last_signal: SignalKind::Snapshot,
                    },
                )
            })
            .collect();
        debug!(rooms = self.counters.len(), total = self.total(), "Applied full unread snapshot");
    }

    /// Replace exactly one room's counter.
    pub fn apply_room_snapshot(&mut self, counterpart: &UserId, count: u32) {
        self.counters.insert(
            counterpart.clone(),
            Counter {
                count,
                last_signal: SignalKind::Snapshot,
            },
        );
    }

    /// Set one room's counter to zero.  Cleared is authoritative: any stale
    /// deltas already applied for the room are wiped with it.
    pub fn apply_cleared(&mut self, counterpart: &UserId) {
        self.counters.insert(
            counterpart.clone(),
            Counter {
                count: 0,
                last_signal: SignalKind::Cleared,
            },
        );
    }

    /// Increment one room's counter by one.  Callers must not route deltas
    /// for the currently open room here; that room's unread state is
    /// implicitly zero while viewed.
    pub fn apply_delta(&mut self, counterpart: &UserId) {
        let counter = self.counters.entry(counterpart.clone()).or_insert(Counter {
            count: 0,
            last_signal: SignalKind::Delta,
        });
        counter.count = counter.count.saturating_add(1);
        counter.last_signal = SignalKind::Delta;
    }

    pub fn count(&self, counterpart: &UserId) -> u32 {
        self.counters.get(counterpart).map(|c| c.count).unwrap_or(0)
    }

    pub fn last_signal(&self, counterpart: &UserId) -> Option<SignalKind> {
        self.counters.get(counterpart).map(|c| c.last_signal)
    }

    /// Grand total: always the sum of the per-room counters.
    pub fn total(&self) -> u64 {
        self.counters.values().map(|c| c.count as u64).sum()
    }

    pub fn counts(&self) -> impl Iterator<Item = (&UserId, u32)> {
        self.counters.iter().map(|(k, c)| (k, c.count))
    }

    pub fn drop_room(&mut self, counterpart: &UserId) {
        self.counters.remove(counterpart);
    }

    pub fn clear(&mut self) {
        self.counters.clear();
    }
}
