//! Per-room ordered message logs.
//!
//! History pages and live pushes race freely; correctness rests on the merge
//! rules here, not on arrival order: message id is the deduplication key, the
//! read flag is monotonic, and ordering is by timestamp with ties broken by
//! arrival order.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use curalink_shared::models::{Attachment, Delivery, Message};
use curalink_shared::types::{MessageId, ParticipantRole, PendingId, RoomId, UserId};

/// A validated, upload-resolved outgoing message body.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub sender_id: UserId,
    pub sender_role: ParticipantRole,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
}

/// One message in a room's log, with its local delivery bookkeeping.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LogEntry {
    pub message: Message,
    pub delivery: Delivery,
    /// Correlation key while the entry awaits its acknowledgement.
    pub pending: Option<PendingId>,
    #[serde(skip)]
    seq: u64,
}

/// Result of reconciling a server acknowledgement with a pending entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The pending entry was replaced in place by the server copy.
    Replaced,
    /// The server copy already arrived via push; the pending duplicate was
    /// dropped.
    AlreadyArrived,
    /// No entry with that pending id exists.
    Unknown,
}

#[derive(Debug, Clone, Default)]
struct MessageLog {
    /// Sorted by `(timestamp, seq)`.  Reconciliation mutates in place and
    /// deliberately does not re-sort, preserving display order.
    entries: Vec<LogEntry>,
    ids: HashSet<MessageId>,
    next_seq: u64,
}

impl MessageLog {
    fn insert_sorted(&mut self, message: Message, delivery: Delivery, pending: Option<PendingId>) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let key = (message.timestamp, seq);
        let at = self
            .entries
            .partition_point(|e| (e.message.timestamp, e.seq) <= key);
        self.ids.insert(message.id.clone());
        self.entries.insert(
            at,
            LogEntry {
                message,
                delivery,
                pending,
                seq,
            },
        );
    }

    /// Dedup-insert; on a duplicate id the read flag is merged monotonically
    /// and nothing else changes.
    fn upsert(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            if message.read {
                if let Some(entry) = self.entries.iter_mut().find(|e| e.message.id == message.id) {
                    entry.message.read = true;
                }
            }
            debug!(msg = %message.id, "Duplicate message id, merge is a no-op");
            return false;
        }
        self.insert_sorted(message, Delivery::Confirmed, None);
        true
    }
}

/// All message logs for the session, keyed by room.
#[derive(Debug, Clone, Default)]
pub struct ConversationStore {
    logs: HashMap<RoomId, MessageLog>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            logs: HashMap::new(),
        }
    }

    /// Merge-insert a history batch.  Never replaces the log wholesale, so
    /// messages received live while the page was in flight are not lost.
    /// Returns how many entries were actually inserted.
    pub fn merge_history(&mut self, room_id: &RoomId, batch: Vec<Message>) -> usize {
        let log = self.logs.entry(room_id.clone()).or_default();
        let mut inserted = 0;
        for message in batch {
            if log.upsert(message) {
                inserted += 1;
            }
        }
        debug!(room = %room_id, inserted, "History batch merged");
        inserted
    }

    /// Insert a single live message; a no-op if the id is already present.
    pub fn append_live(&mut self, message: Message) -> bool {
        let log = self.logs.entry(message.room_id.clone()).or_default();
        log.upsert(message)
    }

    /// Append a not-yet-confirmed message for responsive UI.  The returned
    /// correlation key reconciles the entry once the acknowledgement arrives.
    pub fn send_optimistic(&mut self, room_id: &RoomId, outgoing: Outgoing) -> PendingId {
        let pending = PendingId::new();
        let message = Message {
            id: MessageId::local(pending),
            room_id: room_id.clone(),
            sender_id: outgoing.sender_id,
            sender_role: outgoing.sender_role,
            content: outgoing.content,
            attachment: outgoing.attachment,
            timestamp: Utc::now(),
            read: false,
        };
        let log = self.logs.entry(room_id.clone()).or_default();
        log.insert_sorted(message, Delivery::Pending, Some(pending));
        pending
    }

    /// Replace a pending entry with the acknowledged server copy, keyed by
    /// the correlation id, preserving display order.  If the server copy has
    /// already arrived via push, the pending duplicate is dropped instead so
    /// the id stays unique.
    pub fn confirm_pending(
        &mut self,
        room_id: &RoomId,
        pending: PendingId,
        server: Message,
    ) -> Confirmation {
        let Some(log) = self.logs.get_mut(room_id) else {
            warn!(room = %room_id, %pending, "Acknowledgement for unknown room");
            return Confirmation::Unknown;
        };
        let Some(at) = log.entries.iter().position(|e| e.pending == Some(pending)) else {
            warn!(room = %room_id, %pending, "Acknowledgement for unknown pending entry");
            return Confirmation::Unknown;
        };

        if log.ids.contains(&server.id) {
            let removed = log.entries.remove(at);
            log.ids.remove(&removed.message.id);
            if server.read {
                if let Some(entry) = log.entries.iter_mut().find(|e| e.message.id == server.id) {
                    entry.message.read = true;
                }
            }
            return Confirmation::AlreadyArrived;
        }

        let entry = &mut log.entries[at];
        log.ids.remove(&entry.message.id);
        log.ids.insert(server.id.clone());
        entry.message = server;
        entry.delivery = Delivery::Confirmed;
        entry.pending = None;
        Confirmation::Replaced
    }

    /// Mark a pending entry failed; it stays visible for retry.
    pub fn fail_pending(&mut self, room_id: &RoomId, pending: PendingId) -> bool {
        let Some(log) = self.logs.get_mut(room_id) else {
            return false;
        };
        match log.entries.iter_mut().find(|e| e.pending == Some(pending)) {
            Some(entry) => {
                entry.delivery = Delivery::Failed;
                true
            }
            None => false,
        }
    }

    /// Flip the read flag on every message in the room sent by the given
    /// role.  Models the `messagesRead` push: the other party has seen the
    /// local user's outgoing messages.  Returns how many flags flipped.
    pub fn mark_read_from(&mut self, room_id: &RoomId, sender_role: ParticipantRole) -> usize {
        let Some(log) = self.logs.get_mut(room_id) else {
            return 0;
        };
        let mut flipped = 0;
        for entry in &mut log.entries {
            if entry.message.sender_role == sender_role && !entry.message.read {
                entry.message.read = true;
                flipped += 1;
            }
        }
        flipped
    }

    pub fn entries(&self, room_id: &RoomId) -> &[LogEntry] {
        self.logs.get(room_id).map(|l| l.entries.as_slice()).unwrap_or(&[])
    }

    /// The currently loaded message window, as scanned by local search.
    pub fn window(&self, room_id: &RoomId) -> Vec<Message> {
        self.entries(room_id)
            .iter()
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn contains(&self, room_id: &RoomId, id: &MessageId) -> bool {
        self.logs
            .get(room_id)
            .map(|l| l.ids.contains(id))
            .unwrap_or(false)
    }

    pub fn len(&self, room_id: &RoomId) -> usize {
        self.entries(room_id).len()
    }

    /// A room delete clears the whole log, never individual messages.
    pub fn drop_room(&mut self, room_id: &RoomId) {
        self.logs.remove(room_id);
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }

    // -- Day grouping ------------------------------------------------------

    /// Bucket a room's messages by calendar date in the viewer's local time
    /// zone: buckets in descending date order, each bucket's messages in
    /// ascending timestamp order.
    pub fn group_by_day(&self, room_id: &RoomId) -> Vec<DayBucket> {
        self.group_by_day_on(room_id, Local::now().date_naive())
    }

    fn group_by_day_on(&self, room_id: &RoomId, today: NaiveDate) -> Vec<DayBucket> {
        let mut buckets: Vec<DayBucket> = Vec::new();
        for entry in self.entries(room_id) {
            let date = local_date(entry.message.timestamp);
            match buckets.iter_mut().find(|b| b.date == date) {
                Some(bucket) => bucket.messages.push(entry.message.clone()),
                None => buckets.push(DayBucket {
                    label: DayLabel::for_date(date, today),
                    date,
                    messages: vec![entry.message.clone()],
                }),
            }
        }
        buckets.sort_by(|a, b| b.date.cmp(&a.date));
        buckets
    }
}

fn local_date(timestamp: DateTime<Utc>) -> NaiveDate {
    timestamp.with_timezone(&Local).date_naive()
}

/// Messages of one calendar day, for the conversation view.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DayBucket {
    pub label: DayLabel,
    pub date: NaiveDate,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum DayLabel {
    Today,
    Yesterday,
    Date(NaiveDate),
}

impl DayLabel {
    fn for_date(date: NaiveDate, today: NaiveDate) -> Self {
        if date == today {
            Self::Today
        } else if today.pred_opt() == Some(date) {
            Self::Yesterday
        } else {
            Self::Date(date)
        }
    }
}

impl std::fmt::Display for DayLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Today => write!(f, "Today"),
            Self::Yesterday => write!(f, "Yesterday"),
            Self::Date(date) => write!(f, "{}", date.format("%B %d, %Y")),
        }
    }
}
