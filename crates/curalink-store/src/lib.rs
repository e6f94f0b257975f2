//! # curalink-store
//!
//! Session-scoped state containers for the conversation sync engine: the
//! room directory, per-room message logs, unread counter aggregation, search
//! merging, and typing indicators.
//!
//! Everything here is plain in-memory state with explicit command/query
//! methods.  The containers never talk to the network; the client layer
//! feeds them validated events and REST results and resets them wholesale on
//! logout.

pub mod conversation;
pub mod directory;
pub mod search;
pub mod typing;
pub mod unread;

pub use conversation::{Confirmation, ConversationStore, DayBucket, DayLabel, LogEntry, Outgoing};
pub use directory::RoomDirectory;
pub use search::{merge_results, HitOrigin, SearchHit, SearchResults, SearchState, Span, MIN_QUERY_LEN};
pub use typing::TypingTracker;
pub use unread::{SignalKind, UnreadCounters};
