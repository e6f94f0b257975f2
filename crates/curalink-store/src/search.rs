//! In-conversation search: merges a server-side full-text query with a
//! case-insensitive substring scan of the currently loaded message window
//! into one deduplicated, rank-stable result list with highlight spans.

use std::collections::HashSet;

use serde::Serialize;

use curalink_shared::models::Message;
use curalink_shared::types::MessageId;

/// Queries shorter than this do not activate search mode.
pub const MIN_QUERY_LEN: usize = 2;

/// Which side produced a hit.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HitOrigin {
    Server,
    Local,
    Both,
}

/// Byte range of one query occurrence inside the message text.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub message: Message,
    pub origin: HitOrigin,
    pub spans: Vec<Span>,
}

/// The merged, cursor-addressable result list of an active search.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResults {
    query: String,
    hits: Vec<SearchHit>,
    cursor: usize,
}

impl SearchResults {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn hits(&self) -> &[SearchHit] {
        &self.hits
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> &SearchHit {
        &self.hits[self.cursor]
    }

    /// Advance to the next match, saturating at the end (no wraparound).
    pub fn next(&mut self) -> &SearchHit {
        if self.cursor + 1 < self.hits.len() {
            self.cursor += 1;
        }
        self.current()
    }

    /// Step back to the previous match, saturating at the start.
    pub fn prev(&mut self) -> &SearchHit {
        self.cursor = self.cursor.saturating_sub(1);
        self.current()
    }
}

/// Search mode of a conversation.  `NoMatches` is distinct from "search not
/// active".
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub enum SearchState {
    #[default]
    Inactive,
    NoMatches {
        query: String,
    },
    Active(SearchResults),
}

impl SearchState {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Inactive)
    }
}

/// Merge server and local hits for `query` into one result state.
///
/// Server hits keep their server-assigned rank and win content conflicts on a
/// shared id; local-only hits follow in window order.
pub fn merge_results(query: &str, server_hits: Vec<Message>, local_window: &[Message]) -> SearchState {
    if query.chars().count() < MIN_QUERY_LEN {
        return SearchState::Inactive;
    }

    let local_matches: Vec<&Message> = local_window
        .iter()
        .filter(|m| {
            m.content
                .as_deref()
                .map(|text| !highlight_spans(text, query).is_empty())
                .unwrap_or(false)
        })
        .collect();
    let local_ids: HashSet<&MessageId> = local_matches.iter().map(|m| &m.id).collect();

    let mut hits: Vec<SearchHit> = Vec::new();
    let mut seen: HashSet<MessageId> = HashSet::new();

    for message in server_hits {
        if seen.contains(&message.id) {
            continue;
        }
        let origin = if local_ids.contains(&message.id) {
            HitOrigin::Both
        } else {
            HitOrigin::Server
        };
        let spans = message
            .content
            .as_deref()
            .map(|text| highlight_spans(text, query))
            .unwrap_or_default();
        seen.insert(message.id.clone());
        hits.push(SearchHit {
            message,
            origin,
            spans,
        });
    }

    for message in local_matches {
        if seen.contains(&message.id) {
            continue;
        }
        let spans = message
            .content
            .as_deref()
            .map(|text| highlight_spans(text, query))
            .unwrap_or_default();
        seen.insert(message.id.clone());
        hits.push(SearchHit {
            message: message.clone(),
            origin: HitOrigin::Local,
            spans,
        });
    }

    if hits.is_empty() {
        SearchState::NoMatches {
            query: query.to_string(),
        }
    } else {
        SearchState::Active(SearchResults {
            query: query.to_string(),
            hits,
            cursor: 0,
        })
    }
}

/// Byte spans of every case-insensitive, non-overlapping occurrence of
/// `query` in `text`.  Spans index into the original text, so multi-byte
/// characters are handled without assuming lowercase preserves length.
pub fn highlight_spans(text: &str, query: &str) -> Vec<Span> {
    if query.is_empty() {
        return Vec::new();
    }
    let mut spans = Vec::new();
    let mut at = 0;
    while at < text.len() {
        if let Some(end) = ci_match_at(text, at, query) {
            spans.push(Span { start: at, end });
            at = end;
        } else {
            at += text[at..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
        }
    }
    spans
}

/// If `query` matches case-insensitively at byte offset `at`, return the byte
/// offset just past the match.
fn ci_match_at(text: &str, at: usize, query: &str) -> Option<usize> {
    let mut text_chars = text[at..].char_indices();
    let mut consumed = 0;
    for q in query.chars() {
        let (idx, t) = text_chars.next()?;
        if !t.to_lowercase().eq(q.to_lowercase()) {
            return None;
        }
        consumed = idx + t.len_utf8();
    }
    Some(at + consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use curalink_shared::types::{ParticipantRole, RoomId, UserId};

    fn msg(id: &str, content: &str) -> Message {
        Message {
            id: MessageId::from(id),
            room_id: RoomId::from("room-1"),
            sender_id: UserId::from("u2"),
            sender_role: ParticipantRole::Expert,
            content: Some(content.to_string()),
            attachment: None,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
            read: false,
        }
    }

    #[test]
    fn test_case_insensitive_spans() {
        let spans = highlight_spans("Hello there, say hello", "hello");
        assert_eq!(spans, [Span { start: 0, end: 5 }, Span { start: 17, end: 22 }]);
    }

    #[test]
    fn test_spans_with_multibyte_text() {
        let text = "Grüße, hello";
        let spans = highlight_spans(text, "hello");
        assert_eq!(spans.len(), 1);
        assert_eq!(&text[spans[0].start..spans[0].end], "hello");

        let umlaut = highlight_spans(text, "grüße");
        assert_eq!(umlaut.len(), 1);
        assert_eq!(&text[umlaut[0].start..umlaut[0].end], "Grüße");
    }

    #[test]
    fn test_no_overlapping_matches() {
        assert_eq!(highlight_spans("aaaa", "aa").len(), 2);
    }

    #[test]
    fn test_short_query_deactivates() {
        let state = merge_results("h", vec![msg("m1", "hello")], &[msg("m2", "hello")]);
        assert_eq!(state, SearchState::Inactive);
        assert!(!state.is_active());
    }

    #[test]
    fn test_no_matches_is_distinct_from_inactive() {
        let state = merge_results("zzz", Vec::new(), &[msg("m1", "hello")]);
        assert_eq!(
            state,
            SearchState::NoMatches {
                query: "zzz".into()
            }
        );
        assert!(state.is_active());
    }

    #[test]
    fn test_merge_dedups_preferring_server_copy() {
        // Same id on both sides, server content differs (canonical).
        let server = vec![msg("m1", "hello from server")];
        let local = [msg("m1", "hello"), msg("m2", "say hello")];

        let SearchState::Active(results) = merge_results("hello", server, &local) else {
            panic!("expected active search");
        };
        assert_eq!(results.hits().len(), 2);
        assert_eq!(results.hits()[0].origin, HitOrigin::Both);
        assert_eq!(
            results.hits()[0].message.content.as_deref(),
            Some("hello from server")
        );
        assert_eq!(results.hits()[1].origin, HitOrigin::Local);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let server = vec![msg("m3", "Hello there"), msg("m1", "say hello")];
        let local = [msg("m1", "say hello"), msg("m2", "well hello")];

        let first = merge_results("hello", server.clone(), &local);
        let second = merge_results("hello", server, &local);
        assert_eq!(first, second);
    }

    #[test]
    fn test_server_rank_preserved_locals_appended() {
        let server = vec![msg("m9", "hello nine"), msg("m1", "hello one")];
        let local = [msg("m2", "hello two"), msg("m9", "hello nine")];

        let SearchState::Active(results) = merge_results("hello", server, &local) else {
            panic!("expected active search");
        };
        let ids: Vec<&str> = results.hits().iter().map(|h| h.message.id.as_str()).collect();
        assert_eq!(ids, ["m9", "m1", "m2"]);
    }

    #[test]
    fn test_cursor_saturates_at_both_ends() {
        let SearchState::Active(mut results) = merge_results(
            "hello",
            vec![msg("m1", "hello"), msg("m2", "hello again")],
            &[],
        ) else {
            panic!("expected active search");
        };

        assert_eq!(results.cursor(), 0);
        results.prev();
        assert_eq!(results.cursor(), 0);
        results.next();
        assert_eq!(results.cursor(), 1);
        results.next();
        assert_eq!(results.cursor(), 1);
    }
}
