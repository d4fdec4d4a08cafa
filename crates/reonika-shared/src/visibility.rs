//! Message visibility rules.
//!
//! A message is visible iff it is not soft-deleted and `now < expires_at`.
//! Message lists, conversation previews and unread counts all go through the
//! functions in this module so they can never disagree about which messages
//! exist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    PREVIEW_IMAGE, PREVIEW_MAX_CHARS, PREVIEW_NO_MESSAGES, PREVIEW_VOICE,
};
use crate::models::{ConversationRecord, Message, Payload, Profile};
use crate::types::{ChatId, UserId};

pub fn is_visible(message: &Message, now: DateTime<Utc>) -> bool {
    !message.is_deleted && now < message.expires_at
}

/// Visible messages in ascending creation order.
pub fn visible_messages(messages: &[Message], now: DateTime<Utc>) -> Vec<Message> {
    let mut visible: Vec<Message> = messages
        .iter()
        .filter(|m| is_visible(m, now))
        .cloned()
        .collect();
    visible.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    visible
}

pub fn last_visible(messages: &[Message], now: DateTime<Utc>) -> Option<&Message> {
    messages
        .iter()
        .filter(|m| is_visible(m, now))
        .max_by(|a, b| a.created_at.cmp(&b.created_at))
}

/// Visible, unread messages that `me` did not send.
pub fn unread_count(messages: &[Message], me: UserId, now: DateTime<Utc>) -> usize {
    messages
        .iter()
        .filter(|m| is_visible(m, now) && !m.is_read && m.sender_id != me)
        .count()
}

/// Preview text for a conversation, falling back to the "no messages" text.
pub fn preview_text(messages: &[Message], now: DateTime<Utc>) -> String {
    match last_visible(messages, now) {
        Some(m) => payload_preview(&m.payload),
        None => PREVIEW_NO_MESSAGES.to_string(),
    }
}

fn payload_preview(payload: &Payload) -> String {
    match payload {
        Payload::Text { content } => truncate(content.trim(), PREVIEW_MAX_CHARS),
        Payload::Image { .. } => PREVIEW_IMAGE.to_string(),
        Payload::Voice { duration_secs, .. } => format!(
            "{PREVIEW_VOICE} ({}:{:02})",
            duration_secs / 60,
            duration_secs % 60
        ),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// Conversation list rows
// ---------------------------------------------------------------------------

/// One row of the conversation list, derived on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: ChatId,
    pub partner: Profile,
    pub preview: String,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl ChatSummary {
    pub fn derive(record: &ConversationRecord, me: UserId, now: DateTime<Utc>) -> Self {
        Self {
            chat_id: record.chat.id,
            partner: record.partner.clone(),
            preview: preview_text(&record.messages, now),
            last_message_at: last_visible(&record.messages, now).map(|m| m.created_at),
            unread_count: unread_count(&record.messages, me, now),
            updated_at: record.chat.updated_at,
        }
    }

    /// Most recent activity, used to order the list.
    pub fn activity_at(&self) -> DateTime<Utc> {
        self.last_message_at.unwrap_or(self.updated_at)
    }
}

/// Derive and order the conversation list, most recent activity first.
pub fn summarize(records: &[ConversationRecord], me: UserId, now: DateTime<Utc>) -> Vec<ChatSummary> {
    let mut summaries: Vec<ChatSummary> = records
        .iter()
        .filter(|r| !r.chat.is_deleted)
        .map(|r| ChatSummary::derive(r, me, now))
        .collect();
    summaries.sort_by(|a, b| b.activity_at().cmp(&a.activity_at()));
    summaries
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::{Chat, Payload};

    fn msg(sender: UserId, created: DateTime<Utc>, text: &str) -> Message {
        Message::new(ChatId::new(), sender, Payload::text(text), created)
    }

    #[test]
    fn test_expired_and_deleted_are_invisible() {
        let t0 = Utc::now();
        let m = msg(UserId::new(), t0, "hi");
        assert!(is_visible(&m, t0 + Duration::hours(23)));
        assert!(!is_visible(&m, t0 + Duration::hours(24)));

        let mut deleted = msg(UserId::new(), t0, "bye");
        deleted.is_deleted = true;
        assert!(!is_visible(&deleted, t0));
    }

    #[test]
    fn test_expired_message_never_counts_anywhere() {
        let me = UserId::new();
        let other = UserId::new();
        let t0 = Utc::now();
        let stale_cache = vec![msg(other, t0, "old")];
        let later = t0 + Duration::hours(24) + Duration::minutes(1);

        assert!(visible_messages(&stale_cache, later).is_empty());
        assert_eq!(unread_count(&stale_cache, me, later), 0);
        assert_eq!(preview_text(&stale_cache, later), PREVIEW_NO_MESSAGES);

        // Replaying the same cache even later never brings it back.
        let much_later = later + Duration::days(3);
        assert!(visible_messages(&stale_cache, much_later).is_empty());
    }

    #[test]
    fn test_unread_count_skips_own_and_read() {
        let me = UserId::new();
        let other = UserId::new();
        let t0 = Utc::now();
        let mut read = msg(other, t0, "a");
        read.is_read = true;
        let messages = vec![msg(other, t0, "b"), msg(me, t0, "c"), read];
        assert_eq!(unread_count(&messages, me, t0), 1);
    }

    #[test]
    fn test_preview_uses_last_visible() {
        let me = UserId::new();
        let t0 = Utc::now();
        let first = msg(me, t0, "first");
        let mut second = msg(me, t0 + Duration::minutes(1), "second");
        second.is_deleted = true;
        assert_eq!(preview_text(&[first, second], t0 + Duration::minutes(2)), "first");
    }

    #[test]
    fn test_media_previews() {
        let t0 = Utc::now();
        let mut m = msg(UserId::new(), t0, "x");
        m.payload = Payload::voice("v.webm", 75);
        assert_eq!(preview_text(&[m.clone()], t0), "🎤 Voice message (1:15)");
        m.payload = Payload::image("a.png");
        assert_eq!(preview_text(&[m], t0), PREVIEW_IMAGE);
    }

    #[test]
    fn test_long_text_is_truncated() {
        let t0 = Utc::now();
        let m = msg(UserId::new(), t0, &"y".repeat(100));
        let preview = preview_text(&[m], t0);
        assert_eq!(preview.chars().count(), PREVIEW_MAX_CHARS + 1);
        assert!(preview.ends_with('…'));
    }

    #[test]
    fn test_summaries_sorted_by_activity() {
        let me = UserId::new();
        let t0 = Utc::now();
        let record = |other: UserId, at: DateTime<Utc>, messages: Vec<Message>| ConversationRecord {
            chat: Chat {
                id: ChatId::new(),
                user1_id: me,
                user2_id: other,
                created_at: at,
                updated_at: at,
                is_deleted: false,
            },
            partner: Profile::unknown(other),
            messages,
        };
        let quiet = UserId::new();
        let busy = UserId::new();
        let records = vec![
            record(quiet, t0, vec![]),
            record(busy, t0 - Duration::hours(1), vec![msg(busy, t0 + Duration::minutes(5), "hey")]),
        ];

        let rows = summarize(&records, me, t0 + Duration::minutes(10));
        assert_eq!(rows[0].partner.id, busy);
        assert_eq!(rows[0].unread_count, 1);
        assert_eq!(rows[1].preview, PREVIEW_NO_MESSAGES);
        assert_eq!(rows[1].last_message_at, None);
    }
}
