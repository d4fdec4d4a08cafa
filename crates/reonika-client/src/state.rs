//! View state owned by the refresh coordinator.
//!
//! [`ViewState`] holds the conversation list and the open chat's messages.
//! Only the coordinator task mutates it, either when a refresh completes or
//! when a user action applies an optimistic update. Every refresh target
//! carries a [`RefreshSlot`] that decides whether a completion may render.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reonika_shared::visibility::{self, summarize};
use reonika_shared::{ChatId, ChatSummary, ConversationRecord, Message, MessageId, UserId};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Refresh slot
// ---------------------------------------------------------------------------

/// Coalescing and ordering bookkeeping for one refresh target.
///
/// Sequence numbers come from a single counter in the coordinator and grow
/// with issue order. A completion renders only if its sequence number is
/// above everything already rendered for the target.
#[derive(Debug, Default, Clone)]
pub struct RefreshSlot {
    in_flight: Option<u64>,
    pending: bool,
    rendered: u64,
}

impl RefreshSlot {
    /// Ask for a refresh. Returns `true` when the caller should issue one now;
    /// otherwise the request is folded into the single pending follow-up.
    pub fn request(&mut self) -> bool {
        if self.in_flight.is_some() {
            self.pending = true;
            false
        } else {
            true
        }
    }

    /// Record that refresh `seq` was issued.
    pub fn begin(&mut self, seq: u64) {
        self.in_flight = Some(seq);
    }

    /// Issue `seq` regardless of what is in flight. Older completions still
    /// arrive but can no longer render over it once it has rendered.
    pub fn force(&mut self, seq: u64) {
        self.pending = false;
        self.in_flight = Some(seq);
    }

    /// Record completion of `seq`. Returns whether its result may render.
    pub fn finish(&mut self, seq: u64) -> bool {
        if self.in_flight == Some(seq) {
            self.in_flight = None;
        }
        seq > self.rendered
    }

    pub fn mark_rendered(&mut self, seq: u64) {
        self.rendered = self.rendered.max(seq);
    }

    /// Take the pending follow-up once nothing is in flight.
    pub fn take_pending(&mut self) -> bool {
        if self.in_flight.is_none() && self.pending {
            self.pending = false;
            true
        } else {
            false
        }
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

// ---------------------------------------------------------------------------
// View state
// ---------------------------------------------------------------------------

/// Point-in-time copy of what the UI should be showing.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub open_chat: Option<ChatId>,
    pub conversations: Vec<ChatSummary>,
    pub messages: Vec<Message>,
}

pub struct ViewState {
    me: UserId,
    open_chat: Option<ChatId>,
    records: Vec<ConversationRecord>,
    messages: Vec<Message>,
    unread: HashMap<ChatId, usize>,
    pub conversations_slot: RefreshSlot,
    pub messages_slot: RefreshSlot,
}

impl ViewState {
    pub fn new(me: UserId) -> Self {
        Self {
            me,
            open_chat: None,
            records: Vec::new(),
            messages: Vec::new(),
            unread: HashMap::new(),
            conversations_slot: RefreshSlot::default(),
            messages_slot: RefreshSlot::default(),
        }
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn open_chat(&self) -> Option<ChatId> {
        self.open_chat
    }

    /// Switch the open chat. Messages of the previous chat are dropped.
    pub fn set_open_chat(&mut self, chat_id: Option<ChatId>) {
        if self.open_chat != chat_id {
            self.messages.clear();
        }
        self.open_chat = chat_id;
    }

    pub fn conversations(&self, now: DateTime<Utc>) -> Vec<ChatSummary> {
        summarize(&self.records, self.me, now)
    }

    pub fn messages(&self, now: DateTime<Utc>) -> Vec<Message> {
        visibility::visible_messages(&self.messages, now)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> ViewSnapshot {
        ViewSnapshot {
            open_chat: self.open_chat,
            conversations: self.conversations(now),
            messages: self.messages(now),
        }
    }

    /// Apply a conversation-list refresh. Returns `false` if `seq` is stale.
    pub fn apply_conversations(&mut self, seq: u64, records: Vec<ConversationRecord>) -> bool {
        if !self.conversations_slot.finish(seq) {
            return false;
        }
        self.records = records;
        self.conversations_slot.mark_rendered(seq);
        true
    }

    /// Apply a message-list refresh for `chat_id`. Returns `false` if `seq` is
    /// stale or the chat is no longer the open one.
    pub fn apply_messages(&mut self, seq: u64, chat_id: ChatId, messages: Vec<Message>) -> bool {
        let fresh = self.messages_slot.finish(seq);
        if !fresh || self.open_chat != Some(chat_id) {
            return false;
        }
        self.messages = messages;
        self.messages_slot.mark_rendered(seq);
        true
    }

    /// Whether the open chat shows visible partner messages that are unread.
    pub fn open_chat_has_unread(&self, now: DateTime<Utc>) -> bool {
        self.open_chat.is_some() && visibility::unread_count(&self.messages, self.me, now) > 0
    }

    /// Optimistically mark the partner's messages in `chat_id` as read, in
    /// both the conversation list and the open message list.
    pub fn mark_read_locally(&mut self, chat_id: ChatId, now: DateTime<Utc>) -> bool {
        let me = self.me;
        let mut changed = false;
        let mut flip = |m: &mut Message| {
            if m.chat_id == chat_id && m.sender_id != me && !m.is_read {
                m.is_read = true;
                m.read_at = Some(now);
                changed = true;
            }
        };
        for record in self.records.iter_mut().filter(|r| r.chat.id == chat_id) {
            record.messages.iter_mut().for_each(&mut flip);
        }
        if self.open_chat == Some(chat_id) {
            self.messages.iter_mut().for_each(&mut flip);
        }
        changed
    }

    /// Add a message the local user just sent.
    pub fn insert_sent(&mut self, message: Message) {
        if let Some(record) = self.records.iter_mut().find(|r| r.chat.id == message.chat_id) {
            if !record.messages.iter().any(|m| m.id == message.id) {
                record.chat.updated_at = message.created_at;
                record.messages.push(message.clone());
            }
        }
        if self.open_chat == Some(message.chat_id) && !self.messages.iter().any(|m| m.id == message.id) {
            self.messages.push(message);
        }
    }

    pub fn remove_message(&mut self, id: MessageId) -> bool {
        let before = self.messages.len() + self.record_message_count();
        self.messages.retain(|m| m.id != id);
        for record in &mut self.records {
            record.messages.retain(|m| m.id != id);
        }
        before != self.messages.len() + self.record_message_count()
    }

    pub fn remove_chat(&mut self, chat_id: ChatId) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.chat.id != chat_id);
        if self.open_chat == Some(chat_id) {
            self.set_open_chat(None);
        }
        before != self.records.len()
    }

    /// Drop messages that stopped being visible. Returns whether the
    /// conversation list and the message list changed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> (bool, bool) {
        let mut conversations_changed = false;
        for record in &mut self.records {
            let before = record.messages.len();
            record.messages.retain(|m| visibility::is_visible(m, now));
            conversations_changed |= before != record.messages.len();
        }
        let before = self.messages.len();
        self.messages.retain(|m| visibility::is_visible(m, now));
        (conversations_changed, before != self.messages.len())
    }

    /// Chats whose unread count differs from the last reported one. Chats
    /// that disappeared report zero. Nothing is recorded until
    /// [`report_unread`](Self::report_unread) confirms delivery.
    pub fn unread_changes(&self, now: DateTime<Utc>) -> Vec<(ChatId, usize)> {
        let current: HashMap<ChatId, usize> = self
            .records
            .iter()
            .map(|r| (r.chat.id, visibility::unread_count(&r.messages, self.me, now)))
            .collect();

        let mut changes: Vec<(ChatId, usize)> = current
            .iter()
            .filter(|(id, count)| self.unread.get(id).copied().unwrap_or(0) != **count)
            .map(|(id, count)| (*id, *count))
            .collect();
        for (id, previous) in &self.unread {
            if *previous != 0 && !current.contains_key(id) {
                changes.push((*id, 0));
            }
        }
        changes
    }

    /// Record that the UI was told `chat_id` has `count` unread messages.
    pub fn report_unread(&mut self, chat_id: ChatId, count: usize) {
        if count == 0 {
            self.unread.remove(&chat_id);
        } else {
            self.unread.insert(chat_id, count);
        }
    }

    fn record_message_count(&self) -> usize {
        self.records.iter().map(|r| r.messages.len()).sum()
    }
}
