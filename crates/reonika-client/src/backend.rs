//! The collaborator interface the state manager is written against.
//!
//! In production this is the hosted platform (auth, tables with row-level
//! security, realtime feed). [`LocalBackend`](crate::local::LocalBackend)
//! implements the same contract on top of `reonika-store`.

use async_trait::async_trait;
use reonika_shared::{
    ChangeEvent, Chat, ChatId, ConversationRecord, Message, MessageId, Payload, Result, Table,
    UserId,
};
use tokio::sync::broadcast;
use tracing::debug;

use crate::presence::PresenceSubscription;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Whether `user` still has a valid session.
    async fn validate_session(&self, user: UserId) -> Result<bool>;

    /// Live conversations of `user`, partner profile joined, with each
    /// chat's currently visible messages.
    async fn fetch_conversations(&self, user: UserId) -> Result<Vec<ConversationRecord>>;

    /// Visible messages of a chat, oldest first.
    async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>>;

    async fn create_message(&self, chat_id: ChatId, sender: UserId, payload: Payload) -> Result<Message>;

    /// Mark the partner's visible messages read. Idempotent; returns the
    /// number of messages that changed.
    async fn mark_messages_read(&self, chat_id: ChatId, reader: UserId) -> Result<usize>;

    /// Idempotent under concurrent duplicate creation from either side.
    async fn create_or_get_conversation(&self, user: UserId, other: UserId) -> Result<Chat>;

    async fn soft_delete_conversation(&self, chat_id: ChatId, requester: UserId) -> Result<()>;

    /// Only the requester's own messages may be deleted.
    async fn soft_delete_message(&self, message_id: MessageId, requester: UserId) -> Result<()>;

    /// Physically remove expired messages other participants sent to
    /// `requester`. Returns how many rows were removed.
    async fn purge_expired_messages(&self, requester: UserId) -> Result<usize>;

    /// Subscribe to row changes on the given tables.
    fn subscribe_to_changes(&self, tables: &[Table]) -> ChangeSubscription;

    /// Join a presence channel as `me`.
    fn subscribe_to_presence(&self, channel: &str, me: UserId) -> PresenceSubscription;
}

/// What a change subscription yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotice {
    Change(ChangeEvent),
    /// The subscriber fell behind and `n` events were dropped; the only safe
    /// reaction is a full refresh.
    Missed(u64),
}

/// Handle for a realtime change subscription. Dropping it unsubscribes.
pub struct ChangeSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    tables: Vec<Table>,
}

impl ChangeSubscription {
    pub fn new(rx: broadcast::Receiver<ChangeEvent>, tables: &[Table]) -> Self {
        Self {
            rx,
            tables: tables.to_vec(),
        }
    }

    /// Next notice for the subscribed tables, or `None` once the feed closes.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.tables.contains(&event.table) => {
                    return Some(ChangeNotice::Change(event))
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => return Some(ChangeNotice::Missed(n)),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {
        debug!(tables = ?self.tables, "unsubscribed from change feed");
    }
}
