//! [`Backend`] implementation over the local SQLite store.
//!
//! Every mutation is followed by a [`ChangeEvent`] on an in-process broadcast
//! channel, which plays the part of the platform's realtime feed. One
//! `LocalBackend` can be shared by several clients to simulate both sides of
//! a conversation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reonika_shared::constants::CHANNEL_CAPACITY;
use reonika_shared::{
    ChangeEvent, ChangeKind, Chat, ChatId, Clock, ConversationRecord, Message, MessageId, Payload,
    ReonikaError, Result, Table, UserId,
};
use reonika_store::{Database, StoreError};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::backend::{Backend, ChangeSubscription};
use crate::presence::{PresenceHub, PresenceSubscription};

pub struct LocalBackend {
    db: Arc<Mutex<Database>>,
    clock: Arc<dyn Clock>,
    changes: broadcast::Sender<ChangeEvent>,
    presence: PresenceHub,
}

impl LocalBackend {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self::with_shared(Arc::new(Mutex::new(db)), clock)
    }

    pub fn with_shared(db: Arc<Mutex<Database>>, clock: Arc<dyn Clock>) -> Self {
        let (changes, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            db,
            clock,
            changes,
            presence: PresenceHub::new(),
        }
    }

    /// The underlying store, for setup code (profiles) and inspection.
    pub fn database(&self) -> Arc<Mutex<Database>> {
        self.db.clone()
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> reonika_store::Result<T>) -> Result<T> {
        let guard = self
            .db
            .lock()
            .map_err(|e| ReonikaError::NetworkFailure(format!("Lock poisoned: {e}")))?;
        f(&guard).map_err(ReonikaError::from)
    }

    fn publish(&self, table: Table, kind: ChangeKind, chat_id: ChatId, record_id: uuid::Uuid) {
        // No subscribers is not an error.
        let _ = self.changes.send(ChangeEvent {
            table,
            kind,
            chat_id,
            record_id,
        });
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn validate_session(&self, user: UserId) -> Result<bool> {
        self.with_db(|db| match db.get_profile(user) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e),
        })
    }

    async fn fetch_conversations(&self, user: UserId) -> Result<Vec<ConversationRecord>> {
        let now = self.clock.now();
        self.with_db(|db| db.conversations_for_user(user, now))
    }

    async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>> {
        let now = self.clock.now();
        self.with_db(|db| db.list_visible_messages(chat_id, now))
    }

    async fn create_message(&self, chat_id: ChatId, sender: UserId, payload: Payload) -> Result<Message> {
        let now = self.clock.now();
        let message = self.with_db(|db| db.create_message(chat_id, sender, payload, now))?;
        self.publish(Table::Messages, ChangeKind::Insert, chat_id, message.id.0);
        Ok(message)
    }

    async fn mark_messages_read(&self, chat_id: ChatId, reader: UserId) -> Result<usize> {
        let now = self.clock.now();
        let changed = self.with_db(|db| db.mark_messages_read(chat_id, reader, now))?;
        if changed > 0 {
            self.publish(Table::Messages, ChangeKind::Update, chat_id, chat_id.0);
        }
        Ok(changed)
    }

    async fn create_or_get_conversation(&self, user: UserId, other: UserId) -> Result<Chat> {
        let now = self.clock.now();
        let chat = self.with_db(|db| db.create_or_get_chat(user, other, now))?;
        if chat.created_at == chat.updated_at {
            self.publish(Table::Chats, ChangeKind::Insert, chat.id, chat.id.0);
        }
        Ok(chat)
    }

    async fn soft_delete_conversation(&self, chat_id: ChatId, requester: UserId) -> Result<()> {
        let now = self.clock.now();
        self.with_db(|db| db.soft_delete_chat(chat_id, requester, now))?;
        self.publish(Table::Chats, ChangeKind::Update, chat_id, chat_id.0);
        Ok(())
    }

    async fn soft_delete_message(&self, message_id: MessageId, requester: UserId) -> Result<()> {
        let now = self.clock.now();
        let chat_id = self.with_db(|db| {
            db.soft_delete_message(message_id, requester, now)?;
            Ok(db.get_message(message_id)?.chat_id)
        })?;
        self.publish(Table::Messages, ChangeKind::Update, chat_id, message_id.0);
        Ok(())
    }

    async fn purge_expired_messages(&self, requester: UserId) -> Result<usize> {
        let now = self.clock.now();
        let purged = self.with_db(|db| db.purge_expired_messages(requester, now))?;

        let chats: HashSet<ChatId> = purged.iter().map(|(chat, _)| *chat).collect();
        for (chat_id, message_id) in &purged {
            debug!(chat = %chat_id, message = %message_id, "purged expired message");
        }
        for chat_id in chats {
            self.publish(Table::Messages, ChangeKind::Delete, chat_id, chat_id.0);
        }
        if !purged.is_empty() {
            info!(count = purged.len(), requester = %requester, "expired messages purged");
        }
        Ok(purged.len())
    }

    fn subscribe_to_changes(&self, tables: &[Table]) -> ChangeSubscription {
        ChangeSubscription::new(self.changes.subscribe(), tables)
    }

    fn subscribe_to_presence(&self, channel: &str, me: UserId) -> PresenceSubscription {
        self.presence.subscribe(channel, me)
    }
}
