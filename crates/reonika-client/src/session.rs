//! Session gate for the main view.

use std::time::Duration;

use reonika_shared::UserId;
use tracing::{info, warn};

use crate::backend::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Valid,
    Invalid,
}

impl SessionStatus {
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }
}

/// Check the session of `user`. A failed or slow check counts as invalid so
/// the caller never hangs on the gate.
pub async fn check_session(backend: &dyn Backend, user: UserId, limit: Duration) -> SessionStatus {
    match tokio::time::timeout(limit, backend.validate_session(user)).await {
        Ok(Ok(true)) => {
            info!(user = %user, "session valid");
            SessionStatus::Valid
        }
        Ok(Ok(false)) => {
            info!(user = %user, "no session for user");
            SessionStatus::Invalid
        }
        Ok(Err(e)) => {
            warn!(user = %user, error = %e, "session check failed");
            SessionStatus::Invalid
        }
        Err(_) => {
            warn!(user = %user, timeout_ms = limit.as_millis() as u64, "session check timed out");
            SessionStatus::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::Utc;
    use reonika_shared::{
        Chat, ChatId, ConversationRecord, Message, MessageId, Payload, Profile, Result, SystemClock,
        Table,
    };
    use reonika_store::Database;

    use super::*;
    use crate::backend::ChangeSubscription;
    use crate::local::LocalBackend;
    use crate::presence::PresenceSubscription;

    /// Never answers the session check.
    struct Hanging(LocalBackend);

    #[async_trait]
    impl Backend for Hanging {
        async fn validate_session(&self, _user: UserId) -> Result<bool> {
            std::future::pending().await
        }
        async fn fetch_conversations(&self, user: UserId) -> Result<Vec<ConversationRecord>> {
            self.0.fetch_conversations(user).await
        }
        async fn fetch_messages(&self, chat_id: ChatId) -> Result<Vec<Message>> {
            self.0.fetch_messages(chat_id).await
        }
        async fn create_message(
            &self,
            chat_id: ChatId,
            sender: UserId,
            payload: Payload,
        ) -> Result<Message> {
            self.0.create_message(chat_id, sender, payload).await
        }
        async fn mark_messages_read(&self, chat_id: ChatId, reader: UserId) -> Result<usize> {
            self.0.mark_messages_read(chat_id, reader).await
        }
        async fn create_or_get_conversation(&self, user: UserId, other: UserId) -> Result<Chat> {
            self.0.create_or_get_conversation(user, other).await
        }
        async fn soft_delete_conversation(&self, chat_id: ChatId, requester: UserId) -> Result<()> {
            self.0.soft_delete_conversation(chat_id, requester).await
        }
        async fn soft_delete_message(&self, message_id: MessageId, requester: UserId) -> Result<()> {
            self.0.soft_delete_message(message_id, requester).await
        }
        async fn purge_expired_messages(&self, requester: UserId) -> Result<usize> {
            self.0.purge_expired_messages(requester).await
        }
        fn subscribe_to_changes(&self, tables: &[Table]) -> ChangeSubscription {
            self.0.subscribe_to_changes(tables)
        }
        fn subscribe_to_presence(&self, channel: &str, me: UserId) -> PresenceSubscription {
            self.0.subscribe_to_presence(channel, me)
        }
    }

    fn local() -> LocalBackend {
        LocalBackend::new(Database::open_in_memory().unwrap(), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_known_user_is_valid() {
        let backend = local();
        let user = UserId::new();
        backend
            .database()
            .lock()
            .unwrap()
            .upsert_profile(
                &Profile {
                    id: user,
                    display_name: "Ines".into(),
                    avatar_url: None,
                },
                Utc::now(),
            )
            .unwrap();

        let status = check_session(&backend, user, Duration::from_secs(1)).await;
        assert!(status.is_valid());
    }

    #[tokio::test]
    async fn test_unknown_user_is_invalid() {
        let backend = local();
        let status = check_session(&backend, UserId::new(), Duration::from_secs(1)).await;
        assert_eq!(status, SessionStatus::Invalid);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_check_times_out_as_invalid() {
        let backend = Hanging(local());
        let status = check_session(&backend, UserId::new(), Duration::from_secs(8)).await;
        assert_eq!(status, SessionStatus::Invalid);
    }
}
