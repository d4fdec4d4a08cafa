//! Read/unread reconciliation.
//!
//! Read receipts are best effort: the remote mark is fire-and-forget, the
//! local view is updated optimistically by the coordinator, and failures
//! only reach the log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reonika_shared::{visibility, ChatId, Message, Result, UserId};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::Backend;

#[derive(Clone)]
pub struct ReadReconciler {
    backend: Arc<dyn Backend>,
    me: UserId,
}

impl ReadReconciler {
    pub fn new(backend: Arc<dyn Backend>, me: UserId) -> Self {
        Self { backend, me }
    }

    /// Mark every visible partner message in `chat_id` as read. Calling it
    /// again when nothing is unread changes nothing.
    pub async fn mark_read(&self, chat_id: ChatId) -> Result<usize> {
        let changed = self.backend.mark_messages_read(chat_id, self.me).await?;
        debug!(chat = %chat_id, changed, "marked messages read");
        Ok(changed)
    }

    /// Fire-and-forget variant; errors are logged and dropped.
    pub fn mark_read_in_background(&self, chat_id: ChatId) -> JoinHandle<()> {
        let reconciler = self.clone();
        tokio::spawn(async move {
            if let Err(e) = reconciler.mark_read(chat_id).await {
                warn!(chat = %chat_id, error = %e, "read receipt failed, will retry on next view");
            }
        })
    }

    pub fn unread_count(&self, messages: &[Message], now: DateTime<Utc>) -> usize {
        visibility::unread_count(messages, self.me, now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use reonika_shared::{Clock, ManualClock, Payload};
    use reonika_store::Database;

    use super::*;
    use crate::local::LocalBackend;

    #[tokio::test]
    async fn test_mark_read_twice_goes_to_zero_and_stays() {
        let clock = ManualClock::new(Utc::now());
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(
            Database::open_in_memory().unwrap(),
            Arc::new(clock.clone()),
        ));
        let a = UserId::new();
        let b = UserId::new();
        let chat = backend.create_or_get_conversation(a, b).await.unwrap();
        for text in ["one", "two", "three"] {
            backend.create_message(chat.id, a, Payload::text(text)).await.unwrap();
        }

        let reconciler = ReadReconciler::new(backend.clone(), b);
        let now = clock.now();
        let before = backend.fetch_messages(chat.id).await.unwrap();
        assert_eq!(reconciler.unread_count(&before, now), 3);

        assert_eq!(reconciler.mark_read(chat.id).await.unwrap(), 3);
        let after = backend.fetch_messages(chat.id).await.unwrap();
        assert_eq!(reconciler.unread_count(&after, now), 0);

        assert_eq!(reconciler.mark_read(chat.id).await.unwrap(), 0);
        let again = backend.fetch_messages(chat.id).await.unwrap();
        assert_eq!(reconciler.unread_count(&again, now), 0);
    }

    #[tokio::test]
    async fn test_expired_message_is_never_unread() {
        let clock = ManualClock::new(Utc::now());
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(
            Database::open_in_memory().unwrap(),
            Arc::new(clock.clone()),
        ));
        let a = UserId::new();
        let b = UserId::new();
        let chat = backend.create_or_get_conversation(a, b).await.unwrap();
        let sent = backend.create_message(chat.id, a, Payload::text("x")).await.unwrap();

        let reconciler = ReadReconciler::new(backend.clone(), b);
        let stale_cache = vec![sent];
        clock.advance(Duration::hours(24));
        assert_eq!(reconciler.unread_count(&stale_cache, clock.now()), 0);
        // The expired row is not marked read either.
        assert_eq!(reconciler.mark_read(chat.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_background_failure_is_swallowed() {
        let backend: Arc<dyn Backend> = Arc::new(LocalBackend::new(
            Database::open_in_memory().unwrap(),
            Arc::new(reonika_shared::SystemClock),
        ));
        let reconciler = ReadReconciler::new(backend, UserId::new());
        // Unknown chat: the remote call fails, the task still completes.
        reconciler
            .mark_read_in_background(ChatId::new())
            .await
            .expect("task should not panic");
    }
}
