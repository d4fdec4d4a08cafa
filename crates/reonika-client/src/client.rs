//! The client facade the UI talks to.
//!
//! [`Client::start`] wires the coordinator to its trigger sources (realtime
//! bridge, poller, presence task, sweeper) and hands back the receiving end
//! of the view-event channel. Foreground actions call the backend directly
//! and report their outcome to the coordinator, so nothing is shown as done
//! before the backend accepted it.

use std::sync::{Arc, RwLock};

use reonika_shared::constants::CHANNEL_CAPACITY;
use reonika_shared::{
    Chat, ChatId, Clock, Message, MessageId, Payload, PresenceStatus, ReonikaError, Result, UserId,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::Backend;
use crate::config::ClientConfig;
use crate::coordinator::{
    spawn_coordinator, CoordinatorCommand, CoordinatorHandle, RefreshTarget, RefreshTrigger,
};
use crate::events::ViewEvent;
use crate::poll::spawn_poller;
use crate::presence::{spawn_presence_task, PresenceTracker};
use crate::realtime::{spawn_realtime_bridge, WATCHED_TABLES};
use crate::reconciler::ReadReconciler;
use crate::state::ViewSnapshot;
use crate::sweeper::spawn_sweeper;

pub struct Client {
    backend: Arc<dyn Backend>,
    me: UserId,
    coordinator: CoordinatorHandle,
    coordinator_task: JoinHandle<()>,
    reconciler: ReadReconciler,
    presence: Arc<RwLock<PresenceTracker>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Client {
    /// Start every background task for `me` and load the conversation list.
    pub async fn start(
        backend: Arc<dyn Backend>,
        me: UserId,
        config: &ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::Receiver<ViewEvent>) {
        let (view_tx, view_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (coordinator, coordinator_task) =
            spawn_coordinator(backend.clone(), me, clock, view_tx.clone());

        let changes = backend.subscribe_to_changes(&WATCHED_TABLES);
        let mut presence_sub = backend.subscribe_to_presence(&config.presence_channel, me);
        presence_sub.track(PresenceStatus::Online);
        let presence = Arc::new(RwLock::new(PresenceTracker::new()));

        let tasks = vec![
            spawn_realtime_bridge(changes, coordinator.clone()),
            spawn_poller(coordinator.clone(), config.poll_interval),
            spawn_presence_task(presence_sub, presence.clone(), view_tx),
            spawn_sweeper(backend.clone(), me, config.sweep_interval),
        ];

        coordinator
            .refresh(RefreshTarget::Conversations, RefreshTrigger::Navigation)
            .await;
        info!(user = %me, "client started");

        let client = Self {
            reconciler: ReadReconciler::new(backend.clone(), me),
            backend,
            me,
            coordinator,
            coordinator_task,
            presence,
            tasks,
        };
        (client, view_rx)
    }

    pub fn me(&self) -> UserId {
        self.me
    }

    // -- Navigation --

    pub async fn open_chat(&self, chat_id: ChatId) -> Result<()> {
        self.command(CoordinatorCommand::OpenChat(chat_id)).await
    }

    pub async fn close_chat(&self) -> Result<()> {
        self.command(CoordinatorCommand::CloseChat).await
    }

    /// Ask for a refresh of both the conversation list and the open chat.
    pub async fn refresh(&self) -> Result<()> {
        if self.coordinator.refresh_all(RefreshTrigger::Navigation).await {
            Ok(())
        } else {
            Err(stopped())
        }
    }

    // -- Messages --

    pub async fn send_message(&self, chat_id: ChatId, payload: Payload) -> Result<Message> {
        if let Err(e) = payload.validate() {
            return Err(report("send message", e));
        }
        let message = self
            .backend
            .create_message(chat_id, self.me, payload)
            .await
            .map_err(|e| report("send message", e))?;
        info!(chat = %chat_id, message = %message.id, "message sent");
        self.command(CoordinatorCommand::MessageSent(message.clone()))
            .await?;
        Ok(message)
    }

    pub async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<Message> {
        self.send_message(chat_id, Payload::text(text)).await
    }

    /// Delete one of the local user's messages. A message that is already
    /// gone counts as deleted.
    pub async fn delete_message(&self, message_id: MessageId) -> Result<()> {
        match self.backend.soft_delete_message(message_id, self.me).await {
            Ok(()) => {}
            Err(ReonikaError::NotFound(_)) => {
                info!(message = %message_id, "message already gone");
            }
            Err(e) => return Err(report("delete message", e)),
        }
        self.command(CoordinatorCommand::MessageDeleted(message_id))
            .await
    }

    // -- Conversations --

    /// Find or create the chat with `other` and open it.
    pub async fn start_conversation(&self, other: UserId) -> Result<Chat> {
        let chat = self
            .backend
            .create_or_get_conversation(self.me, other)
            .await
            .map_err(|e| report("start conversation", e))?;
        info!(chat = %chat.id, partner = %other, "conversation ready");
        self.open_chat(chat.id).await?;
        if !self
            .coordinator
            .refresh(RefreshTarget::Conversations, RefreshTrigger::Navigation)
            .await
        {
            return Err(stopped());
        }
        Ok(chat)
    }

    pub async fn delete_conversation(&self, chat_id: ChatId) -> Result<()> {
        match self.backend.soft_delete_conversation(chat_id, self.me).await {
            Ok(()) => {}
            Err(ReonikaError::NotFound(_)) => {
                info!(chat = %chat_id, "conversation already gone");
            }
            Err(e) => return Err(report("delete conversation", e)),
        }
        self.command(CoordinatorCommand::ChatDeleted(chat_id)).await
    }

    /// Mark the partner's messages in `chat_id` read right away.
    pub async fn mark_read(&self, chat_id: ChatId) -> Result<usize> {
        self.reconciler.mark_read(chat_id).await
    }

    /// Unread count of `chat_id` as currently rendered.
    pub async fn unread_count(&self, chat_id: ChatId) -> usize {
        self.snapshot()
            .await
            .and_then(|s| s.conversations.into_iter().find(|c| c.chat_id == chat_id))
            .map(|c| c.unread_count)
            .unwrap_or(0)
    }

    // -- Presence --

    pub fn is_online(&self, user: &UserId) -> bool {
        self.presence
            .read()
            .map(|tracker| tracker.is_online(user))
            .unwrap_or(false)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.presence
            .read()
            .map(|tracker| tracker.online_users())
            .unwrap_or_default()
    }

    // -- Lifecycle --

    pub async fn snapshot(&self) -> Option<ViewSnapshot> {
        self.coordinator.snapshot().await
    }

    /// Stop all background tasks. Leaving the presence channel happens as
    /// the presence task is torn down.
    pub async fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        for task in self.tasks {
            let _ = task.await;
        }
        self.coordinator.shutdown().await;
        let _ = self.coordinator_task.await;
        info!(user = %self.me, "client stopped");
    }

    async fn command(&self, cmd: CoordinatorCommand) -> Result<()> {
        if self.coordinator.send(cmd).await {
            Ok(())
        } else {
            Err(stopped())
        }
    }
}

fn stopped() -> ReonikaError {
    ReonikaError::NetworkFailure("client is shut down".to_string())
}

fn report(action: &str, e: ReonikaError) -> ReonikaError {
    warn!(action, notice = ?e.notice(), error = %e, "action failed");
    e
}
