use reonika_shared::{ChatId, ChatSummary, Message, UserId};
use serde::Serialize;
use tokio::sync::mpsc;

pub const EVENT_CONVERSATIONS_CHANGED: &str = "conversations-changed";
pub const EVENT_MESSAGES_CHANGED: &str = "messages-changed";
pub const EVENT_UNREAD_COUNT_CHANGED: &str = "unread-count-changed";
pub const EVENT_PRESENCE_CHANGED: &str = "presence-changed";

/// Render instructions for the UI layer, emitted after each coalesced
/// refresh or optimistic update.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ViewEvent {
    ConversationsChanged {
        conversations: Vec<ChatSummary>,
    },
    #[serde(rename_all = "camelCase")]
    MessagesChanged {
        chat_id: ChatId,
        messages: Vec<Message>,
    },
    #[serde(rename_all = "camelCase")]
    UnreadCountChanged {
        chat_id: ChatId,
        count: usize,
    },
    PresenceChanged {
        online: Vec<UserId>,
    },
}

impl ViewEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConversationsChanged { .. } => EVENT_CONVERSATIONS_CHANGED,
            Self::MessagesChanged { .. } => EVENT_MESSAGES_CHANGED,
            Self::UnreadCountChanged { .. } => EVENT_UNREAD_COUNT_CHANGED,
            Self::PresenceChanged { .. } => EVENT_PRESENCE_CHANGED,
        }
    }
}

/// Hand an event to the UI without ever blocking the caller. Returns whether
/// the event was queued.
pub fn emit_event(tx: &mpsc::Sender<ViewEvent>, event: ViewEvent) -> bool {
    let name = event.name();
    match tx.try_send(event) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(event = name, error = %e, "Failed to emit event");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let chat_id = ChatId::new();
        let json = serde_json::to_value(ViewEvent::UnreadCountChanged { chat_id, count: 3 }).unwrap();
        assert_eq!(json["event"], EVENT_UNREAD_COUNT_CHANGED);
        assert_eq!(json["count"], 3);
        assert_eq!(json["chatId"], chat_id.0.to_string());
    }
}
