//! Domain records exchanged between the backend and the state manager.
//!
//! Every struct derives `Serialize` so it can be handed straight to the
//! rendering layer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{MAX_TEXT_LEN, MESSAGE_TTL_HOURS};
use crate::error::{ReonikaError, Result};
use crate::types::{ChatId, MessageId, UserId};

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The primary payload of a message. Exactly one kind per message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Text { content: String },
    Image { url: String },
    Voice { url: String, duration_secs: u32 },
}

impl Payload {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::Image { url: url.into() }
    }

    pub fn voice(url: impl Into<String>, duration_secs: u32) -> Self {
        Self::Voice {
            url: url.into(),
            duration_secs,
        }
    }

    /// Build a payload from the optional columns a composer or a table row
    /// carries. Fails unless exactly one of them is present.
    pub fn from_parts(
        content: Option<String>,
        image_url: Option<String>,
        voice: Option<(String, u32)>,
    ) -> Result<Self> {
        let content = content.filter(|c| !c.trim().is_empty());
        let payload = match (content, image_url, voice) {
            (Some(content), None, None) => Self::Text { content },
            (None, Some(url), None) => Self::Image { url },
            (None, None, Some((url, duration_secs))) => Self::Voice { url, duration_secs },
            (None, None, None) => {
                return Err(ReonikaError::Validation("message has no content".into()))
            }
            _ => {
                return Err(ReonikaError::Validation(
                    "message must carry exactly one of text, image or voice".into(),
                ))
            }
        };
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Text { content } => {
                if content.trim().is_empty() {
                    return Err(ReonikaError::Validation("message has no content".into()));
                }
                if content.chars().count() > MAX_TEXT_LEN {
                    return Err(ReonikaError::Validation(format!(
                        "message exceeds {MAX_TEXT_LEN} characters"
                    )));
                }
            }
            Self::Image { url } => {
                if url.trim().is_empty() {
                    return Err(ReonikaError::Validation("image reference is empty".into()));
                }
            }
            Self::Voice { url, duration_secs } => {
                if url.trim().is_empty() {
                    return Err(ReonikaError::Validation("voice reference is empty".into()));
                }
                if *duration_secs == 0 {
                    return Err(ReonikaError::Validation("voice message has no duration".into()));
                }
            }
        }
        Ok(())
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Text { content } => Some(content),
            _ => None,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            Self::Image { url } => Some(url),
            _ => None,
        }
    }

    pub fn as_voice(&self) -> Option<(&str, u32)> {
        match self {
            Self::Voice { url, duration_secs } => Some((url, *duration_secs)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One unit of conversation content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
    /// `created_at` plus the fixed TTL.
    pub expires_at: DateTime<Utc>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(chat_id: ChatId, sender_id: UserId, payload: Payload, now: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::new(),
            chat_id,
            sender_id,
            payload,
            created_at: now,
            expires_at: expiry_for(now),
            is_read: false,
            read_at: None,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

/// Expiration timestamp for a message created at `created_at`.
pub fn expiry_for(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(MESSAGE_TTL_HOURS)
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A two-party conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub user1_id: UserId,
    pub user2_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Chat {
    pub fn has_participant(&self, user: UserId) -> bool {
        self.user1_id == user || self.user2_id == user
    }

    /// The other participant, or `None` if `me` is not part of this chat.
    pub fn partner_of(&self, me: UserId) -> Option<UserId> {
        if self.user1_id == me {
            Some(self.user2_id)
        } else if self.user2_id == me {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl Profile {
    /// Placeholder used when a partner has no profile row yet.
    pub fn unknown(id: UserId) -> Self {
        Self {
            id,
            display_name: format!("user-{}", id.short()),
            avatar_url: None,
        }
    }
}

/// A conversation as returned by `fetch_conversations`: the chat, the
/// partner's profile and the chat's non-deleted messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationRecord {
    pub chat: Chat,
    pub partner: Profile,
    pub messages: Vec<Message>,
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Chats,
    Messages,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change notification from the realtime feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub chat_id: ChatId,
    pub record_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_requires_exactly_one_part() {
        assert!(matches!(
            Payload::from_parts(None, None, None),
            Err(ReonikaError::Validation(_))
        ));
        assert!(matches!(
            Payload::from_parts(Some("   ".into()), None, None),
            Err(ReonikaError::Validation(_))
        ));
        assert!(matches!(
            Payload::from_parts(Some("hi".into()), Some("img.png".into()), None),
            Err(ReonikaError::Validation(_))
        ));

        let p = Payload::from_parts(None, None, Some(("v.webm".into(), 7))).unwrap();
        assert_eq!(p.as_voice(), Some(("v.webm", 7)));
    }

    #[test]
    fn test_payload_text_too_long() {
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        assert!(Payload::text(long).validate().is_err());
        assert!(Payload::text("hello").validate().is_ok());
    }

    #[test]
    fn test_message_expiry_is_created_plus_ttl() {
        let now = Utc::now();
        let m = Message::new(ChatId::new(), UserId::new(), Payload::text("hi"), now);
        assert_eq!(m.expires_at - m.created_at, Duration::hours(24));
        assert!(!m.is_read);
        assert!(!m.is_deleted);
    }

    #[test]
    fn test_partner_lookup() {
        let a = UserId::new();
        let b = UserId::new();
        let now = Utc::now();
        let chat = Chat {
            id: ChatId::new(),
            user1_id: a,
            user2_id: b,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        };
        assert_eq!(chat.partner_of(a), Some(b));
        assert_eq!(chat.partner_of(b), Some(a));
        assert_eq!(chat.partner_of(UserId::new()), None);
    }
}
