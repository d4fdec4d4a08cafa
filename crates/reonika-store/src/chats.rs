//! CRUD operations for [`Chat`] records.

use chrono::{DateTime, Utc};
use reonika_shared::{Chat, ChatId, ConversationRecord, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, is_unique_violation, normalize_ts, not_found, parse_ts, parse_uuid};

const CHAT_COLUMNS: &str = "id, user1_id, user2_id, created_at, updated_at, is_deleted";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Return the live chat between `user` and `other`, creating it if none
    /// exists. Safe to call from both sides at once: whoever loses the insert
    /// race gets the winner's row.
    pub fn create_or_get_chat(&self, user: UserId, other: UserId, now: DateTime<Utc>) -> Result<Chat> {
        if user == other {
            return Err(StoreError::Validation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        if let Some(existing) = self.find_active_chat(user, other)? {
            return Ok(existing);
        }

        self.insert_chat_or_refetch(user, other, now)
    }

    /// Insert a new chat row; on a unique-constraint conflict re-read the
    /// chat that won.
    pub fn insert_chat_or_refetch(&self, user: UserId, other: UserId, now: DateTime<Utc>) -> Result<Chat> {
        let now = normalize_ts(now);
        let (lo, hi) = ordered_pair(user, other);
        let chat = Chat {
            id: ChatId::new(),
            user1_id: user,
            user2_id: other,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        };

        let inserted = self.conn().execute(
            "INSERT INTO chats (id, user1_id, user2_id, pair_lo, pair_hi, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                chat.id.to_string(),
                user.to_string(),
                other.to_string(),
                lo.to_string(),
                hi.to_string(),
                fmt_ts(now),
                fmt_ts(now),
            ],
        );

        match inserted {
            Ok(_) => {
                tracing::debug!(chat = %chat.id, "created chat");
                Ok(chat)
            }
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(user = %user, other = %other, "chat already exists, re-fetching");
                self.find_active_chat(user, other)?.ok_or(StoreError::NotFound)
            }
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// The live chat for an unordered pair, if any.
    pub fn find_active_chat(&self, a: UserId, b: UserId) -> Result<Option<Chat>> {
        let (lo, hi) = ordered_pair(a, b);
        let chat = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {CHAT_COLUMNS} FROM chats
                     WHERE pair_lo = ?1 AND pair_hi = ?2 AND is_deleted = 0"
                ),
                params![lo.to_string(), hi.to_string()],
                row_to_chat,
            )
            .optional()?;
        Ok(chat)
    }

    /// Fetch a single chat by id, deleted or not.
    pub fn get_chat(&self, id: ChatId) -> Result<Chat> {
        self.conn()
            .query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = ?1"),
                params![id.to_string()],
                row_to_chat,
            )
            .map_err(not_found)
    }

    /// Live chats of `user`, most recently updated first.
    pub fn list_chats_for_user(&self, user: UserId) -> Result<Vec<Chat>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CHAT_COLUMNS} FROM chats
             WHERE (user1_id = ?1 OR user2_id = ?1) AND is_deleted = 0
             ORDER BY updated_at DESC"
        ))?;

        let rows = stmt.query_map(params![user.to_string()], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Live chats of `user` joined with the partner's profile and the chat's
    /// visible messages as of `now`.
    pub fn conversations_for_user(&self, user: UserId, now: DateTime<Utc>) -> Result<Vec<ConversationRecord>> {
        let chats = self.list_chats_for_user(user)?;
        let mut records = Vec::with_capacity(chats.len());
        for chat in chats {
            let partner_id = chat.partner_of(user).ok_or_else(|| {
                StoreError::PermissionDenied(format!("{user} is not a participant of {}", chat.id))
            })?;
            let partner = self.profile_or_unknown(partner_id)?;
            let messages = self.list_visible_messages(chat.id, now)?;
            records.push(ConversationRecord {
                chat,
                partner,
                messages,
            });
        }
        Ok(records)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub(crate) fn touch_chat(&self, id: ChatId, now: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE chats SET updated_at = ?1 WHERE id = ?2",
            params![fmt_ts(now), id.to_string()],
        )?;
        Ok(())
    }

    /// Soft-delete a chat. Only a participant may do this; deleting an
    /// already-deleted chat is a no-op.
    pub fn soft_delete_chat(&self, id: ChatId, requester: UserId, now: DateTime<Utc>) -> Result<()> {
        let chat = self.get_chat(id)?;
        if !chat.has_participant(requester) {
            return Err(StoreError::PermissionDenied(format!(
                "{requester} is not a participant of {id}"
            )));
        }
        if chat.is_deleted {
            return Ok(());
        }

        self.conn().execute(
            "UPDATE chats SET is_deleted = 1, updated_at = ?1 WHERE id = ?2",
            params![fmt_ts(now), id.to_string()],
        )?;
        tracing::debug!(chat = %id, by = %requester, "soft-deleted chat");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ordered_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Map a `rusqlite::Row` to a [`Chat`].
fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    let id_str: String = row.get(0)?;
    let user1_str: String = row.get(1)?;
    let user2_str: String = row.get(2)?;
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;
    let is_deleted: bool = row.get(5)?;

    Ok(Chat {
        id: ChatId(parse_uuid(0, &id_str)?),
        user1_id: UserId(parse_uuid(1, &user1_str)?),
        user2_id: UserId(parse_uuid(2, &user2_str)?),
        created_at: parse_ts(3, &created_str)?,
        updated_at: parse_ts(4, &updated_str)?,
        is_deleted,
    })
}
