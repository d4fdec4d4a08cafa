use chrono::{DateTime, Utc};
use reonika_shared::{ChatId, Message, MessageId, Payload, UserId};
use rusqlite::params;

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, normalize_ts, not_found, parse_opt_ts, parse_ts, parse_uuid};

const MESSAGE_COLUMNS: &str = "id, chat_id, sender_id, content, image_url, voice_url, voice_duration,
     created_at, expires_at, is_read, read_at, is_deleted, deleted_at";

impl Database {
    /// Validate and store a new message from `sender`, stamped at `now`.
    pub fn create_message(
        &self,
        chat_id: ChatId,
        sender: UserId,
        payload: Payload,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        payload
            .validate()
            .map_err(|e| StoreError::Validation(e.to_string()))?;

        let chat = self.get_chat(chat_id)?;
        if chat.is_deleted {
            return Err(StoreError::NotFound);
        }
        if !chat.has_participant(sender) {
            return Err(StoreError::PermissionDenied(format!(
                "{sender} is not a participant of {chat_id}"
            )));
        }

        let message = Message::new(chat_id, sender, payload, normalize_ts(now));
        self.insert_message(&message)?;
        self.touch_chat(chat_id, message.created_at)?;
        Ok(message)
    }

    /// Raw insert without participant checks.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        let voice = message.payload.as_voice();
        self.conn().execute(
            "INSERT INTO messages (id, chat_id, sender_id, content, image_url, voice_url,
                                   voice_duration, created_at, expires_at, is_read, read_at,
                                   is_deleted, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                message.id.to_string(),
                message.chat_id.to_string(),
                message.sender_id.to_string(),
                message.payload.content(),
                message.payload.image_url(),
                voice.map(|(url, _)| url),
                voice.map(|(_, secs)| secs),
                fmt_ts(message.created_at),
                fmt_ts(message.expires_at),
                message.is_read,
                message.read_at.map(fmt_ts),
                message.is_deleted,
                message.deleted_at.map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    /// Visible messages of a chat as of `now`, oldest first.
    pub fn list_visible_messages(&self, chat_id: ChatId, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS}
             FROM messages
             WHERE chat_id = ?1 AND is_deleted = 0 AND expires_at > ?2
             ORDER BY created_at ASC"
        ))?;

        let rows = stmt.query_map(params![chat_id.to_string(), fmt_ts(now)], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// Physical row count of a chat, expired and deleted rows included.
    pub fn count_message_rows(&self, chat_id: ChatId) -> Result<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ?1",
            params![chat_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Mark every visible message in the chat that `reader` did not send as
    /// read. Returns how many rows flipped; already-read rows are untouched.
    pub fn mark_messages_read(&self, chat_id: ChatId, reader: UserId, now: DateTime<Utc>) -> Result<usize> {
        let chat = self.get_chat(chat_id)?;
        if !chat.has_participant(reader) {
            return Err(StoreError::PermissionDenied(format!(
                "{reader} is not a participant of {chat_id}"
            )));
        }

        let now = fmt_ts(now);
        let affected = self.conn().execute(
            "UPDATE messages SET is_read = 1, read_at = ?1
             WHERE chat_id = ?2 AND sender_id <> ?3
               AND is_read = 0 AND is_deleted = 0 AND expires_at > ?1",
            params![now, chat_id.to_string(), reader.to_string()],
        )?;
        Ok(affected)
    }

    /// Soft-delete a message. Only its sender may do this.
    pub fn soft_delete_message(&self, id: MessageId, requester: UserId, now: DateTime<Utc>) -> Result<()> {
        let message = self.get_message(id)?;
        if message.sender_id != requester {
            return Err(StoreError::PermissionDenied(
                "only the sender can delete a message".into(),
            ));
        }
        if message.is_deleted {
            return Ok(());
        }

        self.conn().execute(
            "UPDATE messages SET is_deleted = 1, deleted_at = ?1 WHERE id = ?2",
            params![fmt_ts(now), id.to_string()],
        )?;
        Ok(())
    }

    /// Physically remove expired messages that other participants sent to
    /// `requester`. The requester's own messages are left in place.
    pub fn purge_expired_messages(&self, requester: UserId, now: DateTime<Utc>) -> Result<Vec<(ChatId, MessageId)>> {
        let user = requester.to_string();
        let now = fmt_ts(now);

        let mut stmt = self.conn().prepare(
            "SELECT m.chat_id, m.id
             FROM messages m
             JOIN chats c ON c.id = m.chat_id
             WHERE m.expires_at <= ?1
               AND m.sender_id <> ?2
               AND (c.user1_id = ?2 OR c.user2_id = ?2)",
        )?;
        let rows = stmt.query_map(params![now, user], |row| {
            let chat_str: String = row.get(0)?;
            let id_str: String = row.get(1)?;
            Ok((ChatId(parse_uuid(0, &chat_str)?), MessageId(parse_uuid(1, &id_str)?)))
        })?;
        let expired = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        for (_, id) in &expired {
            self.conn()
                .execute("DELETE FROM messages WHERE id = ?1", params![id.to_string()])?;
        }
        Ok(expired)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let chat_id_str: String = row.get(1)?;
    let sender_str: String = row.get(2)?;
    let content: Option<String> = row.get(3)?;
    let image_url: Option<String> = row.get(4)?;
    let voice_url: Option<String> = row.get(5)?;
    let voice_duration: Option<u32> = row.get(6)?;
    let created_str: String = row.get(7)?;
    let expires_str: String = row.get(8)?;
    let is_read: bool = row.get(9)?;
    let read_at: Option<String> = row.get(10)?;
    let is_deleted: bool = row.get(11)?;
    let deleted_at: Option<String> = row.get(12)?;

    let voice = voice_url.map(|url| (url, voice_duration.unwrap_or(0)));
    let payload = Payload::from_parts(content, image_url, voice).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Message {
        id: MessageId(parse_uuid(0, &id_str)?),
        chat_id: ChatId(parse_uuid(1, &chat_id_str)?),
        sender_id: UserId(parse_uuid(2, &sender_str)?),
        payload,
        created_at: parse_ts(7, &created_str)?,
        expires_at: parse_ts(8, &expires_str)?,
        is_read,
        read_at: parse_opt_ts(10, read_at)?,
        is_deleted,
        deleted_at: parse_opt_ts(12, deleted_at)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn setup() -> (Database, ChatId, UserId, UserId) {
        let db = Database::open_in_memory().unwrap();
        let a = UserId::new();
        let b = UserId::new();
        let chat = db.create_or_get_chat(a, b, Utc::now()).unwrap();
        (db, chat.id, a, b)
    }

    #[test]
    fn test_create_and_list_round_trip() {
        let (db, chat, a, _) = setup();
        let now = Utc::now();
        let sent = db.create_message(chat, a, Payload::voice("v.ogg", 12), now).unwrap();

        let listed = db.list_visible_messages(chat, now).unwrap();
        assert_eq!(listed, vec![sent.clone()]);
        assert_eq!(db.get_message(sent.id).unwrap(), sent);
    }

    #[test]
    fn test_create_rejects_outsider_and_empty_payload() {
        let (db, chat, a, _) = setup();
        assert!(matches!(
            db.create_message(chat, UserId::new(), Payload::text("hi"), Utc::now()),
            Err(StoreError::PermissionDenied(_))
        ));
        assert!(matches!(
            db.create_message(chat, a, Payload::text(" "), Utc::now()),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            db.create_message(ChatId::new(), a, Payload::text("hi"), Utc::now()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_expired_and_deleted_excluded() {
        let (db, chat, a, _) = setup();
        let t0 = Utc::now();
        let old = db.create_message(chat, a, Payload::text("old"), t0).unwrap();
        let gone = db
            .create_message(chat, a, Payload::text("gone"), t0 + Duration::hours(2))
            .unwrap();
        let kept = db
            .create_message(chat, a, Payload::image("p.png"), t0 + Duration::hours(3))
            .unwrap();
        db.soft_delete_message(gone.id, a, t0 + Duration::hours(4)).unwrap();

        let listed = db.list_visible_messages(chat, t0 + Duration::hours(25)).unwrap();
        assert_eq!(listed.iter().map(|m| m.id).collect::<Vec<_>>(), vec![kept.id]);
        assert!(db.get_message(old.id).is_ok());
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let (db, chat, a, b) = setup();
        let now = Utc::now();
        db.create_message(chat, a, Payload::text("1"), now).unwrap();
        db.create_message(chat, a, Payload::text("2"), now).unwrap();
        db.create_message(chat, b, Payload::text("mine"), now).unwrap();

        assert_eq!(db.mark_messages_read(chat, b, now).unwrap(), 2);
        assert_eq!(db.mark_messages_read(chat, b, now).unwrap(), 0);

        let listed = db.list_visible_messages(chat, now).unwrap();
        assert!(listed.iter().filter(|m| m.sender_id == a).all(|m| m.is_read && m.read_at.is_some()));
        assert!(listed.iter().filter(|m| m.sender_id == b).all(|m| !m.is_read));
    }

    #[test]
    fn test_only_sender_can_delete() {
        let (db, chat, a, b) = setup();
        let m = db.create_message(chat, a, Payload::text("x"), Utc::now()).unwrap();
        assert!(matches!(
            db.soft_delete_message(m.id, b, Utc::now()),
            Err(StoreError::PermissionDenied(_))
        ));
        db.soft_delete_message(m.id, a, Utc::now()).unwrap();
        db.soft_delete_message(m.id, a, Utc::now()).unwrap();
        assert!(db.get_message(m.id).unwrap().is_deleted);
        assert!(matches!(
            db.soft_delete_message(MessageId::new(), a, Utc::now()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_purge_spares_own_messages() {
        let (db, chat, a, b) = setup();
        let t0 = Utc::now();
        let from_a = db.create_message(chat, a, Payload::text("from a"), t0).unwrap();
        let from_b = db.create_message(chat, b, Payload::text("from b"), t0).unwrap();
        let after = t0 + Duration::hours(24) + Duration::seconds(1);

        // Nothing has expired yet.
        assert!(db.purge_expired_messages(a, t0).unwrap().is_empty());

        let purged_by_a = db.purge_expired_messages(a, after).unwrap();
        assert_eq!(purged_by_a, vec![(chat, from_b.id)]);
        assert!(db.get_message(from_a.id).is_ok());

        let purged_by_b = db.purge_expired_messages(b, after).unwrap();
        assert_eq!(purged_by_b, vec![(chat, from_a.id)]);
        assert_eq!(db.count_message_rows(chat).unwrap(), 0);
    }

    #[test]
    fn test_purge_ignores_foreign_chats() {
        let (db, chat, a, _) = setup();
        let t0 = Utc::now();
        db.create_message(chat, a, Payload::text("x"), t0).unwrap();
        let stranger = UserId::new();
        assert!(db
            .purge_expired_messages(stranger, t0 + Duration::days(2))
            .unwrap()
            .is_empty());
        assert_eq!(db.count_message_rows(chat).unwrap(), 1);
    }
}
