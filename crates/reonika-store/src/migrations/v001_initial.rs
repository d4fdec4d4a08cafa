//! v001 -- Initial schema creation.
//!
//! Creates the three core tables: `profiles`, `chats` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Profiles
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS profiles (
    id           TEXT PRIMARY KEY NOT NULL,   -- auth user id (UUID)
    display_name TEXT NOT NULL,
    avatar_url   TEXT,
    created_at   TEXT NOT NULL                -- RFC-3339, UTC, millis
);

-- ----------------------------------------------------------------
-- Chats (two-party)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    user1_id   TEXT NOT NULL,                 -- initiator
    user2_id   TEXT NOT NULL,
    pair_lo    TEXT NOT NULL,                 -- min(user1_id, user2_id)
    pair_hi    TEXT NOT NULL,                 -- max(user1_id, user2_id)
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    is_deleted INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1

    CHECK (user1_id <> user2_id)
);

-- At most one live chat per unordered pair.
CREATE UNIQUE INDEX IF NOT EXISTS idx_chats_active_pair
    ON chats(pair_lo, pair_hi) WHERE is_deleted = 0;

CREATE INDEX IF NOT EXISTS idx_chats_user1 ON chats(user1_id);
CREATE INDEX IF NOT EXISTS idx_chats_user2 ON chats(user2_id);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id             TEXT PRIMARY KEY NOT NULL, -- UUID v4
    chat_id        TEXT NOT NULL,             -- FK -> chats(id)
    sender_id      TEXT NOT NULL,
    content        TEXT,
    image_url      TEXT,
    voice_url      TEXT,
    voice_duration INTEGER,
    created_at     TEXT NOT NULL,
    expires_at     TEXT NOT NULL,             -- created_at + TTL
    is_read        INTEGER NOT NULL DEFAULT 0,
    read_at        TEXT,
    is_deleted     INTEGER NOT NULL DEFAULT 0,
    deleted_at     TEXT,

    FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE,
    CHECK ((content IS NOT NULL) + (image_url IS NOT NULL) + (voice_url IS NOT NULL) = 1)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_created
    ON messages(chat_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
