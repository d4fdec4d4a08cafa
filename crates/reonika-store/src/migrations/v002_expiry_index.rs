use rusqlite::Connection;

// The sweeper scans by expiry across all chats of one user.
const UP_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_expires_at ON messages(expires_at);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
