//! CRUD operations for [`Profile`] records.

use chrono::{DateTime, Utc};
use reonika_shared::{Profile, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::rows::{fmt_ts, not_found, parse_uuid};

impl Database {
    /// Insert a profile or refresh its display name and avatar.
    pub fn upsert_profile(&self, profile: &Profile, now: DateTime<Utc>) -> Result<()> {
        if profile.display_name.trim().is_empty() {
            return Err(StoreError::Validation("display name is empty".into()));
        }
        self.conn().execute(
            "INSERT INTO profiles (id, display_name, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                avatar_url   = excluded.avatar_url",
            params![
                profile.id.to_string(),
                profile.display_name.trim(),
                profile.avatar_url,
                fmt_ts(now),
            ],
        )?;
        Ok(())
    }

    pub fn get_profile(&self, id: UserId) -> Result<Profile> {
        self.conn()
            .query_row(
                "SELECT id, display_name, avatar_url FROM profiles WHERE id = ?1",
                params![id.to_string()],
                row_to_profile,
            )
            .map_err(not_found)
    }

    /// Profile for `id`, or a placeholder if the user never created one.
    pub fn profile_or_unknown(&self, id: UserId) -> Result<Profile> {
        let found = self
            .conn()
            .query_row(
                "SELECT id, display_name, avatar_url FROM profiles WHERE id = ?1",
                params![id.to_string()],
                row_to_profile,
            )
            .optional()?;
        Ok(found.unwrap_or_else(|| Profile::unknown(id)))
    }

    /// Case-insensitive display-name search, excluding `exclude` (the caller).
    pub fn search_profiles(&self, query: &str, exclude: UserId, limit: u32) -> Result<Vec<Profile>> {
        let pattern = format!("%{}%", query.trim().to_lowercase());
        let mut stmt = self.conn().prepare(
            "SELECT id, display_name, avatar_url
             FROM profiles
             WHERE lower(display_name) LIKE ?1 AND id <> ?2
             ORDER BY display_name ASC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![pattern, exclude.to_string(), limit], row_to_profile)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    let id_str: String = row.get(0)?;
    Ok(Profile {
        id: UserId(parse_uuid(0, &id_str)?),
        display_name: row.get(1)?,
        avatar_url: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> Profile {
        Profile {
            id: UserId::new(),
            display_name: name.to_string(),
            avatar_url: None,
        }
    }

    #[test]
    fn test_upsert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let mut alice = profile("Alice");
        db.upsert_profile(&alice, Utc::now()).unwrap();
        assert_eq!(db.get_profile(alice.id).unwrap(), alice);

        alice.display_name = "Alice B".into();
        db.upsert_profile(&alice, Utc::now()).unwrap();
        assert_eq!(db.get_profile(alice.id).unwrap().display_name, "Alice B");
    }

    #[test]
    fn test_missing_profile() {
        let db = Database::open_in_memory().unwrap();
        let id = UserId::new();
        assert!(matches!(db.get_profile(id), Err(StoreError::NotFound)));
        assert_eq!(db.profile_or_unknown(id).unwrap(), Profile::unknown(id));
    }

    #[test]
    fn test_empty_name_rejected() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.upsert_profile(&profile("  "), Utc::now()),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_search_excludes_self() {
        let db = Database::open_in_memory().unwrap();
        let me = profile("Marta");
        let other = profile("Mariusz");
        db.upsert_profile(&me, Utc::now()).unwrap();
        db.upsert_profile(&other, Utc::now()).unwrap();

        let found = db.search_profiles("MAR", me.id, 10).unwrap();
        assert_eq!(found, vec![other]);
    }
}
