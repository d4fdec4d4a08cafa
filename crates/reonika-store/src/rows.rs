//! Column encoding shared by the CRUD modules.
//!
//! Timestamps are stored as RFC-3339 UTC strings with millisecond precision
//! so that lexicographic order in SQL equals chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use uuid::Uuid;

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drop sub-millisecond precision so values survive a round trip unchanged.
pub(crate) fn normalize_ts(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts - chrono::Duration::nanoseconds(i64::from(ts.timestamp_subsec_nanos() % 1_000_000))
}

pub(crate) fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_opt_ts(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(idx, &v)).transpose()
}

/// Map "no rows" to [`StoreError::NotFound`](crate::StoreError::NotFound).
pub(crate) fn not_found(e: rusqlite::Error) -> crate::StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => crate::StoreError::NotFound,
        other => crate::StoreError::Sqlite(other),
    }
}

/// A UNIQUE (or PRIMARY KEY) failure. CHECK and foreign-key failures are not.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rusqlite::Connection;

    use super::*;

    #[test]
    fn test_only_unique_failures_count_as_unique_violations() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (k TEXT UNIQUE, n INTEGER CHECK (n > 0));
             INSERT INTO t (k, n) VALUES ('a', 1);",
        )
        .unwrap();

        let duplicate = conn
            .execute("INSERT INTO t (k, n) VALUES ('a', 2)", [])
            .unwrap_err();
        assert!(is_unique_violation(&duplicate));

        let failed_check = conn
            .execute("INSERT INTO t (k, n) VALUES ('b', 0)", [])
            .unwrap_err();
        assert!(!is_unique_violation(&failed_check));
    }

    #[test]
    fn test_timestamp_strings_sort_chronologically() {
        let t0 = DateTime::parse_from_rfc3339("2026-03-01T09:59:59.999Z")
            .unwrap()
            .with_timezone(&Utc);
        let t1 = t0 + Duration::milliseconds(1);
        assert!(fmt_ts(t0) < fmt_ts(t1));
        assert_eq!(parse_ts(0, &fmt_ts(t1)).unwrap(), t1);
    }

    #[test]
    fn test_normalized_timestamp_round_trips() {
        let now = normalize_ts(Utc::now());
        assert_eq!(parse_ts(0, &fmt_ts(now)).unwrap(), now);
    }
}
