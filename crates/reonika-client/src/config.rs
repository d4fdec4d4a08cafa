//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client starts with zero configuration
//! for local development.

use std::path::PathBuf;
use std::time::Duration;

use reonika_shared::constants::{
    PRESENCE_CHANNEL, POLL_INTERVAL_SECS, SESSION_CHECK_TIMEOUT_SECS, SWEEP_INTERVAL_SECS,
};
use reonika_shared::UserId;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// SQLite database file.
    /// Env: `REONIKA_DB_PATH`
    /// Default: `None` (platform data directory).
    pub db_path: Option<PathBuf>,

    /// Local user id.
    /// Env: `REONIKA_USER_ID`
    /// Default: `None` (a fresh id per run).
    pub user_id: Option<UserId>,

    /// Display name upserted into the local profile.
    /// Env: `REONIKA_DISPLAY_NAME`
    /// Default: `"Anonymous"`
    pub display_name: String,

    /// Fallback poll interval.
    /// Env: `REONIKA_POLL_INTERVAL_SECS`
    /// Default: 30 s
    pub poll_interval: Duration,

    /// Expired-message sweep interval.
    /// Env: `REONIKA_SWEEP_INTERVAL_SECS`
    /// Default: 300 s
    pub sweep_interval: Duration,

    /// Upper bound for the session check.
    /// Env: `REONIKA_SESSION_TIMEOUT_SECS`
    /// Default: 8 s
    pub session_timeout: Duration,

    /// Presence channel name.
    /// Env: `REONIKA_PRESENCE_CHANNEL`
    /// Default: `"online-users"`
    pub presence_channel: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            user_id: None,
            display_name: "Anonymous".to_string(),
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            sweep_interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            session_timeout: Duration::from_secs(SESSION_CHECK_TIMEOUT_SECS),
            presence_channel: PRESENCE_CHANNEL.to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup("REONIKA_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Some(id) = lookup("REONIKA_USER_ID") {
            match UserId::parse(&id) {
                Ok(parsed) => config.user_id = Some(parsed),
                Err(e) => tracing::warn!(value = %id, error = %e, "Invalid REONIKA_USER_ID, ignoring"),
            }
        }

        if let Some(name) = lookup("REONIKA_DISPLAY_NAME") {
            if !name.trim().is_empty() {
                config.display_name = name.trim().to_string();
            }
        }

        if let Some(secs) = parse_secs(&lookup, "REONIKA_POLL_INTERVAL_SECS") {
            config.poll_interval = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "REONIKA_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = secs;
        }
        if let Some(secs) = parse_secs(&lookup, "REONIKA_SESSION_TIMEOUT_SECS") {
            config.session_timeout = secs;
        }

        if let Some(channel) = lookup("REONIKA_PRESENCE_CHANNEL") {
            if !channel.is_empty() {
                config.presence_channel = channel;
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}

/// A positive number of seconds, or `None` (with a warning when set but bad).
fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Some(Duration::from_secs(n)),
        _ => {
            tracing::warn!(key, value = %raw, "Invalid interval, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::from_lookup(lookup(&[]));
        assert_eq!(config.poll_interval, Duration::from_secs(30));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.session_timeout, Duration::from_secs(8));
        assert_eq!(config.presence_channel, "online-users");
        assert!(config.db_path.is_none());
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_overrides() {
        let id = UserId::new();
        let id_str = id.to_string();
        let config = ClientConfig::from_lookup(lookup(&[
            ("REONIKA_DB_PATH", "/tmp/reonika.db"),
            ("REONIKA_USER_ID", id_str.as_str()),
            ("REONIKA_DISPLAY_NAME", "  Mira "),
            ("REONIKA_POLL_INTERVAL_SECS", "5"),
            ("REONIKA_PRESENCE_CHANNEL", "lobby"),
        ]));
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/reonika.db")));
        assert_eq!(config.user_id, Some(id));
        assert_eq!(config.display_name, "Mira");
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.presence_channel, "lobby");
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("REONIKA_USER_ID", "not-a-uuid"),
            ("REONIKA_SWEEP_INTERVAL_SECS", "0"),
            ("REONIKA_SESSION_TIMEOUT_SECS", "soon"),
        ]));
        assert!(config.user_id.is_none());
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
        assert_eq!(config.session_timeout, Duration::from_secs(8));
    }
}
