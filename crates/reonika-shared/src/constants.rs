/// Application name
pub const APP_NAME: &str = "REonika";

/// Fixed message time-to-live in hours
pub const MESSAGE_TTL_HOURS: i64 = 24;

/// Poll fallback interval in seconds
pub const POLL_INTERVAL_SECS: u64 = 30;

/// Expired-message sweep interval in seconds (5 minutes)
pub const SWEEP_INTERVAL_SECS: u64 = 300;

/// Upper bound for the session check that gates the main view
pub const SESSION_CHECK_TIMEOUT_SECS: u64 = 8;

/// Default presence channel name
pub const PRESENCE_CHANNEL: &str = "online-users";

/// Maximum text message length in characters
pub const MAX_TEXT_LEN: usize = 4096;

/// Preview texts shown in the conversation list
pub const PREVIEW_NO_MESSAGES: &str = "No messages yet";
pub const PREVIEW_IMAGE: &str = "📷 Photo";
pub const PREVIEW_VOICE: &str = "🎤 Voice message";

/// Text previews longer than this are truncated with an ellipsis
pub const PREVIEW_MAX_CHARS: usize = 60;

/// Capacity of the coordinator command and view event channels
pub const CHANNEL_CAPACITY: usize = 256;
