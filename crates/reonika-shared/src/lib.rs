//! Types shared by the REonika store, state manager and CLI: identifiers,
//! domain records, the visibility filter, the clock and the error taxonomy.

pub mod clock;
pub mod constants;
pub mod error;
pub mod models;
pub mod types;
pub mod visibility;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Notice, ReonikaError, Result};
pub use models::*;
pub use types::{ChatId, MessageId, PresenceStatus, UserId};
pub use visibility::ChatSummary;
