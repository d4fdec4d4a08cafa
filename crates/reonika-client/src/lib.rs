//! REonika client-side state manager.
//!
//! Keeps a conversation list and the open chat's messages consistent while
//! realtime notifications, a fallback poll and user navigation all ask for
//! refreshes at once. Messages vanish from every view 24 hours after they
//! were sent; a background sweeper removes them for good.

pub mod backend;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod local;
pub mod poll;
pub mod presence;
pub mod realtime;
pub mod reconciler;
pub mod session;
pub mod state;
pub mod sweeper;

use tracing_subscriber::{fmt, EnvFilter};

pub use backend::{Backend, ChangeNotice, ChangeSubscription};
pub use client::Client;
pub use config::ClientConfig;
pub use events::ViewEvent;
pub use local::LocalBackend;
pub use presence::{PresenceEvent, PresenceHub, PresenceSubscription, PresenceTracker};
pub use session::{check_session, SessionStatus};
pub use state::ViewSnapshot;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reonika_client=debug,reonika_store=info,warn"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
