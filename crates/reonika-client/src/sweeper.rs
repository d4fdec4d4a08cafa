//! Message lifecycle sweeper.
//!
//! Physically removes expired messages the partner sent to the local user.
//! The local user's own expired messages are left for the platform's
//! retention; they are already invisible to everyone.

use std::sync::Arc;
use std::time::Duration;

use reonika_shared::{Result, UserId};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::Backend;

/// Run one sweep. Returns the number of rows removed.
pub async fn sweep_once(backend: &dyn Backend, me: UserId) -> Result<usize> {
    let purged = backend.purge_expired_messages(me).await?;
    if purged > 0 {
        info!(user = %me, purged, "swept expired messages");
    } else {
        debug!(user = %me, "sweep found nothing to remove");
    }
    Ok(purged)
}

/// Sweep now and then every `period`. Failures are logged and the next tick
/// tries again.
pub fn spawn_sweeper(backend: Arc<dyn Backend>, me: UserId, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        // The first tick completes immediately: that is the startup sweep.
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match sweep_once(backend.as_ref(), me).await {
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    warn!(user = %me, error = %e, "sweep failed, retrying next tick");
                }
                Err(e) => error!(user = %me, error = %e, "sweep rejected"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};
    use reonika_shared::{ManualClock, Payload};
    use reonika_store::Database;

    use super::*;
    use crate::local::LocalBackend;

    #[tokio::test]
    async fn test_sweep_spares_own_messages() {
        let clock = ManualClock::new(Utc::now());
        let backend = LocalBackend::new(Database::open_in_memory().unwrap(), Arc::new(clock.clone()));
        let a = UserId::new();
        let b = UserId::new();
        let chat = backend.create_or_get_conversation(a, b).await.unwrap();
        backend.create_message(chat.id, a, Payload::text("from a")).await.unwrap();
        backend.create_message(chat.id, b, Payload::text("from b")).await.unwrap();

        clock.advance(ChronoDuration::hours(25));
        assert_eq!(sweep_once(&backend, a).await.unwrap(), 1);

        let remaining = backend.database().lock().unwrap().count_message_rows(chat.id).unwrap();
        assert_eq!(remaining, 1);
        // A second sweep by the same user finds nothing new.
        assert_eq!(sweep_once(&backend, a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweeper_runs_at_startup() {
        let clock = ManualClock::new(Utc::now());
        let backend = Arc::new(LocalBackend::new(
            Database::open_in_memory().unwrap(),
            Arc::new(clock.clone()),
        ));
        let a = UserId::new();
        let b = UserId::new();
        let chat = backend.create_or_get_conversation(a, b).await.unwrap();
        backend.create_message(chat.id, a, Payload::text("old")).await.unwrap();
        clock.advance(ChronoDuration::hours(25));

        let task = spawn_sweeper(backend.clone(), b, Duration::from_secs(300));
        for _ in 0..100 {
            if backend.database().lock().unwrap().count_message_rows(chat.id).unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            backend.database().lock().unwrap().count_message_rows(chat.id).unwrap(),
            0
        );
        task.abort();
    }
}
