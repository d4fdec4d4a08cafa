//! Fallback poll trigger.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::coordinator::{CoordinatorHandle, RefreshTarget, RefreshTrigger};

/// Every `period`: prune expired messages from the view, then ask for both
/// refresh targets. Stops once the coordinator is gone.
pub fn spawn_poller(handle: CoordinatorHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            trace!("poll tick");
            let alive = handle.prune().await
                && handle
                    .refresh(RefreshTarget::Conversations, RefreshTrigger::Poll)
                    .await
                && handle.refresh(RefreshTarget::OpenChat, RefreshTrigger::Poll).await;
            if !alive {
                break;
            }
        }
        debug!("poller stopped");
    })
}
