//! Realtime trigger: turns row-change notifications into refresh requests.

use reonika_shared::Table;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::backend::{ChangeNotice, ChangeSubscription};
use crate::coordinator::{CoordinatorHandle, RefreshTarget, RefreshTrigger};

/// Tables the client listens to.
pub const WATCHED_TABLES: [Table; 2] = [Table::Chats, Table::Messages];

/// Forward change notices to the coordinator until the feed closes or the
/// coordinator stops. The subscription is released on exit.
pub fn spawn_realtime_bridge(
    mut subscription: ChangeSubscription,
    handle: CoordinatorHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = subscription.recv().await {
            let alive = match notice {
                ChangeNotice::Change(event) => {
                    trace!(table = ?event.table, kind = ?event.kind, chat = %event.chat_id, "change received");
                    let listed = handle
                        .refresh(RefreshTarget::Conversations, RefreshTrigger::Realtime)
                        .await;
                    if event.table == Table::Messages {
                        listed
                            && handle
                                .refresh(RefreshTarget::Chat(event.chat_id), RefreshTrigger::Realtime)
                                .await
                    } else {
                        listed
                    }
                }
                ChangeNotice::Missed(n) => {
                    warn!(missed = n, "change feed lagged, refreshing everything");
                    handle.refresh_all(RefreshTrigger::Realtime).await
                }
            };
            if !alive {
                break;
            }
        }
        subscription.unsubscribe();
        debug!("realtime bridge stopped");
    })
}
