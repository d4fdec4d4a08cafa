//! Presence tracking.
//!
//! A [`PresenceHub`] is the in-process stand-in for the platform's presence
//! channels. Each client holds one [`PresenceSubscription`] per channel; the
//! subscription task folds sync/join/leave events into a [`PresenceTracker`]
//! that the rest of the client only reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use reonika_shared::constants::CHANNEL_CAPACITY;
use reonika_shared::{PresenceStatus, UserId};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{emit_event, ViewEvent};

/// What a presence subscription yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// Full membership of the channel.
    Sync(Vec<(UserId, PresenceStatus)>),
    Join(UserId, PresenceStatus),
    Leave(UserId),
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

struct PresenceChannel {
    members: HashMap<UserId, PresenceStatus>,
    tx: broadcast::Sender<PresenceEvent>,
}

impl PresenceChannel {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            members: HashMap::new(),
            tx,
        }
    }

    fn snapshot(&self) -> Vec<(UserId, PresenceStatus)> {
        let mut members: Vec<_> = self.members.iter().map(|(id, s)| (*id, *s)).collect();
        members.sort_by_key(|(id, _)| *id);
        members
    }
}

#[derive(Clone, Default)]
pub struct PresenceHub {
    channels: Arc<Mutex<HashMap<String, PresenceChannel>>>,
}

impl PresenceHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join `channel` as `me`. Nothing is announced until
    /// [`PresenceSubscription::track`] is called.
    pub fn subscribe(&self, channel: &str, me: UserId) -> PresenceSubscription {
        let rx = self
            .lock()
            .entry(channel.to_string())
            .or_insert_with(PresenceChannel::new)
            .tx
            .subscribe();
        debug!(channel, user = %me, "presence subscription opened");
        PresenceSubscription {
            hub: self.clone(),
            channel: channel.to_string(),
            me,
            rx,
            synced: false,
            tracked: false,
        }
    }

    /// Current members of `channel`, sorted by id.
    pub fn members(&self, channel: &str) -> Vec<(UserId, PresenceStatus)> {
        self.lock()
            .get(channel)
            .map(PresenceChannel::snapshot)
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PresenceChannel>> {
        // Membership maps stay consistent even if a holder panicked.
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, channel: &str, event: PresenceEvent) {
        let mut channels = self.lock();
        let Some(entry) = channels.get_mut(channel) else {
            return;
        };
        match &event {
            PresenceEvent::Join(id, status) => {
                entry.members.insert(*id, *status);
            }
            PresenceEvent::Leave(id) => {
                entry.members.remove(id);
            }
            PresenceEvent::Sync(_) => {}
        }
        let _ = entry.tx.send(event);
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Membership of one presence channel. Dropping it leaves the channel.
pub struct PresenceSubscription {
    hub: PresenceHub,
    channel: String,
    me: UserId,
    rx: broadcast::Receiver<PresenceEvent>,
    synced: bool,
    tracked: bool,
}

impl PresenceSubscription {
    /// Announce the local user with `status`.
    pub fn track(&mut self, status: PresenceStatus) {
        self.tracked = true;
        self.hub
            .update(&self.channel, PresenceEvent::Join(self.me, status));
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next presence event. The first call yields a full sync; a subscriber
    /// that falls behind is resynced instead of replaying what it missed.
    pub async fn recv(&mut self) -> Option<PresenceEvent> {
        if !self.synced {
            self.synced = true;
            return Some(PresenceEvent::Sync(self.hub.members(&self.channel)));
        }
        match self.rx.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(channel = %self.channel, missed = n, "presence feed lagged, resyncing");
                Some(PresenceEvent::Sync(self.hub.members(&self.channel)))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

impl Drop for PresenceSubscription {
    fn drop(&mut self) {
        if self.tracked {
            self.hub.update(&self.channel, PresenceEvent::Leave(self.me));
        }
        debug!(channel = %self.channel, user = %self.me, "presence subscription closed");
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Who is online, as last reported by the presence channel.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    online: HashMap<UserId, PresenceStatus>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_sync(&mut self, members: Vec<(UserId, PresenceStatus)>) {
        self.online = members.into_iter().collect();
    }

    pub fn on_join(&mut self, user: UserId, status: PresenceStatus) {
        if self.online.insert(user, status).is_none() {
            debug!(user = %user, "user came online");
        }
    }

    pub fn on_leave(&mut self, user: &UserId) {
        if self.online.remove(user).is_some() {
            debug!(user = %user, "user went offline");
        }
    }

    /// Apply one event. Returns whether the online set changed.
    pub fn apply(&mut self, event: PresenceEvent) -> bool {
        let before = self.online_users();
        match event {
            PresenceEvent::Sync(members) => self.on_sync(members),
            PresenceEvent::Join(user, status) => self.on_join(user, status),
            PresenceEvent::Leave(user) => self.on_leave(&user),
        }
        before != self.online_users()
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.contains_key(user)
    }

    /// Online users, sorted by id.
    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.online.keys().copied().collect();
        users.sort();
        users
    }
}

/// Drive `subscription` into `tracker`, emitting `PresenceChanged` whenever
/// the online set changes. Ends when the channel closes.
pub fn spawn_presence_task(
    mut subscription: PresenceSubscription,
    tracker: Arc<RwLock<PresenceTracker>>,
    view_tx: mpsc::Sender<ViewEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(channel = %subscription.channel(), "presence task started");
        while let Some(event) = subscription.recv().await {
            let online = {
                let mut guard = match tracker.write() {
                    Ok(guard) => guard,
                    Err(e) => {
                        warn!(error = %e, "presence tracker poisoned, stopping");
                        break;
                    }
                };
                guard.apply(event).then(|| guard.online_users())
            };
            if let Some(online) = online {
                debug!(online = online.len(), "presence changed");
                emit_event(&view_tx, ViewEvent::PresenceChanged { online });
            }
        }
        debug!("presence task stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[test]
    fn test_tracker_join_leave() {
        let mut tracker = PresenceTracker::new();
        let user = UserId::new();

        assert!(!tracker.is_online(&user));
        assert!(tracker.apply(PresenceEvent::Join(user, PresenceStatus::Online)));
        assert!(tracker.is_online(&user));
        // Status change only: online set unchanged.
        assert!(!tracker.apply(PresenceEvent::Join(user, PresenceStatus::Away)));
        assert_eq!(tracker.online_users(), vec![user]);

        assert!(tracker.apply(PresenceEvent::Leave(user)));
        assert!(!tracker.is_online(&user));
        assert!(tracker.online_users().is_empty());
    }

    #[test]
    fn test_sync_replaces_membership() {
        let mut tracker = PresenceTracker::new();
        let stale = UserId::new();
        let fresh = UserId::new();
        tracker.on_join(stale, PresenceStatus::Online);

        tracker.on_sync(vec![(fresh, PresenceStatus::Online)]);
        assert!(!tracker.is_online(&stale));
        assert_eq!(tracker.online_users(), vec![fresh]);
    }

    #[tokio::test]
    async fn test_subscription_sync_then_join_then_leave_on_drop() {
        let hub = PresenceHub::new();
        let a = UserId::new();
        let b = UserId::new();

        let mut sub_a = hub.subscribe("online-users", a);
        sub_a.track(PresenceStatus::Online);

        let mut sub_b = hub.subscribe("online-users", b);
        assert_eq!(
            sub_b.recv().await,
            Some(PresenceEvent::Sync(vec![(a, PresenceStatus::Online)]))
        );

        sub_a.track(PresenceStatus::Away);
        assert_eq!(
            sub_b.recv().await,
            Some(PresenceEvent::Join(a, PresenceStatus::Away))
        );

        drop(sub_a);
        assert_eq!(sub_b.recv().await, Some(PresenceEvent::Leave(a)));
        assert!(hub.members("online-users").is_empty());
    }

    #[tokio::test]
    async fn test_presence_task_emits_changes() {
        let hub = PresenceHub::new();
        let me = UserId::new();
        let other = UserId::new();
        let tracker = Arc::new(RwLock::new(PresenceTracker::new()));
        let (view_tx, mut view_rx) = mpsc::channel(16);

        let mut mine = hub.subscribe("online-users", me);
        mine.track(PresenceStatus::Online);
        let task = spawn_presence_task(mine, tracker.clone(), view_tx);

        let first = timeout(Duration::from_secs(5), view_rx.recv()).await.unwrap();
        assert_eq!(first, Some(ViewEvent::PresenceChanged { online: vec![me] }));

        let mut theirs = hub.subscribe("online-users", other);
        theirs.track(PresenceStatus::Online);
        let second = timeout(Duration::from_secs(5), view_rx.recv()).await.unwrap();
        match second {
            Some(ViewEvent::PresenceChanged { online }) => assert!(online.contains(&other)),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(tracker.read().unwrap().is_online(&other));
        task.abort();
    }
}
