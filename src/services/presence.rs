use crate::domain::event::ServerEvent;
use dashmap::DashMap;
use opentelemetry::{
    global,
    metrics::{Counter, UpDownCounter},
};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Clone, Debug)]
struct Metrics {
    registered_total: Counter<u64>,
    reclaimed_total: Counter<u64>,
    online: UpDownCounter<i64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("parley-server");
        Self {
            registered_total: meter
                .u64_counter("parley_presence_registrations_total")
                .with_description("Total connection registrations")
                .build(),
            reclaimed_total: meter
                .u64_counter("parley_presence_reclaimed_total")
                .with_description("Total dead presence entries reclaimed by the sweeper")
                .build(),
            online: meter
                .i64_up_down_counter("parley_presence_online")
                .with_description("Number of users with a live presence entry")
                .build(),
        }
    }
}

/// A user's live connection: the identity of the socket session plus the
/// sender half of its outbound event queue.
#[derive(Debug)]
struct ConnectionHandle {
    connection_id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

/// Ticket handed to the session that owns a registration.
///
/// Disconnect handling passes this back instead of re-deriving the entry
/// from the user id, so a stale disconnect can never evict the entry of a
/// newer connection after a rapid reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub user_id: Uuid,
    pub connection_id: Uuid,
}

/// In-memory map from user identity to their single live connection.
///
/// The map's per-key atomic insert and conditional removal are the only
/// synchronization points: last-completed `register` wins, and `unregister`
/// removes an entry only when it still belongs to the disconnecting session.
#[derive(Debug)]
pub struct PresenceRegistry {
    entries: DashMap<Uuid, ConnectionHandle>,
    outbound_capacity: usize,
    metrics: Metrics,
}

impl PresenceRegistry {
    #[must_use]
    pub fn new(outbound_capacity: usize) -> Self {
        Self { entries: DashMap::new(), outbound_capacity, metrics: Metrics::new() }
    }

    /// Inserts or overwrites the entry for a user and returns the session's
    /// registration ticket together with the receiving half of its outbound
    /// queue.
    ///
    /// Overwriting drops the superseded connection's sender, which wakes and
    /// ends the old session loop.
    pub fn register(&self, user_id: Uuid) -> (Registration, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.outbound_capacity);
        let connection_id = Uuid::new_v4();

        let previous = self.entries.insert(user_id, ConnectionHandle { connection_id, tx });
        if previous.is_none() {
            self.metrics.online.add(1, &[]);
        }
        self.metrics.registered_total.add(1, &[]);
        tracing::debug!(%user_id, %connection_id, superseded = previous.is_some(), "Registered connection");

        (Registration { user_id, connection_id }, rx)
    }

    /// Removes the entry for the given registration; a no-op when the user
    /// has since reconnected or the entry is already gone. Returns whether
    /// an entry was removed.
    pub fn unregister(&self, registration: Registration) -> bool {
        let removed = self
            .entries
            .remove_if(&registration.user_id, |_, handle| {
                handle.connection_id == registration.connection_id
            })
            .is_some();

        if removed {
            self.metrics.online.add(-1, &[]);
            tracing::debug!(user_id = %registration.user_id, "Unregistered connection");
        } else {
            tracing::debug!(user_id = %registration.user_id, "Stale unregister ignored");
        }
        removed
    }

    /// The outbound queue of a user's live connection, if any.
    #[must_use]
    pub fn lookup(&self, user_id: Uuid) -> Option<mpsc::Sender<ServerEvent>> {
        self.entries.get(&user_id).map(|handle| handle.tx.clone())
    }

    /// Snapshot of every online user identity.
    #[must_use]
    pub fn online_users(&self) -> Vec<Uuid> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    /// Snapshot of every live connection's outbound queue, for broadcasts.
    #[must_use]
    pub fn connections(&self) -> Vec<(Uuid, mpsc::Sender<ServerEvent>)> {
        self.entries.iter().map(|entry| (*entry.key(), entry.value().tx.clone())).collect()
    }

    /// Reclaims entries whose session died without unregistering (receiver
    /// dropped). Returns the number of entries removed.
    pub fn sweep_dead(&self) -> usize {
        let mut reclaimed = 0usize;
        self.entries.retain(|_, handle| {
            let alive = !handle.tx.is_closed();
            if !alive {
                reclaimed += 1;
            }
            alive
        });

        if reclaimed > 0 {
            self.metrics.reclaimed_total.add(reclaimed as u64, &[]);
            self.metrics.online.add(-(reclaimed as i64), &[]);
            tracing::info!(reclaimed, "Presence sweep reclaimed dead entries");
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_most_recent_registration() {
        crate::telemetry::init_test_telemetry();

        let registry = PresenceRegistry::new(4);
        let user = Uuid::new_v4();

        let (_first, mut first_rx) = registry.register(user);
        let (_second, _second_rx) = registry.register(user);

        // The superseded sender was dropped, so the first session's queue
        // ends while the latest registration stays routable.
        assert!(first_rx.recv().await.is_none());
        assert!(registry.lookup(user).is_some());
        assert_eq!(registry.online_users(), vec![user]);
    }

    #[tokio::test]
    async fn stale_unregister_does_not_evict_newer_connection() {
        let registry = PresenceRegistry::new(4);
        let user = Uuid::new_v4();

        let (old, _old_rx) = registry.register(user);
        let (_new, _new_rx) = registry.register(user);

        assert!(!registry.unregister(old));
        assert!(registry.lookup(user).is_some());
    }

    #[tokio::test]
    async fn unregister_removes_own_entry_and_is_idempotent() {
        let registry = PresenceRegistry::new(4);
        let user = Uuid::new_v4();

        let (registration, _rx) = registry.register(user);
        assert!(registry.unregister(registration));
        assert!(registry.lookup(user).is_none());
        assert!(!registry.unregister(registration));
    }

    #[tokio::test]
    async fn sweep_reclaims_only_dead_entries() {
        let registry = PresenceRegistry::new(4);
        let alive_user = Uuid::new_v4();
        let dead_user = Uuid::new_v4();

        let (_alive, _alive_rx) = registry.register(alive_user);
        let (_dead, dead_rx) = registry.register(dead_user);
        drop(dead_rx);

        assert_eq!(registry.sweep_dead(), 1);
        assert!(registry.lookup(alive_user).is_some());
        assert!(registry.lookup(dead_user).is_none());
    }

    #[tokio::test]
    async fn concurrent_lifecycles_leave_unrelated_entries_intact() {
        let registry = std::sync::Arc::new(PresenceRegistry::new(4));
        let stable_user = Uuid::new_v4();
        let (_stable, _stable_rx) = registry.register(stable_user);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = std::sync::Arc::clone(&registry);
            tasks.push(tokio::spawn(async move {
                let user = Uuid::new_v4();
                for _ in 0..50 {
                    let (registration, _rx) = registry.register(user);
                    registry.unregister(registration);
                }
            }));
        }
        for task in tasks {
            task.await.expect("task");
        }

        assert!(registry.lookup(stable_user).is_some());
        assert_eq!(registry.online_users(), vec![stable_user]);
    }
}
